use crate::{
    app::AppState,
    catalog::filter_catalog,
    constants::{API_ERROR_NO_BACKEND, API_ERROR_NOT_FOUND},
    error::{ErrorCode, RegistryError},
    pipeline::RequestContext,
};
use axum::{
    body::Body,
    extract::{Request, State},
    http::{Method, Response, StatusCode, header},
};
use tracing::{debug, warn};

const BASE_PATH: &str = "/v2/";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// `/v2`, answered with a redirect to `/v2/`.
    BaseRedirect,
    /// `/v2/`, the API version check.
    Base,
    Catalog,
    /// Everything else under `/v2/`.
    Repository,
    NotFound,
}

impl Route {
    pub fn classify(path: &str) -> Self {
        match path {
            "/v2" => Self::BaseRedirect,
            BASE_PATH => Self::Base,
            "/v2/_catalog" => Self::Catalog,
            _ if path.starts_with(BASE_PATH) => Self::Repository,
            _ => Self::NotFound,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::BaseRedirect => "base-redirect",
            Self::Base => "base",
            Self::Catalog => "catalog",
            Self::Repository => "repository",
            Self::NotFound => "not-found",
        }
    }
}

pub async fn dispatch(
    State(state): State<AppState>,
    req: Request<Body>,
) -> Result<Response<Body>, RegistryError> {
    let route = Route::classify(req.uri().path());
    debug!(
        method = %req.method(),
        path = req.uri().path(),
        route = route.as_str(),
        "dispatching request"
    );

    let pipeline = match route {
        Route::BaseRedirect => return Ok(redirect_to_base()),
        Route::NotFound => {
            return Err(RegistryError::new(ErrorCode::NotFound, API_ERROR_NOT_FOUND));
        }
        Route::Base | Route::Catalog => &state.gate,
        Route::Repository => &state.repository_gate,
    };

    let config = state.config.current().await;
    let mut ctx = RequestContext::new(
        req.method().clone(),
        req.uri().path(),
        req.headers().clone(),
        config.clone(),
    );
    pipeline.run(&mut ctx).await?;

    let Some(registry) = config.registry.as_deref() else {
        warn!(path = ctx.path.as_str(), "no registry backend configured");
        return Err(RegistryError::unavailable(API_ERROR_NO_BACKEND));
    };

    // HEAD replies carry no catalog body.
    let filtered = route == Route::Catalog && req.method() != Method::HEAD;
    match ctx.identity {
        Some(identity) if filtered && !identity.user.repos.is_unrestricted() => {
            state
                .upstream
                .forward_with_rewrite(registry, req, move |body| {
                    filter_catalog(&identity.user, body)
                })
                .await
        }
        _ => state.upstream.forward(registry, req).await,
    }
}

fn redirect_to_base() -> Response<Body> {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::FOUND;
    response
        .headers_mut()
        .insert(header::LOCATION, header::HeaderValue::from_static(BASE_PATH));
    response
}
