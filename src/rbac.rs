use crate::{
    constants::{API_ERROR_ACCESS_DENIED, API_ERROR_DELETE_DENIED, API_ERROR_READ_ONLY},
    error::RegistryError,
    models::Role,
    pipeline::{Outcome, RequestContext, Stage, StageError},
};
use async_trait::async_trait;
use axum::http::Method;
use tracing::{info, warn};

/// Returns the denial message when `role` may not use `method`.
pub fn method_denial(role: Option<Role>, method: &Method) -> Option<&'static str> {
    match role {
        None => Some(API_ERROR_ACCESS_DENIED),
        Some(Role::Reader) => {
            let name = method.as_str();
            if name.eq_ignore_ascii_case("get") || name.eq_ignore_ascii_case("head") {
                None
            } else {
                Some(API_ERROR_READ_ONLY)
            }
        }
        Some(Role::Writer) => {
            if method.as_str().eq_ignore_ascii_case("delete") {
                Some(API_ERROR_DELETE_DENIED)
            } else {
                None
            }
        }
        Some(Role::Admin) => None,
    }
}

/// Gates HTTP methods by the authenticated user's role.
#[derive(Debug, Clone, Copy, Default)]
pub struct AuthorizeMethod;

#[async_trait]
impl Stage for AuthorizeMethod {
    fn name(&self) -> &'static str {
        "authorize-method"
    }

    async fn handle(&self, ctx: &mut RequestContext) -> Result<Outcome, StageError> {
        let Some(identity) = ctx.identity.as_ref() else {
            warn!(path = ctx.path.as_str(), "unauthorized request, no identity attached");
            return Ok(Outcome::Deny(RegistryError::unauthorized()));
        };

        match method_denial(identity.user.role, &ctx.method) {
            None => Ok(Outcome::Continue),
            Some(message) => {
                if identity.user.role.is_none() {
                    warn!(
                        path = ctx.path.as_str(),
                        user = identity.name(),
                        "deny request, user has no role"
                    );
                } else {
                    info!(
                        method = %ctx.method,
                        path = ctx.path.as_str(),
                        user = identity.name(),
                        role = identity.user.role.map(Role::as_str).unwrap_or("<none>"),
                        "deny request"
                    );
                }
                Ok(Outcome::Deny(RegistryError::denied(message)))
            }
        }
    }
}
