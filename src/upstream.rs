use crate::{constants::API_ERROR_BACKEND_UNREACHABLE, error::RegistryError};
use axum::{
    body::{Body, Bytes, HttpBody},
    http::{HeaderMap, HeaderValue, Request, header},
    response::Response,
};
use reqwest::{Client, redirect};
use std::time::Duration;
use tracing::debug;

const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Client for the registry backend. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Upstream {
    client: Client,
}

impl Upstream {
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .redirect(redirect::Policy::none())
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self { client })
    }

    /// Streams `req` to `registry` and the backend reply back to the caller.
    pub async fn forward(
        &self,
        registry: &str,
        req: Request<Body>,
    ) -> Result<Response, RegistryError> {
        let resp = self.send(registry, req, false).await?;
        let mut builder = Response::builder().status(resp.status());
        if let Some(headers) = builder.headers_mut() {
            copy_end_to_end(resp.headers(), headers);
        }
        builder
            .body(Body::from_stream(resp.bytes_stream()))
            .map_err(|_| RegistryError::unavailable(API_ERROR_BACKEND_UNREACHABLE))
    }

    /// Like [`Upstream::forward`], but hands the complete backend body to
    /// `rewrite` before replying.
    pub async fn forward_with_rewrite<F>(
        &self,
        registry: &str,
        req: Request<Body>,
        rewrite: F,
    ) -> Result<Response, RegistryError>
    where
        F: FnOnce(Bytes) -> Result<Bytes, RegistryError>,
    {
        let resp = self.send(registry, req, true).await?;
        let status = resp.status();
        let mut headers = HeaderMap::new();
        copy_end_to_end(resp.headers(), &mut headers);
        let body = rewrite(resp.bytes().await?)?;

        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(body.len()));
        let mut builder = Response::builder().status(status);
        if let Some(target) = builder.headers_mut() {
            *target = headers;
        }
        builder
            .body(Body::from(body))
            .map_err(|_| RegistryError::unavailable(API_ERROR_BACKEND_UNREACHABLE))
    }

    async fn send(
        &self,
        registry: &str,
        req: Request<Body>,
        identity_encoding: bool,
    ) -> Result<reqwest::Response, RegistryError> {
        let (parts, body) = req.into_parts();
        let path_and_query = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        let url = format!("{registry}{path_and_query}");
        debug!(method = %parts.method, url = url.as_str(), "forwarding to registry backend");

        let mut headers = HeaderMap::new();
        copy_end_to_end(&parts.headers, &mut headers);
        headers.remove(header::AUTHORIZATION);
        headers.remove(header::HOST);
        if identity_encoding {
            headers.insert(header::ACCEPT_ENCODING, HeaderValue::from_static("identity"));
        }

        let mut outbound = self.client.request(parts.method, url).headers(headers);
        if !body.is_end_stream() {
            outbound = outbound.body(reqwest::Body::wrap_stream(body.into_data_stream()));
        }
        Ok(outbound.send().await?)
    }
}

fn copy_end_to_end(from: &HeaderMap, to: &mut HeaderMap) {
    for (name, value) in from {
        if HOP_BY_HOP.contains(&name.as_str()) {
            continue;
        }
        to.append(name.clone(), value.clone());
    }
}
