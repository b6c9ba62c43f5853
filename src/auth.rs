//! HTTP Basic authentication against the static user table.

use crate::{
    credential::{Credential, hash_password},
    error::RegistryError,
    models::RequestIdentity,
    pipeline::{Outcome, RequestContext, Stage, StageError},
};
use async_trait::async_trait;
use axum::http::{HeaderMap, header};
use base64::{Engine as _, engine::general_purpose::STANDARD as B64};
use std::sync::OnceLock;
use tracing::info;

/// Secret of the decoy hash checked for names that match no user.
const DECOY_SECRET: &str = "registry-guard-decoy";

/// Name and password as sent by the client, not yet checked.
#[derive(Clone, PartialEq, Eq)]
pub struct BasicCredentials {
    pub name: String,
    pub password: String,
}

impl std::fmt::Debug for BasicCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BasicCredentials")
            .field("name", &self.name)
            .field("password", &crate::constants::REDACTED)
            .finish()
    }
}

/// Why a header did not yield credentials. Only ever logged.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CredentialsError {
    #[error("no authorization header")]
    Missing,
    #[error("authorization header is not visible ASCII")]
    NotAscii,
    #[error("unsupported authorization scheme '{0}'")]
    Scheme(String),
    #[error("basic payload is not valid base64")]
    Base64,
    #[error("basic payload is not valid UTF-8")]
    Utf8,
}

pub fn parse_basic(headers: &HeaderMap) -> Result<BasicCredentials, CredentialsError> {
    let raw = headers
        .get(header::AUTHORIZATION)
        .ok_or(CredentialsError::Missing)?
        .to_str()
        .map_err(|_| CredentialsError::NotAscii)?;
    if raw.trim().is_empty() {
        return Err(CredentialsError::Missing);
    }
    let (scheme, payload) = raw.split_once(' ').unwrap_or((raw, ""));
    if !scheme.eq_ignore_ascii_case("basic") {
        return Err(CredentialsError::Scheme(scheme.to_string()));
    }
    let decoded = B64
        .decode(payload.trim())
        .map_err(|_| CredentialsError::Base64)?;
    let decoded = String::from_utf8(decoded).map_err(|_| CredentialsError::Utf8)?;
    let (name, password) = decoded.split_once(':').unwrap_or((decoded.as_str(), ""));
    Ok(BasicCredentials {
        name: name.to_string(),
        password: password.to_string(),
    })
}

/// Resolves the caller to a configured user and attaches it to the request.
#[derive(Debug, Clone, Copy, Default)]
pub struct Authenticate;

#[async_trait]
impl Stage for Authenticate {
    fn name(&self) -> &'static str {
        "authenticate"
    }

    async fn handle(&self, ctx: &mut RequestContext) -> Result<Outcome, StageError> {
        trace_request(ctx);
        let credentials = match parse_basic(&ctx.headers) {
            Ok(credentials) => credentials,
            Err(err) => {
                info!(path = ctx.path.as_str(), reason = %err, "unauthorized request");
                return Ok(Outcome::Deny(RegistryError::unauthorized()));
            }
        };

        let Some(user) = ctx.config.find_user(&credentials.name).cloned() else {
            let password = credentials.password;
            tokio::task::spawn_blocking(move || {
                if let Some(decoy) = decoy_credential() {
                    decoy.verify(&password);
                }
            })
            .await?;
            info!(
                path = ctx.path.as_str(),
                user = credentials.name.as_str(),
                "unauthorized request, unknown user or wrong password"
            );
            return Ok(Outcome::Deny(RegistryError::unauthorized()));
        };

        let verified = if user.credential.is_hashed() {
            let candidate = user.clone();
            let password = credentials.password;
            tokio::task::spawn_blocking(move || candidate.credential.verify(&password)).await?
        } else {
            user.credential.verify(&credentials.password)
        };

        if !verified {
            info!(
                path = ctx.path.as_str(),
                user = credentials.name.as_str(),
                "unauthorized request, unknown user or wrong password"
            );
            return Ok(Outcome::Deny(RegistryError::unauthorized()));
        }

        ctx.identity = Some(RequestIdentity::new(user));
        Ok(Outcome::Continue)
    }
}

/// A bcrypt hash at the default cost, verified against when the name is
/// unknown so that such requests take as long as a wrong password.
fn decoy_credential() -> Option<&'static Credential> {
    static DECOY: OnceLock<Option<Credential>> = OnceLock::new();
    DECOY
        .get_or_init(|| {
            hash_password(DECOY_SECRET)
                .ok()
                .and_then(|hash| Credential::new(hash).ok())
        })
        .as_ref()
}

fn trace_request(ctx: &RequestContext) {
    if !tracing::enabled!(tracing::Level::TRACE) {
        return;
    }
    tracing::trace!(method = %ctx.method, path = ctx.path.as_str(), "request");
    let mut names: Vec<&str> = ctx.headers.keys().map(|name| name.as_str()).collect();
    names.sort_unstable();
    names.dedup();
    for name in names {
        if name == header::AUTHORIZATION.as_str() {
            tracing::trace!(header = name, values = crate::constants::REDACTED, "request header");
            continue;
        }
        let values = ctx
            .headers
            .get_all(name)
            .iter()
            .map(|value| value.to_str().unwrap_or("<binary>"))
            .collect::<Vec<_>>()
            .join(", ");
        tracing::trace!(header = name, values, "request header");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        acl::RepoAcl,
        config::Config,
        credential::Credential,
        error::ErrorCode,
        models::{Role, User},
    };
    use axum::http::{HeaderValue, Method};
    use std::sync::Arc;

    fn headers_with(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(value).expect("header"),
        );
        headers
    }

    fn basic(raw: &str) -> String {
        format!("Basic {}", B64.encode(raw))
    }

    fn config() -> Arc<Config> {
        let hashed = bcrypt::hash("s3cret", 4).expect("hash");
        Arc::new(
            Config::new(
                Some("http://registry".to_string()),
                vec![
                    User {
                        name: "alice".to_string(),
                        credential: Credential::new("secret").expect("credential"),
                        role: Some(Role::Admin),
                        repos: RepoAcl::unrestricted(),
                    },
                    User {
                        name: "bob".to_string(),
                        credential: Credential::new(hashed.replacen("$2b$", "$2y$", 1))
                            .expect("credential"),
                        role: Some(Role::Reader),
                        repos: RepoAcl::unrestricted(),
                    },
                ],
            )
            .expect("config"),
        )
    }

    async fn run(headers: HeaderMap) -> (Outcome, Option<String>) {
        let mut ctx = RequestContext::new(Method::GET, "/v2/", headers, config());
        let outcome = Authenticate.handle(&mut ctx).await.expect("stage");
        (outcome, ctx.identity.map(|id| id.name().to_string()))
    }

    fn is_unauthorized(outcome: &Outcome) -> bool {
        matches!(outcome, Outcome::Deny(err) if err.code == ErrorCode::Unauthorized)
    }

    #[test]
    fn parses_basic_header() {
        let creds = parse_basic(&headers_with(&basic("alice:pa:ss"))).expect("creds");
        assert_eq!(creds.name, "alice");
        assert_eq!(creds.password, "pa:ss");

        let creds = parse_basic(&headers_with(&format!("bAsIc {}", B64.encode("bob"))))
            .expect("creds");
        assert_eq!(creds.name, "bob");
        assert_eq!(creds.password, "");
    }

    #[test]
    fn rejects_malformed_headers() {
        assert_eq!(parse_basic(&HeaderMap::new()), Err(CredentialsError::Missing));
        assert_eq!(parse_basic(&headers_with("   ")), Err(CredentialsError::Missing));
        assert_eq!(
            parse_basic(&headers_with("Bearer abc")),
            Err(CredentialsError::Scheme("Bearer".to_string()))
        );
        assert_eq!(
            parse_basic(&headers_with("Basic !!!not-base64")),
            Err(CredentialsError::Base64)
        );
        assert_eq!(
            parse_basic(&headers_with(&format!("Basic {}", B64.encode([0xff, 0xfe, b':'])))),
            Err(CredentialsError::Utf8)
        );
    }

    #[test]
    fn debug_hides_presented_password() {
        let creds = parse_basic(&headers_with(&basic("alice:hunter2"))).expect("creds");
        assert!(!format!("{creds:?}").contains("hunter2"));
    }

    #[tokio::test]
    async fn attaches_identity_for_valid_plain_and_bcrypt_users() {
        let (outcome, identity) = run(headers_with(&basic("alice:secret"))).await;
        assert!(matches!(outcome, Outcome::Continue));
        assert_eq!(identity.as_deref(), Some("alice"));

        let (outcome, identity) = run(headers_with(&basic("bob:s3cret"))).await;
        assert!(matches!(outcome, Outcome::Continue));
        assert_eq!(identity.as_deref(), Some("bob"));
    }

    #[test]
    fn decoy_is_a_default_cost_bcrypt_hash() {
        match decoy_credential() {
            Some(Credential::Bcrypt(hash)) => {
                assert!(hash.starts_with(&format!("$2b${:02}$", bcrypt::DEFAULT_COST)));
            }
            other => panic!("unexpected decoy {other:?}"),
        }
    }

    #[tokio::test]
    async fn unknown_user_is_denied_even_with_decoy_secret() {
        let headers = headers_with(&basic(&format!("ghost:{DECOY_SECRET}")));
        let (outcome, identity) = run(headers).await;
        assert!(is_unauthorized(&outcome));
        assert!(identity.is_none());
    }

    #[tokio::test]
    async fn denies_missing_unknown_and_wrong_credentials() {
        for headers in [
            HeaderMap::new(),
            headers_with(&basic("alice:wrong")),
            headers_with(&basic("Alice:secret")),
            headers_with(&basic("mallory:secret")),
            headers_with(&basic("bob:secret")),
            headers_with("Digest username=alice"),
        ] {
            let (outcome, identity) = run(headers).await;
            assert!(is_unauthorized(&outcome));
            assert!(identity.is_none());
        }
    }
}
