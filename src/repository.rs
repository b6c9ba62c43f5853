//! Repository-name extraction and per-repository authorization.
//!
//! The repository name is whatever sits between `v2` and the rightmost
//! `tags`, `manifests` or `blobs` segment. A repository whose own name has one
//! of those words as a segment followed by another keyword further right still
//! resolves correctly; a name whose last keyword-like segment is part of the
//! name itself does not, since the path alone cannot tell them apart.
//!
//! Paths with `.` or `..` segments, backslashes, or percent-encoded forms of
//! any of those or of `/` resolve to nothing: the backend normalizes them, so
//! the repository checked here would not be the one served.

use crate::{
    constants::API_ERROR_ACCESS_DENIED,
    error::RegistryError,
    pipeline::{Outcome, RequestContext, Stage, StageError},
};
use async_trait::async_trait;
use tracing::{debug, info, warn};

const ROUTE_KEYWORDS: [&str; 3] = ["tags", "manifests", "blobs"];

pub fn resolve_repository(path: &str) -> Option<String> {
    let lowered = path.to_ascii_lowercase();
    if lowered.contains('\\')
        || lowered.contains("%2f")
        || lowered.contains("%5c")
        || lowered.split('/').any(is_dot_segment)
    {
        return None;
    }
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let end = segments
        .iter()
        .rposition(|segment| ROUTE_KEYWORDS.contains(segment))?;
    if end <= 1 {
        return None;
    }
    Some(segments[1..end].join("/"))
}

fn is_dot_segment(segment: &str) -> bool {
    let decoded = segment.replace("%2e", ".");
    decoded == "." || decoded == ".."
}

/// Lets the request through only if the caller may see the repository in its
/// path.
#[derive(Debug, Clone, Copy, Default)]
pub struct AuthorizeRepository;

#[async_trait]
impl Stage for AuthorizeRepository {
    fn name(&self) -> &'static str {
        "authorize-repository"
    }

    async fn handle(&self, ctx: &mut RequestContext) -> Result<Outcome, StageError> {
        let Some(identity) = ctx.identity.as_ref() else {
            warn!(path = ctx.path.as_str(), "unauthorized request, no identity attached");
            return Ok(Outcome::Deny(RegistryError::unauthorized()));
        };

        let repository = resolve_repository(&ctx.path).filter(|name| !name.trim().is_empty());
        debug!(
            path = ctx.path.as_str(),
            repository = repository.as_deref().unwrap_or("<none>"),
            "resolved repository"
        );
        let Some(repository) = repository else {
            info!(path = ctx.path.as_str(), "deny request, repository is blank");
            return Ok(Outcome::Deny(RegistryError::denied(API_ERROR_ACCESS_DENIED)));
        };

        if identity.user.can_access_repo(&repository) {
            return Ok(Outcome::Continue);
        }

        info!(
            user = identity.name(),
            repository = repository.as_str(),
            "deny request, insufficient privilege for repository"
        );
        Ok(Outcome::Deny(RegistryError::denied(format!(
            "{API_ERROR_ACCESS_DENIED}, repository '{repository}'"
        ))))
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
        models::{RequestIdentity, Role, User},
    };
    use axum::http::{HeaderMap, Method};
    use std::sync::Arc;

    #[test]
    fn resolves_repository_names() {
        assert_eq!(
            resolve_repository("v2/myteam/myimage/manifests/latest").as_deref(),
            Some("myteam/myimage")
        );
        assert_eq!(
            resolve_repository("/v2/library/ubuntu/blobs/sha256:abc").as_deref(),
            Some("library/ubuntu")
        );
        assert_eq!(
            resolve_repository("/v2/app/blobs/uploads/3f1a").as_deref(),
            Some("app")
        );
        assert_eq!(
            resolve_repository("/v2/a/b/c/tags/list").as_deref(),
            Some("a/b/c")
        );
        assert_eq!(
            resolve_repository("/v2/odd/blobs/name/manifests/v1").as_deref(),
            Some("odd/blobs/name")
        );
    }

    #[test]
    fn unresolvable_paths_yield_none() {
        assert_eq!(resolve_repository("v2/_catalog"), None);
        assert_eq!(resolve_repository("/v2/"), None);
        assert_eq!(resolve_repository("/v2/manifests/latest"), None);
        assert_eq!(resolve_repository("/v2/something/else"), None);
    }

    #[test]
    fn dot_segments_and_backslashes_yield_none() {
        for path in [
            "/v2/allowed/../secret/manifests/latest",
            "/v2/library/./manifests/latest",
            "/v2/allowed/%2e%2e/secret/manifests/latest",
            "/v2/allowed/%2E./secret/manifests/latest",
            "/v2/library/%2e/manifests/latest",
            "/v2/library\\evil/manifests/latest",
            "/v2/allowed%2F..%2Fsecret/manifests/latest",
            "/v2/library%5cevil/manifests/latest",
        ] {
            assert_eq!(resolve_repository(path), None, "{path}");
        }
        assert_eq!(
            resolve_repository("/v2/my.repo/v1..2/manifests/latest").as_deref(),
            Some("my.repo/v1..2")
        );
    }

    fn ctx(path: &str, repos: RepoAcl, with_identity: bool) -> RequestContext {
        let mut ctx = RequestContext::new(
            Method::GET,
            path,
            HeaderMap::new(),
            Arc::new(Config::empty()),
        );
        if with_identity {
            ctx.identity = Some(RequestIdentity::new(Arc::new(User {
                name: "alice".to_string(),
                credential: Credential::new("pw").expect("credential"),
                role: Some(Role::Reader),
                repos,
            })));
        }
        ctx
    }

    async fn outcome(mut ctx: RequestContext) -> Outcome {
        AuthorizeRepository.handle(&mut ctx).await.expect("stage")
    }

    #[tokio::test]
    async fn allows_matching_repository() {
        let ctx = ctx("/v2/library/ubuntu/manifests/latest", RepoAcl::new(["library/*"]), true);
        assert!(matches!(outcome(ctx).await, Outcome::Continue));
    }

    #[tokio::test]
    async fn denies_non_matching_repository_with_its_name() {
        let ctx = ctx("/v2/other/ubuntu/manifests/latest", RepoAcl::new(["library/*"]), true);
        match outcome(ctx).await {
            Outcome::Deny(err) => {
                assert_eq!(err.code, ErrorCode::Denied);
                assert_eq!(err.message, "access denied, repository 'other/ubuntu'");
            }
            Outcome::Continue => panic!("expected denial"),
        }
    }

    #[tokio::test]
    async fn denies_unresolvable_repository_even_when_unrestricted() {
        let ctx = ctx("/v2/manifests/latest", RepoAcl::unrestricted(), true);
        match outcome(ctx).await {
            Outcome::Deny(err) => {
                assert_eq!(err.code, ErrorCode::Denied);
                assert_eq!(err.message, "access denied");
            }
            Outcome::Continue => panic!("expected denial"),
        }
    }

    #[tokio::test]
    async fn missing_identity_is_unauthorized() {
        let ctx = ctx("/v2/library/ubuntu/manifests/latest", RepoAcl::unrestricted(), false);
        assert!(matches!(
            outcome(ctx).await,
            Outcome::Deny(err) if err.code == ErrorCode::Unauthorized
        ));
    }
}
