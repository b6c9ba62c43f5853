use crate::{
    constants::API_ERROR_BAD_CATALOG,
    error::RegistryError,
    models::{Catalog, User},
};
use axum::body::Bytes;
use tracing::{debug, warn};

/// Drops catalog entries `user` may not see. Bodies that are empty, or that
/// carry no `repositories` member, come back untouched.
pub fn filter_catalog(user: &User, body: Bytes) -> Result<Bytes, RegistryError> {
    if body.is_empty() {
        return Ok(body);
    }
    let mut catalog: Catalog = serde_json::from_slice(&body).map_err(|err| {
        warn!(user = user.name.as_str(), error = %err, "unreadable catalog from registry backend");
        RegistryError::unavailable(API_ERROR_BAD_CATALOG)
    })?;
    let Some(repositories) = catalog.repositories.take() else {
        return Ok(body);
    };

    let total = repositories.len();
    let visible: Vec<String> = repositories
        .into_iter()
        .filter(|repository| user.can_access_repo(repository))
        .collect();
    debug!(
        user = user.name.as_str(),
        total,
        visible = visible.len(),
        "filtered catalog"
    );
    catalog.repositories = Some(visible);

    serde_json::to_vec(&catalog).map(Bytes::from).map_err(|err| {
        warn!(error = %err, "failed to serialize filtered catalog");
        RegistryError::unavailable(API_ERROR_BAD_CATALOG)
    })
}
