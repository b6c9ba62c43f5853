use crate::{
    api,
    auth::Authenticate,
    config_store::ConfigStore,
    pipeline::Pipeline,
    rbac::AuthorizeMethod,
    repository::AuthorizeRepository,
    upstream::Upstream,
};
use axum::{Router, routing::any};
use std::sync::Arc;

#[derive(Clone, Debug)]
pub struct AppState {
    pub config: Arc<ConfigStore>,
    pub upstream: Upstream,
    /// Authentication plus the role check, for `/v2/` and the catalog.
    pub gate: Pipeline,
    /// `gate` followed by the per-repository check.
    pub repository_gate: Pipeline,
}

impl AppState {
    pub fn new(config: Arc<ConfigStore>, upstream: Upstream) -> Self {
        let gate = Pipeline::new()
            .with_stage(Arc::new(Authenticate))
            .with_stage(Arc::new(AuthorizeMethod));
        let repository_gate = gate.clone().with_stage(Arc::new(AuthorizeRepository));
        Self {
            config,
            upstream,
            gate,
            repository_gate,
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new().fallback(any(api::dispatch)).with_state(state)
}
