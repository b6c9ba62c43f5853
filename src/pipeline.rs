//! Ordered request stages.
//!
//! Every stage either lets the request continue or denies it with a registry
//! error that becomes the response. Unexpected failures inside a stage are
//! turned into denials by [`Pipeline::run`]; nothing falls through as allowed.

use crate::{config::Config, error::RegistryError, models::RequestIdentity};
use async_trait::async_trait;
use axum::http::{HeaderMap, Method};
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug)]
pub enum Outcome {
    Continue,
    Deny(RegistryError),
}

#[derive(Debug, thiserror::Error)]
pub enum StageError {
    #[error("malformed request: {0}")]
    Malformed(String),
    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Everything a stage may look at. The configuration snapshot is fixed for the
/// lifetime of the request.
#[derive(Debug)]
pub struct RequestContext {
    pub method: Method,
    pub path: String,
    pub headers: HeaderMap,
    pub config: Arc<Config>,
    pub identity: Option<RequestIdentity>,
}

impl RequestContext {
    pub fn new(
        method: Method,
        path: impl Into<String>,
        headers: HeaderMap,
        config: Arc<Config>,
    ) -> Self {
        Self {
            method,
            path: path.into(),
            headers,
            config,
            identity: None,
        }
    }
}

#[async_trait]
pub trait Stage: Send + Sync {
    fn name(&self) -> &'static str;

    async fn handle(&self, ctx: &mut RequestContext) -> Result<Outcome, StageError>;
}

#[derive(Clone, Default)]
pub struct Pipeline {
    stages: Vec<Arc<dyn Stage>>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stage(mut self, stage: Arc<dyn Stage>) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|stage| stage.name()).collect()
    }

    /// Runs the stages in order and stops at the first denial.
    pub async fn run(&self, ctx: &mut RequestContext) -> Result<(), RegistryError> {
        for stage in &self.stages {
            match stage.handle(ctx).await {
                Ok(Outcome::Continue) => {
                    debug!(stage = stage.name(), "stage passed");
                }
                Ok(Outcome::Deny(err)) => {
                    debug!(stage = stage.name(), code = err.code.as_str(), "stage denied request");
                    return Err(err);
                }
                Err(err) => {
                    warn!(
                        stage = stage.name(),
                        path = ctx.path.as_str(),
                        error = %err,
                        "stage failed, denying request"
                    );
                    return Err(fail_closed(ctx));
                }
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("stages", &self.stage_names())
            .finish()
    }
}

fn fail_closed(ctx: &RequestContext) -> RegistryError {
    if ctx.identity.is_some() {
        RegistryError::denied(crate::constants::API_ERROR_ACCESS_DENIED)
    } else {
        RegistryError::unauthorized()
    }
}
