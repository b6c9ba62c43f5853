use crate::{acl::RepoAcl, credential::Credential};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::{fmt, sync::Arc};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Reader,
    Writer,
    Admin,
}

impl Role {
    /// Case-insensitive; unknown names yield `None`, which carries no privilege.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "reader" => Some(Self::Reader),
            "writer" => Some(Self::Writer),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Reader => "reader",
            Self::Writer => "writer",
            Self::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub name: String,
    pub credential: Credential,
    pub role: Option<Role>,
    pub repos: RepoAcl,
}

impl User {
    pub fn can_access_repo(&self, repository: &str) -> bool {
        self.repos.can_access(repository)
    }
}

/// The caller resolved by authentication, valid for one request.
#[derive(Debug, Clone)]
pub struct RequestIdentity {
    pub user: Arc<User>,
}

impl RequestIdentity {
    pub fn new(user: Arc<User>) -> Self {
        Self { user }
    }

    pub fn name(&self) -> &str {
        &self.user.name
    }
}

/// Body of `GET /v2/_catalog`. Unknown top-level members are carried through
/// untouched, explicit nulls included.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repositories: Option<Vec<String>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
