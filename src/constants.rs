pub const HEADER_JSON: &str = "application/json; charset=utf-8";
pub const HEADER_API_VERSION: &str = "docker-distribution-api-version";
pub const API_VERSION: &str = "registry/2.0";
pub const HEADER_NOSNIFF: &str = "x-content-type-options";
pub const NOSNIFF: &str = "nosniff";
pub const BASIC_CHALLENGE: &str = "Basic realm=\"Registry Realm\"";

pub const API_ERROR_AUTH_REQUIRED: &str = "authentication required";
pub const API_ERROR_ACCESS_DENIED: &str = "access denied";
pub const API_ERROR_READ_ONLY: &str = "read-only access";
pub const API_ERROR_DELETE_DENIED: &str = "delete access denied";
pub const API_ERROR_NOT_FOUND: &str = "not found";
pub const API_ERROR_NO_BACKEND: &str = "registry backend not configured";
pub const API_ERROR_BACKEND_UNREACHABLE: &str = "registry backend unreachable";
pub const API_ERROR_BAD_CATALOG: &str = "registry backend returned an unreadable catalog";

pub const ENV_PREFIX: &str = "REGISTRY_GUARD";
pub const DEFAULT_BIND: &str = "0.0.0.0:8080";
pub const DEFAULT_LOG_LEVEL: &str = "info";

pub const REDACTED: &str = "***";
