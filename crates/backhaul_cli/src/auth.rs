//! Bearer API-key authentication for the job-trigger API (spec §6):
//! `Authorization: Bearer <api-key>`, each key carrying a fixed set of
//! capabilities (`jobs:execute`, `jobs:read`). Grounded on the API-key
//! branch of an enterprise gateway's auth middleware, trimmed to drop the
//! JWT/OAuth branches this spec never asks for.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// A capability an API key may carry (spec §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    JobsExecute,
    JobsRead,
}

impl Capability {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "jobs:execute" => Some(Capability::JobsExecute),
            "jobs:read" => Some(Capability::JobsRead),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ApiKeyInfo {
    pub owner: String,
    pub capabilities: Vec<Capability>,
}

/// The configured set of valid API keys, built once at startup from
/// `BACKHAUL_API_KEYS` (`key:cap1|cap2,key2:cap1`).
#[derive(Clone)]
pub struct ApiKeyConfig {
    keys: Arc<HashMap<String, ApiKeyInfo>>,
}

impl ApiKeyConfig {
    pub fn new(keys: HashMap<String, ApiKeyInfo>) -> Self {
        Self { keys: Arc::new(keys) }
    }

    /// Parses `BACKHAUL_API_KEYS`. Each entry is `<key>:<capability>|<capability>`,
    /// entries separated by `;`. A key with no recognized capability is
    /// rejected outright rather than silently granted nothing.
    pub fn from_env_str(raw: &str) -> Result<Self, String> {
        let mut keys = HashMap::new();
        for entry in raw.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            let (key, caps_raw) = entry
                .split_once(':')
                .ok_or_else(|| format!("malformed API key entry {entry:?}, expected key:capabilities"))?;
            let capabilities: Vec<Capability> = caps_raw
                .split('|')
                .filter_map(Capability::parse)
                .collect();
            if capabilities.is_empty() {
                return Err(format!("API key entry {entry:?} carries no recognized capability"));
            }
            keys.insert(
                key.trim().to_string(),
                ApiKeyInfo {
                    owner: key.trim().to_string(),
                    capabilities,
                },
            );
        }
        Ok(Self::new(keys))
    }
}

/// The authenticated caller, attached to request extensions by
/// [`auth_middleware`].
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub owner: String,
    pub capabilities: Vec<Capability>,
}

impl AuthContext {
    pub fn allows(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing or malformed authorization header")]
    MissingToken,
    #[error("invalid api key")]
    InvalidToken,
    #[error("the api key lacks the required capability")]
    InsufficientCapability,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = match self {
            AuthError::MissingToken | AuthError::InvalidToken => StatusCode::UNAUTHORIZED,
            AuthError::InsufficientCapability => StatusCode::FORBIDDEN,
        };
        (status, self.to_string()).into_response()
    }
}

fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
}

/// Authenticates every request against `config`, attaching an
/// [`AuthContext`] to its extensions on success. Capability checks happen
/// per-handler since the required capability differs by route.
pub async fn auth_middleware(
    State(config): State<ApiKeyConfig>,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let token = extract_bearer_token(request.headers()).ok_or(AuthError::MissingToken)?;
    let info = config.keys.get(token).ok_or(AuthError::InvalidToken)?;

    request.extensions_mut().insert(AuthContext {
        owner: info.owner.clone(),
        capabilities: info.capabilities.clone(),
    });

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_env_str_parses_multiple_keys_and_capabilities() {
        let config =
            ApiKeyConfig::from_env_str("abc:jobs:execute|jobs:read;def:jobs:read").unwrap();
        let abc = config.keys.get("abc").unwrap();
        assert_eq!(abc.capabilities.len(), 2);
        let def = config.keys.get("def").unwrap();
        assert_eq!(def.capabilities, vec![Capability::JobsRead]);
    }

    #[test]
    fn from_env_str_rejects_entry_without_capability() {
        assert!(ApiKeyConfig::from_env_str("abc:bogus").is_err());
    }

    #[test]
    fn extract_bearer_token_strips_prefix() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "authorization",
            axum::http::HeaderValue::from_static("Bearer my-key"),
        );
        assert_eq!(extract_bearer_token(&headers), Some("my-key"));
    }

    #[test]
    fn extract_bearer_token_rejects_other_schemes() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "authorization",
            axum::http::HeaderValue::from_static("Basic dXNlcjpwYXNz"),
        );
        assert_eq!(extract_bearer_token(&headers), None);
    }

    #[test]
    fn auth_context_allows_checks_capability_membership() {
        let ctx = AuthContext {
            owner: "abc".to_string(),
            capabilities: vec![Capability::JobsRead],
        };
        assert!(ctx.allows(Capability::JobsRead));
        assert!(!ctx.allows(Capability::JobsExecute));
    }
}
