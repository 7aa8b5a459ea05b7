//! Bearer-token caller resolution.
//!
//! Session issuance lives outside this service; handlers only need to know
//! who is calling and whether they hold the administrator capability.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use common::UserId;
use domain::Caller;
use thiserror::Error;

use crate::error::ApiError;
use crate::{AppState, AppStore};

/// Resolves a bearer token to a caller.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Returns `None` for unknown or expired tokens.
    async fn authenticate(&self, token: &str) -> Option<Caller>;
}

/// Malformed `API_TOKENS` entry.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("Invalid token entry '{entry}': {reason}")]
pub struct TokenConfigError {
    pub entry: String,
    pub reason: &'static str,
}

/// Fixed token table, configured as `token=user_id[:admin],...`.
#[derive(Debug, Clone, Default)]
pub struct StaticTokenAuthenticator {
    tokens: HashMap<String, Caller>,
}

impl StaticTokenAuthenticator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a token.
    pub fn with_token(mut self, token: impl Into<String>, caller: Caller) -> Self {
        self.tokens.insert(token.into(), caller);
        self
    }

    /// Parses a comma-separated token table. Blank entries are skipped.
    pub fn parse(table: &str) -> Result<Self, TokenConfigError> {
        let mut authenticator = Self::new();
        for entry in table.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let invalid = |reason| TokenConfigError {
                entry: entry.to_string(),
                reason,
            };

            let (token, principal) = entry
                .split_once('=')
                .ok_or_else(|| invalid("expected token=user_id"))?;
            let token = token.trim();
            if token.is_empty() {
                return Err(invalid("empty token"));
            }

            let (user_id, role) = match principal.split_once(':') {
                Some((id, role)) => (id, Some(role.trim())),
                None => (principal, None),
            };
            let user_id: i64 = user_id
                .trim()
                .parse()
                .map_err(|_| invalid("user id is not an integer"))?;

            let caller = match role {
                None => Caller::customer(UserId::new(user_id)),
                Some("admin") => Caller::admin(UserId::new(user_id)),
                Some(_) => return Err(invalid("unknown role")),
            };
            authenticator.tokens.insert(token.to_string(), caller);
        }
        Ok(authenticator)
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[async_trait]
impl Authenticator for StaticTokenAuthenticator {
    async fn authenticate(&self, token: &str) -> Option<Caller> {
        self.tokens.get(token).copied()
    }
}

/// Extracts the token from an `Authorization: Bearer <token>` header value.
fn bearer_token(value: &str) -> Option<&str> {
    let (scheme, token) = value.trim().split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

/// The authenticated caller of a request.
#[derive(Debug, Clone, Copy)]
pub struct Authenticated(pub Caller);

impl<S: AppStore> FromRequestParts<Arc<AppState<S>>> for Authenticated {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState<S>>,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(bearer_token)
            .ok_or(ApiError::Unauthorized)?;

        match state.auth.authenticate(token).await {
            Some(caller) => Ok(Authenticated(caller)),
            None => {
                tracing::debug!("rejected unknown bearer token");
                Err(ApiError::Unauthorized)
            }
        }
    }
}
