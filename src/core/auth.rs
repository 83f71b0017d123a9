//! Caller identity and authentication seam
//!
//! Token validation itself is external: an [`Authenticator`] turns a bearer
//! token into a [`Caller`]. Requests to public paths skip authentication and
//! run as [`Caller::Anonymous`].

use anyhow::Result;
use async_trait::async_trait;
use regex::{Regex, RegexBuilder};

/// Identity on whose behalf a request is dispatched
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Caller {
    /// Authenticated user
    User { user_id: i64, roles: Vec<String> },

    /// Service-to-service communication
    Service { service_name: String },

    /// No authentication (public access)
    Anonymous,
}

impl Caller {
    /// Get user_id if available
    pub fn user_id(&self) -> Option<i64> {
        match self {
            Caller::User { user_id, .. } => Some(*user_id),
            _ => None,
        }
    }

    pub fn has_role(&self, role: &str) -> bool {
        match self {
            Caller::User { roles, .. } => roles.iter().any(|r| r == role),
            _ => false,
        }
    }

    pub fn is_service(&self) -> bool {
        matches!(self, Caller::Service { .. })
    }

    pub fn is_anonymous(&self) -> bool {
        matches!(self, Caller::Anonymous)
    }
}

/// Resolves bearer tokens to callers
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Return the caller owning `token`, or `None` when the token is invalid
    async fn authenticate(&self, token: &str) -> Result<Option<Caller>>;
}

/// Accepts every token as an anonymous caller (for development)
pub struct NoAuthenticator;

#[async_trait]
impl Authenticator for NoAuthenticator {
    async fn authenticate(&self, _token: &str) -> Result<Option<Caller>> {
        Ok(Some(Caller::Anonymous))
    }
}

/// Extract the token of an `Authorization: Bearer …` header value
pub fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

/// Resource paths reachable without authentication
///
/// Patterns are globs where `*` matches any run of characters; matching is
/// case-insensitive and anchored at both ends.
#[derive(Debug, Clone, Default)]
pub struct PublicPaths {
    patterns: Vec<Regex>,
}

impl PublicPaths {
    pub fn new<S: AsRef<str>>(globs: &[S]) -> Result<Self> {
        let patterns = globs
            .iter()
            .map(|glob| {
                let escaped = glob
                    .as_ref()
                    .split('*')
                    .map(regex::escape)
                    .collect::<Vec<_>>()
                    .join(".*?");
                RegexBuilder::new(&format!("^{}$", escaped))
                    .case_insensitive(true)
                    .build()
                    .map_err(anyhow::Error::from)
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    pub fn is_public(&self, resource_path: &str) -> bool {
        self.patterns.iter().any(|p| p.is_match(resource_path))
    }
}
