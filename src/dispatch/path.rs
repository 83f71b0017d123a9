//! Resource path resolution

use crate::core::error::{DispatchError, RestResult};
use crate::core::provider::ProviderRef;
use crate::dispatch::context::DispatchContext;

/// One path segment still to be processed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Purely numeric: an entity id
    Id(i64),
    /// `[name]`: lookup by name within the fetched list
    Name(String),
    /// Anything else: an operation word
    Word(String),
    /// No segment left
    Empty,
}

impl Segment {
    pub fn parse(raw: &str) -> Self {
        if raw.is_empty() {
            return Segment::Empty;
        }
        if raw.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(id) = raw.parse() {
                return Segment::Id(id);
            }
        }
        if let Some(name) = raw.strip_prefix('[').and_then(|r| r.strip_suffix(']')) {
            return Segment::Name(name.to_string());
        }
        Segment::Word(raw.to_string())
    }

    /// Label used in logs and errors
    pub fn describe(&self) -> String {
        match self {
            Segment::Id(id) => format!("id {}", id),
            Segment::Name(name) => format!("[{}]", name),
            Segment::Word(word) => format!("'{}'", word),
            Segment::Empty => "empty segment".to_string(),
        }
    }
}

/// Outcome of path resolution
#[derive(Clone)]
pub struct ResolvedPath {
    pub provider: ProviderRef,
    /// Intermediate segments in original order
    pub secondary: Vec<Segment>,
    /// Final segment, `Empty` when the whole path matched a provider
    pub last: Segment,
}

impl std::fmt::Debug for ResolvedPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedPath")
            .field("provider", &self.provider.kind())
            .field("secondary", &self.secondary)
            .field("last", &self.last)
            .finish()
    }
}

/// Splits a resource path into the longest prefix naming a provider and the
/// segments that follow it
pub struct PathResolver;

impl PathResolver {
    pub fn resolve(ctx: &DispatchContext, path: &str) -> RestResult<ResolvedPath> {
        let mut prefix: Vec<&str> = if path.is_empty() {
            Vec::new()
        } else {
            path.split('/').collect()
        };
        let mut popped: Vec<&str> = Vec::new();

        loop {
            if let Some(provider) = ctx.provider_for_path(&prefix.join("/")) {
                popped.reverse();
                let last = popped.pop().map(Segment::parse).unwrap_or(Segment::Empty);
                let secondary = popped.into_iter().map(Segment::parse).collect();
                let resolved = ResolvedPath {
                    provider: provider.clone(),
                    secondary,
                    last,
                };
                tracing::debug!(?resolved, "resource path resolved");
                return Ok(resolved);
            }
            match prefix.pop() {
                Some(segment) => popped.push(segment),
                None => {
                    return Err(DispatchError::BadPath {
                        path: path.to_string(),
                    }
                    .into());
                }
            }
        }
    }
}
