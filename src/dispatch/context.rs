//! Read-only dispatch context shared by every request
//!
//! Built once at startup from the configuration and the registered providers,
//! then passed by reference through dispatch and shaping.

use crate::config::{RestConfig, normalize_path};
use crate::core::entity::{Entity, EntityRef};
use crate::core::error::{ConfigError, DispatchError, RestResult};
use crate::core::memory::MemoryGuard;
use crate::core::provider::ProviderRef;
use crate::request::RequestParser;
use indexmap::IndexMap;
use regex::Regex;
use std::collections::HashMap;

/// Registry of providers keyed by kind
#[derive(Default, Clone)]
pub struct ProviderRegistry {
    providers: IndexMap<String, ProviderRef>,
}

impl ProviderRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider under its kind, replacing any previous one
    pub fn register(&mut self, provider: ProviderRef) {
        let kind = provider.kind().to_string();
        if self.providers.insert(kind.clone(), provider).is_some() {
            tracing::warn!(%kind, "provider registered twice, keeping the last one");
        }
    }

    pub fn get(&self, kind: &str) -> Option<&ProviderRef> {
        self.providers.get(kind)
    }

    /// Get all registered kinds
    pub fn kinds(&self) -> Vec<&str> {
        self.providers.keys().map(|s| s.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

/// Builds outbound hrefs and recognizes inbound ones
///
/// Format: `{host}{baseUri}v{version}/{endpoint}/{id}`
#[derive(Debug, Clone)]
pub struct HrefCodec {
    prefix: String,
    inbound: Regex,
}

impl HrefCodec {
    pub fn new(host: &str, base_uri: &str) -> RestResult<Self> {
        let prefix = format!("{}{}", host, base_uri);
        let inbound = Regex::new(&format!(r"^{}v(\d+)/(.+?)/(\d+)$", regex::escape(&prefix)))
            .map_err(|e| ConfigError::InvalidValue {
                field: "host".to_string(),
                value: host.to_string(),
                message: e.to_string(),
            })?;
        Ok(Self { prefix, inbound })
    }

    pub fn href(&self, version: u32, endpoint: &str, id: i64) -> String {
        format!("{}v{}/{}/{}", self.prefix, version, endpoint, id)
    }

    /// Split an href into endpoint and id
    pub fn parse<'a>(&self, href: &'a str) -> Option<(&'a str, i64)> {
        let captures = self.inbound.captures(href)?;
        let endpoint = captures.get(2)?.as_str();
        let id = captures.get(3)?.as_str().parse().ok()?;
        Some((endpoint, id))
    }
}

/// Everything dispatch needs besides the request itself
pub struct DispatchContext {
    config: RestConfig,
    providers: ProviderRegistry,
    endpoints: HashMap<String, String>,
    hrefs: HrefCodec,
    memory: MemoryGuard,
    parser: RequestParser,
}

impl DispatchContext {
    pub fn new(config: RestConfig, providers: ProviderRegistry) -> RestResult<Self> {
        let memory = MemoryGuard::new(config.memory_limit_bytes, config.memory_check_interval);
        Self::with_memory_guard(config, providers, memory)
    }

    pub fn with_memory_guard(
        config: RestConfig,
        providers: ProviderRegistry,
        memory: MemoryGuard,
    ) -> RestResult<Self> {
        let config = config.normalized()?;

        for (path, kind) in &config.paths {
            if providers.get(kind).is_none() {
                return Err(ConfigError::InvalidValue {
                    field: format!("paths.{}", path),
                    value: kind.clone(),
                    message: format!(
                        "no provider registered for this kind (registered: {})",
                        providers.kinds().join(", ")
                    ),
                }
                .into());
            }
        }

        // first registered path wins as the canonical endpoint of a kind
        let mut endpoints = HashMap::new();
        for (path, kind) in &config.paths {
            endpoints.entry(kind.clone()).or_insert_with(|| path.clone());
        }

        let hrefs = HrefCodec::new(&config.host, &config.base_uri)?;
        let parser = RequestParser::new(&config)?;

        tracing::debug!(
            providers = providers.len(),
            paths = config.paths.len(),
            "dispatch context built"
        );

        Ok(Self {
            config,
            providers,
            endpoints,
            hrefs,
            memory,
            parser,
        })
    }

    pub fn config(&self) -> &RestConfig {
        &self.config
    }

    pub fn providers(&self) -> &ProviderRegistry {
        &self.providers
    }

    pub fn parser(&self) -> &RequestParser {
        &self.parser
    }

    pub fn memory(&self) -> &MemoryGuard {
        &self.memory
    }

    pub fn hrefs(&self) -> &HrefCodec {
        &self.hrefs
    }

    pub fn provider(&self, kind: &str) -> Option<&ProviderRef> {
        self.providers.get(kind)
    }

    /// Provider addressed by a resource path: a configured mapping first, then
    /// a provider's own kind
    pub fn provider_for_path(&self, path: &str) -> Option<&ProviderRef> {
        let path = normalize_path(path);
        match self.config.paths.get(&path) {
            Some(kind) => self.providers.get(kind),
            None => self.providers.get(&path),
        }
    }

    /// Path under which entities of `kind` are addressed
    pub fn endpoint_for<'a>(&'a self, kind: &'a str) -> &'a str {
        self.endpoints.get(kind).map(String::as_str).unwrap_or(kind)
    }

    pub fn href_for(&self, entity: &dyn Entity, version: u32) -> String {
        self.hrefs
            .href(version, self.endpoint_for(entity.kind()), entity.id())
    }

    /// Resolve an href string to the entity it points at
    ///
    /// Returns `Ok(None)` when the string is not an href of this API.
    pub async fn resolve_href(&self, href: &str) -> RestResult<Option<EntityRef>> {
        let Some((endpoint, id)) = self.hrefs.parse(href) else {
            return Ok(None);
        };
        let Some(provider) = self.provider_for_path(endpoint) else {
            return Ok(None);
        };
        match provider.get(id).await? {
            Some(entity) => Ok(Some(entity)),
            None => Err(DispatchError::NotFound {
                kind: provider.kind().to_string(),
                id: id.to_string(),
            }
            .into()),
        }
    }
}
