//! Configuration loading and management

use crate::core::error::{ConfigError, RestResult};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Engine configuration
///
/// ```yaml
/// host: https://api.example.com
/// base_uri: /
/// paths:
///   users: user
///   me/sessions: session
/// public_paths:
///   - sessions
///   - docs/*
/// default_limit: 100
/// max_limit: 5000
/// memory_limit_bytes: 536870912
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RestConfig {
    /// Scheme and authority prefixed to every href
    pub host: String,

    /// Path prefix in front of `v{N}/`, always ending with `/`
    pub base_uri: String,

    /// Resource path -> provider kind
    pub paths: IndexMap<String, String>,

    /// Glob patterns of resource paths that skip authentication
    pub public_paths: Vec<String>,

    /// Page size when the request has no `limit`
    pub default_limit: usize,

    /// Upper bound for `limit`
    pub max_limit: usize,

    /// Memory ceiling for the shaping guard; no guard when absent
    pub memory_limit_bytes: Option<u64>,

    /// The guard probes memory on every n-th check
    pub memory_check_interval: u32,

    /// Value of `Access-Control-Allow-Origin`
    pub cors_allow_origin: String,
}

impl Default for RestConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            base_uri: "/".to_string(),
            paths: IndexMap::new(),
            public_paths: Vec::new(),
            default_limit: 100,
            max_limit: 5000,
            memory_limit_bytes: None,
            memory_check_interval: 10,
            cors_allow_origin: "*".to_string(),
        }
    }
}

impl RestConfig {
    /// Load configuration from a YAML file
    pub fn from_yaml_file(path: &str) -> RestResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ConfigError::FileNotFound {
                path: path.to_string(),
            },
            _ => ConfigError::IoError {
                message: e.to_string(),
            },
        })?;
        let config: Self = serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError {
            file: Some(path.to_string()),
            message: e.to_string(),
        })?;
        config.normalized()
    }

    /// Load configuration from a YAML string
    pub fn from_yaml_str(yaml: &str) -> RestResult<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.normalized()
    }

    /// Normalize paths and check limits
    pub fn normalized(mut self) -> RestResult<Self> {
        let trimmed = self.base_uri.trim_matches('/');
        self.base_uri = if trimmed.is_empty() {
            "/".to_string()
        } else {
            format!("/{}/", trimmed)
        };
        self.host = self.host.trim_end_matches('/').to_string();
        self.paths = self
            .paths
            .into_iter()
            .map(|(path, kind)| (normalize_path(&path), kind))
            .collect();

        if self.max_limit == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_limit".to_string(),
                value: "0".to_string(),
                message: "must be positive".to_string(),
            }
            .into());
        }
        if self.default_limit > self.max_limit {
            return Err(ConfigError::InvalidValue {
                field: "default_limit".to_string(),
                value: self.default_limit.to_string(),
                message: format!("exceeds max_limit {}", self.max_limit),
            }
            .into());
        }
        Ok(self)
    }

    /// Merge another configuration into this one
    ///
    /// Paths and public paths are combined; entries from `other` win on
    /// conflicting paths. Scalar settings of `self` are kept.
    pub fn merge(mut self, other: RestConfig) -> Self {
        for (path, kind) in other.paths {
            let path = normalize_path(&path);
            if let Some(previous) = self.paths.insert(path.clone(), kind.clone()) {
                if previous != kind {
                    tracing::warn!(%path, %previous, %kind, "path mapping overridden");
                }
            }
        }
        for public in other.public_paths {
            if !self.public_paths.contains(&public) {
                self.public_paths.push(public);
            }
        }
        self
    }

    /// Register a path for a provider kind
    pub fn with_path(mut self, path: &str, kind: &str) -> Self {
        self.paths.insert(normalize_path(path), kind.to_string());
        self
    }
}

/// Strip surrounding slashes and a trailing `/*` wildcard
pub fn normalize_path(path: &str) -> String {
    let path = path.trim().trim_matches('/');
    path.strip_suffix("/*")
        .unwrap_or(path)
        .trim_end_matches('*')
        .trim_end_matches('/')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RestConfig::default();
        assert_eq!(config.default_limit, 100);
        assert_eq!(config.max_limit, 5000);
        assert_eq!(config.base_uri, "/");
        assert_eq!(config.cors_allow_origin, "*");
        assert!(config.memory_limit_bytes.is_none());
    }

    #[test]
    fn test_yaml_loading_normalizes() {
        let config = RestConfig::from_yaml_str(
            r#"
host: https://api.example.com/
base_uri: api
paths:
  /users/: user
  me/sessions/*: session
public_paths:
  - sessions
"#,
        )
        .unwrap();

        assert_eq!(config.host, "https://api.example.com");
        assert_eq!(config.base_uri, "/api/");
        assert_eq!(config.paths.get("users").map(String::as_str), Some("user"));
        assert_eq!(
            config.paths.get("me/sessions").map(String::as_str),
            Some("session")
        );
        assert_eq!(config.default_limit, 100);
    }

    #[test]
    fn test_invalid_limits_rejected() {
        let err = RestConfig::from_yaml_str("default_limit: 10\nmax_limit: 5\n").unwrap_err();
        assert_eq!(err.error_code(), "CONFIG_ERROR");
        assert!(err.to_string().contains("default_limit"));
    }

    #[test]
    fn test_missing_file() {
        let err = RestConfig::from_yaml_file("/nonexistent/rest.yaml").unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_yaml_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rest.yaml");
        let config = RestConfig::default().with_path("users", "user");
        std::fs::write(&path, serde_yaml::to_string(&config).unwrap()).unwrap();

        let loaded = RestConfig::from_yaml_file(path.to_str().unwrap()).unwrap();
        assert_eq!(loaded.paths.len(), 1);
        assert_eq!(loaded.max_limit, 5000);
    }

    #[test]
    fn test_merge_combines_paths() {
        let base = RestConfig::default()
            .with_path("users", "user")
            .with_path("cars", "car");
        let mut other = RestConfig::default().with_path("cars", "vehicle");
        other.public_paths.push("docs/*".to_string());

        let merged = base.merge(other);
        assert_eq!(merged.paths.len(), 2);
        assert_eq!(merged.paths.get("cars").map(String::as_str), Some("vehicle"));
        assert_eq!(merged.public_paths, vec!["docs/*".to_string()]);
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("/users/"), "users");
        assert_eq!(normalize_path("users/*"), "users");
        assert_eq!(normalize_path("me/sessions"), "me/sessions");
        assert_eq!(normalize_path(""), "");
    }
}
