//! Structured view over an inbound HTTP request
//!
//! [`RequestParser`] is built once from the configuration and turns method,
//! URI, headers and body into an immutable [`RequestView`].

pub mod query;
pub mod terse;

pub use query::{FilterGlyph, Pagination, QueryFilter};
pub use terse::TerseTree;

use crate::config::RestConfig;
use crate::core::auth::bearer_token;
use crate::core::error::{ConfigError, RequestError, RestResult};
use crate::core::value::Value;
use axum::http::{HeaderMap, Method, header};
use indexmap::IndexMap;
use regex::Regex;

/// Parses request URIs of the form `{base}v{N}/{resource}[.{type}][?{query}]`
#[derive(Debug, Clone)]
pub struct RequestParser {
    uri_regex: Regex,
    default_limit: usize,
    max_limit: usize,
}

impl RequestParser {
    pub fn new(config: &RestConfig) -> RestResult<Self> {
        let pattern = format!(
            r"^{}v(\d+)/(.*?)(?:\.(\w+))?(?:\?(.*))?$",
            regex::escape(&config.base_uri)
        );
        let uri_regex = Regex::new(&pattern).map_err(|e| ConfigError::InvalidValue {
            field: "base_uri".to_string(),
            value: config.base_uri.clone(),
            message: e.to_string(),
        })?;
        Ok(Self {
            uri_regex,
            default_limit: config.default_limit,
            max_limit: config.max_limit,
        })
    }

    /// Build a view; `uri` is the path plus optional query string
    pub fn parse(
        &self,
        method: Method,
        uri: &str,
        headers: HeaderMap,
        body: &[u8],
    ) -> RestResult<RequestView> {
        let invalid = || RequestError::InvalidResourcePath {
            uri: uri.to_string(),
        };
        let captures = self.uri_regex.captures(uri).ok_or_else(invalid)?;

        let version: u32 = captures[1].parse().map_err(|_| invalid())?;
        if version < 1 {
            return Err(invalid().into());
        }

        let resource_path = decode_component(&captures[2])
            .trim_end_matches('/')
            .to_string();

        let response_type = captures
            .get(3)
            .map(|m| m.as_str().to_string())
            .unwrap_or_else(|| "json".to_string());
        if response_type != "json" {
            return Err(RequestError::UnsupportedResponseType { response_type }.into());
        }

        let pairs = captures
            .get(4)
            .map(|m| query::parse_pairs(m.as_str()))
            .unwrap_or_default();

        let mut fields = TerseTree::new();
        let mut expand = TerseTree::new();
        let mut return_true_as_null = false;
        for (name, value) in &pairs {
            match name.as_str() {
                "fields" => fields.merge(TerseTree::parse(value)?),
                "expand" => expand.merge(TerseTree::parse(value)?),
                "returnTrueAsNull" => {
                    return_true_as_null = query::parameter_value(value).is_truthy()
                }
                _ => {}
            }
        }

        let pagination = Pagination::from_pairs(&pairs, self.max_limit)?;
        let filters = query::collect_filters(&pairs);
        let parameters = pairs
            .iter()
            .map(|(name, value)| (name.clone(), query::parameter_value(value)))
            .collect();

        let body = if body.iter().all(u8::is_ascii_whitespace) {
            Value::Null
        } else {
            let json: serde_json::Value =
                serde_json::from_slice(body).map_err(|e| RequestError::InvalidBody {
                    message: e.to_string(),
                })?;
            Value::from_json(json)
        };

        Ok(RequestView {
            method,
            version,
            resource_path,
            filters,
            parameters,
            fields,
            expand,
            pagination,
            default_limit: self.default_limit,
            body,
            headers,
            return_true_as_null,
        })
    }
}

/// Percent-decode one URI component, keeping `+` literal
fn decode_component(raw: &str) -> String {
    let escaped = raw.replace('+', "%2B").replace('&', "%26");
    url::form_urlencoded::parse(format!("v={}", escaped).as_bytes())
        .next()
        .map(|(_, value)| value.into_owned())
        .unwrap_or_default()
}

/// Immutable view of one request
#[derive(Debug, Clone)]
pub struct RequestView {
    method: Method,
    version: u32,
    resource_path: String,
    filters: Vec<QueryFilter>,
    parameters: IndexMap<String, Value>,
    fields: TerseTree,
    expand: TerseTree,
    pagination: Pagination,
    default_limit: usize,
    body: Value,
    headers: HeaderMap,
    return_true_as_null: bool,
}

impl RequestView {
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// API version from the `v{N}` path segment
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Resource path after `v{N}/`, without extension or query
    pub fn resource_path(&self) -> &str {
        &self.resource_path
    }

    /// Filters from the query string, equality filters coalesced
    pub fn filters(&self) -> &[QueryFilter] {
        &self.filters
    }

    /// Every query parameter as an operation argument
    pub fn parameters(&self) -> &IndexMap<String, Value> {
        &self.parameters
    }

    pub fn fields(&self) -> &TerseTree {
        &self.fields
    }

    pub fn expand(&self) -> &TerseTree {
        &self.expand
    }

    /// Effective limit: requested or the configured default
    pub fn limit(&self) -> usize {
        self.pagination.limit_or(self.default_limit)
    }

    pub fn offset(&self) -> usize {
        self.pagination.offset()
    }

    pub fn body(&self) -> &Value {
        &self.body
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn return_true_as_null(&self) -> bool {
        self.return_true_as_null
    }

    /// Bearer token from the `Authorization` header
    pub fn access_token(&self) -> Option<&str> {
        self.headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(bearer_token)
    }

    /// Value of `If-None-Match`, if present
    pub fn if_none_match(&self) -> Option<&str> {
        self.headers
            .get(header::IF_NONE_MATCH)
            .and_then(|v| v.to_str().ok())
    }
}
