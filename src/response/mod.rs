//! HTTP responses: headers, ETag handling and error bodies

pub mod shaper;

pub use shaper::{CollectionInfo, ResponseShaper, ShapedBody};

use crate::core::error::RestError;
use axum::body::Body;
use axum::http::{HeaderName, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use indexmap::IndexMap;
use sha2::{Digest, Sha256};

pub const COLLECTION_COUNT: &str = "X-Collection-Count";
pub const COLLECTION_OFFSET: &str = "X-Collection-Offset";
pub const COLLECTION_LIMIT: &str = "X-Collection-Limit";

const ALLOW_HEADERS: &str = "Authorization,Content-Type,If-Match,If-None-Match";
const ALLOW_METHODS: &str = "GET,POST,PUT,DELETE,OPTIONS";

/// A response under construction
///
/// Headers are kept in insertion order; they take part in the ETag and are
/// listed in `Access-Control-Expose-Headers`.
#[derive(Debug, Clone)]
pub struct RestResponse {
    status: StatusCode,
    headers: IndexMap<String, String>,
    body: Option<String>,
    content_type: &'static str,
}

impl RestResponse {
    /// Empty 200 response carrying the CORS and security headers
    pub fn new(cors_allow_origin: &str) -> Self {
        let mut headers = IndexMap::new();
        headers.insert(
            "Access-Control-Allow-Origin".to_string(),
            cors_allow_origin.to_string(),
        );
        headers.insert(
            "Strict-Transport-Security".to_string(),
            "max-age=31536000; includeSubDomains".to_string(),
        );
        headers.insert("X-Frame-Options".to_string(), "SAMEORIGIN".to_string());
        headers.insert("X-XSS-Protection".to_string(), "1; mode=block".to_string());
        headers.insert("X-Content-Type-Options".to_string(), "nosniff".to_string());
        headers.insert("Referrer-Policy".to_string(), "no-referrer".to_string());
        Self {
            status: StatusCode::OK,
            headers,
            body: None,
            content_type: "application/json",
        }
    }

    pub fn set_header(&mut self, name: impl Into<String>, value: impl ToString) {
        self.headers.insert(name.into(), value.to_string());
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Pagination headers of a collection
    pub fn set_collection(&mut self, info: &CollectionInfo) {
        self.set_header(COLLECTION_COUNT, info.count);
        self.set_header(COLLECTION_OFFSET, info.offset);
        self.set_header(COLLECTION_LIMIT, info.limit);
    }

    /// Serialize `body` as the JSON payload
    pub fn json(mut self, body: &serde_json::Value) -> Self {
        self.body = Some(body.to_string());
        self
    }

    /// Answer to a CORS preflight
    pub fn preflight(mut self) -> Self {
        self.set_header("Access-Control-Allow-Headers", ALLOW_HEADERS);
        self.set_header("Access-Control-Allow-Methods", ALLOW_METHODS);
        self.status = StatusCode::NO_CONTENT;
        self.content_type = "text/html";
        self.body = None;
        self
    }

    /// Uniform error body with the error's status code
    pub fn error(mut self, error: &RestError) -> Self {
        self.status = error.status_code();
        let body = serde_json::to_value(error.to_response()).unwrap_or_default();
        self.body = Some(body.to_string());
        self
    }

    /// Quoted SHA-256 over the body and headers
    pub fn etag(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.body.as_deref().unwrap_or_default().as_bytes());
        for (name, value) in &self.headers {
            hasher.update(name.as_bytes());
            hasher.update(b":");
            hasher.update(value.as_bytes());
            hasher.update(b"\n");
        }
        format!("\"{}\"", hex::encode(hasher.finalize()))
    }

    /// Finish the response: a matching `If-None-Match` turns it into a bodiless
    /// 304, anything else gets its `ETag`
    pub fn finish(mut self, if_none_match: Option<&str>) -> Response {
        let etag = self.etag();
        if if_none_match.map(strip_gzip_marker).as_deref() == Some(etag.as_str()) {
            tracing::debug!(%etag, "etag matched, not modified");
            return StatusCode::NOT_MODIFIED.into_response();
        }
        self.set_header("ETag", &etag);
        self.into_response()
    }
}

impl IntoResponse for RestResponse {
    fn into_response(self) -> Response {
        let mut response = Response::new(match self.body {
            Some(body) => Body::from(body),
            None => Body::empty(),
        });
        *response.status_mut() = self.status;

        let headers = response.headers_mut();
        let exposed = self.headers.keys().cloned().collect::<Vec<_>>().join(",");
        if let Ok(value) = HeaderValue::from_str(&exposed) {
            headers.insert(header::ACCESS_CONTROL_EXPOSE_HEADERS, value);
        }
        for (name, value) in &self.headers {
            match (
                HeaderName::try_from(name.as_str()),
                HeaderValue::from_str(value),
            ) {
                (Ok(name), Ok(value)) => {
                    headers.insert(name, value);
                }
                _ => tracing::warn!(%name, "dropping header that is not valid HTTP"),
            }
        }
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static(self.content_type),
        );
        response
    }
}

/// `"abc-gzip"` as sent back by compressing proxies becomes `"abc"`
fn strip_gzip_marker(etag: &str) -> String {
    match etag.strip_suffix("-gzip\"") {
        Some(inner) if inner.starts_with('"') => format!("{}\"", inner),
        _ => etag.to_string(),
    }
}
