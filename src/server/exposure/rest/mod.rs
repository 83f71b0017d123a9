//! REST API exposure
//!
//! Every request falls through to a single handler: resource paths are
//! resolved by the dispatch engine, not by the router.

use super::super::host::ServerHost;
use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, Method, Uri};
use axum::response::Response;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::Instrument;
use uuid::Uuid;

pub struct RestExposure;

impl RestExposure {
    /// Build the REST router from a host
    ///
    /// `custom_routes` are merged in front of the dispatch fallback, for
    /// endpoints that do not follow the resource path conventions.
    pub fn build_router(host: Arc<ServerHost>, custom_routes: Vec<Router>) -> Router {
        let mut app = Router::new().fallback(Self::handle).with_state(host);
        for custom_router in custom_routes {
            app = app.merge(custom_router);
        }

        app.layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
    }

    async fn handle(
        State(host): State<Arc<ServerHost>>,
        method: Method,
        uri: Uri,
        headers: HeaderMap,
        body: Bytes,
    ) -> Response {
        let request_id = Uuid::new_v4();
        let span = tracing::info_span!(
            "rest_request",
            %request_id,
            %method,
            path = %uri.path()
        );
        host.process(method, &uri, headers, &body)
            .instrument(span)
            .await
    }
}
