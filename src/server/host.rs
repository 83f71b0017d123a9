//! Server host holding everything a request needs
//!
//! The host is transport-agnostic: it takes the raw method, URI, headers and
//! body of a request and produces a complete HTTP response. Exposures only
//! have to route requests into [`ServerHost::process`].

use crate::core::auth::{Authenticator, Caller, PublicPaths};
use crate::core::error::{RequestError, RestError, RestResult};
use crate::dispatch::{DispatchContext, dispatch};
use crate::request::RequestView;
use crate::response::{ResponseShaper, RestResponse};
use axum::http::{HeaderMap, Method, Uri};
use axum::response::Response;
use std::sync::Arc;

/// Host context containing all engine state
pub struct ServerHost {
    /// Read-only registries and configuration
    pub context: Arc<DispatchContext>,

    /// Token verification
    pub authenticator: Arc<dyn Authenticator>,

    /// Resource paths reachable without a token
    pub public_paths: PublicPaths,
}

impl ServerHost {
    pub fn new(
        context: DispatchContext,
        authenticator: Arc<dyn Authenticator>,
    ) -> RestResult<Self> {
        let public_paths = PublicPaths::new(&context.config().public_paths).map_err(|e| {
            crate::core::error::ConfigError::InvalidValue {
                field: "public_paths".to_string(),
                value: context.config().public_paths.join(","),
                message: e.to_string(),
            }
        })?;
        Ok(Self {
            context: Arc::new(context),
            authenticator,
            public_paths,
        })
    }

    /// Run one request through parsing, authentication, dispatch and shaping
    pub async fn process(
        &self,
        method: Method,
        uri: &Uri,
        headers: HeaderMap,
        body: &[u8],
    ) -> Response {
        let response = RestResponse::new(&self.context.config().cors_allow_origin);

        if method == Method::OPTIONS {
            return response.preflight().finish(None);
        }

        let target = uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or_else(|| uri.path());
        tracing::info!(%method, uri = %target, "request received");

        match self.respond(method, target, headers, body, response.clone()).await {
            Ok(finished) => finished,
            Err(error) => {
                let status = error.status_code();
                if status.is_server_error() {
                    tracing::error!(%error, code = error.error_code(), "request failed");
                } else {
                    tracing::warn!(%error, code = error.error_code(), "request rejected");
                }
                response.error(&error).finish(None)
            }
        }
    }

    async fn respond(
        &self,
        method: Method,
        target: &str,
        headers: HeaderMap,
        body: &[u8],
        mut response: RestResponse,
    ) -> RestResult<Response> {
        let ctx = self.context.as_ref();
        let view = ctx.parser().parse(method, target, headers, body)?;
        let caller = self.authenticate(&view).await?;

        let outcome = dispatch(ctx, &view, &caller).await?;
        let shaped = ResponseShaper::new(ctx, &view).shape(outcome).await?;

        if let Some(info) = &shaped.collection {
            response.set_collection(info);
        }
        let response = response.json(&shaped.body);
        tracing::info!(status = %response.status(), "request handled");

        let if_none_match = match view.method() {
            &Method::GET => view.if_none_match(),
            _ => None,
        };
        Ok(response.finish(if_none_match))
    }

    /// Resolve the caller; non-public paths need a valid bearer token
    async fn authenticate(&self, view: &RequestView) -> RestResult<Caller> {
        let public = self.public_paths.is_public(view.resource_path());
        let caller = match view.access_token() {
            Some(token) => self.authenticator.authenticate(token).await?,
            None => None,
        };

        match caller {
            Some(caller) => Ok(caller),
            None if public => Ok(Caller::Anonymous),
            None => Err(RestError::from(RequestError::Unauthorized {
                message: match view.access_token() {
                    Some(_) => "invalid access token".to_string(),
                    None => "missing access token".to_string(),
                },
            })),
        }
    }
}
