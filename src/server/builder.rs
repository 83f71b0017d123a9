//! ServerBuilder for fluent API to build HTTP servers

use super::exposure::RestExposure;
use super::host::ServerHost;
use crate::config::RestConfig;
use crate::core::auth::{Authenticator, NoAuthenticator};
use crate::core::error::RestResult;
use crate::core::memory::MemoryGuard;
use crate::core::provider::{Provider, ProviderRef};
use crate::dispatch::{DispatchContext, ProviderRegistry};
use anyhow::Result;
use axum::Router;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Builder for the dispatch server
///
/// # Example
///
/// ```ignore
/// let app = ServerBuilder::new()
///     .with_config(RestConfig::from_yaml_file("config/api.yaml")?)
///     .with_provider(users)
///     .with_authenticator(MyTokens::new())
///     .build()?;
/// ```
pub struct ServerBuilder {
    configs: Vec<RestConfig>,
    providers: ProviderRegistry,
    authenticator: Option<Arc<dyn Authenticator>>,
    memory_guard: Option<MemoryGuard>,
    custom_routes: Vec<Router>,
}

impl ServerBuilder {
    pub fn new() -> Self {
        Self {
            configs: Vec::new(),
            providers: ProviderRegistry::new(),
            authenticator: None,
            memory_guard: None,
            custom_routes: Vec::new(),
        }
    }

    /// Add a configuration
    ///
    /// Scalar settings come from the first configuration added; path
    /// mappings and public paths of all of them accumulate.
    pub fn with_config(mut self, config: RestConfig) -> Self {
        self.configs.push(config);
        self
    }

    /// Register a provider under its kind
    pub fn with_provider(self, provider: impl Provider + 'static) -> Self {
        self.with_provider_ref(Arc::new(provider))
    }

    pub fn with_provider_ref(mut self, provider: ProviderRef) -> Self {
        self.providers.register(provider);
        self
    }

    /// Set the token authenticator; without one every token is accepted
    pub fn with_authenticator(mut self, authenticator: impl Authenticator + 'static) -> Self {
        self.authenticator = Some(Arc::new(authenticator));
        self
    }

    /// Replace the memory guard derived from the configuration
    pub fn with_memory_guard(mut self, guard: MemoryGuard) -> Self {
        self.memory_guard = Some(guard);
        self
    }

    /// Add routes that bypass resource dispatch
    pub fn with_custom_routes(mut self, routes: Router) -> Self {
        self.custom_routes.push(routes);
        self
    }

    /// Build the transport-agnostic host
    pub fn build_host(self) -> RestResult<ServerHost> {
        let (host, _) = self.into_host()?;
        Ok(host)
    }

    /// Build the REST router
    pub fn build(self) -> RestResult<Router> {
        let (host, custom_routes) = self.into_host()?;
        Ok(RestExposure::build_router(Arc::new(host), custom_routes))
    }

    fn into_host(self) -> RestResult<(ServerHost, Vec<Router>)> {
        let config = Self::merge_configs(self.configs);
        let context = match self.memory_guard {
            Some(guard) => DispatchContext::with_memory_guard(config, self.providers, guard)?,
            None => DispatchContext::new(config, self.providers)?,
        };
        let authenticator = self
            .authenticator
            .unwrap_or_else(|| Arc::new(NoAuthenticator));

        tracing::info!(
            providers = context.providers().len(),
            kinds = ?context.providers().kinds(),
            "server host built"
        );
        Ok((ServerHost::new(context, authenticator)?, self.custom_routes))
    }

    fn merge_configs(configs: Vec<RestConfig>) -> RestConfig {
        let mut configs = configs.into_iter();
        let first = configs.next().unwrap_or_default();
        configs.fold(first, RestConfig::merge)
    }

    /// Serve the application with graceful shutdown
    ///
    /// ```ignore
    /// ServerBuilder::new()
    ///     .with_provider(users)
    ///     .serve("127.0.0.1:3000").await?;
    /// ```
    pub async fn serve(self, addr: &str) -> Result<()> {
        let app = self.build()?;
        let listener = TcpListener::bind(addr).await?;

        tracing::info!("Server listening on {}", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("Server shutdown complete");
        Ok(())
    }
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal, initiating graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM signal, initiating graceful shutdown...");
        },
    }
}
