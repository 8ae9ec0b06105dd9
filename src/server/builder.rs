//! Builder and entry points for mounting crudlify

use super::dispatcher::Dispatcher;
use super::host::CrudHost;
use super::router::build_router;
use crate::config::{CrudConfig, CrudOptions};
use crate::core::error::{ConfigError, CrudError};
use crate::core::hooks::HookMediator;
use crate::core::schema::{RawSchema, RawSchemaMap, SchemaMap};
use crate::core::service::{Datastore, DatastoreHandle};
use anyhow::Result;
use axum::Router;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Builder for a crudlify instance
///
/// # Example
///
/// ```ignore
/// let crud = CrudlifyBuilder::new()
///     .with_datastore(InMemoryDatastore::new())
///     .with_collection("books", json!({"title": {"type": "string", "required": true}}))
///     .reserve("logs")
///     .build()?;
///
/// let app = Router::new().merge(crud.router());
/// ```
pub struct CrudlifyBuilder {
    datastore: Option<Arc<dyn Datastore>>,
    schemas: RawSchemaMap,
    options: CrudOptions,
    hooks: HookMediator,
}

impl CrudlifyBuilder {
    /// Create a new CrudlifyBuilder
    pub fn new() -> Self {
        Self {
            datastore: None,
            schemas: RawSchemaMap::new(),
            options: CrudOptions::default(),
            hooks: HookMediator::new(),
        }
    }

    /// Set the datastore (required)
    pub fn with_datastore(mut self, datastore: impl Datastore + 'static) -> Self {
        self.datastore = Some(Arc::new(datastore));
        self
    }

    /// Set a datastore that is already shared
    pub fn with_shared_datastore(mut self, datastore: Arc<dyn Datastore>) -> Self {
        self.datastore = Some(datastore);
        self
    }

    /// Replace the whole raw schema map
    pub fn with_schemas(mut self, schemas: RawSchemaMap) -> Self {
        self.schemas = schemas;
        self
    }

    /// Declare one collection with a schema
    pub fn with_collection(mut self, name: &str, schema: impl Into<RawSchema>) -> Self {
        self.schemas.insert(name.to_string(), Some(schema.into()));
        self
    }

    /// Declare a collection that is accepted without validation
    pub fn reserve(mut self, name: &str) -> Self {
        self.schemas.insert(name.to_string(), None);
        self
    }

    pub fn with_options(mut self, options: CrudOptions) -> Self {
        self.options = options;
        self
    }

    /// Take options and collections from a configuration file
    pub fn with_config(self, config: CrudConfig) -> Self {
        let (schemas, options) = config.into_parts();
        self.with_schemas(schemas).with_options(options)
    }

    /// Use an existing hook registry
    pub fn with_hooks(mut self, hooks: HookMediator) -> Self {
        self.hooks = hooks;
        self
    }

    /// Compile the schemas and assemble the engine
    ///
    /// Schema compilation errors surface here, before any request is served.
    pub fn build(self) -> Result<Crudlify, CrudError> {
        let datastore = self.datastore.ok_or_else(|| ConfigError::MissingField {
            field: "datastore".to_string(),
            context: "CrudlifyBuilder (call .with_datastore())".to_string(),
        })?;
        self.options.validate()?;

        let strategy = self.options.schema.strategy();
        let schemas = if self.schemas.is_empty() {
            SchemaMap::empty()
        } else {
            strategy.prepare(self.schemas)?
        };
        let translator = self.options.query.translator();

        tracing::info!(
            backend = strategy.name(),
            query = translator.name(),
            datastore = datastore.name(),
            collections = schemas.len(),
            "crudlify ready"
        );

        let host = CrudHost::new(
            DatastoreHandle::new(datastore),
            schemas,
            strategy,
            translator,
            self.hooks,
        );

        Ok(Crudlify {
            dispatcher: Dispatcher::new(Arc::new(host)),
            prefix: self.options.prefix,
        })
    }
}

impl Default for CrudlifyBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Build a crudlify instance in one call
pub fn crudlify(
    datastore: impl Datastore + 'static,
    schemas: RawSchemaMap,
    options: CrudOptions,
) -> Result<Crudlify, CrudError> {
    CrudlifyBuilder::new()
        .with_datastore(datastore)
        .with_schemas(schemas)
        .with_options(options)
        .build()
}

/// A ready-to-mount CRUD engine
#[derive(Debug, Clone)]
pub struct Crudlify {
    dispatcher: Dispatcher,
    prefix: Option<String>,
}

impl Crudlify {
    /// The CRUD routes, nested under the configured prefix
    pub fn router(&self) -> Router {
        build_router(self.dispatcher.clone(), self.prefix.as_deref())
    }

    /// Hook registry; hooks registered after `router()` still apply
    pub fn hooks(&self) -> &HookMediator {
        &self.dispatcher.host().hooks
    }

    /// Transport-agnostic access to the eight operations
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Point every later request at a new datastore
    pub fn reconfigure(&self, datastore: impl Datastore + 'static) {
        self.dispatcher.host().datastore.reconfigure(Arc::new(datastore));
    }

    /// Serve the routes with graceful shutdown
    ///
    /// This will:
    /// - Bind to the provided address
    /// - Start serving requests
    /// - Handle SIGTERM and SIGINT (Ctrl+C) for graceful shutdown
    ///
    /// # Example
    ///
    /// ```ignore
    /// crudlify(InMemoryDatastore::new(), RawSchemaMap::new(), CrudOptions::default())?
    ///     .serve("127.0.0.1:3000")
    ///     .await?;
    /// ```
    pub async fn serve(&self, addr: &str) -> Result<()> {
        let app = self.router();
        let listener = TcpListener::bind(addr).await?;

        tracing::info!("Server listening on {}", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("Server shutdown complete");
        Ok(())
    }
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {}", e);
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
                tracing::error!("failed to install SIGTERM handler: {}", e);
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::{SchemaBackend, SchemaEntry};
    use crate::storage::InMemoryDatastore;
    use serde_json::json;

    #[test]
    fn test_build_requires_datastore() {
        let err = CrudlifyBuilder::new().build().unwrap_err();
        assert!(matches!(err, CrudError::Config(ConfigError::MissingField { .. })));
    }

    #[test]
    fn test_build_compiles_schemas() {
        let crud = CrudlifyBuilder::new()
            .with_datastore(InMemoryDatastore::new())
            .with_collection("books", json!({"title": "string"}))
            .reserve("logs")
            .build()
            .unwrap();

        let schemas = &crud.dispatcher().host().schemas;
        assert!(matches!(schemas.resolve("books"), SchemaEntry::Compiled(_)));
        assert!(matches!(schemas.resolve("logs"), SchemaEntry::Reserved));
        assert!(!schemas.resolve("ghosts").is_known());
    }

    #[test]
    fn test_build_rejects_schema_for_wrong_backend() {
        let err = CrudlifyBuilder::new()
            .with_datastore(InMemoryDatastore::new())
            .with_collection("books", json!({"title": "string"}))
            .with_options(CrudOptions::default().with_schema(SchemaBackend::Typed))
            .build()
            .unwrap_err();
        assert_eq!(err.error_code(), "CONFIG_ERROR");
    }

    #[test]
    fn test_build_rejects_bad_prefix() {
        let err = crudlify(
            InMemoryDatastore::new(),
            RawSchemaMap::new(),
            CrudOptions::default().with_prefix("api"),
        )
        .unwrap_err();
        assert!(err.to_string().contains("options.prefix"));
    }

    #[test]
    fn test_hooks_are_shared_with_clones() {
        let crud = crudlify(InMemoryDatastore::new(), RawSchemaMap::new(), CrudOptions::default())
            .unwrap();
        let clone = crud.clone();
        crud.hooks().before_post("books", |_| async { Ok(()) });
        assert!(clone.hooks().contains(
            "books",
            crate::core::hooks::Verb::Post,
            crate::core::hooks::Phase::Before
        ));
    }
}
