//! Shared state behind every CRUD route
//!
//! The host is transport-agnostic: it holds the datastore handle, the
//! compiled schema map and the strategies chosen at setup. The dispatcher
//! and the REST handlers only read from it.

use crate::core::hooks::HookMediator;
use crate::core::query::QueryTranslator;
use crate::core::schema::{SchemaMap, SchemaStrategy};
use crate::core::service::DatastoreHandle;
use std::fmt;
use std::sync::Arc;

/// Host context containing all engine state
pub struct CrudHost {
    /// Active datastore, swappable at runtime
    pub datastore: DatastoreHandle,

    /// Compiled schemas, immutable after setup
    pub schemas: Arc<SchemaMap>,

    /// Validation backend applied to every collection
    pub strategy: Arc<dyn SchemaStrategy>,

    /// Query-string translator for the `_byquery` and list routes
    pub translator: Arc<dyn QueryTranslator>,

    /// Lifecycle hooks around writes
    pub hooks: HookMediator,
}

impl fmt::Debug for CrudHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CrudHost")
            .field("datastore", &self.datastore)
            .field("collections", &self.schemas.collections().collect::<Vec<_>>())
            .field("strategy", &self.strategy.name())
            .field("translator", &self.translator.name())
            .field("hooks", &self.hooks)
            .finish()
    }
}

impl CrudHost {
    pub fn new(
        datastore: DatastoreHandle,
        schemas: SchemaMap,
        strategy: Arc<dyn SchemaStrategy>,
        translator: Arc<dyn QueryTranslator>,
        hooks: HookMediator,
    ) -> Self {
        Self {
            datastore,
            schemas: Arc::new(schemas),
            strategy,
            translator,
            hooks,
        }
    }

    /// Collection names declared in the schema map
    ///
    /// Empty when every collection is accepted.
    pub fn collections(&self) -> Vec<&str> {
        self.schemas.collections().collect()
    }
}
