//! Standalone crudlify server backed by the in-memory datastore
//!
//! ```text
//! CRUDLIFY_CONFIG=demos/server/crudlify.yaml cargo run --example server
//!
//! curl -X POST localhost:3000/api/books -H 'content-type: application/json' \
//!      -d '{"title": "Dune", "pages": "412"}'
//! curl 'localhost:3000/api/books?pages>300&sort=-pages'
//! curl -X DELETE 'localhost:3000/api/books/_byquery?q={"title":"Dune"}'
//! ```

use anyhow::Result;
use crudlify::prelude::*;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,crudlify=debug")),
        )
        .init();

    let config_path =
        std::env::var("CRUDLIFY_CONFIG").unwrap_or_else(|_| "demos/server/crudlify.yaml".into());
    let addr = std::env::var("CRUDLIFY_ADDR").unwrap_or_else(|_| "127.0.0.1:3000".into());

    let config = CrudConfig::from_yaml_file(&config_path)?;
    let crud = CrudlifyBuilder::new()
        .with_datastore(InMemoryDatastore::new())
        .with_config(config)
        .build()?;

    crud.hooks().after_post("books", |doc| async move {
        tracing::info!(id = %doc["_id"], title = %doc["title"], "book added");
        Ok(())
    });

    crud.serve(&addr).await
}
