//! Router builder for the CRUD routes

use super::dispatcher::Dispatcher;
use super::handlers::{
    create, delete_many, delete_one, patch_many, patch_one, read_many, read_one, replace,
};
use axum::{
    Router,
    routing::{get, patch, post},
};
use tower_http::trace::TraceLayer;

/// Build the CRUD routes
///
/// These routes are generic and work for any collection:
/// - POST /{collection} - Create a document
/// - GET /{collection} - List documents matching the query string
/// - GET /{collection}/{id} - Get a document
/// - PUT /{collection}/{id} - Replace a document
/// - PATCH /{collection}/{id} - Patch a document
/// - PATCH /{collection}/_byquery - Patch every document matching the query string
/// - DELETE /{collection}/{id} - Delete a document
/// - DELETE /{collection}/_byquery - Delete every document matching the query string
///
/// `_byquery` is a static segment, so it takes precedence over `{id}`.
pub fn build_crud_routes(dispatcher: Dispatcher) -> Router {
    Router::new()
        .route("/{collection}", post(create).get(read_many))
        .route(
            "/{collection}/_byquery",
            patch(patch_many).delete(delete_many),
        )
        .route(
            "/{collection}/{id}",
            get(read_one).put(replace).patch(patch_one).delete(delete_one),
        )
        .with_state(dispatcher)
}

/// Build the full application router, nested under `prefix` when given
pub fn build_router(dispatcher: Dispatcher, prefix: Option<&str>) -> Router {
    let routes = build_crud_routes(dispatcher);
    let app = match prefix {
        Some(prefix) => Router::new().nest(prefix, routes),
        None => routes,
    };
    app.layer(TraceLayer::new_for_http())
}
