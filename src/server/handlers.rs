//! HTTP handlers for the CRUD routes
//!
//! Handlers extract path, query string, headers and body, hand them to the
//! [`Dispatcher`] and turn the outcome into a response. Failures are logged
//! here, once per request.

use super::dispatcher::Dispatcher;
use crate::core::document::Document;
use crate::core::error::{CrudError, RequestError};
use axum::{
    Json,
    extract::{Path, Query, State, rejection::JsonRejection},
    http::{HeaderMap, StatusCode},
};
use serde::Serialize;
use serde_json::Value;

/// Params of the query string, in request order
type QueryPairs = Query<Vec<(String, String)>>;

/// Response body of the `_byquery` routes
#[derive(Debug, Serialize)]
pub struct CountResponse {
    pub count: u64,
}

/// Unknown collections win over unusable bodies
fn checked_body(
    dispatcher: &Dispatcher,
    collection: &str,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Value, CrudError> {
    dispatcher.ensure_collection(collection)?;
    match body {
        Ok(Json(value)) => Ok(value),
        Err(rejection) => Err(RequestError::InvalidBody {
            message: rejection.body_text(),
        }
        .into()),
    }
}

/// Log a failed request at a level matching its status
fn logged<T>(operation: &str, collection: &str, result: Result<T, CrudError>) -> Result<T, CrudError> {
    if let Err(e) = &result {
        if e.is_client_error() {
            tracing::warn!(operation, collection, code = e.error_code(), "{}", e);
        } else {
            tracing::error!(operation, collection, code = e.error_code(), "{}", e);
        }
    }
    result
}

/// POST /{collection}
pub async fn create(
    State(dispatcher): State<Dispatcher>,
    Path(collection): Path<String>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<(StatusCode, Json<Document>), CrudError> {
    let result = match checked_body(&dispatcher, &collection, body) {
        Ok(body) => dispatcher.create(&collection, body).await,
        Err(e) => Err(e),
    };
    let created = logged("create", &collection, result)?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// GET /{collection}
pub async fn read_many(
    State(dispatcher): State<Dispatcher>,
    Path(collection): Path<String>,
    Query(params): QueryPairs,
    headers: HeaderMap,
) -> Result<Json<Vec<Document>>, CrudError> {
    let result = dispatcher.read_many(&collection, &params, &headers).await;
    logged("read_many", &collection, result).map(Json)
}

/// GET /{collection}/{id}
pub async fn read_one(
    State(dispatcher): State<Dispatcher>,
    Path((collection, id)): Path<(String, String)>,
) -> Result<Json<Document>, CrudError> {
    let result = dispatcher.read_one(&collection, &id).await;
    logged("read_one", &collection, result).map(Json)
}

/// PUT /{collection}/{id}
pub async fn replace(
    State(dispatcher): State<Dispatcher>,
    Path((collection, id)): Path<(String, String)>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Document>, CrudError> {
    let result = match checked_body(&dispatcher, &collection, body) {
        Ok(body) => dispatcher.replace(&collection, &id, body).await,
        Err(e) => Err(e),
    };
    logged("replace", &collection, result).map(Json)
}

/// PATCH /{collection}/{id}
pub async fn patch_one(
    State(dispatcher): State<Dispatcher>,
    Path((collection, id)): Path<(String, String)>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Document>, CrudError> {
    let result = match checked_body(&dispatcher, &collection, body) {
        Ok(body) => dispatcher.patch_one(&collection, &id, body).await,
        Err(e) => Err(e),
    };
    logged("patch_one", &collection, result).map(Json)
}

/// PATCH /{collection}/_byquery
pub async fn patch_many(
    State(dispatcher): State<Dispatcher>,
    Path(collection): Path<String>,
    Query(params): QueryPairs,
    headers: HeaderMap,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<CountResponse>, CrudError> {
    let result = match checked_body(&dispatcher, &collection, body) {
        Ok(body) => dispatcher.patch_many(&collection, &params, &headers, body).await,
        Err(e) => Err(e),
    };
    logged("patch_many", &collection, result).map(|count| Json(CountResponse { count }))
}

/// DELETE /{collection}/{id}
pub async fn delete_one(
    State(dispatcher): State<Dispatcher>,
    Path((collection, id)): Path<(String, String)>,
) -> Result<Json<Document>, CrudError> {
    let result = dispatcher.delete_one(&collection, &id).await;
    logged("delete_one", &collection, result).map(Json)
}

/// DELETE /{collection}/_byquery
pub async fn delete_many(
    State(dispatcher): State<Dispatcher>,
    Path(collection): Path<String>,
    Query(params): QueryPairs,
    headers: HeaderMap,
) -> Result<Json<CountResponse>, CrudError> {
    let result = dispatcher.delete_many(&collection, &params, &headers).await;
    logged("delete_many", &collection, result).map(|count| Json(CountResponse { count }))
}
