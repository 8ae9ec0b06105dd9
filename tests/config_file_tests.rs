//! Loading engine setup from YAML configuration files

use axum::http::StatusCode;
use axum_test::TestServer;
use crudlify::core::ConfigError;
use crudlify::prelude::*;
use std::io::Write;
use tempfile::NamedTempFile;

fn write_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("Failed to create temp file");
    file.write_all(content.as_bytes())
        .expect("Failed to write config");
    file
}

#[tokio::test]
async fn test_server_from_yaml_file() {
    let file = write_config(
        r#"
options:
  prefix: /api
collections:
  books:
    title: { type: string, required: true }
    pages: integer
  logs: ~
"#,
    );

    let config = CrudConfig::from_yaml_file(file.path()).unwrap();
    let crud = CrudlifyBuilder::new()
        .with_datastore(InMemoryDatastore::new())
        .with_config(config)
        .build()
        .unwrap();
    let server = TestServer::new(crud.router()).unwrap();

    server
        .post("/api/books")
        .json(&json!({"pages": 3}))
        .await
        .assert_status(StatusCode::BAD_REQUEST);
    server
        .post("/api/books")
        .json(&json!({"title": "Dune", "pages": "3"}))
        .await
        .assert_status(StatusCode::CREATED);
    server
        .post("/api/logs")
        .json(&json!({"free": "form"}))
        .await
        .assert_status(StatusCode::CREATED);
    server.get("/api/ghosts").await.assert_status_not_found();
}

#[tokio::test]
async fn test_json_schema_backend_from_yaml_file() {
    let file = write_config(
        r#"
options:
  schema: json-schema
collections:
  books:
    type: object
    required: [title]
    properties:
      title: { type: string }
      status: { type: string, default: draft }
"#,
    );

    let crud = CrudlifyBuilder::new()
        .with_datastore(InMemoryDatastore::new())
        .with_config(CrudConfig::from_yaml_file(file.path()).unwrap())
        .build()
        .unwrap();
    let server = TestServer::new(crud.router()).unwrap();

    let response = server.post("/books").json(&json!({"title": "Dune"})).await;
    response.assert_status(StatusCode::CREATED);

    let body: Value = response.json();
    assert_eq!(body["status"], "draft");
}

#[test]
fn test_missing_file_names_the_path() {
    let err = CrudConfig::from_yaml_file("/nonexistent/crudlify.yaml").unwrap_err();
    assert!(matches!(
        err.downcast_ref::<ConfigError>(),
        Some(ConfigError::IoError { .. })
    ));
    assert!(format!("{:#}", err).contains("/nonexistent/crudlify.yaml"));
}

#[test]
fn test_malformed_yaml_file_is_parse_error() {
    let file = write_config("collections: [unclosed\n");
    let err = CrudConfig::from_yaml_file(file.path()).unwrap_err();

    match err.downcast_ref::<ConfigError>() {
        Some(ConfigError::ParseError { file: Some(name), .. }) => {
            assert_eq!(name, &file.path().display().to_string());
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[test]
fn test_invalid_prefix_in_file_is_rejected() {
    let file = write_config("options:\n  prefix: api/\n");
    let err = CrudConfig::from_yaml_file(file.path()).unwrap_err();
    assert!(format!("{:#}", err).contains("options.prefix"));
}

#[test]
fn test_bad_rule_fails_at_build() {
    let file = write_config("collections:\n  books:\n    title: { type: text }\n");
    let config = CrudConfig::from_yaml_file(file.path()).unwrap();

    let err = CrudlifyBuilder::new()
        .with_datastore(InMemoryDatastore::new())
        .with_config(config)
        .build()
        .unwrap_err();
    assert_eq!(err.error_code(), "CONFIG_ERROR");
    assert!(err.to_string().contains("books"));
}
