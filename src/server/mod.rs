//! Server module for mounting CRUD routes on an axum application
//!
//! This module provides:
//! - [`CrudlifyBuilder`] and [`crudlify`] to assemble the engine
//! - [`Dispatcher`] with the eight transport-agnostic operations
//! - the REST handlers and router built on top of it

pub mod builder;
pub mod dispatcher;
pub mod handlers;
pub mod host;
pub mod router;

pub use builder::{Crudlify, CrudlifyBuilder, crudlify};
pub use dispatcher::Dispatcher;
pub use host::CrudHost;
pub use router::{build_crud_routes, build_router};
