//! Relational SDK: driver-neutral schema introspection, DDL and generic CRUD over sqlx's Any driver.

pub mod case;
pub mod config;
pub mod dialect;
pub mod error;
pub mod introspect;
pub mod migration;
pub mod response;
pub mod service;
pub mod sql;
pub mod state;
pub mod store;

pub use config::{EngineSettings, FieldDescriptor, FieldSchema, TableDescriptor, TableSchema};
pub use dialect::{Dialect, SqlDialect};
pub use error::{AppError, ConfigError};
pub use introspect::Introspector;
pub use response::{RecordMeta, RecordOutcome, RecordSet};
pub use service::{
    Action, AllowAll, Authorizer, CallerContext, CrudService, RetrieveOptions, SchemaService, Target, WriteOptions,
};
pub use state::EngineState;
