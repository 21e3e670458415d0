//! Record and schema operations over an engine state.

pub mod codec;
mod context;
mod crud;
mod schema;

pub use codec::parse_record;
pub use context::{Action, AllowAll, Authorizer, CallerContext};
pub use crud::{CrudService, RetrieveOptions, Target, WriteOptions};
pub use schema::SchemaService;
