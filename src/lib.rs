pub mod config;
pub mod error;
pub mod logging;
pub mod normalize;
pub mod pipeline;
pub mod schema;
pub mod secrets;
pub mod sheets;
pub mod upsert;

pub use config::SyncConfig;
pub use error::{ReadError, ResolutionError, SyncError, ValidationError, WriteError};
pub use normalize::{normalize, RawRow, Record};
pub use pipeline::{handler, InvocationResult};
pub use schema::TableSchema;
