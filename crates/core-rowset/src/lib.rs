//! Streaming row access over HTTP/JSON dataset responses.
//!
//! A response envelope declares its column schema up front; the reader
//! detects how the row data is encoded and yields decoded rows one at a
//! time, in a single forward pass, without ever holding the whole response
//! in memory.

pub mod envelope;
pub mod errors;
pub mod reader;
pub mod schema;
pub mod token;
pub mod types;
pub mod value;

pub use envelope::{ColumnDef, DatasetRecord, ResponseEnvelope};
pub use errors::{RowSetError, RowSetResult};
pub use reader::{ResultShape, RowReader};
pub use schema::{Column, ColumnSchema};
pub use token::{JsonTokenCursor, Token, TokenCursor, TokenKind};
pub use types::{HostKind, WireType};
pub use value::Cell;
