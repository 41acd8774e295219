use snafu::Snafu;

use crate::types::WireType;

pub type RowSetResult<T> = std::result::Result<T, RowSetError>;

#[derive(Snafu, Debug)]
#[snafu(visibility(pub(crate)))]
pub enum RowSetError {
    #[snafu(display("Error reading response body: {source}"))]
    Io { source: std::io::Error },

    #[snafu(display("Malformed response JSON: {message}"))]
    Format { message: String },

    #[snafu(display("Response JSON ended before the document was complete"))]
    UnexpectedEnd,

    #[snafu(display("Column {column:?} declares unsupported type {type_name:?}"))]
    UnsupportedColumnType { column: String, type_name: String },

    #[snafu(display("Cannot decode column {column:?} as {wire_type}: {message}"))]
    Decode {
        column: String,
        wire_type: WireType,
        message: String,
    },

    #[snafu(display("No row has been read from the stream"))]
    NoCurrentRow,
}
