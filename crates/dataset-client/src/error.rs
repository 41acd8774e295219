use http::StatusCode;
use snafu::Snafu;
use std::time::Duration;

pub type ClientResult<T> = std::result::Result<T, ClientError>;

#[derive(Snafu, Debug)]
#[snafu(visibility(pub(crate)))]
pub enum ClientError {
    #[snafu(display("Connection is not open"))]
    ConnectionClosed,

    #[snafu(display("Connection is already open"))]
    ConnectionAlreadyOpen,

    #[snafu(display("Command is already running"))]
    CommandBusy,

    #[snafu(display("Command was cancelled"))]
    Cancelled,

    #[snafu(display("Command timed out after {timeout:?}"))]
    TimedOut { timeout: Duration },

    #[snafu(display("Invalid dataset path {path:?}: {source}"))]
    InvalidUrl {
        path: String,
        source: url::ParseError,
    },

    #[snafu(display("Error building HTTP client: {source}"))]
    BuildClient { source: reqwest::Error },

    #[snafu(display("HTTP request error: {source}"))]
    Http { source: reqwest::Error },

    #[snafu(display("Server responded with {status}: {body}"))]
    Status { status: StatusCode, body: String },

    #[snafu(display("Error decoding schema response: {source}"))]
    DecodeSchema { source: reqwest::Error },

    #[snafu(display("{source}"))]
    RowSet { source: core_rowset::RowSetError },
}
