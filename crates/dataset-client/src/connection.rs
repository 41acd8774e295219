use http::header;
use snafu::{ensure, OptionExt, ResultExt};
use std::time::Duration;
use url::Url;

use crate::command::Command;
use crate::error::{
    BuildClientSnafu, ClientResult, ConnectionAlreadyOpenSnafu, ConnectionClosedSnafu,
    InvalidUrlSnafu,
};

/// A connection to a dataset service.
///
/// The base URL should include a trailing slash so command paths join under
/// it. There is no real wire-level connection behind this; `open` exists to
/// initialize the HTTP client shared by every command created from here.
#[derive(Debug)]
pub struct Connection {
    base_url: Url,
    timeout: Option<Duration>,
    client: Option<reqwest::Client>,
}

impl Connection {
    /// # Errors
    /// Fails if `base_url` is not an absolute URL.
    pub fn new(base_url: &str) -> ClientResult<Self> {
        let base_url = Url::parse(base_url).context(InvalidUrlSnafu {
            path: base_url.to_string(),
        })?;
        Ok(Self {
            base_url,
            timeout: None,
            client: None,
        })
    }

    /// Connection-level timeout applied to every request issued through this
    /// connection's client.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// # Errors
    /// Fails if the connection is already open or the client cannot be built.
    pub fn open(&mut self) -> ClientResult<()> {
        ensure!(self.client.is_none(), ConnectionAlreadyOpenSnafu);
        let mut headers = header::HeaderMap::new();
        headers.insert(header::ACCEPT, header::HeaderValue::from_static("application/json"));
        let mut builder = reqwest::Client::builder().default_headers(headers);
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }
        self.client = Some(builder.build().context(BuildClientSnafu)?);
        Ok(())
    }

    pub fn close(&mut self) {
        self.client = None;
    }

    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.client.is_some()
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Creates a command bound to this connection's client.
    ///
    /// `text` is the dataset path relative to the base URL.
    ///
    /// # Errors
    /// Fails if the connection is not open.
    pub fn create_command(&self, text: impl Into<String>) -> ClientResult<Command> {
        let client = self.client.clone().context(ConnectionClosedSnafu)?;
        Ok(Command::new(client, self.base_url.clone(), text.into()))
    }
}
