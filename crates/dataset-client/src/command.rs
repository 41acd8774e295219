//! The command facade: builds and issues the dataset request, then hands the
//! still-streaming response body to a row reader.

use futures::io::AsyncRead;
use futures::TryStreamExt;
use snafu::{ensure, ResultExt};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use url::Url;

use core_rowset::{ColumnDef, JsonTokenCursor, ResponseEnvelope, RowReader};

use crate::error::{
    CancelledSnafu, ClientResult, CommandBusySnafu, DecodeSchemaSnafu, HttpSnafu,
    InvalidUrlSnafu, RowSetSnafu, StatusSnafu, TimedOutSnafu,
};
use crate::parameters::ParameterBag;

/// Response body adapted into a forward-only byte stream.
pub type ResponseBody = Pin<Box<dyn AsyncRead + Send>>;

/// Reader over a live response body.
pub type ResponseRowReader = RowReader<JsonTokenCursor<ResponseBody>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommandBehavior {
    /// Execute the dataset and stream its single result.
    #[default]
    Default,
    /// Ask the server for parameters and columns only, no rows.
    SchemaOnly,
}

/// Cancels the outstanding operation of the command it was taken from.
/// Cloneable and safe to trigger from another task while an execute is in
/// flight; a cancel raised while nothing is outstanding is a no-op.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    slot: Arc<CancelSlot>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        if let Some(cancel) = self.slot.lock().as_ref() {
            cancel.notify_one();
        }
    }
}

/// Rendezvous between a cancel handle and the operation currently in flight.
/// Empty outside `execute_and_wait`, so a stale cancel cannot leak into a
/// later operation.
#[derive(Debug, Default)]
struct CancelSlot(Mutex<Option<Arc<Notify>>>);

impl CancelSlot {
    fn lock(&self) -> MutexGuard<'_, Option<Arc<Notify>>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Declared parameter names and columns of a dataset, from a schema-only
/// round trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetSchema {
    pub parameters: Vec<String>,
    pub columns: Vec<ColumnDef>,
}

/// A command for querying one dataset.
///
/// `text` is the dataset path relative to the connection's base URL. At most
/// one operation is in flight at a time; starting a second while one is
/// outstanding is a usage error, never queued.
pub struct Command {
    client: reqwest::Client,
    base_url: Url,
    text: String,
    timeout: Option<Duration>,
    parameters: ParameterBag,
    cancel: Arc<CancelSlot>,
    in_flight: AtomicBool,
}

impl Command {
    pub(crate) fn new(client: reqwest::Client, base_url: Url, text: String) -> Self {
        Self {
            client,
            base_url,
            text,
            timeout: None,
            parameters: ParameterBag::new(),
            cancel: Arc::new(CancelSlot::default()),
            in_flight: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
    }

    /// Command-level timeout for one execute; `None` waits indefinitely.
    pub fn set_timeout(&mut self, timeout: Option<Duration>) {
        self.timeout = timeout;
    }

    #[must_use]
    pub fn parameters(&self) -> &ParameterBag {
        &self.parameters
    }

    pub fn parameters_mut(&mut self) -> &mut ParameterBag {
        &mut self.parameters
    }

    /// Handle for cancelling this command's outstanding operation from
    /// another task.
    #[must_use]
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            slot: Arc::clone(&self.cancel),
        }
    }

    fn build_url(&self, behavior: CommandBehavior) -> ClientResult<Url> {
        let mut url = self.base_url.join(&self.text).context(InvalidUrlSnafu {
            path: self.text.clone(),
        })?;
        if behavior == CommandBehavior::SchemaOnly {
            url.query_pairs_mut().append_pair("behavior", "schemaOnly");
        }
        Ok(url)
    }

    /// Issues the POST and returns a row reader over the streaming response
    /// body.
    ///
    /// The body is handed over as soon as response headers arrive, so the
    /// first row can be produced before the server has finished writing the
    /// last one. Dropping the reader closes the stream.
    ///
    /// # Errors
    /// Usage, transport, timeout, cancellation and envelope errors, per
    /// [`crate::ClientError`].
    pub async fn execute_reader(
        &self,
        behavior: CommandBehavior,
    ) -> ClientResult<ResponseRowReader> {
        let url = self.build_url(behavior)?;
        tracing::debug!(%url, "executing dataset command");
        let request = self.client.post(url).json(&self.parameters);
        let response = self
            .execute_and_wait(async { request.send().await.context(HttpSnafu) })
            .await?;
        let response = check_status(response).await?;
        let body: ResponseBody = Box::pin(
            response
                .bytes_stream()
                .map_err(std::io::Error::other)
                .into_async_read(),
        );
        RowReader::open(JsonTokenCursor::new(body))
            .await
            .context(RowSetSnafu)
    }

    /// Fetches the dataset's declared parameters and columns without
    /// executing it.
    ///
    /// Schema-only responses are small, so this path reads the body whole
    /// instead of streaming it.
    ///
    /// # Errors
    /// Same classes as [`Self::execute_reader`].
    pub async fn describe(&self) -> ClientResult<DatasetSchema> {
        let url = self.build_url(CommandBehavior::SchemaOnly)?;
        tracing::debug!(%url, "fetching dataset schema");
        let request = self.client.post(url).json(&self.parameters);
        let envelope: ResponseEnvelope<serde_json::Value> = self
            .execute_and_wait(async {
                let response = request.send().await.context(HttpSnafu)?;
                let response = check_status(response).await?;
                response.json().await.context(DecodeSchemaSnafu)
            })
            .await?;
        Ok(DatasetSchema {
            parameters: envelope.parameters.unwrap_or_default(),
            columns: envelope.columns,
        })
    }

    /// Runs one transport operation, racing it against the external cancel
    /// signal and the configured timeout. The cancel rendezvous is created
    /// here and torn down with the in-flight flag on every exit path.
    async fn execute_and_wait<F, T>(&self, operation: F) -> ClientResult<T>
    where
        F: Future<Output = ClientResult<T>>,
    {
        ensure!(!self.in_flight.swap(true, Ordering::SeqCst), CommandBusySnafu);
        let cancel = Arc::new(Notify::new());
        *self.cancel.lock() = Some(Arc::clone(&cancel));
        let _guard = OperationGuard(self);
        tokio::select! {
            result = operation => result,
            () = cancel.notified() => CancelledSnafu.fail(),
            () = wait_for_timeout(self.timeout) => TimedOutSnafu {
                timeout: self.timeout.unwrap_or_default(),
            }
            .fail(),
        }
    }
}

struct OperationGuard<'a>(&'a Command);

impl Drop for OperationGuard<'_> {
    fn drop(&mut self) {
        *self.0.cancel.lock() = None;
        self.0.in_flight.store(false, Ordering::SeqCst);
    }
}

async fn wait_for_timeout(timeout: Option<Duration>) {
    match timeout {
        Some(timeout) => tokio::time::sleep(timeout).await,
        None => std::future::pending().await,
    }
}

async fn check_status(response: reqwest::Response) -> ClientResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    StatusSnafu { status, body }.fail()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::ClientError;

    fn test_command() -> Command {
        Command::new(
            reqwest::Client::new(),
            Url::parse("http://example.test/reports/").unwrap(),
            "trialBalance".to_string(),
        )
    }

    #[test]
    fn url_joins_command_text_under_the_base() {
        let command = test_command();
        let url = command.build_url(CommandBehavior::Default).unwrap();
        assert_eq!(url.as_str(), "http://example.test/reports/trialBalance");
    }

    #[test]
    fn schema_only_adds_the_behavior_flag() {
        let command = test_command();
        let url = command.build_url(CommandBehavior::SchemaOnly).unwrap();
        assert_eq!(
            url.as_str(),
            "http://example.test/reports/trialBalance?behavior=schemaOnly"
        );
    }

    #[tokio::test]
    async fn timeout_abandons_the_operation() {
        let mut command = test_command();
        command.set_timeout(Some(Duration::from_millis(10)));
        let result = command
            .execute_and_wait(std::future::pending::<ClientResult<()>>())
            .await;
        assert!(matches!(result, Err(ClientError::TimedOut { .. })));

        // The in-flight slot is free again after the timeout.
        let result = command.execute_and_wait(async { Ok(5) }).await;
        assert_eq!(result.unwrap(), 5);
    }

    #[tokio::test]
    async fn cancel_aborts_the_outstanding_wait() {
        let command = test_command();
        let handle = command.cancel_handle();
        let pending = command.execute_and_wait(std::future::pending::<ClientResult<()>>());
        let canceller = async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            handle.cancel();
        };
        let (result, ()) = tokio::join!(pending, canceller);
        assert!(matches!(result, Err(ClientError::Cancelled)));

        let result = command.execute_and_wait(async { Ok(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test]
    async fn cancel_between_operations_is_a_no_op() {
        let command = test_command();
        let handle = command.cancel_handle();

        // Nothing in flight yet; this must not cancel the next execute.
        handle.cancel();
        let result = command.execute_and_wait(async { Ok(3) }).await;
        assert_eq!(result.unwrap(), 3);

        // Nor may a cancel racing in after completion leak forward.
        handle.cancel();
        let result = command.execute_and_wait(async { Ok(4) }).await;
        assert_eq!(result.unwrap(), 4);
    }

    #[tokio::test]
    async fn second_execute_while_outstanding_is_a_usage_error() {
        let command = test_command();
        let slow = command.execute_and_wait(async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(1)
        });
        let contender = async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            command.execute_and_wait(async { Ok(2) }).await
        };
        let (first, second) = tokio::join!(slow, contender);
        assert_eq!(first.unwrap(), 1);
        assert!(matches!(second, Err(ClientError::CommandBusy)));
    }
}
