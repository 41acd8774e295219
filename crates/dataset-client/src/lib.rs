//! HTTP client for dataset services: connection, command, parameters, and a
//! streaming row reader over the response body.
//!
//! ```no_run
//! use dataset_client::{CommandBehavior, Connection};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut connection = Connection::new("http://localhost:8080/reports/")?;
//! connection.open()?;
//! let mut command = connection.create_command("trialBalance")?;
//! command.parameters_mut().set("from", "2024-01-01");
//! let mut reader = command.execute_reader(CommandBehavior::Default).await?;
//! while reader.read().await? {
//!     println!("{:?}", reader.value(0)?);
//! }
//! # Ok(())
//! # }
//! ```

pub mod command;
pub mod connection;
pub mod error;
pub mod parameters;

pub use command::{CancelHandle, Command, CommandBehavior, DatasetSchema, ResponseRowReader};
pub use connection::Connection;
pub use error::{ClientError, ClientResult};
pub use parameters::{Parameter, ParameterBag};
