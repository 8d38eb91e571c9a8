//! Application gateway.
//!
//! Bridges a fully read request to an application callback:
//!
//! - **`environ`**: builds the per-request [`Environment`] from the parsed
//!   request and the process-wide [`BaseEnvironment`]
//! - **`app`**: the [`Application`] contract and body producers
//! - **`invoker`**: runs the application and frames its output
//! - **`errors`**: the [`ErrorStream`] applications write diagnostics to
//! - **`error`**: protocol violations raised by [`StartResponse`]

pub mod app;
pub mod environ;
pub mod error;
pub mod errors;
pub mod invoker;

pub use app::{Application, Body, HelloWorld, ResponseBody, ResponseBodyExt, chunks, from_fn, try_chunks};
pub use environ::{BaseEnvironment, Environment, Scheme};
pub use error::GatewayError;
pub use errors::ErrorStream;
pub use invoker::{BodyWriter, StartResponse, invoke};
