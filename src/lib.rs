//! Turnstile - single-threaded HTTP front end
//!
//! Terminates client byte streams, parses one request per connection and
//! hands it to an application callback through a synchronous gateway
//! contract.

pub mod config;
pub mod gateway;
pub mod http;
pub mod server;
