//! HTTP/1.1 framing for the one-request-per-connection engine.
//!
//! # Architecture
//!
//! - **`framer`**: finds the blank line that ends the request head
//! - **`parser`**: turns the head into a structured [`request::Request`]
//! - **`request`**: request representation and target splitting
//! - **`response`**: status line and header list, preamble serialisation
//! - **`connection`**: the per-connection state machine
//! - **`writer`**: partial, non-blocking delivery of response bytes
//!
//! # Connection State Machine
//!
//! ```text
//!        ┌──────────────────┐
//!        │  ReadingHeaders  │ ← accumulate until the blank line
//!        └──────┬───────────┘
//!               │ head parsed; body-bearing with unmet Content-Length
//!               ▼
//!        ┌──────────────────┐
//!        │   ReadingBody    │ ← accumulate declared length
//!        └──────┬───────────┘
//!               │ body complete (or no body expected)
//!               ▼
//!        ┌──────────────────┐
//!        │ ReadyToDispatch  │ ← application runs here, once
//!        └──────┬───────────┘
//!               │ response assembled
//!               ▼
//!        ┌──────────────────┐
//!        │ WritingResponse  │ ← drained on write-readiness
//!        └──────┬───────────┘
//!               │ all bytes sent
//!               ▼
//!            Closing
//! ```
//!
//! Malformed heads, body-bearing requests without Content-Length, peer
//! shutdown and hang-ups go straight to `Closing` from any phase.

pub mod connection;
pub mod framer;
pub mod parser;
pub mod request;
pub mod response;
pub mod writer;
