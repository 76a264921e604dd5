//! `skirmish-server` – the decision service's network surface.
//!
//! Binds a TCP listener on the loopback interface (default port `12345`) and
//! answers exactly one observation per connection:
//!
//! 1. **Read** until a newline or [`MAX_REQUEST_BYTES`], whichever comes first.
//! 2. **Decode** everything read, trimmed, as one [`Observation`].
//! 3. **Decide** with the shared [`Policy`].
//! 4. **Write** the [`Decision`] as one JSON line, then close.
//!
//! Anything that goes wrong between reading and writing is answered with
//! [`FALLBACK_RESPONSE`]. A peer that disconnects without sending a byte gets
//! no answer at all.
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use skirmish_policy::HeuristicPolicy;
//! use skirmish_server::DecisionServer;
//!
//! #[tokio::main]
//! async fn main() {
//!     DecisionServer::new(Arc::new(HeuristicPolicy::new()))
//!         .run()
//!         .await
//!         .expect("decision server failed");
//! }
//! ```
//!
//! [`Observation`]: skirmish_types::Observation
//! [`Decision`]: skirmish_types::Decision
//! [`Policy`]: skirmish_policy::Policy

pub mod handler;
pub mod server;

pub use handler::{
    ConnectionOutcome, FALLBACK_RESPONSE, MAX_REQUEST_BYTES, handle_connection,
};
pub use server::{DEFAULT_PORT, DEFAULT_READ_TIMEOUT, DecisionServer};
