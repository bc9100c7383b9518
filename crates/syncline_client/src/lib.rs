//! # Syncline Client
//!
//! Client-side request tracking for the syncline protocol.
//!
//! This crate provides:
//! - `RequestManager`, which tracks outstanding mutations and actions
//! - `ResultHandle`, the single-resolution future a caller awaits
//! - `SyncClient`, which ties the manager to a transport and a connection
//!   lifecycle
//! - Transport abstraction with a mock for testing
//!
//! ## Request lifecycle
//!
//! 1. A call is registered and its message handed to the transport
//! 2. The backend replies; actions resolve immediately
//! 3. Mutations wait until the local view has advanced past their commit
//!    timestamp
//! 4. After a reconnect, mutations and unsent actions are replayed
//!
//! ## Key Invariants
//!
//! - Every result handle resolves exactly once
//! - A mutation result is never delivered before its effects are observable
//! - An action that may already have run is never sent twice
//! - Responses for unknown requests are dropped, never treated as errors

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod client;
mod config;
mod error;
mod handle;
mod request_manager;
mod transport;

pub use client::{ClientStats, ConnectionState, SyncClient};
pub use config::ClientConfig;
pub use error::{ClientError, ClientResult};
pub use handle::{ResultHandle, CONNECTION_LOST_MESSAGE, MANAGER_CLOSED_MESSAGE};
pub use request_manager::{RequestManager, ResponseDisposition};
pub use transport::{MockTransport, Transport};
