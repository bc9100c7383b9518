//! # Syncline Protocol
//!
//! Request/response types exchanged between a syncline client and the
//! backend.
//!
//! This crate provides:
//! - `Timestamp` and `RequestId` identifiers
//! - `RequestMessage` for mutation and action calls
//! - `ResponseMessage` for their replies
//! - `FunctionResult`, the value a caller finally observes
//! - JSON encoding/decoding of the wire messages
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod messages;
mod types;

pub use error::{ProtocolError, ProtocolResult};
pub use messages::{
    decode_request, decode_response, encode_request, encode_response, FunctionOutcome,
    FunctionResult, LogLines, RequestKind, RequestMessage, ResponseMessage,
};
pub use types::{RequestId, Timestamp};

/// Dynamic value used for function arguments and return values.
pub use serde_json::Value;
