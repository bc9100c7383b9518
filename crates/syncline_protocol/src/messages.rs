//! Protocol messages for mutation and action calls.

use crate::error::{ProtocolError, ProtocolResult};
use crate::types::{RequestId, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Log lines emitted by a backend function while it ran.
pub type LogLines = Vec<String>;

/// The kind of call a request or response belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    /// Idempotent write, deduplicated by the backend on its request ID.
    Mutation,
    /// Side-effecting call with no idempotency guarantee.
    Action,
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestKind::Mutation => f.write_str("mutation"),
            RequestKind::Action => f.write_str("action"),
        }
    }
}

/// A call sent from the client to the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RequestMessage {
    /// Run a mutation.
    #[serde(rename_all = "camelCase")]
    Mutation {
        /// Request ID.
        request_id: RequestId,
        /// Path of the function to run.
        udf_path: String,
        /// Function arguments.
        args: Vec<Value>,
    },
    /// Run an action.
    #[serde(rename_all = "camelCase")]
    Action {
        /// Request ID.
        request_id: RequestId,
        /// Path of the function to run.
        udf_path: String,
        /// Function arguments.
        args: Vec<Value>,
    },
}

impl RequestMessage {
    /// Creates a mutation request.
    pub fn mutation(request_id: RequestId, udf_path: impl Into<String>, args: Vec<Value>) -> Self {
        RequestMessage::Mutation {
            request_id,
            udf_path: udf_path.into(),
            args,
        }
    }

    /// Creates an action request.
    pub fn action(request_id: RequestId, udf_path: impl Into<String>, args: Vec<Value>) -> Self {
        RequestMessage::Action {
            request_id,
            udf_path: udf_path.into(),
            args,
        }
    }

    /// Returns the request ID.
    pub fn request_id(&self) -> RequestId {
        match self {
            RequestMessage::Mutation { request_id, .. }
            | RequestMessage::Action { request_id, .. } => *request_id,
        }
    }

    /// Returns the path of the function being called.
    pub fn udf_path(&self) -> &str {
        match self {
            RequestMessage::Mutation { udf_path, .. } | RequestMessage::Action { udf_path, .. } => {
                udf_path
            }
        }
    }

    /// Returns the call arguments.
    pub fn args(&self) -> &[Value] {
        match self {
            RequestMessage::Mutation { args, .. } | RequestMessage::Action { args, .. } => args,
        }
    }

    /// Returns the kind of call.
    pub fn kind(&self) -> RequestKind {
        match self {
            RequestMessage::Mutation { .. } => RequestKind::Mutation,
            RequestMessage::Action { .. } => RequestKind::Action,
        }
    }
}

/// Whether a backend function succeeded, with its return value or error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "WireOutcome", into = "WireOutcome")]
pub enum FunctionOutcome {
    /// The function returned a value.
    Success(Value),
    /// The function failed with an error message.
    Failure(String),
}

impl FunctionOutcome {
    /// Returns true if the function succeeded.
    pub fn is_success(&self) -> bool {
        matches!(self, FunctionOutcome::Success(_))
    }
}

/// On the wire the outcome is a `success` flag next to either `result` or
/// `errorMessage`.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireOutcome {
    success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error_message: Option<String>,
}

impl TryFrom<WireOutcome> for FunctionOutcome {
    type Error = ProtocolError;

    fn try_from(wire: WireOutcome) -> Result<Self, Self::Error> {
        if wire.success {
            Ok(FunctionOutcome::Success(wire.result.unwrap_or(Value::Null)))
        } else {
            wire.error_message
                .map(FunctionOutcome::Failure)
                .ok_or_else(|| {
                    ProtocolError::InvalidOutcome("failed response without errorMessage".into())
                })
        }
    }
}

impl From<FunctionOutcome> for WireOutcome {
    fn from(outcome: FunctionOutcome) -> Self {
        match outcome {
            FunctionOutcome::Success(value) => WireOutcome {
                success: true,
                result: Some(value),
                error_message: None,
            },
            FunctionOutcome::Failure(message) => WireOutcome {
                success: false,
                result: None,
                error_message: Some(message),
            },
        }
    }
}

/// A reply from the backend to a [`RequestMessage`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ResponseMessage {
    /// Reply to a mutation, carrying the commit timestamp.
    #[serde(rename_all = "camelCase")]
    MutationResponse {
        /// Request ID of the mutation.
        request_id: RequestId,
        /// Result or error.
        #[serde(flatten)]
        outcome: FunctionOutcome,
        /// Timestamp the mutation committed at.
        ts: Timestamp,
        /// Function log output.
        #[serde(default)]
        log_lines: LogLines,
    },
    /// Reply to an action. Actions are not part of the commit log and carry
    /// no timestamp.
    #[serde(rename_all = "camelCase")]
    ActionResponse {
        /// Request ID of the action.
        request_id: RequestId,
        /// Result or error.
        #[serde(flatten)]
        outcome: FunctionOutcome,
        /// Function log output.
        #[serde(default)]
        log_lines: LogLines,
    },
}

impl ResponseMessage {
    /// Creates a mutation response.
    pub fn mutation(
        request_id: RequestId,
        outcome: FunctionOutcome,
        ts: Timestamp,
        log_lines: LogLines,
    ) -> Self {
        ResponseMessage::MutationResponse {
            request_id,
            outcome,
            ts,
            log_lines,
        }
    }

    /// Creates an action response.
    pub fn action(request_id: RequestId, outcome: FunctionOutcome, log_lines: LogLines) -> Self {
        ResponseMessage::ActionResponse {
            request_id,
            outcome,
            log_lines,
        }
    }

    /// Returns the request ID this response answers.
    pub fn request_id(&self) -> RequestId {
        match self {
            ResponseMessage::MutationResponse { request_id, .. }
            | ResponseMessage::ActionResponse { request_id, .. } => *request_id,
        }
    }

    /// Returns the kind of call this response answers.
    pub fn kind(&self) -> RequestKind {
        match self {
            ResponseMessage::MutationResponse { .. } => RequestKind::Mutation,
            ResponseMessage::ActionResponse { .. } => RequestKind::Action,
        }
    }

    /// Returns the commit timestamp, for mutation responses.
    pub fn ts(&self) -> Option<Timestamp> {
        match self {
            ResponseMessage::MutationResponse { ts, .. } => Some(*ts),
            ResponseMessage::ActionResponse { .. } => None,
        }
    }

    /// Returns the function outcome.
    pub fn outcome(&self) -> &FunctionOutcome {
        match self {
            ResponseMessage::MutationResponse { outcome, .. }
            | ResponseMessage::ActionResponse { outcome, .. } => outcome,
        }
    }

    /// Returns the function log output.
    pub fn log_lines(&self) -> &[String] {
        match self {
            ResponseMessage::MutationResponse { log_lines, .. }
            | ResponseMessage::ActionResponse { log_lines, .. } => log_lines,
        }
    }

    /// Converts the response into the result delivered to the caller.
    pub fn into_result(self) -> FunctionResult {
        match self {
            ResponseMessage::MutationResponse {
                outcome, log_lines, ..
            }
            | ResponseMessage::ActionResponse {
                outcome, log_lines, ..
            } => FunctionResult::from_outcome(outcome, log_lines),
        }
    }
}

/// The value a caller's pending request finally resolves to.
///
/// Every outcome, including connection loss, is represented as data.
#[derive(Debug, Clone, PartialEq)]
pub enum FunctionResult {
    /// The function returned a value.
    Success {
        /// Return value.
        value: Value,
        /// Function log output.
        log_lines: LogLines,
    },
    /// The function, or the connection carrying it, failed.
    Failure {
        /// Error message.
        error_message: String,
        /// Function log output.
        log_lines: LogLines,
    },
}

impl FunctionResult {
    /// Creates a successful result.
    pub fn success(value: Value, log_lines: LogLines) -> Self {
        FunctionResult::Success { value, log_lines }
    }

    /// Creates a failed result.
    pub fn failure(error_message: impl Into<String>, log_lines: LogLines) -> Self {
        FunctionResult::Failure {
            error_message: error_message.into(),
            log_lines,
        }
    }

    /// Builds a result from a response outcome.
    pub fn from_outcome(outcome: FunctionOutcome, log_lines: LogLines) -> Self {
        match outcome {
            FunctionOutcome::Success(value) => FunctionResult::success(value, log_lines),
            FunctionOutcome::Failure(message) => FunctionResult::failure(message, log_lines),
        }
    }

    /// Returns true if the call succeeded.
    pub fn is_success(&self) -> bool {
        matches!(self, FunctionResult::Success { .. })
    }

    /// Returns the return value of a successful call.
    pub fn value(&self) -> Option<&Value> {
        match self {
            FunctionResult::Success { value, .. } => Some(value),
            FunctionResult::Failure { .. } => None,
        }
    }

    /// Returns the error message of a failed call.
    pub fn error_message(&self) -> Option<&str> {
        match self {
            FunctionResult::Success { .. } => None,
            FunctionResult::Failure { error_message, .. } => Some(error_message),
        }
    }

    /// Returns the function log output.
    pub fn log_lines(&self) -> &[String] {
        match self {
            FunctionResult::Success { log_lines, .. }
            | FunctionResult::Failure { log_lines, .. } => log_lines,
        }
    }
}

/// Encodes a request to JSON bytes.
pub fn encode_request(message: &RequestMessage) -> ProtocolResult<Vec<u8>> {
    serde_json::to_vec(message).map_err(ProtocolError::Encode)
}

/// Decodes a request from JSON bytes.
pub fn decode_request(bytes: &[u8]) -> ProtocolResult<RequestMessage> {
    serde_json::from_slice(bytes).map_err(ProtocolError::Decode)
}

/// Encodes a response to JSON bytes.
pub fn encode_response(message: &ResponseMessage) -> ProtocolResult<Vec<u8>> {
    serde_json::to_vec(message).map_err(ProtocolError::Encode)
}

/// Decodes a response from JSON bytes.
pub fn decode_response(bytes: &[u8]) -> ProtocolResult<ResponseMessage> {
    serde_json::from_slice(bytes).map_err(ProtocolError::Decode)
}
