//! Tracking of outstanding mutation and action requests.

use crate::handle::{self, Resolver, ResultHandle, CONNECTION_LOST_MESSAGE, MANAGER_CLOSED_MESSAGE};
use std::collections::BTreeMap;
use syncline_protocol::{
    FunctionOutcome, FunctionResult, LogLines, RequestId, RequestKind, RequestMessage,
    ResponseMessage, Timestamp,
};
use tracing::{debug, warn};

/// What [`RequestManager::on_response`] did with a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseDisposition {
    /// An action result was delivered to its handle.
    Resolved,
    /// A mutation response was recorded; delivery waits for observation.
    Captured,
    /// No matching outstanding request; the response was dropped.
    Ignored,
}

/// A mutation response held until the local view reaches its timestamp.
#[derive(Debug)]
struct CapturedResponse {
    outcome: FunctionOutcome,
    ts: Timestamp,
    log_lines: LogLines,
}

/// Per-request state.
///
/// An action has no captured-response state: its response resolves and
/// removes it in the same step.
#[derive(Debug)]
enum OutstandingRequest {
    Mutation {
        message: RequestMessage,
        resolver: Resolver,
        response: Option<CapturedResponse>,
    },
    Action {
        message: RequestMessage,
        resolver: Resolver,
        sent: bool,
    },
}

impl OutstandingRequest {
    fn has_response(&self) -> bool {
        match self {
            OutstandingRequest::Mutation { response, .. } => response.is_some(),
            OutstandingRequest::Action { .. } => false,
        }
    }

    fn kind(&self) -> RequestKind {
        match self {
            OutstandingRequest::Mutation { .. } => RequestKind::Mutation,
            OutstandingRequest::Action { .. } => RequestKind::Action,
        }
    }

    fn into_resolver(self) -> Resolver {
        match self {
            OutstandingRequest::Mutation { resolver, .. }
            | OutstandingRequest::Action { resolver, .. } => resolver,
        }
    }
}

/// Tracks outstanding mutations and actions across reconnects.
///
/// The manager owns one entry per live request ID and decides when each
/// caller's [`ResultHandle`] may resolve:
///
/// - Actions resolve as soon as their response arrives.
/// - Mutations resolve only once a response has arrived **and**
///   [`remove_completed`](Self::remove_completed) reports that the local view
///   has reached the mutation's commit timestamp, so a caller never sees a
///   mutation's return value before its effects.
///
/// After a reconnect, [`restart`](Self::restart) reports what must be sent
/// again and fails actions that may already have run.
///
/// # Concurrency
///
/// All operations are synchronous and take `&mut self`. The manager does no
/// locking of its own; callers serialize access.
#[derive(Debug, Default)]
pub struct RequestManager {
    requests: BTreeMap<RequestId, OutstandingRequest>,
}

impl RequestManager {
    /// Creates an empty request manager.
    pub fn new() -> Self {
        Self {
            requests: BTreeMap::new(),
        }
    }

    /// Registers a request and returns the handle its result is delivered to.
    ///
    /// `sent` states whether the message has already been transmitted on the
    /// current connection. It only matters for actions.
    ///
    /// The request ID must not belong to another outstanding request. If it
    /// does, the earlier request is displaced and its handle resolves to a
    /// closed failure.
    pub fn request(&mut self, message: RequestMessage, sent: bool) -> ResultHandle {
        let request_id = message.request_id();
        let (resolver, handle) = handle::channel(request_id);

        let entry = match message.kind() {
            RequestKind::Mutation => OutstandingRequest::Mutation {
                message,
                resolver,
                response: None,
            },
            RequestKind::Action => OutstandingRequest::Action {
                message,
                resolver,
                sent,
            },
        };

        debug!(%request_id, kind = %entry.kind(), sent, "registered request");
        if let Some(previous) = self.requests.insert(request_id, entry) {
            warn!(%request_id, "request ID reused while still outstanding");
            previous
                .into_resolver()
                .resolve(FunctionResult::failure(MANAGER_CLOSED_MESSAGE, Vec::new()));
        }
        handle
    }

    /// Handles a response from the backend.
    ///
    /// Action responses resolve immediately. Mutation responses are captured,
    /// replacing any earlier capture for the same ID, and wait for
    /// [`remove_completed`](Self::remove_completed).
    ///
    /// Responses for unknown IDs are expected after a reconnect replays a
    /// request that has since completed; they are dropped.
    pub fn on_response(&mut self, response: ResponseMessage) -> ResponseDisposition {
        let request_id = response.request_id();

        let expected_kind = match self.requests.get(&request_id) {
            Some(entry) => entry.kind(),
            None => {
                debug!(%request_id, "dropping response for unknown request");
                return ResponseDisposition::Ignored;
            }
        };
        if expected_kind != response.kind() {
            warn!(
                %request_id,
                expected = %expected_kind,
                received = %response.kind(),
                "dropping response of mismatched kind"
            );
            return ResponseDisposition::Ignored;
        }

        match response {
            ResponseMessage::ActionResponse {
                outcome, log_lines, ..
            } => {
                if let Some(entry) = self.requests.remove(&request_id) {
                    entry
                        .into_resolver()
                        .resolve(FunctionResult::from_outcome(outcome, log_lines));
                }
                debug!(%request_id, "action resolved");
                ResponseDisposition::Resolved
            }
            ResponseMessage::MutationResponse {
                outcome,
                ts,
                log_lines,
                ..
            } => {
                if let Some(OutstandingRequest::Mutation { response, .. }) =
                    self.requests.get_mut(&request_id)
                {
                    *response = Some(CapturedResponse {
                        outcome,
                        ts,
                        log_lines,
                    });
                }
                debug!(%request_id, %ts, "mutation response captured");
                ResponseDisposition::Captured
            }
        }
    }

    /// Resolves every mutation whose captured response committed at or before
    /// `ts`. Returns how many requests were resolved.
    ///
    /// `ts` is the timestamp the local view has advanced to. Callers must pass
    /// non-decreasing values across calls; this is not checked.
    pub fn remove_completed(&mut self, ts: Timestamp) -> usize {
        let completed: Vec<RequestId> = self
            .requests
            .iter()
            .filter(|(_, entry)| match entry {
                OutstandingRequest::Mutation {
                    response: Some(captured),
                    ..
                } => captured.ts <= ts,
                _ => false,
            })
            .map(|(id, _)| *id)
            .collect();

        for request_id in &completed {
            if let Some(OutstandingRequest::Mutation {
                resolver,
                response: Some(captured),
                ..
            }) = self.requests.remove(request_id)
            {
                resolver.resolve(FunctionResult::from_outcome(
                    captured.outcome,
                    captured.log_lines,
                ));
            }
        }

        if !completed.is_empty() {
            debug!(%ts, resolved = completed.len(), "mutations observed");
        }
        completed.len()
    }

    /// Prepares for a fresh connection.
    ///
    /// Returns the messages to send again, in ascending request ID order:
    ///
    /// - every outstanding mutation, captured response or not, since the
    ///   backend deduplicates them by request ID;
    /// - every action that was never sent, which is now marked sent.
    ///
    /// Actions that were sent but never answered may already have run, so
    /// they are resolved with a [`CONNECTION_LOST_MESSAGE`] failure instead of
    /// being retried.
    pub fn restart(&mut self) -> Vec<RequestMessage> {
        let mut resend = Vec::new();
        let mut lost = Vec::new();

        for (request_id, entry) in self.requests.iter_mut() {
            match entry {
                OutstandingRequest::Mutation { message, .. } => {
                    resend.push(message.clone());
                }
                OutstandingRequest::Action {
                    message,
                    sent: sent @ false,
                    ..
                } => {
                    *sent = true;
                    resend.push(message.clone());
                }
                OutstandingRequest::Action { sent: true, .. } => {
                    lost.push(*request_id);
                }
            }
        }

        for request_id in &lost {
            if let Some(entry) = self.requests.remove(request_id) {
                warn!(%request_id, "action lost in flight");
                entry
                    .into_resolver()
                    .resolve(FunctionResult::failure(CONNECTION_LOST_MESSAGE, Vec::new()));
            }
        }

        debug!(resend = resend.len(), failed = lost.len(), "restarted requests");
        resend
    }

    /// Marks an outstanding action as not yet sent, so the next
    /// [`restart`](Self::restart) sends it again instead of failing it.
    ///
    /// For use when a send reported by `restart` did not reach the transport.
    /// Mutations and unknown IDs are left untouched.
    pub fn mark_unsent(&mut self, request_id: RequestId) {
        if let Some(OutstandingRequest::Action { sent, .. }) = self.requests.get_mut(&request_id) {
            *sent = false;
            debug!(%request_id, "action marked unsent");
        }
    }

    /// Returns true if some request is still waiting for a response.
    ///
    /// Mutations that have a response but await observation do not count.
    pub fn has_incomplete_requests(&self) -> bool {
        self.requests.values().any(|entry| !entry.has_response())
    }

    /// Returns the number of outstanding requests.
    pub fn outstanding_count(&self) -> usize {
        self.requests.len()
    }

    /// Returns true if the request is still outstanding.
    pub fn contains(&self, request_id: RequestId) -> bool {
        self.requests.contains_key(&request_id)
    }

    /// Resolves every outstanding request with a closed failure.
    pub fn close(self) {
        for (request_id, entry) in self.requests {
            debug!(%request_id, "closing outstanding request");
            entry
                .into_resolver()
                .resolve(FunctionResult::failure(MANAGER_CLOSED_MESSAGE, Vec::new()));
        }
    }
}
