//! Client session tying the request manager to a transport.

use crate::config::ClientConfig;
use crate::error::ClientResult;
use crate::handle::ResultHandle;
use crate::request_manager::{RequestManager, ResponseDisposition};
use crate::transport::Transport;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use syncline_protocol::{RequestId, RequestMessage, ResponseMessage, Timestamp, Value};
use tracing::{debug, info, warn};

/// Connection state as reported by the transport's owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No usable connection; new requests are queued.
    Disconnected,
    /// Requests are sent as soon as they are issued.
    Connected,
}

impl ConnectionState {
    /// Returns true if requests can be sent right away.
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

/// Statistics about client requests.
#[derive(Debug, Clone, Default)]
pub struct ClientStats {
    /// Total number of requests issued.
    pub requests_issued: u64,
    /// Total number of responses matched to an outstanding request.
    pub responses_received: u64,
    /// Total number of responses dropped for unknown requests.
    pub stale_responses: u64,
    /// Total number of mutations delivered after observation.
    pub mutations_observed: u64,
    /// Total number of messages sent again after reconnects.
    pub resends: u64,
    /// Total number of actions failed by connection loss.
    pub actions_lost: u64,
    /// Total number of reconnects handled.
    pub reconnects: u64,
    /// Last transport error message.
    pub last_error: Option<String>,
}

/// A client session issuing mutations and actions over a transport.
///
/// The session allocates request IDs, sends messages while connected, and
/// drives its [`RequestManager`] from transport and view events:
///
/// - [`on_response`](Self::on_response) for every reply from the backend
/// - [`on_transition`](Self::on_transition) whenever the local view advances
/// - [`on_disconnect`](Self::on_disconnect) / [`on_reconnect`](Self::on_reconnect)
///   around connection loss
///
/// The manager sits behind a mutex so the session can be shared across
/// threads.
pub struct SyncClient<T: Transport> {
    config: ClientConfig,
    transport: Arc<T>,
    requests: Mutex<RequestManager>,
    next_request_id: Mutex<RequestId>,
    observed_ts: Mutex<Option<Timestamp>>,
    state: RwLock<ConnectionState>,
    stats: RwLock<ClientStats>,
}

impl<T: Transport> SyncClient<T> {
    /// Creates a new client session.
    pub fn new(config: ClientConfig, transport: T) -> ClientResult<Self> {
        Self::with_shared_transport(config, Arc::new(transport))
    }

    /// Creates a new client session over a transport shared with its owner.
    pub fn with_shared_transport(config: ClientConfig, transport: Arc<T>) -> ClientResult<Self> {
        config.validate()?;
        let state = if transport.is_connected() {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        };
        Ok(Self {
            config,
            transport,
            requests: Mutex::new(RequestManager::new()),
            next_request_id: Mutex::new(RequestId::new(0)),
            observed_ts: Mutex::new(None),
            state: RwLock::new(state),
            stats: RwLock::new(ClientStats::default()),
        })
    }

    /// Gets the configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Gets the transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Gets the current connection state.
    pub fn connection_state(&self) -> ConnectionState {
        *self.state.read()
    }

    /// Gets the current stats.
    pub fn stats(&self) -> ClientStats {
        self.stats.read().clone()
    }

    /// Gets the latest timestamp the local view has reached.
    pub fn observed_ts(&self) -> Option<Timestamp> {
        *self.observed_ts.lock()
    }

    /// Issues a mutation.
    pub fn mutation(&self, udf_path: impl Into<String>, args: Vec<Value>) -> ResultHandle {
        let request_id = self.allocate_request_id();
        self.issue(RequestMessage::mutation(request_id, udf_path, args))
    }

    /// Issues an action.
    pub fn action(&self, udf_path: impl Into<String>, args: Vec<Value>) -> ResultHandle {
        let request_id = self.allocate_request_id();
        self.issue(RequestMessage::action(request_id, udf_path, args))
    }

    /// Handles a reply from the backend.
    pub fn on_response(&self, response: ResponseMessage) -> ResponseDisposition {
        let request_id = response.request_id();
        let log_lines = if self.config.forward_log_lines {
            response.log_lines().to_vec()
        } else {
            Vec::new()
        };

        let disposition = self.requests.lock().on_response(response);

        // Replies to replayed requests repeat output already forwarded.
        if disposition != ResponseDisposition::Ignored {
            for line in &log_lines {
                info!(%request_id, "[{}] {}", self.config.log_prefix, line);
            }
        }

        let mut stats = self.stats.write();
        match disposition {
            ResponseDisposition::Ignored => stats.stale_responses += 1,
            ResponseDisposition::Resolved | ResponseDisposition::Captured => {
                stats.responses_received += 1
            }
        }
        disposition
    }

    /// Records that the local view has advanced to `ts` and delivers the
    /// mutations it now reflects. Returns how many were delivered.
    ///
    /// A timestamp older than one already observed is ignored.
    pub fn on_transition(&self, ts: Timestamp) -> usize {
        let mut observed = self.observed_ts.lock();
        if let Some(previous) = *observed {
            if ts < previous {
                warn!(%ts, %previous, "ignoring transition to an older timestamp");
                return 0;
            }
        }
        *observed = Some(ts);

        let delivered = self.requests.lock().remove_completed(ts);
        self.stats.write().mutations_observed += delivered as u64;
        delivered
    }

    /// Records that the connection dropped. Requests issued from now on are
    /// queued until [`on_reconnect`](Self::on_reconnect).
    pub fn on_disconnect(&self) {
        *self.state.write() = ConnectionState::Disconnected;
        self.lifecycle("connection lost", None);
    }

    /// Recovers outstanding requests on a fresh connection.
    ///
    /// Mutations and never-sent actions are sent again in request ID order.
    /// Actions that were in flight resolve with a connection-lost failure.
    /// Returns the number of messages sent.
    ///
    /// Stops at the first send failure and returns it; the client is then
    /// disconnected again. Actions from the failed send onward are marked
    /// unsent, so the next reconnect sends them rather than failing them.
    pub fn on_reconnect(&self) -> ClientResult<usize> {
        *self.state.write() = ConnectionState::Connected;

        let mut requests = self.requests.lock();
        let before = requests.outstanding_count();
        let resend = requests.restart();
        let lost = before - requests.outstanding_count();

        {
            let mut stats = self.stats.write();
            stats.reconnects += 1;
            stats.actions_lost += lost as u64;
        }

        for (sent, message) in resend.iter().enumerate() {
            if let Err(e) = self.transport.send(message) {
                warn!(request_id = %message.request_id(), error = %e, "resend failed");
                for unsent in &resend[sent..] {
                    requests.mark_unsent(unsent.request_id());
                }
                *self.state.write() = ConnectionState::Disconnected;
                let mut stats = self.stats.write();
                stats.resends += sent as u64;
                stats.last_error = Some(e.to_string());
                return Err(e);
            }
        }

        self.stats.write().resends += resend.len() as u64;
        self.lifecycle("reconnected", None);
        debug!(resent = resend.len(), lost, "requests recovered");
        Ok(resend.len())
    }

    /// Returns true if some request is still waiting for a response.
    ///
    /// Useful to decide whether the connection is idle.
    pub fn has_incomplete_requests(&self) -> bool {
        self.requests.lock().has_incomplete_requests()
    }

    /// Returns the number of outstanding requests.
    pub fn outstanding_count(&self) -> usize {
        self.requests.lock().outstanding_count()
    }

    /// Ends the session, resolving every outstanding request with a closed
    /// failure.
    pub fn close(self) {
        self.lifecycle("closing session", None);
        self.requests.into_inner().close();
    }

    fn allocate_request_id(&self) -> RequestId {
        let mut next = self.next_request_id.lock();
        let request_id = *next;
        *next = request_id.next();
        request_id
    }

    /// Registers a message, sending it first when connected.
    fn issue(&self, message: RequestMessage) -> ResultHandle {
        let request_id = message.request_id();
        // Lock held across the send: a response must not be processed before
        // its request is registered.
        let mut requests = self.requests.lock();
        let sent = self.try_send(&message);
        let handle = requests.request(message, sent);
        drop(requests);

        self.stats.write().requests_issued += 1;
        let event = if sent { "request sent" } else { "request queued" };
        self.lifecycle(event, Some(request_id));
        handle
    }

    fn try_send(&self, message: &RequestMessage) -> bool {
        if !self.connection_state().is_connected() {
            return false;
        }
        match self.transport.send(message) {
            Ok(()) => true,
            Err(e) => {
                warn!(request_id = %message.request_id(), error = %e, "send failed, queueing request");
                self.stats.write().last_error = Some(e.to_string());
                false
            }
        }
    }

    fn lifecycle(&self, event: &str, request_id: Option<RequestId>) {
        let request_id = request_id.map(|id| id.to_string()).unwrap_or_default();
        if self.config.verbose {
            info!(request_id = %request_id, "{event}");
        } else {
            debug!(request_id = %request_id, "{event}");
        }
    }
}
