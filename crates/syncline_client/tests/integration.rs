//! Integration tests for the sync client against an in-memory backend.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use syncline_client::{
    ClientConfig, ClientResult, ConnectionState, SyncClient, Transport, CONNECTION_LOST_MESSAGE,
};
use syncline_protocol::{
    FunctionOutcome, RequestId, RequestMessage, ResponseMessage, Timestamp, Value,
};

/// A backend that commits mutations at increasing timestamps and
/// deduplicates them by request ID. Replies are queued until delivered.
#[derive(Default)]
struct InMemoryBackend {
    state: Mutex<BackendState>,
}

#[derive(Default)]
struct BackendState {
    connected: bool,
    next_ts: u64,
    committed: HashMap<RequestId, Timestamp>,
    action_runs: HashMap<String, u32>,
    replies: Vec<ResponseMessage>,
}

impl InMemoryBackend {
    fn new() -> Self {
        let backend = Self::default();
        backend.state.lock().connected = true;
        backend
    }

    fn set_connected(&self, connected: bool) {
        let mut state = self.state.lock();
        state.connected = connected;
        if !connected {
            // Replies in flight are lost with the connection.
            state.replies.clear();
        }
    }

    fn take_replies(&self) -> Vec<ResponseMessage> {
        std::mem::take(&mut self.state.lock().replies)
    }

    fn commit_count(&self) -> usize {
        self.state.lock().committed.len()
    }

    fn action_runs(&self, udf_path: &str) -> u32 {
        self.state.lock().action_runs.get(udf_path).copied().unwrap_or(0)
    }

    fn latest_ts(&self) -> Timestamp {
        Timestamp::new(self.state.lock().next_ts)
    }
}

impl Transport for InMemoryBackend {
    fn send(&self, message: &RequestMessage) -> ClientResult<()> {
        let mut state = self.state.lock();
        if !state.connected {
            return Err(syncline_client::ClientError::NotConnected);
        }
        let reply = match message {
            RequestMessage::Mutation { request_id, .. } => {
                let ts = match state.committed.get(request_id) {
                    Some(ts) => *ts,
                    None => {
                        state.next_ts += 1;
                        let ts = Timestamp::new(state.next_ts);
                        state.committed.insert(*request_id, ts);
                        ts
                    }
                };
                ResponseMessage::mutation(
                    *request_id,
                    FunctionOutcome::Success(Value::Null),
                    ts,
                    vec![],
                )
            }
            RequestMessage::Action {
                request_id,
                udf_path,
                ..
            } => {
                *state.action_runs.entry(udf_path.clone()).or_default() += 1;
                ResponseMessage::action(
                    *request_id,
                    FunctionOutcome::Success(Value::from(udf_path.as_str())),
                    vec![format!("ran {udf_path}")],
                )
            }
        };
        state.replies.push(reply);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.state.lock().connected
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn setup() -> (Arc<InMemoryBackend>, SyncClient<InMemoryBackend>) {
    init_tracing();
    let backend = Arc::new(InMemoryBackend::new());
    let client =
        SyncClient::with_shared_transport(ClientConfig::default(), Arc::clone(&backend)).unwrap();
    (backend, client)
}

fn deliver(backend: &InMemoryBackend, client: &SyncClient<InMemoryBackend>) {
    for reply in backend.take_replies() {
        client.on_response(reply);
    }
}

#[tokio::test]
async fn mutation_round_trip() {
    let (backend, client) = setup();

    let mut handle = client.mutation("messages:send", vec![Value::from("hello")]);
    deliver(&backend, &client);
    assert!(!client.has_incomplete_requests());
    assert!(handle.try_result().is_none());

    client.on_transition(backend.latest_ts());
    assert!(handle.await.is_success());
    assert_eq!(backend.commit_count(), 1);
}

#[tokio::test]
async fn mutation_committed_once_across_reconnect() {
    let (backend, client) = setup();

    let handle = client.mutation("counter:increment", vec![]);
    // The reply is lost with the connection.
    backend.set_connected(false);
    client.on_disconnect();
    assert!(client.has_incomplete_requests());

    backend.set_connected(true);
    assert_eq!(client.on_reconnect().unwrap(), 1);
    deliver(&backend, &client);

    client.on_transition(backend.latest_ts());
    assert!(handle.await.is_success());
    assert_eq!(backend.commit_count(), 1);
    assert_eq!(client.stats().resends, 1);
}

#[tokio::test]
async fn in_flight_action_never_runs_twice() {
    let (backend, client) = setup();

    let handle = client.action("payments:charge", vec![Value::from(100)]);
    backend.set_connected(false);
    client.on_disconnect();

    backend.set_connected(true);
    assert_eq!(client.on_reconnect().unwrap(), 0);

    let result = handle.await;
    assert_eq!(result.error_message(), Some(CONNECTION_LOST_MESSAGE));
    assert_eq!(backend.action_runs("payments:charge"), 1);
}

#[tokio::test]
async fn action_queued_while_offline_runs_after_reconnect() {
    let (backend, client) = setup();

    backend.set_connected(false);
    client.on_disconnect();
    let handle = client.action("email:send", vec![]);
    assert_eq!(backend.action_runs("email:send"), 0);

    backend.set_connected(true);
    assert_eq!(client.on_reconnect().unwrap(), 1);
    assert_eq!(client.connection_state(), ConnectionState::Connected);
    deliver(&backend, &client);

    let result = handle.await;
    assert_eq!(result.value(), Some(&Value::from("email:send")));
    assert_eq!(result.log_lines(), &["ran email:send".to_string()]);
    assert_eq!(backend.action_runs("email:send"), 1);
}

#[test]
fn duplicate_reply_after_observation_is_dropped() {
    let (backend, client) = setup();

    let mut handle = client.mutation("m", vec![]);
    deliver(&backend, &client);

    // Reconnect replays the mutation; the view then passes it before the
    // replayed reply arrives.
    client.on_disconnect();
    client.on_reconnect().unwrap();
    client.on_transition(backend.latest_ts());
    assert!(handle.try_result().is_some());

    deliver(&backend, &client);
    assert_eq!(client.stats().stale_responses, 1);
    assert_eq!(client.outstanding_count(), 0);
    assert_eq!(backend.commit_count(), 1);
}
