//! Transport layer abstraction for outgoing requests.

use crate::error::{ClientError, ClientResult};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use syncline_protocol::{decode_request, encode_request, RequestMessage};

/// A transport carries request messages to the backend.
///
/// This trait abstracts the connection layer, allowing for different
/// implementations (WebSocket, in-process loopback, mock for testing, etc.).
/// Responses travel the other way and are fed to
/// [`SyncClient::on_response`](crate::SyncClient::on_response) by the
/// transport's owner.
///
/// `send` is called while the client holds its request lock. An
/// implementation must not call back into the same `SyncClient` from inside
/// `send` (for example to deliver a reply synchronously); that deadlocks.
/// Queue replies and deliver them after `send` returns.
pub trait Transport: Send + Sync {
    /// Sends a request message over the current connection.
    fn send(&self, message: &RequestMessage) -> ClientResult<()>;

    /// Checks if the transport is connected.
    fn is_connected(&self) -> bool;
}

/// A mock transport for testing.
///
/// Every sent message is encoded to its wire form and recorded.
#[derive(Debug)]
pub struct MockTransport {
    connected: AtomicBool,
    fail_sends: AtomicBool,
    frames: Mutex<Vec<Vec<u8>>>,
}

impl MockTransport {
    /// Creates a new connected mock transport.
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(true),
            fail_sends: AtomicBool::new(false),
            frames: Mutex::new(Vec::new()),
        }
    }

    /// Sets the connected state.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Makes subsequent sends fail with a retryable transport error.
    pub fn set_fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    /// Returns the encoded frames sent so far.
    pub fn sent_frames(&self) -> Vec<Vec<u8>> {
        self.frames.lock().clone()
    }

    /// Returns the messages sent so far, decoded from their frames.
    pub fn sent_messages(&self) -> ClientResult<Vec<RequestMessage>> {
        self.frames
            .lock()
            .iter()
            .map(|frame| decode_request(frame).map_err(ClientError::from))
            .collect()
    }

    /// Returns and clears the messages sent so far.
    pub fn take_sent(&self) -> ClientResult<Vec<RequestMessage>> {
        let frames = std::mem::take(&mut *self.frames.lock());
        frames
            .iter()
            .map(|frame| decode_request(frame).map_err(ClientError::from))
            .collect()
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for MockTransport {
    fn send(&self, message: &RequestMessage) -> ClientResult<()> {
        if !self.is_connected() {
            return Err(ClientError::NotConnected);
        }
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(ClientError::transport_retryable("mock send failure"));
        }
        let frame = encode_request(message)?;
        self.frames.lock().push(frame);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}
