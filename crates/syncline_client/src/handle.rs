//! Single-resolution result handles.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use syncline_protocol::{FunctionResult, RequestId};
use tokio::sync::oneshot;
use tokio::sync::oneshot::error::TryRecvError;

/// Error message delivered to an action that was in flight when the
/// connection dropped.
pub const CONNECTION_LOST_MESSAGE: &str = "Connection lost while action was in flight";

/// Error message delivered when the owning manager goes away before a
/// request completed.
pub const MANAGER_CLOSED_MESSAGE: &str = "Request manager closed before the request completed";

/// Creates a linked resolver and handle for one request.
pub(crate) fn channel(request_id: RequestId) -> (Resolver, ResultHandle) {
    let (sender, receiver) = oneshot::channel();
    (
        Resolver { request_id, sender },
        ResultHandle {
            request_id,
            receiver,
            result: None,
        },
    )
}

/// The resolving half of a [`ResultHandle`], owned by the request manager.
#[derive(Debug)]
pub(crate) struct Resolver {
    request_id: RequestId,
    sender: oneshot::Sender<FunctionResult>,
}

impl Resolver {
    /// Delivers the result to the handle.
    pub(crate) fn resolve(self, result: FunctionResult) {
        if self.sender.send(result).is_err() {
            tracing::debug!(request_id = %self.request_id, "result handle dropped before resolution");
        }
    }
}

/// A pending call result.
///
/// Awaiting the handle yields the [`FunctionResult`] once the request
/// manager resolves it. The handle never fails: if the manager is dropped
/// first, it resolves to a failure carrying [`MANAGER_CLOSED_MESSAGE`].
#[derive(Debug)]
#[must_use = "a result handle does nothing unless awaited or polled"]
pub struct ResultHandle {
    request_id: RequestId,
    receiver: oneshot::Receiver<FunctionResult>,
    result: Option<FunctionResult>,
}

impl ResultHandle {
    /// Returns the request ID this handle belongs to.
    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// Returns the result if it is already available, without waiting.
    ///
    /// Once resolved, every call returns the same result and awaiting the
    /// handle still yields it.
    pub fn try_result(&mut self) -> Option<FunctionResult> {
        if self.result.is_none() {
            self.result = match self.receiver.try_recv() {
                Ok(result) => Some(result),
                Err(TryRecvError::Empty) => None,
                Err(TryRecvError::Closed) => Some(closed_result()),
            };
        }
        self.result.clone()
    }
}

impl Future for ResultHandle {
    type Output = FunctionResult;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        // The receiver is drained once `try_result` has seen the value.
        if let Some(result) = this.result.take() {
            return Poll::Ready(result);
        }
        Pin::new(&mut this.receiver)
            .poll(cx)
            .map(|result| result.unwrap_or_else(|_| closed_result()))
    }
}

fn closed_result() -> FunctionResult {
    FunctionResult::failure(MANAGER_CLOSED_MESSAGE, Vec::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use syncline_protocol::Value;

    #[test]
    fn try_result_before_and_after_resolution() {
        let (resolver, mut handle) = channel(RequestId::new(1));
        assert_eq!(handle.request_id(), RequestId::new(1));
        assert!(handle.try_result().is_none());

        resolver.resolve(FunctionResult::success(Value::Null, vec![]));
        assert_eq!(
            handle.try_result(),
            Some(FunctionResult::success(Value::Null, vec![]))
        );
        assert_eq!(
            handle.try_result(),
            Some(FunctionResult::success(Value::Null, vec![]))
        );
    }

    #[tokio::test]
    async fn await_after_try_result() {
        let (resolver, mut handle) = channel(RequestId::new(5));
        resolver.resolve(FunctionResult::success(Value::from(7), vec![]));

        assert!(handle.try_result().is_some());
        assert_eq!(
            handle.await,
            FunctionResult::success(Value::from(7), vec![])
        );
    }

    #[tokio::test]
    async fn await_after_closed_try_result() {
        let (resolver, mut handle) = channel(RequestId::new(6));
        drop(resolver);

        assert!(handle.try_result().is_some());
        assert_eq!(handle.await.error_message(), Some(MANAGER_CLOSED_MESSAGE));
    }

    #[test]
    fn dropped_resolver_yields_closed_failure() {
        let (resolver, mut handle) = channel(RequestId::new(2));
        drop(resolver);
        let result = handle.try_result().unwrap();
        assert_eq!(result.error_message(), Some(MANAGER_CLOSED_MESSAGE));
    }

    #[test]
    fn resolving_after_handle_dropped_is_harmless() {
        let (resolver, handle) = channel(RequestId::new(3));
        drop(handle);
        resolver.resolve(FunctionResult::failure("late", vec![]));
    }

    #[tokio::test]
    async fn await_resolved_handle() {
        let (resolver, handle) = channel(RequestId::new(4));
        resolver.resolve(FunctionResult::failure("boom", vec!["trace".into()]));
        let result = handle.await;
        assert_eq!(result.error_message(), Some("boom"));
        assert_eq!(result.log_lines(), &["trace".to_string()]);
    }
}
