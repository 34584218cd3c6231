//! Request/acknowledgement correlation over a transport.

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use futures::{FutureExt, future::BoxFuture};
use sandbox_core::{AckId, ClientError, RemoteError, Transport};
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::debug;

type CallResult = Result<Value, ClientError>;
type PendingTable = Mutex<Pending>;

#[derive(Default)]
struct Pending {
    slots: HashMap<AckId, oneshot::Sender<CallResult>>,
    closed: bool,
}

/// Remote call primitive.
///
/// Each call emits one message tagged with a fresh ack id and parks a
/// sender in the pending table; the matching acknowledgement settles it.
/// Acks may arrive in any order. Once abandoned, the table refuses new calls.
pub struct RemoteCalls {
    transport: Arc<dyn Transport>,
    pending: Arc<PendingTable>,
    next_id: AtomicU64,
    timeout: Option<Duration>,
}

impl RemoteCalls {
    /// Create a call table over `transport`.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, timeout: Option<Duration>) -> Self {
        Self {
            transport,
            pending: Arc::new(Mutex::new(Pending::default())),
            next_id: AtomicU64::new(1),
            timeout,
        }
    }

    /// Emit `name` with `args` and wait for its acknowledgement.
    ///
    /// The message is enqueued before this returns; the future only waits.
    /// It resolves with the ack payload, or fails with the translated remote
    /// error when the ack's error slot is non-null.
    pub fn call(&self, name: &str, args: Vec<Value>) -> BoxFuture<'static, CallResult> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = lock(&self.pending);
            if pending.closed {
                debug!(event = %name, "call after close");
                return futures::future::ready(Err(ClientError::Closed)).boxed();
            }
            pending.slots.insert(id, tx);
        }

        debug!(event = %name, id, "remote call");
        if let Err(e) = self.transport.emit(name, args, Some(id)) {
            lock(&self.pending).slots.remove(&id);
            return futures::future::ready(Err(ClientError::from(e))).boxed();
        }

        let pending = Arc::clone(&self.pending);
        let timeout = self.timeout;
        async move {
            let settled = match timeout {
                None => rx.await,
                Some(limit) => match tokio::time::timeout(limit, rx).await {
                    Ok(settled) => settled,
                    Err(_) => {
                        lock(&pending).slots.remove(&id);
                        return Err(ClientError::Timeout(limit));
                    }
                },
            };
            // Sender dropped without settling: the session went away.
            settled.unwrap_or(Err(ClientError::Closed))
        }
        .boxed()
    }

    /// Settle the call waiting on `id` with the ack arguments.
    ///
    /// Returns `false` for unknown or already settled ids.
    pub fn settle(&self, id: AckId, args: Vec<Value>) -> bool {
        let Some(tx) = lock(&self.pending).slots.remove(&id) else {
            debug!(id, "ack for unknown call");
            return false;
        };

        let mut args = args.into_iter();
        let error = args.next().unwrap_or(Value::Null);
        let result = if error.is_null() {
            Ok(args.next().unwrap_or(Value::Null))
        } else {
            Err(ClientError::Remote(RemoteError::from_value(error)))
        };

        // The caller may have stopped waiting.
        let _ = tx.send(result);
        true
    }

    /// Fail every pending call with [`ClientError::Closed`] and refuse new
    /// ones.
    ///
    /// Returns the number of calls abandoned.
    pub fn abandon_all(&self) -> usize {
        let drained: Vec<_> = {
            let mut pending = lock(&self.pending);
            pending.closed = true;
            pending.slots.drain().collect()
        };
        let count = drained.len();
        for (_, tx) in drained {
            let _ = tx.send(Err(ClientError::Closed));
        }
        count
    }

    /// Number of calls still waiting for an acknowledgement.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        lock(&self.pending).slots.len()
    }
}

fn lock(pending: &PendingTable) -> MutexGuard<'_, Pending> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sandbox_core::TransportError;
    use sandbox_transport::ChannelTransport;
    use serde_json::json;
    use tokio_test::{assert_err, assert_ok};

    fn calls() -> (RemoteCalls, sandbox_transport::RemoteEnd) {
        let (transport, remote) = ChannelTransport::new();
        (RemoteCalls::new(Arc::new(transport), None), remote)
    }

    #[tokio::test]
    async fn test_resolves_with_payload() {
        let (calls, mut remote) = calls();

        let fut = calls.call("readFile", vec![json!("/a")]);
        let packet = remote.recv().await.unwrap();
        assert_eq!(packet.name, "readFile");
        assert_eq!(packet.args, vec![json!("/a")]);

        assert!(calls.settle(packet.ack.unwrap(), vec![Value::Null, json!({ "n": 1 })]));
        assert_eq!(assert_ok!(fut.await), json!({ "n": 1 }));
        assert_eq!(calls.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_payload_resolves_null() {
        let (calls, mut remote) = calls();

        let fut = calls.call("writeFile", vec![]);
        let id = remote.recv().await.unwrap().ack.unwrap();
        calls.settle(id, vec![]);

        assert_eq!(assert_ok!(fut.await), Value::Null);
    }

    #[tokio::test]
    async fn test_rejects_with_translated_error() {
        let (calls, mut remote) = calls();

        let fut = calls.call("readFile", vec![json!("/nope")]);
        let id = remote.recv().await.unwrap().ack.unwrap();
        calls.settle(
            id,
            vec![json!({ "message": "no such file", "code": "ENOENT", "path": "/nope" })],
        );

        let err = assert_err!(fut.await);
        let remote_err = err.as_remote().unwrap();
        assert_eq!(remote_err.message, "no such file");
        assert_eq!(remote_err.code(), Some("ENOENT"));
        assert_eq!(remote_err.field("path"), Some(&json!("/nope")));
    }

    #[tokio::test]
    async fn test_out_of_order_acks() {
        let (calls, mut remote) = calls();

        let a = calls.call("readFile", vec![json!("/a")]);
        let b = calls.call("readFile", vec![json!("/b")]);
        let id_a = remote.recv().await.unwrap().ack.unwrap();
        let id_b = remote.recv().await.unwrap().ack.unwrap();
        assert_ne!(id_a, id_b);

        calls.settle(id_b, vec![Value::Null, json!("B")]);
        calls.settle(id_a, vec![Value::Null, json!("A")]);

        assert_eq!(assert_ok!(a.await), json!("A"));
        assert_eq!(assert_ok!(b.await), json!("B"));
    }

    #[tokio::test]
    async fn test_settles_exactly_once() {
        let (calls, mut remote) = calls();

        let fut = calls.call("rm", vec![]);
        let id = remote.recv().await.unwrap().ack.unwrap();

        assert!(calls.settle(id, vec![Value::Null, json!(1)]));
        assert!(!calls.settle(id, vec![json!("late error")]));
        assert_eq!(assert_ok!(fut.await), json!(1));
    }

    #[tokio::test]
    async fn test_emit_failure() {
        let (calls, remote) = calls();
        drop(remote);

        let err = assert_err!(calls.call("mkdir", vec![]).await);
        assert!(matches!(err, ClientError::Transport(TransportError::Closed)));
        assert_eq!(calls.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_abandon_all() {
        let (calls, _remote) = calls();

        let fut = calls.call("cp", vec![]);
        assert_eq!(calls.abandon_all(), 1);
        assert!(matches!(fut.await, Err(ClientError::Closed)));
    }

    #[tokio::test]
    async fn test_calls_after_abandon_fail_fast() {
        let (calls, mut remote) = calls();
        calls.abandon_all();

        let err = assert_err!(calls.call("readFile", vec![json!("/a")]).await);
        assert!(matches!(err, ClientError::Closed));
        assert_eq!(calls.pending_count(), 0);
        assert!(remote.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_timeout_removes_pending() {
        let (transport, _remote) = ChannelTransport::new();
        let calls = RemoteCalls::new(Arc::new(transport), Some(Duration::from_millis(10)));

        let err = assert_err!(calls.call("readFile", vec![json!("/slow")]).await);
        assert!(matches!(err, ClientError::Timeout(d) if d == Duration::from_millis(10)));
        assert_eq!(calls.pending_count(), 0);
    }
}
