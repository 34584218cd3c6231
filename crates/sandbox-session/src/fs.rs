//! Filesystem operations against the remote sandbox.

use bytes::Bytes;
use futures::{FutureExt, future::BoxFuture};
use sandbox_core::{ClientError, Encoding};
use sandbox_transport::protocol::{decode_binary, encode_binary};
use serde_json::{Value, json};
use tracing::debug;

use crate::Session;

/// Handler for a failed bulk operation.
///
/// Its return value becomes the operation's result, so a handler can
/// swallow the error (`Ok(..)`) or propagate it (`Err(..)`).
pub type ErrorHandler = Box<dyn FnOnce(ClientError) -> Result<Option<Value>, ClientError> + Send>;

/// Shape of the descriptors a bulk operation takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorShape {
    /// One path per entry.
    Paths,
    /// `[source, target]` per entry.
    Pairs,
}

impl DescriptorShape {
    /// Whether `descriptor` has this shape.
    #[must_use]
    pub fn matches(self, descriptor: &Value) -> bool {
        match self {
            Self::Paths => descriptor.is_string(),
            Self::Pairs => descriptor
                .as_array()
                .is_some_and(|pair| pair.len() == 2 && pair.iter().all(Value::is_string)),
        }
    }
}

/// Bulk filesystem operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulkOp {
    Mkdir,
    Rm,
    Cp,
    Ln,
}

impl BulkOp {
    /// Every bulk operation.
    pub const ALL: [Self; 4] = [Self::Mkdir, Self::Rm, Self::Cp, Self::Ln];

    /// Message name on the wire.
    #[must_use]
    pub const fn wire_name(self) -> &'static str {
        match self {
            Self::Mkdir => "mkdir",
            Self::Rm => "rm",
            Self::Cp => "cp",
            Self::Ln => "ln",
        }
    }

    /// Descriptor shape the operation takes.
    #[must_use]
    pub const fn shape(self) -> DescriptorShape {
        match self {
            Self::Mkdir | Self::Rm => DescriptorShape::Paths,
            Self::Cp | Self::Ln => DescriptorShape::Pairs,
        }
    }
}

/// Default handler: drop the error and resolve with nothing.
#[must_use]
pub fn ignore_errors() -> ErrorHandler {
    Box::new(|error: ClientError| -> Result<Option<Value>, ClientError> {
        debug!(%error, "bulk operation error ignored");
        Ok(None)
    })
}

/// Handler that hands the error back to the caller.
#[must_use]
pub fn propagate_errors() -> ErrorHandler {
    Box::new(Err::<Option<Value>, ClientError>)
}

impl Session {
    /// Read a file as UTF-8 text.
    ///
    /// Invalid sequences are replaced with U+FFFD.
    pub fn read_file(
        &self,
        path: &str,
    ) -> BoxFuture<'static, Result<String, ClientError>> {
        self.read_file_with(path, Encoding::Utf8)
    }

    /// Read a file as text in `encoding`.
    pub fn read_file_with(
        &self,
        path: &str,
        encoding: Encoding,
    ) -> BoxFuture<'static, Result<String, ClientError>> {
        let read = self.read_file_bytes(path);
        async move { Ok::<_, ClientError>(encoding.decode(&read.await?)) }.boxed()
    }

    /// Read a file's raw bytes, without any decoding.
    pub fn read_file_bytes(
        &self,
        path: &str,
    ) -> BoxFuture<'static, Result<Bytes, ClientError>> {
        let call = self.call("readFile", vec![json!(path)]);
        let path = path.to_string();
        async move {
            let payload = call.await?;
            let data = decode_binary(&payload).map_err(|e| ClientError::Decode(e.to_string()))?;
            debug!(%path, bytes = data.len(), "readFile");
            Ok::<_, ClientError>(data)
        }
        .boxed()
    }

    /// Write text to a file, converted to bytes with `encoding`.
    pub fn write_file(
        &self,
        path: &str,
        data: &str,
        encoding: Encoding,
    ) -> BoxFuture<'static, Result<(), ClientError>> {
        self.write_file_bytes(path, &encoding.encode(data))
    }

    /// Write raw bytes to a file.
    pub fn write_file_bytes(
        &self,
        path: &str,
        data: &[u8],
    ) -> BoxFuture<'static, Result<(), ClientError>> {
        let call = self.call("writeFile", vec![json!(path), encode_binary(data)]);
        async move { call.await.map(|_| ()) }.boxed()
    }

    /// Create directories.
    ///
    /// Errors go to `on_error`; without one they are ignored and the result
    /// is `Ok(None)`.
    pub fn mkdir<P: AsRef<str>>(
        &self,
        paths: &[P],
        options: Value,
        on_error: Option<ErrorHandler>,
    ) -> BoxFuture<'static, Result<Option<Value>, ClientError>> {
        self.bulk(BulkOp::Mkdir, path_descriptors(paths), options, on_error)
    }

    /// Remove files or directories.
    ///
    /// Errors go to `on_error`; without one they are ignored and the result
    /// is `Ok(None)`.
    pub fn rm<P: AsRef<str>>(
        &self,
        paths: &[P],
        options: Value,
        on_error: Option<ErrorHandler>,
    ) -> BoxFuture<'static, Result<Option<Value>, ClientError>> {
        self.bulk(BulkOp::Rm, path_descriptors(paths), options, on_error)
    }

    /// Copy `(source, target)` pairs.
    ///
    /// Errors go to `on_error`; without one they are ignored and the result
    /// is `Ok(None)`.
    pub fn cp<S: AsRef<str>, T: AsRef<str>>(
        &self,
        pairs: &[(S, T)],
        options: Value,
        on_error: Option<ErrorHandler>,
    ) -> BoxFuture<'static, Result<Option<Value>, ClientError>> {
        self.bulk(BulkOp::Cp, pair_descriptors(pairs), options, on_error)
    }

    /// Link `(source, target)` pairs.
    ///
    /// Errors go to `on_error`; without one they are ignored and the result
    /// is `Ok(None)`.
    pub fn ln<S: AsRef<str>, T: AsRef<str>>(
        &self,
        pairs: &[(S, T)],
        options: Value,
        on_error: Option<ErrorHandler>,
    ) -> BoxFuture<'static, Result<Option<Value>, ClientError>> {
        self.bulk(BulkOp::Ln, pair_descriptors(pairs), options, on_error)
    }

    fn bulk(
        &self,
        op: BulkOp,
        descriptors: Vec<Value>,
        options: Value,
        on_error: Option<ErrorHandler>,
    ) -> BoxFuture<'static, Result<Option<Value>, ClientError>> {
        debug_assert!(descriptors.iter().all(|d| op.shape().matches(d)));
        let handler = on_error.unwrap_or_else(ignore_errors);
        let call = self.call(op.wire_name(), vec![Value::Array(descriptors), options]);
        async move {
            let result = match call.await {
                Ok(Value::Null) => Ok(None),
                Ok(payload) => Ok(Some(payload)),
                Err(e) => handler(e),
            };
            debug!(op = op.wire_name(), ok = result.is_ok(), "bulk operation settled");
            result
        }
        .boxed()
    }
}

fn path_descriptors<P: AsRef<str>>(paths: &[P]) -> Vec<Value> {
    paths.iter().map(|p| json!(p.as_ref())).collect()
}

fn pair_descriptors<S: AsRef<str>, T: AsRef<str>>(pairs: &[(S, T)]) -> Vec<Value> {
    pairs
        .iter()
        .map(|(source, target)| json!([source.as_ref(), target.as_ref()]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SessionConfig;
    use sandbox_transport::{ChannelTransport, Packet, RemoteEnd};
    use tokio_test::{assert_err, assert_ok};

    fn session() -> (Session, RemoteEnd) {
        let (transport, remote) = ChannelTransport::new();
        (Session::new(transport, SessionConfig::default()), remote)
    }

    async fn next(remote: &mut RemoteEnd) -> (Packet, u64) {
        let packet = remote.recv().await.unwrap();
        let id = packet.ack.unwrap();
        (packet, id)
    }

    #[tokio::test]
    async fn test_read_bytes_are_exact() {
        let (session, mut remote) = session();
        let raw = vec![0x00, 0xff, 0xfe, b'a', 0x80];

        let read = session.read_file_bytes("/data.bin");
        let (packet, id) = next(&mut remote).await;
        assert_eq!(packet.name, "readFile");
        assert_eq!(packet.args, vec![json!("/data.bin")]);
        remote.ack_ok(id, encode_binary(&raw));

        assert_eq!(assert_ok!(read.await), raw);
    }

    #[tokio::test]
    async fn test_read_defaults_to_utf8() {
        let (session, mut remote) = session();

        let read = session.read_file("/hello.txt");
        let (_, id) = next(&mut remote).await;
        remote.ack_ok(id, encode_binary("grüße".as_bytes()));

        assert_eq!(assert_ok!(read.await), "grüße");
    }

    #[tokio::test]
    async fn test_read_with_encoding() {
        let (session, mut remote) = session();

        let read = session.read_file_with("/latin1.txt", Encoding::Latin1);
        let (_, id) = next(&mut remote).await;
        remote.ack_ok(id, json!([0x63, 0x61, 0x66, 0xe9]));

        assert_eq!(assert_ok!(read.await), "café");
    }

    #[tokio::test]
    async fn test_read_error_surfaces_unmodified() {
        let (session, mut remote) = session();

        let read = session.read_file("/missing");
        let (_, id) = next(&mut remote).await;
        remote.ack_err(id, json!({ "message": "ENOENT", "code": "ENOENT", "errno": -2 }));

        let err = assert_err!(read.await);
        let remote_err = err.as_remote().unwrap();
        assert_eq!(remote_err.message, "ENOENT");
        assert_eq!(remote_err.field("errno"), Some(&json!(-2)));
    }

    #[tokio::test]
    async fn test_read_invalid_payload() {
        let (session, mut remote) = session();

        let read = session.read_file_bytes("/weird");
        let (_, id) = next(&mut remote).await;
        remote.ack_ok(id, json!(true));

        assert!(matches!(read.await, Err(ClientError::Decode(_))));
    }

    #[tokio::test]
    async fn test_write_sends_encoded_bytes() {
        let (session, mut remote) = session();

        for (text, encoding) in [
            ("plain ascii", Encoding::Utf8),
            ("ünïcödé ✓", Encoding::Utf8),
            ("wide ✓", Encoding::Utf16Le),
            ("aGVsbG8=", Encoding::Base64),
            ("cafe", Encoding::Hex),
        ] {
            let write = session.write_file("/out.txt", text, encoding);
            let (packet, id) = next(&mut remote).await;
            assert_eq!(packet.name, "writeFile");
            assert_eq!(packet.arg(0), &json!("/out.txt"));

            let sent = decode_binary(packet.arg(1)).unwrap();
            assert_eq!(sent, encoding.encode(text));
            assert_eq!(encoding.decode(&sent), text);

            remote.ack_ok(id, Value::Null);
            assert_ok!(write.await);
        }
    }

    #[tokio::test]
    async fn test_rm_without_handler_swallows_error() {
        let (session, mut remote) = session();

        let rm = session.rm(&["/locked"], json!({}), None);
        let (packet, id) = next(&mut remote).await;
        assert_eq!(packet.name, "rm");
        assert_eq!(packet.args, vec![json!(["/locked"]), json!({})]);
        remote.ack_err(id, json!({ "message": "EPERM", "code": "EPERM" }));

        assert_eq!(assert_ok!(rm.await), None);
    }

    #[tokio::test]
    async fn test_handler_receives_error() {
        let (session, mut remote) = session();

        let mkdir = session.mkdir(
            &["/a/b"],
            json!({ "parents": true }),
            Some(Box::new(|e: ClientError| -> Result<Option<Value>, ClientError> {
                assert_eq!(e.as_remote().and_then(|r| r.code()), Some("EEXIST"));
                Ok(Some(json!("handled")))
            })),
        );
        let (_, id) = next(&mut remote).await;
        remote.ack_err(id, json!({ "message": "exists", "code": "EEXIST" }));

        assert_eq!(assert_ok!(mkdir.await), Some(json!("handled")));
    }

    #[tokio::test]
    async fn test_propagating_handler() {
        let (session, mut remote) = session();

        let ln = session.ln(&[("/src", "/dst")], json!({}), Some(propagate_errors()));
        let (_, id) = next(&mut remote).await;
        remote.ack_err(id, json!("link failed"));

        let err = assert_err!(ln.await);
        assert_eq!(err.to_string(), "link failed");
    }

    #[tokio::test]
    async fn test_cp_sends_pairs_and_returns_payload() {
        let (session, mut remote) = session();

        let cp = session.cp(&[("/a", "/b"), ("/c", "/d")], json!({ "recursive": true }), None);
        let (packet, id) = next(&mut remote).await;
        assert_eq!(packet.name, "cp");
        assert_eq!(
            packet.args,
            vec![json!([["/a", "/b"], ["/c", "/d"]]), json!({ "recursive": true })]
        );
        remote.ack_ok(id, json!({ "copied": 2 }));

        assert_eq!(assert_ok!(cp.await), Some(json!({ "copied": 2 })));
    }

    #[tokio::test]
    async fn test_success_without_payload_is_none() {
        let (session, mut remote) = session();

        let mkdir = session.mkdir(&["/new"], json!({}), None);
        let (_, id) = next(&mut remote).await;
        remote.ack_ok(id, Value::Null);

        assert_eq!(assert_ok!(mkdir.await), None);
    }

    #[test]
    fn test_bulk_table() {
        let names: Vec<_> = BulkOp::ALL.iter().map(|op| op.wire_name()).collect();
        assert_eq!(names, ["mkdir", "rm", "cp", "ln"]);
        assert_eq!(BulkOp::Rm.shape(), DescriptorShape::Paths);
        assert_eq!(BulkOp::Ln.shape(), DescriptorShape::Pairs);
        assert!(DescriptorShape::Paths.matches(&json!("/a")));
        assert!(DescriptorShape::Pairs.matches(&json!(["/a", "/b"])));
        assert!(!DescriptorShape::Pairs.matches(&json!("/a")));
    }
}
