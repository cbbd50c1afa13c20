//! MCP transport layer.
//!
//! Defines the `McpTransport` trait for exchanging JSON-RPC envelopes with a
//! provider, and the `LineTransport` implementation that frames them as one
//! JSON document per line over a pair of byte streams.

use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::McpError;
use crate::types::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};

/// Trait for MCP message transport.
///
/// A transport is a strictly synchronous channel: `call` writes one request
/// and does not return until the matching reply line has been read, so at
/// most one request is ever in flight.
#[async_trait]
pub trait McpTransport: Send {
    /// Send a request and read exactly one response line.
    async fn call(&mut self, request: &JsonRpcRequest) -> Result<JsonRpcResponse, McpError>;

    /// Send a notification. No reply is read.
    async fn notify(&mut self, notification: &JsonRpcNotification) -> Result<(), McpError>;
}

/// Newline-delimited JSON transport over any buffered reader / writer pair.
///
/// For child processes the reader wraps the child's stdout and the writer is
/// its stdin. Reads block indefinitely unless a read timeout is set.
pub struct LineTransport<R, W> {
    reader: R,
    writer: W,
    read_timeout: Option<Duration>,
}

impl<R, W> LineTransport<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    /// Create a transport with no read timeout.
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader,
            writer,
            read_timeout: None,
        }
    }

    /// Bound how long `call` waits for a reply line. `None` blocks forever.
    pub fn with_read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.read_timeout = timeout;
        self
    }

    async fn write_line(&mut self, json: &str) -> Result<(), McpError> {
        let written = async {
            self.writer.write_all(json.as_bytes()).await?;
            self.writer.write_all(b"\n").await?;
            self.writer.flush().await
        }
        .await;
        match written {
            // The provider is gone; there will be no reply line either.
            Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => Err(McpError::NoResponse),
            other => Ok(other?),
        }
    }

    async fn read_line(&mut self) -> Result<String, McpError> {
        let mut line = String::new();
        let bytes_read = match self.read_timeout {
            Some(limit) => tokio::time::timeout(limit, self.reader.read_line(&mut line))
                .await
                .map_err(|_| McpError::Timeout(limit))??,
            None => self.reader.read_line(&mut line).await?,
        };
        if bytes_read == 0 {
            return Err(McpError::NoResponse);
        }
        Ok(line)
    }
}

#[async_trait]
impl<R, W> McpTransport for LineTransport<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn call(&mut self, request: &JsonRpcRequest) -> Result<JsonRpcResponse, McpError> {
        let json = serde_json::to_string(request)?;
        tracing::debug!(method = %request.method, id = %request.id, "Sending request");
        self.write_line(&json).await?;

        let line = self.read_line().await?;
        let trimmed = line.trim();
        tracing::debug!(id = %request.id, bytes = trimmed.len(), "Received response");

        let response: JsonRpcResponse = serde_json::from_str(trimmed)
            .map_err(|e| McpError::MalformedResponse(format!("{}: {}", e, truncate(trimmed, 200))))?;

        if response.result.is_none() && response.error.is_none() {
            return Err(McpError::MalformedResponse(
                "response has neither result nor error".to_string(),
            ));
        }
        if response.id.as_ref() != Some(&request.id) {
            tracing::warn!(
                expected = %request.id,
                received = ?response.id,
                "Response id does not match request id"
            );
        }
        Ok(response)
    }

    async fn notify(&mut self, notification: &JsonRpcNotification) -> Result<(), McpError> {
        let json = serde_json::to_string(notification)?;
        tracing::debug!(method = %notification.method, "Sending notification");
        self.write_line(&json).await
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RpcId;
    use serde_json::json;
    use tokio::io::{duplex, split, AsyncReadExt, BufReader};

    type DuplexLine = LineTransport<
        BufReader<tokio::io::ReadHalf<tokio::io::DuplexStream>>,
        tokio::io::WriteHalf<tokio::io::DuplexStream>,
    >;

    fn pair() -> (DuplexLine, tokio::io::DuplexStream) {
        let (client, server) = duplex(64 * 1024);
        let (read, write) = split(client);
        (LineTransport::new(BufReader::new(read), write), server)
    }

    fn list_request() -> JsonRpcRequest {
        JsonRpcRequest::new(RpcId::Number(1), "tools/list", Some(json!({})))
    }

    #[tokio::test]
    async fn test_request_is_one_flushed_line() {
        let (mut transport, server) = pair();
        let (mut server_read, mut server_write) = split(server);

        let server_task = tokio::spawn(async move {
            let mut reader = BufReader::new(&mut server_read);
            let mut line = String::new();
            reader.read_line(&mut line).await.unwrap();
            server_write
                .write_all(b"{\"id\":1,\"result\":{\"tools\":[]}}\n")
                .await
                .unwrap();
            line
        });

        let resp = transport.call(&list_request()).await.unwrap();
        assert_eq!(resp.result, Some(json!({"tools": []})));

        let sent = server_task.await.unwrap();
        assert!(sent.ends_with('\n'));
        assert_eq!(sent.matches('\n').count(), 1);
        let parsed: serde_json::Value = serde_json::from_str(sent.trim()).unwrap();
        assert_eq!(parsed["method"], "tools/list");
        assert_eq!(parsed["jsonrpc"], "2.0");
    }

    #[tokio::test]
    async fn test_closed_output_is_no_response() {
        let (mut transport, server) = pair();
        // Provider reads nothing and exits immediately.
        drop(server);
        let err = transport.call(&list_request()).await.unwrap_err();
        assert!(matches!(err, McpError::NoResponse), "got {:?}", err);
    }

    #[tokio::test]
    async fn test_close_after_request_is_no_response() {
        let (mut transport, server) = pair();
        let (mut server_read, server_write) = split(server);
        let server_task = tokio::spawn(async move {
            let mut buf = vec![0u8; 256];
            let _ = server_read.read(&mut buf).await;
            drop(server_write);
            drop(server_read);
        });

        let err = transport.call(&list_request()).await.unwrap_err();
        assert!(matches!(err, McpError::NoResponse), "got {:?}", err);
        server_task.await.unwrap();
    }

    #[tokio::test]
    async fn test_garbage_line_is_malformed() {
        let (mut transport, server) = pair();
        let (_server_read, mut server_write) = split(server);
        server_write.write_all(b"starting server...\n").await.unwrap();

        let err = transport.call(&list_request()).await.unwrap_err();
        assert!(matches!(err, McpError::MalformedResponse(_)), "got {:?}", err);
    }

    #[tokio::test]
    async fn test_error_envelope_is_returned_to_caller() {
        let (mut transport, server) = pair();
        let (_server_read, mut server_write) = split(server);
        server_write
            .write_all(b"{\"id\":1,\"error\":{\"code\":-32601,\"message\":\"no such method\"}}\n")
            .await
            .unwrap();

        let resp = transport.call(&list_request()).await.unwrap();
        let err = resp.into_result().unwrap_err();
        assert!(matches!(err, McpError::RemoteToolError(ref e) if e.message == "no such method"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_timeout() {
        let (transport, server) = pair();
        let mut transport = transport.with_read_timeout(Some(Duration::from_secs(2)));
        let err = transport.call(&list_request()).await.unwrap_err();
        assert!(matches!(err, McpError::Timeout(d) if d == Duration::from_secs(2)));
        drop(server);
    }
}
