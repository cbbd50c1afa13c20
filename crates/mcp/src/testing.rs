//! In-memory fake providers for tests.
//!
//! A fake provider runs as a tokio task on the far side of a
//! `tokio::io::duplex` pipe and answers each request through a handler
//! closure. The task resolves to the requests it saw once the client side
//! is dropped.

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::task::JoinHandle;

use crate::transport::{LineTransport, McpTransport};
use crate::types::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};

/// What the fake provider does with one request.
pub enum FakeReply {
    /// Reply with a success envelope carrying this result.
    Result(Value),
    /// Reply with an error envelope.
    Error(JsonRpcError),
    /// Write this exact line (a newline is appended).
    Raw(String),
    /// Close the output stream without replying.
    Close,
    /// Never reply; keep reading.
    Silent,
}

/// Start a fake provider and return the client side as a transport.
pub fn spawn_fake_provider<F>(mut handler: F) -> (Box<dyn McpTransport>, JoinHandle<Vec<JsonRpcRequest>>)
where
    F: FnMut(&JsonRpcRequest) -> FakeReply + Send + 'static,
{
    let (client, server) = tokio::io::duplex(256 * 1024);
    let (client_read, client_write) = tokio::io::split(client);
    let (server_read, mut server_write) = tokio::io::split(server);

    let handle = tokio::spawn(async move {
        let mut seen = Vec::new();
        let mut lines = BufReader::new(server_read).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            // Notifications carry no id and get no reply.
            let Ok(request) = serde_json::from_str::<JsonRpcRequest>(&line) else {
                continue;
            };
            let reply = handler(&request);
            let id = request.id.clone();
            seen.push(request);

            let out = match reply {
                FakeReply::Result(result) => JsonRpcResponse::success(id, result),
                FakeReply::Error(error) => JsonRpcResponse {
                    jsonrpc: "2.0".to_string(),
                    id: Some(id),
                    result: None,
                    error: Some(error),
                },
                FakeReply::Raw(raw) => {
                    if write_line(&mut server_write, &raw).await.is_err() {
                        break;
                    }
                    continue;
                }
                FakeReply::Close => break,
                FakeReply::Silent => continue,
            };
            let Ok(json) = serde_json::to_string(&out) else {
                break;
            };
            if write_line(&mut server_write, &json).await.is_err() {
                break;
            }
        }
        seen
    });

    let transport = LineTransport::new(BufReader::new(client_read), client_write);
    (Box::new(transport), handle)
}

async fn write_line<W: AsyncWrite + Unpin>(writer: &mut W, line: &str) -> std::io::Result<()> {
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await
}
