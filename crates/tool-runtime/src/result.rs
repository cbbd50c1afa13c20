//! Conversion of provider replies into tool-role conversation messages.
//!
//! Text items are flattened into the message content. Image items are
//! written to disk and staged as a [`PendingImage`]; the tool message only
//! carries a short acknowledgement and the image itself is shown to the
//! model on the next completion request.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use conduit_mcp::{CallToolResult, McpError, ToolContent};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{info, warn};

use crate::conversation::ConversationMessage;

/// Tool message content when an image was saved.
pub const SCREENSHOT_ACK: &str = "Screenshot captured successfully.";

/// Tool message content when a provider returned nothing at all.
pub const EMPTY_RESULT: &str = "No response from tool";

/// An image waiting to be shown to the model.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingImage {
    pub mime_type: String,
    /// Base64 of the bytes written to `path`.
    pub data: String,
    pub path: PathBuf,
}

impl PendingImage {
    /// `data:` URI suitable for an image content part.
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ImagePersistError {
    #[error("invalid base64 image data: {0}")]
    Decode(#[from] base64::DecodeError),
    #[error("failed to write {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Writes tool images under one directory with timestamped names.
#[derive(Debug, Clone)]
pub struct ImageStore {
    dir: PathBuf,
}

impl ImageStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Decode and persist one image.
    ///
    /// Accepts bare base64 or a `data:` URI, and ignores embedded whitespace.
    /// The file is named `screenshot_<timestamp>.<subtype>`; a numeric suffix
    /// is added if that name is taken.
    pub async fn save(&self, mime_type: &str, data: &str) -> Result<PendingImage, ImagePersistError> {
        let payload = match data.find("base64,") {
            Some(idx) => &data[idx + "base64,".len()..],
            None => data,
        };
        let cleaned: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
        let bytes = STANDARD.decode(cleaned.as_bytes())?;

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| ImagePersistError::Io {
                path: self.dir.clone(),
                source,
            })?;

        let stem = format!("screenshot_{}", chrono::Local::now().format("%Y%m%d_%H%M%S_%3f"));
        let extension = extension_for(mime_type);
        let mut attempt = 0u32;
        let (path, file) = loop {
            let name = match attempt {
                0 => format!("{}.{}", stem, extension),
                n => format!("{}_{}.{}", stem, n, extension),
            };
            let path = self.dir.join(name);
            match tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(file) => break (path, file),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => attempt += 1,
                Err(source) => return Err(ImagePersistError::Io { path, source }),
            }
        };

        write_or_discard(file, &path, &bytes).await?;

        info!(path = %path.display(), bytes = bytes.len(), "Saved tool image");
        Ok(PendingImage {
            mime_type: mime_type.to_string(),
            data: STANDARD.encode(&bytes),
            path,
        })
    }
}

/// Write the whole image, removing the file again if that fails.
async fn write_or_discard<W>(mut file: W, path: &Path, bytes: &[u8]) -> Result<(), ImagePersistError>
where
    W: AsyncWrite + Unpin,
{
    let written = async {
        file.write_all(bytes).await?;
        file.flush().await
    }
    .await;
    let Err(source) = written else {
        return Ok(());
    };
    drop(file);
    if let Err(e) = tokio::fs::remove_file(path).await {
        warn!(path = %path.display(), error = %e, "Failed to remove partial image");
    }
    Err(ImagePersistError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// File extension from the MIME subtype, restricted to filename-safe chars.
fn extension_for(mime_type: &str) -> String {
    let subtype = mime_type.rsplit('/').next().unwrap_or_default();
    let subtype = subtype.split(['+', ';']).next().unwrap_or_default();
    let cleaned: String = subtype
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-')
        .collect();
    if cleaned.is_empty() {
        "bin".to_string()
    } else {
        cleaned.to_ascii_lowercase()
    }
}

/// Why a tool call produced no provider result.
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error("no provider serves tool '{0}'")]
    UnknownTool(String),
    #[error(transparent)]
    Mcp(#[from] McpError),
}

/// Outcome of executing one tool call.
#[derive(Debug)]
pub enum ToolOutcome {
    /// The raw `result` of a `tools/call` reply.
    Completed(Value),
    Failed(ExecutionError),
}

/// A tool message plus anything the orchestrator must act on.
#[derive(Debug, Clone, PartialEq)]
pub struct AdaptedResult {
    pub message: ConversationMessage,
    pub is_error: bool,
    pub pending_image: Option<PendingImage>,
}

/// Turns tool outcomes into tool-role messages.
#[derive(Debug, Clone)]
pub struct ResultAdapter {
    images: ImageStore,
}

impl ResultAdapter {
    pub fn new(images: ImageStore) -> Self {
        Self { images }
    }

    pub fn images(&self) -> &ImageStore {
        &self.images
    }

    /// Adapt an outcome. Never fails: every error becomes message text.
    pub async fn adapt(&self, call_id: &str, outcome: ToolOutcome) -> AdaptedResult {
        match outcome {
            ToolOutcome::Completed(raw) => self.adapt_result(call_id, raw).await,
            ToolOutcome::Failed(ExecutionError::Mcp(McpError::RemoteToolError(err))) => {
                Self::reply(call_id, format!("Error: {}", err), true)
            }
            ToolOutcome::Failed(err) => {
                Self::reply(call_id, format!("Error executing tool: {}", err), true)
            }
        }
    }

    async fn adapt_result(&self, call_id: &str, raw: Value) -> AdaptedResult {
        if is_empty_result(&raw) {
            return Self::reply(call_id, EMPTY_RESULT.to_string(), false);
        }

        let parsed = serde_json::from_value::<CallToolResult>(raw.clone()).ok();
        let is_error = parsed.as_ref().is_some_and(|r| r.is_error);
        let content = parsed.and_then(|r| r.content).unwrap_or_default();

        let first_image = content.iter().find_map(|item| match item {
            ToolContent::Image { data, mime_type } => Some((mime_type, data)),
            _ => None,
        });
        if let Some((mime_type, data)) = first_image {
            return match self.images.save(mime_type, data).await {
                Ok(image) => AdaptedResult {
                    message: ConversationMessage::tool(call_id, SCREENSHOT_ACK),
                    is_error,
                    pending_image: Some(image),
                },
                Err(e) => {
                    warn!(error = %e, "Failed to save tool image");
                    Self::reply(call_id, format!("Error saving screenshot: {}", e), true)
                }
            };
        }

        let texts: Vec<&str> = content
            .iter()
            .filter_map(|item| match item {
                ToolContent::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect();
        if !texts.is_empty() {
            return Self::reply(call_id, texts.join(" "), is_error);
        }

        let rendered = match raw {
            Value::String(text) => text,
            other => other.to_string(),
        };
        Self::reply(call_id, rendered, is_error)
    }

    fn reply(call_id: &str, content: String, is_error: bool) -> AdaptedResult {
        AdaptedResult {
            message: ConversationMessage::tool(call_id, content),
            is_error,
            pending_image: None,
        }
    }
}

fn is_empty_result(raw: &Value) -> bool {
    match raw {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conduit_mcp::JsonRpcError;
    use serde_json::json;

    // 1x1 transparent PNG
    const PNG_B64: &str = "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNkYPhfDwAChwGA60e6kgAAAABJRU5ErkJggg==";

    fn adapter(dir: &Path) -> ResultAdapter {
        ResultAdapter::new(ImageStore::new(dir))
    }

    fn content_of(result: &AdaptedResult) -> &str {
        match &result.message {
            ConversationMessage::Tool { content, .. } => content,
            other => panic!("expected tool message, got {:?}", other),
        }
    }

    fn files_in(dir: &Path) -> Vec<PathBuf> {
        std::fs::read_dir(dir)
            .map(|entries| entries.map(|e| e.unwrap().path()).collect())
            .unwrap_or_default()
    }

    #[tokio::test]
    async fn test_single_text_item() {
        let dir = tempfile::tempdir().unwrap();
        let result = adapter(dir.path())
            .adapt(
                "call_1",
                ToolOutcome::Completed(json!({"content": [{"type": "text", "text": "5"}]})),
            )
            .await;
        assert_eq!(result.message, ConversationMessage::tool("call_1", "5"));
        assert!(!result.is_error);
        assert!(result.pending_image.is_none());
    }

    #[tokio::test]
    async fn test_text_items_are_space_joined() {
        let dir = tempfile::tempdir().unwrap();
        let result = adapter(dir.path())
            .adapt(
                "c",
                ToolOutcome::Completed(json!({
                    "content": [
                        {"type": "text", "text": "first"},
                        {"type": "resource", "uri": "file:///x"},
                        {"type": "text", "text": "second"}
                    ],
                    "isError": true
                })),
            )
            .await;
        assert_eq!(content_of(&result), "first second");
        assert!(result.is_error);
    }

    #[tokio::test]
    async fn test_unrecognized_result_is_rendered_raw() {
        let dir = tempfile::tempdir().unwrap();
        let raw = json!({"status": "ok", "count": 3});
        let result = adapter(dir.path())
            .adapt("c", ToolOutcome::Completed(raw.clone()))
            .await;
        assert_eq!(content_of(&result), raw.to_string());

        let unknown_only = json!({"content": [{"type": "audio", "data": "AAAA"}]});
        let result = adapter(dir.path())
            .adapt("c", ToolOutcome::Completed(unknown_only.clone()))
            .await;
        assert_eq!(content_of(&result), unknown_only.to_string());
    }

    #[tokio::test]
    async fn test_bare_string_result_is_unquoted() {
        let dir = tempfile::tempdir().unwrap();
        let result = adapter(dir.path())
            .adapt("c", ToolOutcome::Completed(json!("5")))
            .await;
        assert_eq!(content_of(&result), "5");

        let result = adapter(dir.path())
            .adapt("c", ToolOutcome::Completed(json!(42)))
            .await;
        assert_eq!(content_of(&result), "42");
    }

    struct FullDisk;

    impl AsyncWrite for FullDisk {
        fn poll_write(
            self: std::pin::Pin<&mut Self>,
            _: &mut std::task::Context<'_>,
            _: &[u8],
        ) -> std::task::Poll<std::io::Result<usize>> {
            std::task::Poll::Ready(Err(std::io::Error::other("no space left on device")))
        }

        fn poll_flush(
            self: std::pin::Pin<&mut Self>,
            _: &mut std::task::Context<'_>,
        ) -> std::task::Poll<std::io::Result<()>> {
            std::task::Poll::Ready(Ok(()))
        }

        fn poll_shutdown(
            self: std::pin::Pin<&mut Self>,
            _: &mut std::task::Context<'_>,
        ) -> std::task::Poll<std::io::Result<()>> {
            std::task::Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn test_failed_write_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("screenshot_partial.png");
        std::fs::write(&path, b"").unwrap();

        let err = write_or_discard(FullDisk, &path, b"png bytes").await.unwrap_err();
        assert!(matches!(err, ImagePersistError::Io { path: ref p, .. } if p == &path));
        assert!(!path.exists());
        assert!(files_in(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_empty_result() {
        let dir = tempfile::tempdir().unwrap();
        let result = adapter(dir.path())
            .adapt("c", ToolOutcome::Completed(json!({})))
            .await;
        assert_eq!(content_of(&result), EMPTY_RESULT);
    }

    #[tokio::test]
    async fn test_image_is_saved_and_staged() {
        let dir = tempfile::tempdir().unwrap();
        let images = dir.path().join("images");
        let result = adapter(&images)
            .adapt(
                "shot",
                ToolOutcome::Completed(json!({
                    "content": [
                        {"type": "text", "text": "here you go"},
                        {"type": "image", "data": PNG_B64, "mimeType": "image/png"}
                    ]
                })),
            )
            .await;

        assert_eq!(content_of(&result), SCREENSHOT_ACK);
        let image = result.pending_image.expect("image staged");
        assert_eq!(image.mime_type, "image/png");
        assert_eq!(image.data, PNG_B64);
        assert!(image.data_url().starts_with("data:image/png;base64,iVBOR"));

        let files = files_in(&images);
        assert_eq!(files, vec![image.path.clone()]);
        let name = image.path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("screenshot_"));
        assert!(name.ends_with(".png"));
        assert_eq!(std::fs::read(&image.path).unwrap(), STANDARD.decode(PNG_B64).unwrap());
    }

    #[tokio::test]
    async fn test_data_uri_and_whitespace_are_stripped() {
        let dir = tempfile::tempdir().unwrap();
        let wrapped = format!("data:image/jpeg;base64,{}\n{}", &PNG_B64[..20], &PNG_B64[20..]);
        let image = ImageStore::new(dir.path())
            .save("image/jpeg", &wrapped)
            .await
            .unwrap();
        assert_eq!(image.data, PNG_B64);
        assert_eq!(image.path.extension().unwrap(), "jpeg");
    }

    #[tokio::test]
    async fn test_same_timestamp_does_not_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let store = ImageStore::new(dir.path());
        let mut paths = Vec::new();
        for _ in 0..3 {
            paths.push(store.save("image/png", PNG_B64).await.unwrap().path);
        }
        paths.sort();
        paths.dedup();
        assert_eq!(paths.len(), 3);
        assert_eq!(files_in(dir.path()).len(), 3);
    }

    #[tokio::test]
    async fn test_bad_image_data_becomes_error_message() {
        let dir = tempfile::tempdir().unwrap();
        let result = adapter(dir.path())
            .adapt(
                "c",
                ToolOutcome::Completed(json!({
                    "content": [{"type": "image", "data": "%%% not base64 %%%", "mimeType": "image/png"}]
                })),
            )
            .await;
        assert!(content_of(&result).starts_with("Error saving screenshot:"));
        assert!(result.is_error);
        assert!(result.pending_image.is_none());
        assert!(files_in(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_failures_become_error_messages() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = adapter(dir.path());

        let remote = adapter
            .adapt(
                "c1",
                ToolOutcome::Failed(ExecutionError::Mcp(McpError::RemoteToolError(JsonRpcError {
                    code: -32000,
                    message: "page not found".to_string(),
                    data: None,
                }))),
            )
            .await;
        assert!(content_of(&remote).starts_with("Error: page not found"));
        assert!(remote.is_error);

        let transport = adapter
            .adapt("c2", ToolOutcome::Failed(McpError::NoResponse.into()))
            .await;
        assert!(content_of(&transport).starts_with("Error executing tool:"));

        let unknown = adapter
            .adapt("c3", ToolOutcome::Failed(ExecutionError::UnknownTool("ghost".into())))
            .await;
        assert_eq!(
            unknown.message,
            ConversationMessage::tool("c3", "Error executing tool: no provider serves tool 'ghost'")
        );
    }

    #[test]
    fn test_extension_for() {
        assert_eq!(extension_for("image/png"), "png");
        assert_eq!(extension_for("image/svg+xml"), "svg");
        assert_eq!(extension_for("image/../../etc"), "etc");
        assert_eq!(extension_for(""), "bin");
    }
}
