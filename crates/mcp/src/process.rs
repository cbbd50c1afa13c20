//! Tool provider process lifecycle.
//!
//! `ProcessManager` owns one `ProviderProcess` per provider identifier. A
//! process is spawned lazily on first `acquire` and reused afterwards; all of
//! them are terminated together by `shutdown`.

use indexmap::IndexMap;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::ProviderConfig;
use crate::error::McpError;
use crate::transport::{LineTransport, McpTransport};
use crate::types::*;

/// How long `shutdown` waits for providers to exit before killing them.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// A running (or attached) tool provider.
pub struct ProviderProcess {
    id: String,
    child: Option<Child>,
    transport: Box<dyn McpTransport>,
    env: HashMap<String, String>,
    stderr_task: Option<JoinHandle<()>>,
    next_id: i64,
    // Set when a reply timed out; its late reply would answer the next request.
    poisoned: bool,
}

impl ProviderProcess {
    /// Provider identifier this process is bound to.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The merged environment the process was launched with.
    pub fn env(&self) -> &HashMap<String, String> {
        &self.env
    }

    /// OS process id, if this is a child process that is still running.
    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().and_then(Child::id)
    }

    /// Whether the output stream is out of step with requests. A poisoned
    /// process is replaced on the next `ProcessManager::acquire`.
    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// Send a request and unwrap the reply envelope.
    pub async fn request(&mut self, method: &str, params: Value) -> Result<Value, McpError> {
        let id = self.next_id;
        self.next_id += 1;
        let request = JsonRpcRequest::new(RpcId::Number(id), method, Some(params));
        match self.transport.call(&request).await {
            Ok(response) => response.into_result(),
            Err(e) => {
                if matches!(e, McpError::Timeout(_)) {
                    warn!(provider = %self.id, method = %method, "Provider timed out, marking for restart");
                    self.poisoned = true;
                }
                Err(e)
            }
        }
    }

    /// Stop a process that is being replaced.
    fn retire(self) {
        let ProviderProcess {
            id,
            child,
            transport,
            stderr_task,
            ..
        } = self;
        drop(transport);
        if let Some(mut child) = child {
            if let Err(e) = child.start_kill() {
                warn!(provider = %id, error = %e, "Failed to kill provider");
            }
        }
        if let Some(task) = stderr_task {
            task.abort();
        }
    }

    /// Issue `tools/list` and decode the advertised tools.
    pub async fn list_tools(&mut self) -> Result<Vec<ToolInfo>, McpError> {
        let result = self.request(methods::TOOLS_LIST, json!({})).await?;
        let listed: ListToolsResult = serde_json::from_value(result)
            .map_err(|e| McpError::MalformedResponse(format!("invalid tools/list result: {}", e)))?;
        debug!(provider = %self.id, count = listed.tools.len(), "Listed tools");
        Ok(listed.tools)
    }

    /// Issue `tools/call`. The raw result is returned so callers can render
    /// replies that do not follow the usual content shape.
    pub async fn call_tool(&mut self, name: &str, arguments: Value) -> Result<Value, McpError> {
        let params = serde_json::to_value(CallToolParams {
            name: name.to_string(),
            arguments,
        })?;
        info!(provider = %self.id, tool = %name, "Calling tool");
        self.request(methods::TOOLS_CALL, params).await
    }

    /// MCP initialize handshake followed by the initialized notification.
    async fn initialize(&mut self) -> Result<(), McpError> {
        let params = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": {
                "name": "conduit",
                "version": env!("CARGO_PKG_VERSION")
            }
        });
        self.request(methods::INITIALIZE, params).await?;
        self.transport
            .notify(&JsonRpcNotification::new(methods::INITIALIZED, None))
            .await?;
        debug!(provider = %self.id, "Provider initialized");
        Ok(())
    }
}

/// Owns the provider-process table.
pub struct ProcessManager {
    configs: IndexMap<String, ProviderConfig>,
    attached: Vec<String>,
    processes: HashMap<String, ProviderProcess>,
    read_timeout: Option<Duration>,
    shutdown_grace: Duration,
    handshake: bool,
}

impl ProcessManager {
    pub fn new(configs: IndexMap<String, ProviderConfig>) -> Self {
        Self {
            configs,
            attached: Vec::new(),
            processes: HashMap::new(),
            read_timeout: None,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
            handshake: false,
        }
    }

    /// Bound reads from spawned providers. `None` (the default) blocks forever.
    pub fn with_read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    /// Run the MCP initialize handshake right after spawning each provider.
    pub fn with_handshake(mut self, enabled: bool) -> Self {
        self.handshake = enabled;
        self
    }

    /// Provider identifiers in configuration order, then attached ones.
    pub fn provider_ids(&self) -> Vec<String> {
        self.configs
            .keys()
            .chain(self.attached.iter().filter(|id| !self.configs.contains_key(*id)))
            .cloned()
            .collect()
    }

    pub fn config(&self, id: &str) -> Option<&ProviderConfig> {
        self.configs.get(id)
    }

    pub fn is_running(&self, id: &str) -> bool {
        self.processes.contains_key(id)
    }

    /// Number of live provider processes.
    pub fn running(&self) -> usize {
        self.processes.len()
    }

    /// Register an already-connected provider (for example one served
    /// in-process). It is treated like a spawned provider from then on.
    pub fn attach(&mut self, id: impl Into<String>, transport: Box<dyn McpTransport>) {
        let id = id.into();
        if !self.attached.contains(&id) {
            self.attached.push(id.clone());
        }
        self.processes.insert(
            id.clone(),
            ProviderProcess {
                id,
                child: None,
                transport,
                env: HashMap::new(),
                stderr_task: None,
                next_id: 1,
                poisoned: false,
            },
        );
    }

    /// Return the provider's process, spawning it on first use.
    ///
    /// A failed launch is not retried here; the next `acquire` tries again.
    /// A poisoned process is killed and respawned.
    pub async fn acquire(&mut self, id: &str) -> Result<&mut ProviderProcess, McpError> {
        if self.processes.get(id).is_some_and(ProviderProcess::is_poisoned) {
            if let Some(stale) = self.processes.remove(id) {
                info!(provider = %id, "Replacing timed-out provider process");
                stale.retire();
            }
        }
        if !self.processes.contains_key(id) {
            let process = self.launch(id).await?;
            self.processes.insert(id.to_string(), process);
        }
        self.processes
            .get_mut(id)
            .ok_or_else(|| McpError::UnknownProvider(id.to_string()))
    }

    async fn launch(&self, id: &str) -> Result<ProviderProcess, McpError> {
        let config = self
            .configs
            .get(id)
            .ok_or_else(|| McpError::UnknownProvider(id.to_string()))?;

        let mut env: HashMap<String, String> = std::env::vars().collect();
        env.extend(config.env.iter().map(|(k, v)| (k.clone(), v.clone())));

        info!(provider = %id, command = %config.command, "Spawning provider process");

        let launch_error = |source: std::io::Error| McpError::ProviderLaunch {
            provider: id.to_string(),
            source,
        };

        let mut child = Command::new(&config.command)
            .args(&config.args)
            .env_clear()
            .envs(&env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(launch_error)?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| launch_error(std::io::Error::other("failed to capture provider stdin")))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| launch_error(std::io::Error::other("failed to capture provider stdout")))?;

        let stderr_task = child.stderr.take().map(|stderr| {
            let provider = id.to_string();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(provider = %provider, "stderr: {}", line);
                }
            })
        });

        let transport = LineTransport::new(BufReader::new(stdout), stdin)
            .with_read_timeout(self.read_timeout);

        let mut process = ProviderProcess {
            id: id.to_string(),
            child: Some(child),
            transport: Box::new(transport),
            env,
            stderr_task,
            next_id: 1,
            poisoned: false,
        };

        if self.handshake {
            process.initialize().await?;
        }
        Ok(process)
    }

    /// Terminate every provider: close stdin and signal all of them, wait up
    /// to the grace period, then kill whatever is still running. Failures are
    /// logged and never abort the shutdown of the remaining providers.
    pub async fn shutdown(&mut self) {
        let processes: Vec<ProviderProcess> = self.processes.drain().map(|(_, p)| p).collect();
        if processes.is_empty() {
            return;
        }
        info!(count = processes.len(), "Shutting down provider processes");

        let mut children: Vec<(String, Child, Option<JoinHandle<()>>)> = Vec::new();
        for process in processes {
            let ProviderProcess {
                id,
                child,
                transport,
                stderr_task,
                ..
            } = process;
            // Closing stdin is the first shutdown signal for stdio servers.
            drop(transport);
            match child {
                Some(child) => {
                    request_termination(&id, &child);
                    children.push((id, child, stderr_task));
                }
                None => debug!(provider = %id, "Detached in-process provider"),
            }
        }

        let deadline = tokio::time::Instant::now() + self.shutdown_grace;
        for (id, mut child, stderr_task) in children {
            match tokio::time::timeout_at(deadline, child.wait()).await {
                Ok(Ok(status)) => info!(provider = %id, %status, "Provider exited"),
                Ok(Err(e)) => warn!(provider = %id, error = %e, "Failed to wait for provider"),
                Err(_) => {
                    warn!(provider = %id, "Provider did not exit within grace period, killing");
                    if let Err(e) = child.kill().await {
                        warn!(provider = %id, error = %e, "Failed to kill provider");
                    }
                }
            }
            if let Some(task) = stderr_task {
                task.abort();
            }
        }
    }
}

/// Ask a child to exit. On unix this is SIGTERM; elsewhere there is no
/// graceful signal, so the process is left to notice its closed stdin.
fn request_termination(id: &str, child: &Child) {
    let Some(pid) = child.id() else {
        return;
    };
    #[cfg(unix)]
    {
        match std::process::Command::new("kill")
            .args(["-TERM", &pid.to_string()])
            .output()
        {
            Ok(_) => debug!(provider = %id, pid, "Sent SIGTERM"),
            Err(e) => warn!(provider = %id, pid, error = %e, "Failed to send SIGTERM"),
        }
    }
    #[cfg(not(unix))]
    {
        debug!(provider = %id, pid, "Waiting for provider to exit");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{spawn_fake_provider, FakeReply};

    #[tokio::test]
    async fn test_unknown_provider() {
        let mut manager = ProcessManager::new(IndexMap::new());
        let err = manager.acquire("missing").await.err().unwrap();
        assert!(matches!(err, McpError::UnknownProvider(ref id) if id == "missing"));
        assert!(err.is_launch_failure());
    }

    #[tokio::test]
    async fn test_launch_failure_is_not_cached() {
        let mut configs = IndexMap::new();
        configs.insert(
            "ghost".to_string(),
            ProviderConfig::new("/nonexistent/conduit-provider-binary", vec![]),
        );
        let mut manager = ProcessManager::new(configs);

        let err = manager.acquire("ghost").await.err().unwrap();
        assert!(matches!(err, McpError::ProviderLaunch { ref provider, .. } if provider == "ghost"));
        assert!(!manager.is_running("ghost"));

        // A second attempt tries again and fails the same way.
        assert!(manager.acquire("ghost").await.is_err());
        assert_eq!(manager.running(), 0);
    }

    #[tokio::test]
    async fn test_attached_provider_is_reused() {
        let (transport, handle) = spawn_fake_provider(|req| match req.method.as_str() {
            "tools/list" => FakeReply::Result(json!({"tools": [{"name": "echo"}]})),
            _ => FakeReply::Result(json!({"content": []})),
        });
        let mut manager = ProcessManager::new(IndexMap::new());
        manager.attach("fake", transport);
        assert_eq!(manager.provider_ids(), vec!["fake".to_string()]);

        let tools = manager.acquire("fake").await.unwrap().list_tools().await.unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "echo");

        manager
            .acquire("fake")
            .await
            .unwrap()
            .call_tool("echo", json!({"message": "hi"}))
            .await
            .unwrap();

        manager.shutdown().await;
        let requests = handle.await.unwrap();
        assert_eq!(requests.len(), 2);
        // Ids increase per provider, one request in flight at a time.
        assert_eq!(requests[0].id, RpcId::Number(1));
        assert_eq!(requests[1].id, RpcId::Number(2));
        assert_eq!(requests[1].method, "tools/call");
        assert_eq!(
            requests[1].params,
            Some(json!({"name": "echo", "arguments": {"message": "hi"}}))
        );
    }

    #[tokio::test]
    async fn test_invalid_list_result_is_malformed() {
        let (transport, _handle) =
            spawn_fake_provider(|_| FakeReply::Result(json!({"tools": "not-a-list"})));
        let mut manager = ProcessManager::new(IndexMap::new());
        manager.attach("fake", transport);
        let err = manager.acquire("fake").await.unwrap().list_tools().await.unwrap_err();
        assert!(matches!(err, McpError::MalformedResponse(_)));
    }

    #[test]
    fn test_provider_order_follows_config() {
        let mut configs = IndexMap::new();
        configs.insert("zeta".to_string(), ProviderConfig::new("z", vec![]));
        configs.insert("alpha".to_string(), ProviderConfig::new("a", vec![]));
        let manager = ProcessManager::new(configs);
        assert_eq!(manager.provider_ids(), vec!["zeta".to_string(), "alpha".to_string()]);
    }
}
