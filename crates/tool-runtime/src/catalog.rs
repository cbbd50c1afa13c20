use conduit_mcp::ProcessManager;
use std::collections::HashMap;
use tracing::{info, warn};

use crate::schema::to_function_tool;
use crate::tool::{FunctionTool, ToolDefinition};

/// The tools available for a session, keyed by name.
///
/// Built once by discovery and cached by the orchestrator. Definitions and
/// their function-calling entries are kept in lock-step: a tool whose schema
/// cannot be normalized is absent from both.
#[derive(Debug, Clone, Default)]
pub struct ToolCatalog {
    definitions: Vec<ToolDefinition>,
    functions: Vec<FunctionTool>,
    owners: HashMap<String, String>,
}

impl ToolCatalog {
    /// Query every configured provider with `tools/list`.
    ///
    /// Providers that fail to launch or answer are skipped with a warning.
    pub async fn discover(processes: &mut ProcessManager) -> Self {
        let mut definitions = Vec::new();
        for provider in processes.provider_ids() {
            let listed = match processes.acquire(&provider).await {
                Ok(process) => process.list_tools().await,
                Err(e) => Err(e),
            };
            match listed {
                Ok(tools) => {
                    info!(provider = %provider, count = tools.len(), "Discovered tools");
                    definitions.extend(
                        tools
                            .into_iter()
                            .map(|info| ToolDefinition::from_info(info, &provider)),
                    );
                }
                Err(e) => warn!(provider = %provider, error = %e, "Tool discovery failed, skipping provider"),
            }
        }
        Self::from_definitions(definitions)
    }

    /// Build a catalog from definitions in discovery order.
    ///
    /// The first definition of a name wins; later duplicates are dropped.
    pub fn from_definitions(definitions: impl IntoIterator<Item = ToolDefinition>) -> Self {
        let mut catalog = Self::default();
        for def in definitions {
            if let Some(owner) = catalog.owners.get(&def.name) {
                warn!(
                    tool = %def.name,
                    kept = %owner,
                    dropped = %def.provider,
                    "Tool name already provided, dropping duplicate"
                );
                continue;
            }
            match to_function_tool(&def) {
                Ok(function) => {
                    catalog.owners.insert(def.name.clone(), def.provider.clone());
                    catalog.functions.push(function);
                    catalog.definitions.push(def);
                }
                Err(e) => {
                    warn!(tool = %def.name, provider = %def.provider, error = %e, "Could not convert tool schema, skipping");
                }
            }
        }
        catalog
    }

    /// Provider that serves the named tool.
    pub fn provider_for(&self, tool_name: &str) -> Option<&str> {
        self.owners.get(tool_name).map(String::as_str)
    }

    pub fn get(&self, tool_name: &str) -> Option<&ToolDefinition> {
        self.definitions.iter().find(|d| d.name == tool_name)
    }

    pub fn definitions(&self) -> &[ToolDefinition] {
        &self.definitions
    }

    /// Normalized entries to attach to completion requests.
    pub fn functions(&self) -> &[FunctionTool] {
        &self.functions
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conduit_mcp::testing::{spawn_fake_provider, FakeReply};
    use conduit_mcp::ProviderConfig;
    use indexmap::IndexMap;
    use serde_json::{json, Value};

    fn def(name: &str, provider: &str, schema: Value) -> ToolDefinition {
        ToolDefinition {
            name: name.to_string(),
            description: String::new(),
            input_schema: schema,
            provider: provider.to_string(),
        }
    }

    fn lister(tools: Value) -> impl FnMut(&conduit_mcp::JsonRpcRequest) -> FakeReply + Send + 'static {
        move |_| FakeReply::Result(json!({ "tools": tools.clone() }))
    }

    #[test]
    fn test_first_provider_wins_on_duplicate_names() {
        let catalog = ToolCatalog::from_definitions(vec![
            def("search", "web", json!({"type": "object"})),
            def("search", "files", json!({"type": "object"})),
            def("read", "files", json!({"type": "object"})),
        ]);
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.provider_for("search"), Some("web"));
        assert_eq!(catalog.provider_for("read"), Some("files"));
        assert_eq!(catalog.functions().len(), 2);
    }

    #[test]
    fn test_unconvertible_schema_is_dropped() {
        let catalog = ToolCatalog::from_definitions(vec![
            def("bad", "p", json!("nope")),
            def("good", "p", json!({"type": "object"})),
        ]);
        assert_eq!(catalog.len(), 1);
        assert!(catalog.get("bad").is_none());
        assert!(catalog.provider_for("bad").is_none());
        assert_eq!(catalog.functions()[0].name, "good");
    }

    #[tokio::test]
    async fn test_discover_skips_failing_providers() {
        let mut configs = IndexMap::new();
        // Configured but the command does not exist.
        configs.insert(
            "missing".to_string(),
            ProviderConfig::new("/nonexistent/conduit-provider", vec![]),
        );
        let mut processes = ProcessManager::new(configs);

        let (calc, _calc_task) = spawn_fake_provider(lister(json!([
            {"name": "add", "description": "Add two numbers", "inputSchema": {"type": "object"}}
        ])));
        let (broken, _broken_task) =
            spawn_fake_provider(|_| FakeReply::Raw("not json".to_string()));
        processes.attach("calc", calc);
        processes.attach("broken", broken);

        let catalog = ToolCatalog::discover(&mut processes).await;
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.provider_for("add"), Some("calc"));
        let params = &catalog.functions()[0].parameters;
        assert!(params["properties"]["dummy"].is_object());
    }

    #[tokio::test]
    async fn test_discover_sends_empty_params() {
        let mut processes = ProcessManager::new(IndexMap::new());
        let (transport, task) = spawn_fake_provider(lister(json!([])));
        processes.attach("empty", transport);

        let catalog = ToolCatalog::discover(&mut processes).await;
        assert!(catalog.is_empty());

        processes.shutdown().await;
        let seen = task.await.unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].method, "tools/list");
        assert_eq!(seen[0].params, Some(json!({})));
    }
}
