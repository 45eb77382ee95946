//! Tool Registry: unified lookup over every connected provider's tools.
//!
//! Tool names are unique across providers. A collision is a configuration
//! error at build time, never silently shadowed.

use std::collections::HashMap;

use tracing::{debug, info};

use mcpilot_core::{Error, Result, ToolDescriptor};
use mcpilot_providers::{ConnectionState, ProviderSessionPool};

// ─────────────────────────────────────────────
// Registry
// ─────────────────────────────────────────────

/// Discovered tools in registration order, indexed by name.
#[derive(Debug, Default)]
pub struct ToolRegistry {
    tools: Vec<ToolDescriptor>,
    by_name: HashMap<String, usize>,
}

impl ToolRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from every ready session in the pool, in order.
    pub fn from_pool(pool: &ProviderSessionPool) -> Result<Self> {
        let mut registry = Self::new();
        for session in pool.sessions() {
            if session.state() != ConnectionState::Ready {
                continue;
            }
            registry.register(session.id(), session.tools().to_vec())?;
        }
        Ok(registry)
    }

    /// Add one provider's tools.
    ///
    /// All-or-nothing: if any incoming name is already taken (or repeated
    /// within `tools`), nothing is added and `DuplicateTool` is returned.
    pub fn register(&mut self, provider_id: &str, tools: Vec<ToolDescriptor>) -> Result<()> {
        let mut incoming: HashMap<&str, &str> = HashMap::new();
        for tool in &tools {
            let owner = self
                .by_name
                .get(&tool.name)
                .map(|&i| self.tools[i].provider_id.as_str())
                .or_else(|| incoming.get(tool.name.as_str()).copied());
            if let Some(existing) = owner {
                return Err(Error::DuplicateTool {
                    tool: tool.name.clone(),
                    existing: existing.to_string(),
                    incoming: provider_id.to_string(),
                });
            }
            incoming.insert(tool.name.as_str(), provider_id);
        }

        let count = tools.len();
        for mut tool in tools {
            tool.provider_id = provider_id.to_string();
            debug!(tool = %tool.name, provider = provider_id, "registered tool");
            self.by_name.insert(tool.name.clone(), self.tools.len());
            self.tools.push(tool);
        }
        info!(provider = provider_id, tools = count, "registered provider tools");
        Ok(())
    }

    /// Look up a tool by name.
    pub fn resolve(&self, name: &str) -> Result<&ToolDescriptor> {
        self.by_name
            .get(name)
            .map(|&i| &self.tools[i])
            .ok_or_else(|| Error::NotFound {
                tool: name.to_string(),
            })
    }

    /// One summary per tool, in provider-registration then declaration order:
    /// `name(param: type, opt?: type): description [provider: id]`.
    ///
    /// The core is `name(params): description`; parameter types and the
    /// provider suffix are extra hints for the model. Numbering is added by
    /// the prompt builder.
    pub fn describe_all(&self) -> Vec<String> {
        self.tools
            .iter()
            .map(|t| format!("{}: {} [provider: {}]", t.signature(), t.description, t.provider_id))
            .collect()
    }

    /// All descriptors in catalogue order.
    pub fn tools(&self) -> &[ToolDescriptor] {
        &self.tools
    }

    /// Names of all registered tools, in catalogue order.
    pub fn tool_names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tools(provider: &str, names: &[&str]) -> Vec<ToolDescriptor> {
        names
            .iter()
            .map(|n| {
                ToolDescriptor::from_schema(
                    provider,
                    *n,
                    Some(format!("{n} tool")),
                    &json!({"properties": {"a": {"type": "integer"}}, "required": ["a"]}),
                )
            })
            .collect()
    }

    #[test]
    fn disjoint_providers_resolve_to_owner() {
        let mut registry = ToolRegistry::new();
        registry.register("math", tools("math", &["add", "subtract"])).unwrap();
        registry.register("mail", tools("mail", &["send_email"])).unwrap();

        assert_eq!(registry.resolve("add").unwrap().provider_id, "math");
        assert_eq!(registry.resolve("send_email").unwrap().provider_id, "mail");
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn duplicate_across_providers_fails() {
        let mut registry = ToolRegistry::new();
        registry.register("math", tools("math", &["add"])).unwrap();
        let err = registry
            .register("calc", tools("calc", &["mul", "add"]))
            .unwrap_err();

        match err {
            Error::DuplicateTool { tool, existing, incoming } => {
                assert_eq!(tool, "add");
                assert_eq!(existing, "math");
                assert_eq!(incoming, "calc");
            }
            other => panic!("unexpected: {other}"),
        }
        // Nothing from the rejected provider leaked in.
        assert!(registry.resolve("mul").is_err());
        assert_eq!(registry.resolve("add").unwrap().provider_id, "math");
    }

    #[test]
    fn duplicate_within_one_provider_fails() {
        let mut registry = ToolRegistry::new();
        let err = registry.register("math", tools("math", &["add", "add"])).unwrap_err();
        assert!(matches!(err, Error::DuplicateTool { .. }));
        assert!(registry.is_empty());
    }

    #[test]
    fn resolve_unknown_is_not_found() {
        let registry = ToolRegistry::new();
        let err = registry.resolve("nope").unwrap_err();
        assert!(matches!(err, Error::NotFound { ref tool } if tool == "nope"));
    }

    #[test]
    fn describe_all_is_stable() {
        let mut registry = ToolRegistry::new();
        registry.register("mail", tools("mail", &["send_email"])).unwrap();
        registry.register("math", tools("math", &["add", "subtract"])).unwrap();

        assert_eq!(
            registry.describe_all(),
            vec![
                "send_email(a: integer): send_email tool [provider: mail]",
                "add(a: integer): add tool [provider: math]",
                "subtract(a: integer): subtract tool [provider: math]",
            ]
        );
        assert_eq!(registry.tool_names(), vec!["send_email", "add", "subtract"]);
    }
}
