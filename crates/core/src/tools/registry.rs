// Tool registry (spec §4.2). Frozen after startup: built once from the
// built-in tool set plus any skill-provided tools, then handed out as an
// immutable reference to the pipeline and the LLM router's schema builder.

use super::contract::ToolContract;
use crate::atoms::types::AuthorityTier;
use std::collections::HashMap;

pub struct ToolRegistry {
    tools: HashMap<&'static str, ToolContract>,
}

impl ToolRegistry {
    pub fn new(tools: Vec<ToolContract>) -> Self {
        let mut map = HashMap::new();
        for tool in tools {
            map.insert(tool.name, tool);
        }
        ToolRegistry { tools: map }
    }

    pub fn get(&self, name: &str) -> Option<&ToolContract> {
        self.tools.get(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Tools visible to a session at `tier` — the set the LLM router hands
    /// the provider as the available tool schema for this turn.
    pub fn visible_to(&self, tier: AuthorityTier) -> Vec<&ToolContract> {
        self.tools
            .values()
            .filter(|t| crate::policy::authority::is_visible(tier, t.authority_tier_required))
            .collect()
    }

    pub fn counts_by_permission(&self) -> crate::policy::selfmodel::ToolCountsByPermission {
        use crate::atoms::types::PermissionLevel;
        let mut counts = crate::policy::selfmodel::ToolCountsByPermission {
            safe: 0,
            moderate: 0,
            destructive: 0,
            critical: 0,
        };
        for tool in self.tools.values() {
            match tool.permission_level {
                PermissionLevel::Safe => counts.safe += 1,
                PermissionLevel::Moderate => counts.moderate += 1,
                PermissionLevel::Destructive => counts.destructive += 1,
                PermissionLevel::Critical => counts.critical += 1,
            }
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atoms::types::PermissionLevel;
    use crate::tools::contract::{FnToolHandler, ToolContext};

    fn noop_contract(name: &'static str, tier: AuthorityTier, level: PermissionLevel) -> ToolContract {
        ToolContract {
            name,
            description: "test tool",
            input_schema: serde_json::json!({}),
            permission_level: level,
            authority_tier_required: tier,
            sensitive_params: &[],
            is_writer: false,
            handler: Box::new(FnToolHandler(|_ctx: ToolContext<'_>, _args| async { Ok(String::new()) })),
        }
    }

    #[test]
    fn visible_to_filters_by_tier() {
        let registry = ToolRegistry::new(vec![
            noop_contract("public_tool", AuthorityTier::Public, PermissionLevel::Safe),
            noop_contract("owner_tool", AuthorityTier::Owner, PermissionLevel::Critical),
        ]);
        let visible = registry.visible_to(AuthorityTier::Public);
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].name, "public_tool");

        let visible_owner = registry.visible_to(AuthorityTier::Owner);
        assert_eq!(visible_owner.len(), 2);
    }

    #[test]
    fn counts_by_permission_tally_correctly() {
        let registry = ToolRegistry::new(vec![
            noop_contract("a", AuthorityTier::Public, PermissionLevel::Safe),
            noop_contract("b", AuthorityTier::Public, PermissionLevel::Safe),
            noop_contract("c", AuthorityTier::Owner, PermissionLevel::Critical),
        ]);
        let counts = registry.counts_by_permission();
        assert_eq!(counts.safe, 2);
        assert_eq!(counts.critical, 1);
    }
}
