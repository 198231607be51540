//! ToolRouter - routing table and category index for one conversation

use std::collections::{BTreeMap, HashMap, HashSet};

use serde_json::Value;
use tracing::{debug, warn};

use super::category::{CATEGORY_TOOL_NAME, ToolCategory, category_tool_definition};
use super::{GuardedBackend, ToolDescriptor, ToolError, ToolOutput};
use crate::llm::ToolDefinition;

/// Maps each tool name to exactly one backend
///
/// Built once from the union of the backends' catalogs. When two backends
/// publish the same name the first registration wins. A backend tool named
/// `get_tools_by_category` is never routed; the conversation loop handles it.
pub struct ToolRouter {
    backends: Vec<GuardedBackend>,
    /// Tool name -> (backend index, descriptor), in catalog order
    routes: HashMap<String, (usize, ToolDescriptor)>,
    order: Vec<String>,
    by_category: BTreeMap<ToolCategory, Vec<String>>,
    always_visible: Vec<String>,
    category_tool: Option<ToolDefinition>,
}

impl ToolRouter {
    pub fn new(backends: Vec<GuardedBackend>) -> Self {
        debug!(backend_count = backends.len(), "ToolRouter::new: called");
        let mut routes: HashMap<String, (usize, ToolDescriptor)> = HashMap::new();
        let mut order = Vec::new();
        let mut by_category: BTreeMap<ToolCategory, Vec<String>> = BTreeMap::new();
        let mut always_visible = Vec::new();
        let mut published_category_tool = None;

        for (idx, guarded) in backends.iter().enumerate() {
            let backend = guarded.backend();
            for descriptor in backend.catalog() {
                if descriptor.name == CATEGORY_TOOL_NAME {
                    if published_category_tool.is_none() {
                        published_category_tool = Some(descriptor.to_definition());
                    }
                    continue;
                }
                if let Some((owner, _)) = routes.get(&descriptor.name) {
                    warn!(
                        tool = %descriptor.name,
                        owner = %backends[*owner].name(),
                        ignored = %backend.name(),
                        "ToolRouter::new: duplicate tool name, keeping first registration"
                    );
                    continue;
                }

                for tag in &descriptor.categories {
                    match tag.parse::<ToolCategory>() {
                        Ok(category) => by_category.entry(category).or_default().push(descriptor.name.clone()),
                        Err(_) => warn!(tool = %descriptor.name, %tag, "ToolRouter::new: ignoring unknown category tag"),
                    }
                }
                if backend.always_visible() {
                    always_visible.push(descriptor.name.clone());
                }
                order.push(descriptor.name.clone());
                routes.insert(descriptor.name.clone(), (idx, descriptor.clone()));
            }
        }

        // Category selection is offered only when there is something to select
        let categorized = by_category.iter().any(|(c, tools)| *c != ToolCategory::Base && !tools.is_empty());
        let category_tool = categorized.then(|| published_category_tool.unwrap_or_else(category_tool_definition));

        debug!(
            tools = order.len(),
            categories = by_category.len(),
            always_visible = always_visible.len(),
            "ToolRouter::new: routing table built"
        );
        Self {
            backends,
            routes,
            order,
            by_category,
            always_visible,
            category_tool,
        }
    }

    /// Whether the model should be offered category selection
    pub fn has_category_tool(&self) -> bool {
        self.category_tool.is_some()
    }

    pub fn is_category_tool(&self, name: &str) -> bool {
        name == CATEGORY_TOOL_NAME && self.category_tool.is_some()
    }

    /// The starting tool set: the selector, base-tagged and always-visible tools
    pub fn base_tools(&self) -> Vec<ToolDefinition> {
        self.tools_for(&[ToolCategory::Base])
    }

    /// Tools tagged with any of `categories`, plus the always-visible set
    ///
    /// Deduplicated by name. The category tool stays visible so the model
    /// can switch again.
    pub fn tools_for(&self, categories: &[ToolCategory]) -> Vec<ToolDefinition> {
        debug!(?categories, "ToolRouter::tools_for: called");
        let mut seen = HashSet::new();
        let mut tools = Vec::new();

        if let Some(def) = &self.category_tool {
            seen.insert(def.name.clone());
            tools.push(def.clone());
        }
        let tagged = categories
            .iter()
            .filter_map(|c| self.by_category.get(c))
            .flatten();
        for name in tagged.chain(self.always_visible.iter()) {
            if !seen.insert(name.clone()) {
                continue;
            }
            if let Some((_, descriptor)) = self.routes.get(name) {
                tools.push(descriptor.to_definition());
            }
        }
        tools
    }

    /// Every routed tool, in catalog order
    pub fn catalog(&self) -> Vec<&ToolDescriptor> {
        self.order
            .iter()
            .filter_map(|name| self.routes.get(name).map(|(_, d)| d))
            .collect()
    }

    /// Name of the backend that owns `tool`
    pub fn owner(&self, tool: &str) -> Option<&str> {
        self.routes.get(tool).map(|(idx, _)| self.backends[*idx].name())
    }

    /// Route one call to the owning backend
    pub async fn call(&self, tool: &str, arguments: Value) -> Result<ToolOutput, ToolError> {
        let (idx, _) = self.routes.get(tool).ok_or_else(|| {
            debug!(%tool, "ToolRouter::call: unknown tool");
            ToolError::UnknownTool { name: tool.to_string() }
        })?;
        let backend = &self.backends[*idx];
        debug!(%tool, backend = %backend.name(), "ToolRouter::call: routing");
        backend.call(tool, arguments).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::backend::mock::MockBackend;
    use std::sync::Arc;

    fn names(defs: &[ToolDefinition]) -> Vec<&str> {
        defs.iter().map(|d| d.name.as_str()).collect()
    }

    fn stats_router() -> ToolRouter {
        let nba = MockBackend::new("nba")
            .tool("get_season_schedule", &["base", "season"])
            .tool("get_player_stats", &["player"])
            .tool("get_team_stats", &["team"])
            .tool("get_team_roster", &["team", "player"]);
        let search = MockBackend::new("search").tool("web_search", &[]).always_visible();
        ToolRouter::new(vec![
            GuardedBackend::new(Arc::new(nba)),
            GuardedBackend::new(Arc::new(search)),
        ])
    }

    #[test]
    fn test_base_tools() {
        let router = stats_router();
        assert_eq!(
            names(&router.base_tools()),
            vec![CATEGORY_TOOL_NAME, "get_season_schedule", "web_search"]
        );
    }

    #[test]
    fn test_tools_for_union_is_deduplicated() {
        let router = stats_router();
        let tools = router.tools_for(&[ToolCategory::Base, ToolCategory::Player, ToolCategory::Team]);
        assert_eq!(
            names(&tools),
            vec![
                CATEGORY_TOOL_NAME,
                "get_season_schedule",
                "get_player_stats",
                "get_team_roster",
                "get_team_stats",
                "web_search"
            ]
        );
    }

    #[test]
    fn test_first_registration_wins() {
        let a = MockBackend::new("a").tool("shared", &["team"]);
        let b = MockBackend::new("b").tool("shared", &["player"]);
        let router = ToolRouter::new(vec![GuardedBackend::new(Arc::new(a)), GuardedBackend::new(Arc::new(b))]);
        assert_eq!(router.owner("shared"), Some("a"));
        assert!(router.tools_for(&[ToolCategory::Player]).iter().all(|d| d.name != "shared"));
    }

    #[test]
    fn test_no_category_tool_without_categories() {
        let search = MockBackend::new("search").tool("web_search", &[]);
        let router = ToolRouter::new(vec![GuardedBackend::new(Arc::new(search))]);
        assert!(!router.has_category_tool());
        assert!(!router.is_category_tool(CATEGORY_TOOL_NAME));
        assert!(router.base_tools().is_empty());
    }

    #[test]
    fn test_backend_category_tool_is_intercepted() {
        let nba = MockBackend::new("nba")
            .tool(CATEGORY_TOOL_NAME, &["base"])
            .tool("get_team_stats", &["team"]);
        let router = ToolRouter::new(vec![GuardedBackend::new(Arc::new(nba))]);
        assert!(router.is_category_tool(CATEGORY_TOOL_NAME));
        assert_eq!(router.owner(CATEGORY_TOOL_NAME), None);
        assert_eq!(router.base_tools()[0].description, format!("{} tool", CATEGORY_TOOL_NAME));
    }

    #[tokio::test]
    async fn test_call_routes_to_owner() {
        let router = stats_router();
        let output = router.call("web_search", serde_json::json!({"q": "odds"})).await.unwrap();
        assert!(output.texts[0].starts_with("web_search"));

        let err = router.call("get_weather", serde_json::json!({})).await.unwrap_err();
        assert!(matches!(err, ToolError::UnknownTool { .. }));
    }
}
