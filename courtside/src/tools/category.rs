//! Category selection - the reserved tool that swaps the visible catalog
//!
//! Statistics catalogs run to around a hundred tools. Rather than offering
//! all of them every turn, the model starts with a small base set and calls
//! `get_tools_by_category` to request the slice it needs.

use std::fmt;
use std::str::FromStr;

use serde_json::{Value, json};
use thiserror::Error;
use tracing::debug;

use crate::llm::ToolDefinition;

/// Name of the reserved category-selection tool
pub const CATEGORY_TOOL_NAME: &str = "get_tools_by_category";

/// The closed category taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ToolCategory {
    /// Always visible, added to every selection
    Base,
    Player,
    Team,
    League,
    Game,
    Boxscore,
    Draft,
    Franchise,
    Playoff,
    Season,
}

impl ToolCategory {
    /// Tags the model may request
    pub const SELECTABLE: [ToolCategory; 9] = [
        ToolCategory::Player,
        ToolCategory::Team,
        ToolCategory::League,
        ToolCategory::Game,
        ToolCategory::Boxscore,
        ToolCategory::Draft,
        ToolCategory::Franchise,
        ToolCategory::Playoff,
        ToolCategory::Season,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ToolCategory::Base => "base",
            ToolCategory::Player => "player",
            ToolCategory::Team => "team",
            ToolCategory::League => "league",
            ToolCategory::Game => "game",
            ToolCategory::Boxscore => "boxscore",
            ToolCategory::Draft => "draft",
            ToolCategory::Franchise => "franchise",
            ToolCategory::Playoff => "playoff",
            ToolCategory::Season => "season",
        }
    }

    /// Selectable tag names, for error messages and the tool schema
    pub fn allowed_names() -> Vec<&'static str> {
        Self::SELECTABLE.iter().map(|c| c.as_str()).collect()
    }
}

impl fmt::Display for ToolCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ToolCategory {
    type Err = CategoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase();
        match normalized.as_str() {
            "base" => Ok(ToolCategory::Base),
            "player" => Ok(ToolCategory::Player),
            "team" => Ok(ToolCategory::Team),
            "league" => Ok(ToolCategory::League),
            "game" => Ok(ToolCategory::Game),
            "boxscore" => Ok(ToolCategory::Boxscore),
            "draft" => Ok(ToolCategory::Draft),
            "franchise" => Ok(ToolCategory::Franchise),
            "playoff" => Ok(ToolCategory::Playoff),
            "season" => Ok(ToolCategory::Season),
            _ => Err(CategoryError::Unknown {
                invalid: vec![normalized],
            }),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum CategoryError {
    #[error("Invalid categories: {invalid:?}. Allowed: {:?}", ToolCategory::allowed_names())]
    Unknown { invalid: Vec<String> },

    #[error("Invalid category selection arguments: {0}")]
    InvalidArguments(String),
}

/// Validate requested tags and return them with `base`, deduplicated and sorted
///
/// Only selectable tags may be requested; every other tag, `base` included,
/// is reported, not just the first.
pub fn select_categories<S: AsRef<str>>(requested: &[S]) -> Result<Vec<ToolCategory>, CategoryError> {
    debug!(count = requested.len(), "select_categories: called");
    let mut selected = vec![ToolCategory::Base];
    let mut invalid = Vec::new();

    for tag in requested {
        match tag.as_ref().parse::<ToolCategory>() {
            Ok(category) if category != ToolCategory::Base => selected.push(category),
            // base is implied, never requested
            _ => invalid.push(tag.as_ref().trim().to_lowercase()),
        }
    }

    if !invalid.is_empty() {
        debug!(?invalid, "select_categories: rejecting unknown tags");
        return Err(CategoryError::Unknown { invalid });
    }

    selected.sort();
    selected.dedup();
    Ok(selected)
}

/// Parse the `{"categories": [...]}` arguments of a selection call
///
/// A bare string is accepted as a single tag.
pub fn parse_selection(arguments: &Value) -> Result<Vec<ToolCategory>, CategoryError> {
    let tags: Vec<String> = match arguments.get("categories") {
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| {
                v.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| CategoryError::InvalidArguments(format!("expected string tag, got {}", v)))
            })
            .collect::<Result<_, _>>()?,
        Some(Value::String(tag)) => vec![tag.clone()],
        Some(other) => {
            return Err(CategoryError::InvalidArguments(format!(
                "categories must be a list, got {}",
                other
            )));
        }
        None => return Err(CategoryError::InvalidArguments("missing 'categories'".to_string())),
    };
    select_categories(&tags)
}

/// Acknowledgement text returned in place of a tool result
pub fn acknowledgement(categories: &[ToolCategory]) -> String {
    let names: Vec<&str> = categories.iter().map(|c| c.as_str()).collect();
    format!("Updated tool set. Categories: {}", names.join(", "))
}

/// Definition offered to the model when no backend publishes its own
pub fn category_tool_definition() -> ToolDefinition {
    ToolDefinition::new(
        CATEGORY_TOOL_NAME,
        "Replace the currently available tools with the tools in the given categories. \
         Call again with different categories to switch.",
        json!({
            "type": "object",
            "properties": {
                "categories": {
                    "type": "array",
                    "items": { "type": "string", "enum": ToolCategory::allowed_names() },
                    "description": "Categories of tools to load"
                }
            },
            "required": ["categories"]
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_select_adds_base_and_sorts() {
        let selected = select_categories(&["Team", " player ", "team"]).unwrap();
        assert_eq!(
            selected,
            vec![ToolCategory::Base, ToolCategory::Player, ToolCategory::Team]
        );
    }

    #[test]
    fn test_select_empty_is_base_only() {
        let selected = select_categories::<&str>(&[]).unwrap();
        assert_eq!(selected, vec![ToolCategory::Base]);
    }

    #[test]
    fn test_unknown_tags_enumerate_allowed_set() {
        let err = select_categories(&["team", "Weather", "coaching"]).unwrap_err();
        assert_eq!(
            err,
            CategoryError::Unknown {
                invalid: vec!["weather".to_string(), "coaching".to_string()]
            }
        );
        let msg = err.to_string();
        assert!(msg.starts_with("Invalid categories: [\"weather\", \"coaching\"]"));
        for name in ToolCategory::allowed_names() {
            assert!(msg.contains(name), "missing {} in {}", name, msg);
        }
    }

    #[test]
    fn test_base_is_not_requestable() {
        let err = select_categories(&["team", " BASE "]).unwrap_err();
        assert_eq!(
            err,
            CategoryError::Unknown {
                invalid: vec!["base".to_string()]
            }
        );
        assert!(!ToolCategory::allowed_names().contains(&"base"));
        // still a valid tag on backend tools
        assert_eq!("base".parse::<ToolCategory>(), Ok(ToolCategory::Base));
    }

    #[test]
    fn test_parse_selection_arguments() {
        let selected = parse_selection(&json!({"categories": ["GAME"]})).unwrap();
        assert_eq!(selected, vec![ToolCategory::Base, ToolCategory::Game]);

        let selected = parse_selection(&json!({"categories": "draft"})).unwrap();
        assert_eq!(selected, vec![ToolCategory::Base, ToolCategory::Draft]);

        assert!(matches!(
            parse_selection(&json!({})),
            Err(CategoryError::InvalidArguments(_))
        ));
        assert!(matches!(
            parse_selection(&json!({"categories": [1, 2]})),
            Err(CategoryError::InvalidArguments(_))
        ));
    }

    #[test]
    fn test_acknowledgement_lists_categories() {
        let ack = acknowledgement(&[ToolCategory::Base, ToolCategory::Season]);
        assert_eq!(ack, "Updated tool set. Categories: base, season");
    }

    #[test]
    fn test_definition_schema_enumerates_tags() {
        let def = category_tool_definition();
        assert_eq!(def.name, CATEGORY_TOOL_NAME);
        let tags = def.input_schema["properties"]["categories"]["items"]["enum"]
            .as_array()
            .unwrap();
        assert_eq!(tags.len(), ToolCategory::SELECTABLE.len());
    }

    proptest! {
        #[test]
        fn prop_normalization_ignores_case_and_whitespace(
            idx in 0usize..9,
            upper in proptest::bool::ANY,
            pad_left in " {0,3}",
            pad_right in " {0,3}",
        ) {
            let category = ToolCategory::SELECTABLE[idx];
            let name = if upper { category.as_str().to_uppercase() } else { category.as_str().to_string() };
            let tag = format!("{}{}{}", pad_left, name, pad_right);
            let selected = select_categories(&[tag]).unwrap();
            prop_assert!(selected.contains(&category));
            prop_assert!(selected.contains(&ToolCategory::Base));
        }

        #[test]
        fn prop_selection_is_sorted_and_unique(idxs in proptest::collection::vec(0usize..9, 0..12)) {
            let tags: Vec<&str> = idxs.iter().map(|&i| ToolCategory::SELECTABLE[i].as_str()).collect();
            let selected = select_categories(&tags).unwrap();
            let mut expected = selected.clone();
            expected.sort();
            expected.dedup();
            prop_assert_eq!(selected, expected);
        }
    }
}
