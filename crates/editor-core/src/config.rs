use serde::{Deserialize, Serialize};

use crate::core::EditorConfig;
use crate::error::ConfigError;
use crate::suggestion::MentionCandidate;

pub const DEFAULT_PLACEHOLDER: &str = "Digite aqui…";
pub const DEFAULT_CONTENT: &str = "<p></p>";

/// One switch per extension. The core plugin (paragraphs, text, hard breaks)
/// is always on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureFlags {
    pub marks: bool,
    pub text_style: bool,
    pub heading: bool,
    pub blockquote: bool,
    pub code_block: bool,
    pub align: bool,
    pub indent: bool,
    pub lists: bool,
    pub tables: bool,
    pub table_caption: bool,
    pub page_break: bool,
    pub mention: bool,
    pub divider: bool,
}

impl FeatureFlags {
    pub fn none() -> Self {
        Self {
            marks: false,
            text_style: false,
            heading: false,
            blockquote: false,
            code_block: false,
            align: false,
            indent: false,
            lists: false,
            tables: false,
            table_caption: false,
            page_break: false,
            mention: false,
            divider: false,
        }
    }
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            marks: true,
            text_style: true,
            heading: true,
            blockquote: true,
            code_block: true,
            align: true,
            indent: true,
            lists: true,
            tables: true,
            table_caption: true,
            page_break: true,
            mention: true,
            divider: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MenuCapabilities {
    /// Floating menu over non-empty text ranges.
    pub range_menu: bool,
    /// Floating menu while the caret is inside a table.
    pub table_menu: bool,
}

impl Default for MenuCapabilities {
    fn default() -> Self {
        Self {
            range_menu: true,
            table_menu: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Undo depth; `0` picks the editor default.
    pub max_undo: usize,
}

/// Everything the host hands over when a session starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub features: FeatureFlags,
    pub mentions: Vec<MentionCandidate>,
    pub placeholder: String,
    pub read_only: bool,
    /// Initial document as HTML.
    pub content: String,
    pub menus: MenuCapabilities,
    pub history: HistoryConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            features: FeatureFlags::default(),
            mentions: Vec::new(),
            placeholder: DEFAULT_PLACEHOLDER.to_string(),
            read_only: false,
            content: DEFAULT_CONTENT.to_string(),
            menus: MenuCapabilities::default(),
            history: HistoryConfig::default(),
        }
    }
}

impl SessionConfig {
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(s)?)
    }

    pub fn editor_config(&self) -> EditorConfig {
        EditorConfig {
            max_undo: self.history.max_undo,
            ..EditorConfig::default()
        }
        .with_defaults()
    }
}
