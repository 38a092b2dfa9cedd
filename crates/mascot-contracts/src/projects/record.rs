use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::sections::{ComponentKind, SectionNode};

const NAME_PROMPT_CHARS: usize = 20;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackgroundPattern {
    #[default]
    Solid,
    Sunburst,
    Bubbles,
    Hypno,
    Stripes,
    Checker,
}

/// Per-project overrides on top of the selected color scheme.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomColors {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_secondary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_pattern: Option<BackgroundPattern>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_button_bg: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_button_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub card_bg: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub card_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub card_border: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub card_button_bg: Option<String>,
}

/// Snapshot of a project handed to (or restored from) the storage layer.
///
/// Images are `data:` URLs; only the current section snapshot is kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectRecord {
    pub id: String,
    pub name: String,
    pub thumbnail: String,
    pub created_at: i64,
    pub updated_at: i64,
    pub layout_id: u32,
    pub color_scheme_id: String,
    pub font_name: String,
    #[serde(default)]
    pub custom_colors: CustomColors,
    pub sections: Vec<SectionNode>,
    #[serde(default)]
    pub generated_images: Vec<String>,
    #[serde(default)]
    pub prompt: String,
}

impl ProjectRecord {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed reading {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("invalid project {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)
            .with_context(|| format!("failed writing {}", path.display()))
    }
}

pub fn new_project_id() -> String {
    Uuid::new_v4().to_string()
}

/// Hero heading, else the head of the prompt, else a placeholder.
pub fn project_name(sections: &[SectionNode], prompt: &str) -> String {
    let hero_heading = sections
        .iter()
        .find(|section| section.component == ComponentKind::Hero)
        .and_then(|section| section.content.heading.as_deref())
        .filter(|heading| !heading.is_empty());
    if let Some(heading) = hero_heading {
        return heading.to_string();
    }
    let head: String = prompt.chars().take(NAME_PROMPT_CHARS).collect();
    if head.is_empty() {
        return "Untitled Project".to_string();
    }
    head
}
