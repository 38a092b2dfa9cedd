mod history;
mod slots;

use std::fmt;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

pub use history::SectionHistory;
pub use slots::{distribute_slots, ImageSlot};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComponentKind {
    Hero,
    About,
    Tokenomics,
    Gallery,
    Roadmap,
    Socials,
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ComponentKind::Hero => "Hero",
            ComponentKind::About => "About",
            ComponentKind::Tokenomics => "Tokenomics",
            ComponentKind::Gallery => "Gallery",
            ComponentKind::Roadmap => "Roadmap",
            ComponentKind::Socials => "Socials",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SocialLinks {
    pub twitter: String,
    pub telegram: String,
    pub discord: String,
}

impl SocialLinks {
    pub fn set(&mut self, platform: &str, url: &str) -> Result<()> {
        match platform.trim().to_ascii_lowercase().as_str() {
            "twitter" | "x" => self.twitter = url.to_string(),
            "telegram" | "tg" => self.telegram = url.to_string(),
            "discord" => self.discord = url.to_string(),
            other => bail!("unknown social platform: {other}"),
        }
        Ok(())
    }
}

/// Per-field CSS font size overrides, e.g. `"4rem"`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FontSizes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heading: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paragraph: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heading: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paragraph: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nav_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub social_links: Option<SocialLinks>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_font_sizes: Option<FontSizes>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionNode {
    pub id: String,
    pub title: String,
    pub component: ComponentKind,
    pub content: SectionContent,
}

/// A partial content update. Fields left as `None` keep their current value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SectionPatch {
    pub heading: Option<String>,
    pub paragraph: Option<String>,
    pub items: Option<Vec<String>>,
    pub nav_title: Option<String>,
    pub social_links: Option<SocialLinks>,
    pub custom_font_sizes: Option<FontSizes>,
}

impl SectionPatch {
    pub fn apply(&self, content: &SectionContent) -> SectionContent {
        let mut next = content.clone();
        if let Some(heading) = &self.heading {
            next.heading = Some(heading.clone());
        }
        if let Some(paragraph) = &self.paragraph {
            next.paragraph = Some(paragraph.clone());
        }
        if let Some(items) = &self.items {
            next.items = Some(items.clone());
        }
        if let Some(nav_title) = &self.nav_title {
            next.nav_title = Some(nav_title.clone());
        }
        if let Some(links) = &self.social_links {
            next.social_links = Some(links.clone());
        }
        if let Some(sizes) = &self.custom_font_sizes {
            next.custom_font_sizes = Some(sizes.clone());
        }
        next
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveDirection {
    Up,
    Down,
}

impl MoveDirection {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "up" => Some(Self::Up),
            "down" => Some(Self::Down),
            _ => None,
        }
    }
}

/// Returns a new sequence with `patch` merged into the section named `id`.
pub fn patch_section(
    sections: &[SectionNode],
    id: &str,
    patch: &SectionPatch,
) -> Result<Vec<SectionNode>> {
    if !sections.iter().any(|section| section.id == id) {
        bail!("unknown section: {id}");
    }
    Ok(sections
        .iter()
        .map(|section| {
            if section.id == id {
                SectionNode {
                    content: patch.apply(&section.content),
                    ..section.clone()
                }
            } else {
                section.clone()
            }
        })
        .collect())
}

/// Returns a new sequence with the section named `id` swapped one step.
/// Moving past either end returns the sequence unchanged.
pub fn move_section(
    sections: &[SectionNode],
    id: &str,
    direction: MoveDirection,
) -> Result<Vec<SectionNode>> {
    let Some(index) = sections.iter().position(|section| section.id == id) else {
        bail!("unknown section: {id}");
    };
    let mut next = sections.to_vec();
    match direction {
        MoveDirection::Up if index > 0 => next.swap(index, index - 1),
        MoveDirection::Down if index + 1 < next.len() => next.swap(index, index + 1),
        _ => {}
    }
    Ok(next)
}

/// The template every new project starts from.
pub fn default_sections() -> Vec<SectionNode> {
    let node = |id: &str, title: &str, component: ComponentKind, content: SectionContent| {
        SectionNode {
            id: id.to_string(),
            title: title.to_string(),
            component,
            content,
        }
    };
    vec![
        node(
            "hero",
            "Hero",
            ComponentKind::Hero,
            SectionContent {
                heading: Some("SOLIGATOR".to_string()),
                paragraph: Some(
                    "SOLIGATOR, the lazy alligator. Reptile meme on SOL chain.".to_string(),
                ),
                ..SectionContent::default()
            },
        ),
        node(
            "about",
            "About",
            ComponentKind::About,
            SectionContent {
                heading: Some("About".to_string()),
                paragraph: Some(
                    "SOLIGATOR is a fierce yet laid-back croc, lounging by the swamp, waiting \
                     for his next big opportunity to strike and dominate the crypto waters."
                        .to_string(),
                ),
                nav_title: Some("about".to_string()),
                ..SectionContent::default()
            },
        ),
        node(
            "gallery",
            "Buy",
            ComponentKind::Gallery,
            SectionContent {
                heading: Some("Buy $SOLIGATOR".to_string()),
                paragraph: Some(
                    "Create your Phantom wallet and get your first $SOLIGATOR from dexscreener.com"
                        .to_string(),
                ),
                nav_title: Some("buy $MEME".to_string()),
                ..SectionContent::default()
            },
        ),
        node(
            "tokenomics",
            "Tokenomics",
            ComponentKind::Tokenomics,
            SectionContent {
                heading: Some("Tokenomics".to_string()),
                items: Some(vec![
                    "LP Burnt".to_string(),
                    "Contract renounced".to_string(),
                    "100% Liquidity".to_string(),
                ]),
                nav_title: Some("tokenomics".to_string()),
                ..SectionContent::default()
            },
        ),
        node(
            "socials",
            "Socials",
            ComponentKind::Socials,
            SectionContent {
                heading: Some("Join the community".to_string()),
                social_links: Some(SocialLinks {
                    twitter: "https://twitter.com".to_string(),
                    telegram: "https://t.me".to_string(),
                    discord: String::new(),
                }),
                ..SectionContent::default()
            },
        ),
    ]
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn patch_merges_only_supplied_fields() {
        let sections = default_sections();
        let patch = SectionPatch {
            heading: Some("GATOR".to_string()),
            ..SectionPatch::default()
        };
        let next = patch_section(&sections, "hero", &patch).unwrap();
        assert_eq!(next[0].content.heading.as_deref(), Some("GATOR"));
        assert_eq!(next[0].content.paragraph, sections[0].content.paragraph);
        assert_eq!(next[1..], sections[1..]);
    }

    #[test]
    fn patch_unknown_section_is_an_error() {
        let err = patch_section(&default_sections(), "roadmap", &SectionPatch::default())
            .unwrap_err();
        assert!(err.to_string().contains("roadmap"));
    }

    #[test]
    fn move_swaps_neighbors_and_clamps_at_edges() {
        let sections = default_sections();
        let moved = move_section(&sections, "about", MoveDirection::Up).unwrap();
        assert_eq!(moved[0].id, "about");
        assert_eq!(moved[1].id, "hero");

        let top = move_section(&sections, "hero", MoveDirection::Up).unwrap();
        assert_eq!(top, sections);
        let bottom = move_section(&sections, "socials", MoveDirection::Down).unwrap();
        assert_eq!(bottom, sections);
    }

    #[test]
    fn content_serializes_with_camel_case_keys() {
        let sections = default_sections();
        let value = serde_json::to_value(&sections[1]).unwrap();
        assert_eq!(value["content"]["navTitle"], json!("about"));
        assert_eq!(value["component"], json!("About"));
        assert!(value["content"].get("items").is_none());
    }

    #[test]
    fn social_links_accept_known_platforms() {
        let mut links = SocialLinks::default();
        links.set("Discord", "https://discord.gg/x").unwrap();
        links.set("x", "https://x.com/gator").unwrap();
        assert_eq!(links.discord, "https://discord.gg/x");
        assert_eq!(links.twitter, "https://x.com/gator");
        assert!(links.set("myspace", "https://myspace.com").is_err());
    }
}
