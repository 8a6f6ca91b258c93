//! Built-in prompt catalogue.
//!
//! Each entry pairs a prompt with a stable key and a placeholder image
//! that the client may return when image generation is unreachable.

use serde::Serialize;

/// What an entry is used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptKind {
    /// Portrait of the effigy's target.
    Trait,
    /// Avatar for a ritual.
    Ritual,
}

impl std::fmt::Display for PromptKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Trait => write!(f, "trait"),
            Self::Ritual => write!(f, "ritual"),
        }
    }
}

/// One catalogue entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PromptEntry {
    /// Stable ASCII key.
    pub key: &'static str,
    /// Display label.
    pub label: &'static str,
    /// Entry kind.
    pub kind: PromptKind,
    /// Image generation prompt.
    pub prompt: &'static str,
    /// Placeholder image URL.
    pub placeholder: &'static str,
}

/// Every built-in prompt.
pub const CATALOGUE: &[PromptEntry] = &[
    PromptEntry {
        key: "boss",
        label: "烦人上司",
        kind: PromptKind::Trait,
        prompt: "cyberpunk style, glitch art, angry boss face, shouting, corporate suit, distorted features, red and black chaotic background, low poly, 3d render, high contrast",
        placeholder: "https://picsum.photos/seed/boss/512/512",
    },
    PromptEntry {
        key: "ex",
        label: "前任",
        kind: PromptKind::Trait,
        prompt: "cyberpunk style, glitch art, silhouette of a person walking away, rain, neon lights, melancholic blue and purple atmosphere, broken heart symbol, digital noise, 3d render",
        placeholder: "https://picsum.photos/seed/ex/512/512",
    },
    PromptEntry {
        key: "villain",
        label: "小人",
        kind: PromptKind::Trait,
        prompt: "cyberpunk style, glitch art, sneaky villain face, malicious grin, shadowy, toxic green glowing eyes, snake like features, dark alley background, digital distortion, 3d render",
        placeholder: "https://picsum.photos/seed/villain/512/512",
    },
    PromptEntry {
        key: "bad_luck",
        label: "Bad Luck",
        kind: PromptKind::Trait,
        prompt: "cyberpunk style, glitch art, broken mirror, black cat, cracked screen effect, ominous dark symbols, chaotic composition, monochrome with red warning signs, 3d render",
        placeholder: "https://picsum.photos/seed/badluck/512/512",
    },
    PromptEntry {
        key: "love",
        label: "love",
        kind: PromptKind::Ritual,
        prompt: "cyberpunk style, romantic avatar, glowing pink and red hearts, neon love symbols, digital cupid, holographic roses, warm magenta atmosphere, soft glow, 3d render, portrait",
        placeholder: "https://picsum.photos/seed/love/512/512",
    },
    PromptEntry {
        key: "demote",
        label: "demote",
        kind: PromptKind::Ritual,
        prompt: "cyberpunk style, dark villain avatar, shadowy figure, toxic green eyes, sinister smile, snake patterns, dark purple and green aura, menacing, 3d render, portrait",
        placeholder: "https://picsum.photos/seed/demote/512/512",
    },
    PromptEntry {
        key: "luck",
        label: "luck",
        kind: PromptKind::Ritual,
        prompt: "cyberpunk style, fortune avatar, golden coins, lucky clover hologram, sparkling stars, bright golden and cyan glow, prosperity symbols, radiant, 3d render, portrait",
        placeholder: "https://picsum.photos/seed/luck/512/512",
    },
];

/// Iterates over entries of one kind.
pub fn by_kind(kind: PromptKind) -> impl Iterator<Item = &'static PromptEntry> {
    CATALOGUE.iter().filter(move |e| e.kind == kind)
}

/// Finds an entry by key or label (keys are matched case-insensitively).
pub fn lookup(name: &str) -> Option<&'static PromptEntry> {
    let name = name.trim();
    CATALOGUE
        .iter()
        .find(|e| e.key.eq_ignore_ascii_case(name) || e.label == name)
}

/// Returns the key of the entry whose prompt is exactly `prompt`.
pub fn prompt_key(prompt: &str) -> Option<&'static str> {
    CATALOGUE.iter().find(|e| e.prompt == prompt).map(|e| e.key)
}

/// Returns the placeholder image for a key or label.
pub fn placeholder_for(name: &str) -> Option<&'static str> {
    lookup(name).map(|e| e.placeholder)
}
