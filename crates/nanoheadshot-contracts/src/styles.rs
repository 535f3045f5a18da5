use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Fixed suffix appended to every instruction sent to the edit service.
/// Keeps the subject recognizable and the output photographic regardless
/// of which style prompt the user picked.
pub const IDENTITY_SUFFIX: &str = " Ensure the person's facial identity and \
distinctive features are preserved exactly, and keep the result photorealistic.";

/// Message shown when the user asks to generate with an empty custom prompt.
pub const BLANK_PROMPT_MESSAGE: &str = "Please enter a description of the style you want.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StylePreset {
    pub id: String,
    pub label: String,
    pub prompt: String,
}

/// Ordered registry of the named preset prompts. Order matters: the
/// presentation layer renders presets in registry order.
#[derive(Debug, Clone)]
pub struct StyleRegistry {
    presets: IndexMap<String, StylePreset>,
}

impl StyleRegistry {
    pub fn new(presets: Option<IndexMap<String, StylePreset>>) -> Self {
        Self {
            presets: presets.unwrap_or_else(default_presets),
        }
    }

    pub fn get(&self, id: &str) -> Option<&StylePreset> {
        self.presets.get(id)
    }

    pub fn list(&self) -> impl Iterator<Item = &StylePreset> {
        self.presets.values()
    }
}

impl Default for StyleRegistry {
    fn default() -> Self {
        Self::new(None)
    }
}

/// The active style: a preset reference or a user-authored prompt.
/// Exactly one is active at a time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum StyleChoice {
    Preset(String),
    Custom(String),
}

impl Default for StyleChoice {
    fn default() -> Self {
        StyleChoice::Preset("corporate-grey".to_string())
    }
}

impl StyleChoice {
    /// Short label for diagnostics.
    pub fn label(&self) -> String {
        match self {
            StyleChoice::Preset(id) => format!("preset:{id}"),
            StyleChoice::Custom(_) => "custom".to_string(),
        }
    }
}

/// Builds the full instruction sent to the edit service: the chosen prompt
/// text followed verbatim by [`IDENTITY_SUFFIX`].
///
/// The `Err` variant carries the user-facing message for invalid choices
/// (blank custom prompt, unknown preset id).
pub fn compose_instruction(choice: &StyleChoice, registry: &StyleRegistry) -> Result<String, String> {
    let prompt = match choice {
        StyleChoice::Preset(id) => registry
            .get(id)
            .map(|preset| preset.prompt.clone())
            .ok_or_else(|| format!("Unknown style preset '{id}'."))?,
        StyleChoice::Custom(text) => {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                return Err(BLANK_PROMPT_MESSAGE.to_string());
            }
            trimmed.to_string()
        }
    };
    Ok(format!("{prompt}{IDENTITY_SUFFIX}"))
}

fn default_presets() -> IndexMap<String, StylePreset> {
    let mut map = IndexMap::new();

    let mut insert = |id: &str, label: &str, prompt: &str| {
        map.insert(
            id.to_string(),
            StylePreset {
                id: id.to_string(),
                label: label.to_string(),
                prompt: prompt.to_string(),
            },
        );
    };

    insert(
        "corporate-grey",
        "Corporate Grey",
        "Transform this photo into a professional corporate headshot with a \
         neutral grey studio background, soft key lighting, and formal business attire.",
    );
    insert(
        "studio-white",
        "Studio White",
        "Transform this photo into a clean studio headshot on a pure white \
         seamless background with bright, even lighting and a friendly expression.",
    );
    insert(
        "linkedin-blue",
        "LinkedIn Blue",
        "Transform this photo into a polished profile headshot with a softly \
         graduated blue background, crisp focus on the face, and smart-casual attire.",
    );
    insert(
        "outdoor-bokeh",
        "Outdoor Bokeh",
        "Transform this photo into a natural-light outdoor headshot with a \
         warm, heavily blurred green background and golden-hour tones.",
    );
    insert(
        "editorial-bw",
        "Editorial B&W",
        "Transform this photo into a dramatic black-and-white editorial \
         headshot with high contrast, directional lighting, and a dark background.",
    );
    insert(
        "startup-casual",
        "Startup Casual",
        "Transform this photo into a relaxed startup-style headshot against a \
         bright modern office backdrop, wearing casual attire with approachable lighting.",
    );

    map
}

#[cfg(test)]
mod tests {
    use super::{
        compose_instruction, StyleChoice, StyleRegistry, BLANK_PROMPT_MESSAGE, IDENTITY_SUFFIX,
    };

    #[test]
    fn default_registry_keeps_insertion_order_and_known_presets() {
        let registry = StyleRegistry::default();
        let ids: Vec<&str> = registry.list().map(|preset| preset.id.as_str()).collect();
        assert_eq!(ids.first(), Some(&"corporate-grey"));
        assert!(ids.contains(&"studio-white"));
        assert!(registry.get("corporate-grey").is_some());
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn preset_instruction_is_prompt_plus_suffix_verbatim() {
        let registry = StyleRegistry::default();
        let preset = registry.get("corporate-grey").unwrap().clone();
        let instruction =
            compose_instruction(&StyleChoice::Preset("corporate-grey".to_string()), &registry)
                .unwrap();
        assert_eq!(instruction, format!("{}{IDENTITY_SUFFIX}", preset.prompt));
    }

    #[test]
    fn custom_instruction_trims_and_appends_suffix() {
        let registry = StyleRegistry::default();
        let instruction = compose_instruction(
            &StyleChoice::Custom("  make me a wizard  ".to_string()),
            &registry,
        )
        .unwrap();
        assert_eq!(instruction, format!("make me a wizard{IDENTITY_SUFFIX}"));
    }

    #[test]
    fn blank_custom_prompt_is_rejected_with_user_message() {
        let registry = StyleRegistry::default();
        for text in ["", "   ", "\n\t"] {
            let err = compose_instruction(&StyleChoice::Custom(text.to_string()), &registry)
                .err()
                .unwrap_or_default();
            assert_eq!(err, BLANK_PROMPT_MESSAGE);
        }
    }

    #[test]
    fn unknown_preset_is_rejected() {
        let registry = StyleRegistry::default();
        let err = compose_instruction(&StyleChoice::Preset("nope".to_string()), &registry)
            .err()
            .unwrap_or_default();
        assert_eq!(err, "Unknown style preset 'nope'.");
    }
}
