use crate::chat::ChatMessage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextMode {
    Generate,
    Modify,
}

impl TextMode {
    pub fn system_prompt(self) -> &'static str {
        match self {
            Self::Generate => GENERATE_SYSTEM_PROMPT,
            Self::Modify => MODIFY_SYSTEM_PROMPT,
        }
    }

    pub fn progress_label(self) -> &'static str {
        match self {
            Self::Generate => "Generating prompt...",
            Self::Modify => "Modifying prompt...",
        }
    }
}

pub const GENERATE_SYSTEM_PROMPT: &str = r#"You are a professional assistant for writing AI image prompts. The user describes the picture they want; turn the description into a structured JSON prompt.

Output exactly one JSON object in the following shape and nothing else:

{
  "style_mode": "high-fidelity anime illustration, official key art, cel shading",
  "mood": "clear, healing, ethereal, dreamy",
  "scene": {
    "environment": {
      "location": "wooden seaside station under a bright blue sky with towering cumulus clouds",
      "lighting": "high-key daylight, strong ambient light, no crushed shadows",
      "weather": "clear midsummer afternoon, sea breeze, transparent air"
    },
    "subject": {
      "overview": "a cheerful anime girl waiting for the train",
      "appearance": {
        "build": "petite",
        "face": "soft round face with a relaxed, sleepy expression",
        "hair": "long pink hair curling at the tips",
        "eyes": "bright, gem-like heterochromatic eyes"
      },
      "expression_action": {
        "emotion": "happy, relaxed, curious",
        "action": "sitting on a wooden bench, legs swinging, playing with a floating plush whale"
      },
      "clothing": {
        "outfit": "blue and white summer outfit",
        "detail": "wide silk sleeves, ribbons fluttering in the wind"
      },
      "accessories": "rabbit hair clip, floating plush toy"
    },
    "background": {
      "description": "saturated blue sky, white clouds and a glittering sea, very clean frame",
      "depth_of_field": "moderate background blur so the sky and sea stay soft"
    }
  },
  "camera": {
    "angle": "slightly low angle or eye level",
    "composition": "full-body medium shot showing the interaction with the background",
    "lens": "virtual 35mm lens",
    "sensor_quality": "8K ultra high definition, crisp, noise free"
  },
  "aesthetics": {
    "intent": "top-tier game CG, clean wallpaper style",
    "material_realism": [
      "cel-shaded skin, fair with a light blush",
      "glossy, silky hair",
      "fabric with clear folds and flowing movement"
    ],
    "color_style": {
      "tone": "fresh blue and white palette with pink accents, high brightness",
      "contrast": "soft transitions between light and shadow",
      "effects": "dreamy floating particles, glowing lines"
    }
  }
}

Rules:
1. Output only the JSON. No explanation and no markdown code fences.
2. Fill in every field with short, clear content. The example shows the format only; do not copy its style.
3. If the subject is not a person, adapt the appearance fields to describe it.
4. Use vivid, professional wording that evokes the picture.
5. Keep every key of the format above; do not drop any field."#;

pub const MODIFY_SYSTEM_PROMPT: &str = r#"You are a professional assistant for revising AI image prompts. The user provides the current JSON prompt and a change request; apply the change and return the revised JSON.

Follow these rules strictly:
1. Read the structure and content of the current prompt carefully.
2. Adjust only the fields the change request is about.
3. Keep the JSON structure unchanged, including optional sections such as "frame_settings" and "negative_prompt" when present.
4. Make sure the revised content is still complete and coherent.
5. Output only the revised JSON, with no explanation or other text.

Example:
Current prompt:
{
  "style_mode": "high-fidelity anime illustration, cel shading",
  "mood": "clear, healing, dreamy",
  ...
}

Change request: "turn the scene into a snowy landscape and dress the character for winter"

Revised prompt:
{
  "style_mode": "high-fidelity anime illustration, cel shading",
  "mood": "clear, healing, dreamy",
  ... (scene and clothing fields now describe snow and winter wear)
}"#;

/// System message plus one user message for the given mode.
///
/// `current_document_text` is only embedded in modify mode.
pub fn build_messages(
    mode: TextMode,
    instruction: &str,
    current_document_text: &str,
) -> Vec<ChatMessage> {
    let user_text = match mode {
        TextMode::Generate => format!(
            "Generate a prompt from the following description:\n\n{}",
            instruction.trim()
        ),
        TextMode::Modify => format!(
            "Current prompt:\n{}\n\nChange request: {}\n\nReturn the revised JSON prompt:",
            current_document_text.trim(),
            instruction.trim()
        ),
    };
    vec![
        ChatMessage::system(mode.system_prompt()),
        ChatMessage::user(user_text),
    ]
}

#[cfg(test)]
mod tests {
    use promptsmith_contracts::document::{parse_document_text, to_document};
    use promptsmith_contracts::form::{FormModel, FIELDS};
    use serde_json::Value;

    use super::{build_messages, TextMode, GENERATE_SYSTEM_PROMPT};

    #[test]
    fn generate_template_example_covers_every_core_key() -> anyhow::Result<()> {
        let start = GENERATE_SYSTEM_PROMPT.find('{').unwrap_or(0);
        let end = GENERATE_SYSTEM_PROMPT.rfind('}').map(|idx| idx + 1).unwrap_or(0);
        let example = parse_document_text(&GENERATE_SYSTEM_PROMPT[start..end])?;

        let skeleton = to_document(&FormModel::new());
        for spec in FIELDS.iter().filter(|spec| !spec.section.is_optional()) {
            let mut example_node = &example;
            let mut skeleton_node = &skeleton;
            for key in spec.path {
                example_node = example_node.get(*key).unwrap_or(&Value::Null);
                skeleton_node = skeleton_node.get(*key).unwrap_or(&Value::Null);
            }
            assert!(!example_node.is_null(), "missing {}", spec.name);
            assert!(!skeleton_node.is_null(), "skeleton missing {}", spec.name);
        }
        Ok(())
    }

    #[test]
    fn generate_messages_embed_description() {
        let messages = build_messages(TextMode::Generate, "  a cat on a roof ", "{\"ignored\":1}");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, "system");
        assert_eq!(messages[0].content, TextMode::Generate.system_prompt());
        assert_eq!(messages[1].role, "user");
        assert!(messages[1].content.ends_with("a cat on a roof"));
        assert!(!messages[1].content.contains("ignored"));
    }

    #[test]
    fn modify_messages_put_document_before_instruction() {
        let messages = build_messages(TextMode::Modify, "make it night", "{\n  \"mood\": \"calm\"\n}");
        assert_eq!(messages[0].content, TextMode::Modify.system_prompt());
        let user = &messages[1].content;
        let doc_at = user.find("\"mood\"").unwrap_or(usize::MAX);
        let instruction_at = user.find("make it night").unwrap_or(0);
        assert!(doc_at < instruction_at);
    }
}
