use crate::core::state::{Character, InlineImage, Scene};
use serde_json::{json, Value};
use std::fmt::Write;

const ANALYSIS_INSTRUCTIONS: &str = r#"Your task is to analyze a dialogue script. First, identify all unique character names (written in uppercase). Then, break the script down into individual scenes, with each scene corresponding to a single line of dialogue spoken by a character.

For each line of dialogue:
- Create a new scene.
- Provide a concise title that describes the action or content of that specific line (e.g., "John greets Jane," "Jane suggests a walk").
- Include the exact, single line of dialogue for that scene.

Respond ONLY with a JSON object that follows the provided schema. Do not add any extra text or explanations.

Example Dialogue:
JOHN: Hi Jane, lovely weather today!
JANE: Yes, I think so too. Would you like to go for a walk?
JOHN: Good idea! Let's go to the park.
JANE: Great!

Example Detailed JSON Output:
{
    "characters": ["JOHN", "JANE"],
    "scenes": [
        { "title": "John greets Jane and comments on the weather", "dialogue": "JOHN: Hi Jane, lovely weather today!" },
        { "title": "Jane agrees and suggests a walk", "dialogue": "JANE: Yes, I think so too. Would you like to go for a walk?" },
        { "title": "John agrees and suggests the park", "dialogue": "JOHN: Good idea! Let's go to the park." },
        { "title": "Jane agrees enthusiastically", "dialogue": "JANE: Great!" }
    ]
}

Now, analyze this script:
"#;

pub fn build_analysis_prompt(script: &str) -> String {
    format!("{}{}", ANALYSIS_INSTRUCTIONS, script)
}

/// Response schema for script analysis: `{characters: [string], scenes: [{title, dialogue}]}`.
pub fn analysis_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "characters": {
                "type": "ARRAY",
                "items": { "type": "STRING" }
            },
            "scenes": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "title": { "type": "STRING" },
                        "dialogue": { "type": "STRING" }
                    },
                    "required": ["title", "dialogue"]
                }
            }
        },
        "required": ["characters", "scenes"]
    })
}

/// Text prompt plus the reference images sent alongside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRequest {
    pub prompt: String,
    pub attachments: Vec<InlineImage>,
}

pub const NO_TEXT_INSTRUCTION: &str = "IMPORTANT: Do not include any text, words, speech bubbles, or captions in the image. The image should be purely visual.";

/// Builds the request for one scene. A non-blank `refinement` is appended as extra instructions.
pub fn build_scene_request(
    scene: &Scene,
    characters: &[Character],
    refinement: Option<&str>,
) -> ImageRequest {
    let mut prompt = String::from("Generate a 16:9 cartoon style image for the following scene.\n");
    prompt.push_str("Characters:\n");
    for c in characters {
        let _ = writeln!(prompt, "- {}: {}", c.name, c.description.trim());
    }
    let _ = writeln!(prompt, "Scene Description: {}", scene.title);
    let _ = writeln!(prompt, "Dialogue Excerpt: \"{}\"", scene.dialogue);

    if let Some(extra) = refinement.map(str::trim).filter(|s| !s.is_empty()) {
        let _ = writeln!(prompt, "Additional Instructions: {}", extra);
    }

    prompt.push_str(
        "Ensure the characters in the image are consistent with their descriptions and reference images.\n",
    );
    prompt.push_str(NO_TEXT_INSTRUCTION);

    let attachments = characters
        .iter()
        .filter_map(|c| c.reference_image.clone())
        .collect();

    ImageRequest {
        prompt,
        attachments,
    }
}
