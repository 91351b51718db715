use crate::core::state::{Character, Scene, Storyboard};
use crate::services::llm::LlmClient;
use crate::services::prompt::{analysis_schema, build_analysis_prompt};
use anyhow::{anyhow, Context, Result};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct AnalysisResult {
    characters: Vec<String>,
    scenes: Vec<AnalysisScene>,
}

#[derive(Debug, Deserialize)]
struct AnalysisScene {
    title: String,
    dialogue: String,
}

/// Sends the script to the model once and turns the structured answer into a storyboard.
///
/// Nothing is retried; any failure leaves the caller's state as it was.
pub async fn analyze_script(llm: &dyn LlmClient, script: &str) -> Result<Storyboard> {
    let prompt = build_analysis_prompt(script);
    let response = llm.generate_json(&prompt, &analysis_schema()).await?;
    parse_response(&response)
}

pub fn parse_response(response: &str) -> Result<Storyboard> {
    let clean_json = strip_code_blocks(response);
    let analysis: AnalysisResult = serde_json::from_str(&clean_json)
        .context(format!("Failed to parse analysis JSON: {}", clean_json))?;

    if analysis.scenes.is_empty() {
        return Err(anyhow!("Analysis returned no dialogue lines"));
    }

    let mut names: Vec<String> = Vec::new();
    for name in analysis.characters {
        let name = name.trim().to_string();
        if !name.is_empty() && !names.contains(&name) {
            names.push(name);
        }
    }

    let characters = names
        .into_iter()
        .enumerate()
        .map(|(i, name)| Character::new(i, name))
        .collect();

    let scenes = analysis
        .scenes
        .into_iter()
        .enumerate()
        .map(|(i, s)| Scene::new(i, s.title, s.dialogue))
        .collect();

    Ok(Storyboard { characters, scenes })
}

pub fn strip_code_blocks(s: &str) -> String {
    let s = s.trim();
    if s.starts_with("```json") {
        s.trim_start_matches("```json").trim_end_matches("```").trim().to_string()
    } else if s.starts_with("```") {
        s.trim_start_matches("```").trim_end_matches("```").trim().to_string()
    } else {
        s.to_string()
    }
}
