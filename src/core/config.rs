use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

pub const CONFIG_PATH: &str = "config.yml";

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_input")]
    pub input_folder: String,

    #[serde(default = "default_output")]
    pub output_folder: String,

    #[serde(default = "default_data")]
    pub data_folder: String,

    #[serde(default)]
    pub unattended: bool,

    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub generation: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_provider")]
    pub provider: String, // only "gemini" for now
    pub gemini: Option<GeminiConfig>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GeminiConfig {
    /// Fallback credential, used when the user has not saved one in settings.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_text_model")]
    pub text_model: String,
    #[serde(default = "default_image_model")]
    pub image_model: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,
    #[serde(default = "default_max_reference_image_bytes")]
    pub max_reference_image_bytes: u64,
    #[serde(default = "default_archive_name")]
    pub archive_name: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            input_folder: default_input(),
            output_folder: default_output(),
            data_folder: default_data(),
            unattended: false,
            llm: LlmConfig::default(),
            generation: GenerationConfig::default(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            gemini: Some(GeminiConfig::default()),
        }
    }
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            text_model: default_text_model(),
            image_model: default_image_model(),
            base_url: default_base_url(),
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            request_delay_ms: default_request_delay_ms(),
            max_reference_image_bytes: default_max_reference_image_bytes(),
            archive_name: default_archive_name(),
        }
    }
}

impl GenerationConfig {
    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }
}

fn default_input() -> String {
    "input".to_string()
}
fn default_output() -> String {
    "output".to_string()
}
fn default_data() -> String {
    "data".to_string()
}
fn default_provider() -> String {
    "gemini".to_string()
}
fn default_text_model() -> String {
    "gemini-2.5-flash".to_string()
}
fn default_image_model() -> String {
    "gemini-2.5-flash-image-preview".to_string()
}
fn default_base_url() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}
fn default_request_delay_ms() -> u64 {
    5000
}
fn default_max_reference_image_bytes() -> u64 {
    2 * 1024 * 1024
}
fn default_archive_name() -> String {
    "image_generator_scenes.zip".to_string()
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = Path::new(CONFIG_PATH);
        if !path.exists() {
            log::info!("{} not found, writing defaults", CONFIG_PATH);
            let config = Config::default();
            config.save()?;
            return Ok(config);
        }
        Self::load_from(path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: Config = serde_yaml_ng::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(Path::new(CONFIG_PATH))
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let content = serde_yaml_ng::to_string(self)?;
        fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }

    pub fn ensure_directories(&self) -> Result<()> {
        fs::create_dir_all(&self.input_folder)?;
        fs::create_dir_all(&self.output_folder)?;
        fs::create_dir_all(&self.data_folder)?;
        Ok(())
    }

    pub fn gemini(&self) -> Result<&GeminiConfig> {
        match self.llm.provider.as_str() {
            "gemini" => self
                .llm
                .gemini
                .as_ref()
                .ok_or_else(|| anyhow!("Gemini config missing")),
            other => Err(anyhow!("Unknown LLM provider: {}", other)),
        }
    }

    /// Credential fallback used when settings carry no key: config file, then environment.
    pub fn fallback_api_key(&self) -> Option<String> {
        let from_config = self
            .llm
            .gemini
            .as_ref()
            .and_then(|g| g.api_key.clone())
            .filter(|k| !k.trim().is_empty());

        from_config.or_else(|| {
            ["GEMINI_API_KEY", "API_KEY"]
                .iter()
                .filter_map(|name| std::env::var(name).ok())
                .find(|k| !k.trim().is_empty())
        })
    }
}
