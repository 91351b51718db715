use crate::core::config::Config;
use crate::core::error::WizardError;
use crate::core::io::Storage;
use crate::core::settings::Settings;
use crate::core::state::{Character, ImageSlot, Scene, Storyboard, WizardState, WizardStep};
use crate::services::export::{build_archive, candidate_file_name, selected_entries};
use crate::services::generation::{GenerationReport, ImageGenerator};
use crate::services::llm::{create_llm, LlmClient};
use crate::services::pacing::PacedQueue;
use crate::services::script::analyze_script;
use crate::utils::image::load_reference_image;
use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn};
use std::path::Path;
use std::sync::Arc;

/// Owns the wizard state and runs every step of the dialogue-to-images pipeline.
pub struct WorkflowManager {
    config: Config,
    settings: Settings,
    llm: Option<Box<dyn LlmClient>>,
    queue: PacedQueue,
    state: WizardState,
    storage: Arc<dyn Storage>,
    /// Last script sent for analysis, kept so a failed attempt can be retried.
    last_script: String,
}

impl WorkflowManager {
    pub async fn new(config: Config, storage: Arc<dyn Storage>) -> Result<Self> {
        let key = Settings::storage_key(&config.data_folder);
        let settings = Settings::load(storage.as_ref(), &key).await;
        let mut manager = Self::with_client(config, settings, None, storage);
        manager.rebuild_client()?;
        manager.refresh_credential_banner();
        Ok(manager)
    }

    /// Builds a manager around an already constructed client (`None` means no credential).
    pub fn with_client(
        config: Config,
        settings: Settings,
        llm: Option<Box<dyn LlmClient>>,
        storage: Arc<dyn Storage>,
    ) -> Self {
        let queue = PacedQueue::new(config.generation.request_delay());
        let mut manager = Self {
            config,
            settings,
            llm,
            queue,
            state: WizardState::new(),
            storage,
            last_script: String::new(),
        };
        manager.refresh_credential_banner();
        manager
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn state(&self) -> &WizardState {
        &self.state
    }

    fn resolve_api_key(&self) -> Option<String> {
        self.settings
            .api_key
            .clone()
            .or_else(|| self.config.fallback_api_key())
    }

    fn rebuild_client(&mut self) -> Result<()> {
        self.llm = match self.resolve_api_key() {
            Some(key) => Some(create_llm(&self.config, &key)?),
            None => None,
        };
        Ok(())
    }

    fn refresh_credential_banner(&mut self) {
        if self.llm.is_none() {
            self.state.set_error(WizardError::MissingCredential.to_string());
        } else if self.state.error() == Some(WizardError::MissingCredential.to_string().as_str()) {
            self.state.clear_error();
        }
    }

    fn announce_busy(&mut self, message: impl Into<String>) {
        self.state.set_busy(message);
        if let Some(message) = self.state.busy() {
            println!("{}", message);
        }
    }

    fn ensure_client(&mut self) -> Result<(), WizardError> {
        if self.llm.is_none() {
            self.state.set_error(WizardError::MissingCredential.to_string());
            return Err(WizardError::MissingCredential);
        }
        Ok(())
    }

    // --- Settings ---

    pub async fn save_settings(&mut self, settings: Settings) -> Result<()> {
        let settings = settings.normalized();
        let key = Settings::storage_key(&self.config.data_folder);
        settings.save(self.storage.as_ref(), &key).await?;
        info!("Settings saved: {:?}", settings);

        self.settings = settings;
        self.rebuild_client()?;
        self.refresh_credential_banner();
        Ok(())
    }

    // --- Step 1: analysis ---

    /// `.txt` scripts available in the input folder, sorted.
    pub async fn input_scripts(&self) -> Result<Vec<String>> {
        let entries = self.storage.list(&self.config.input_folder).await?;
        Ok(entries.into_iter().filter(|e| e.ends_with(".txt")).collect())
    }

    pub async fn read_script(&self, key: &str) -> Result<String> {
        let bytes = self
            .storage
            .read(key)
            .await
            .with_context(|| format!("Failed to read {}", key))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    pub fn last_script(&self) -> &str {
        &self.last_script
    }

    pub async fn analyze(&mut self, script: &str) -> Result<()> {
        if self.state.step() != WizardStep::Input {
            return Err(WizardError::IllegalTransition {
                action: "analyze a script",
                step: self.state.step(),
            }
            .into());
        }
        if script.trim().is_empty() {
            return Err(WizardError::EmptyScript.into());
        }
        self.last_script = script.to_string();
        self.ensure_client()?;

        self.state.clear_error();
        self.announce_busy("Analyzing dialogue, please wait...");

        let llm = self.llm.as_deref().ok_or(WizardError::MissingCredential)?;
        let result = analyze_script(llm, script).await;
        self.state.clear_busy();

        match result {
            Ok(board) => {
                info!(
                    "Analysis found {} characters and {} scenes",
                    board.characters.len(),
                    board.scenes.len()
                );
                self.state.begin_setup(script.to_string(), board)?;
                Ok(())
            }
            Err(e) => {
                error!("Analysis failed: {:#}", e);
                self.state.set_error(
                    "Could not analyze the dialogue. Check the script format or your API key and try again.",
                );
                Err(e)
            }
        }
    }

    // --- Step 2: setup edits ---

    pub fn rename_character(&mut self, id: &str, name: &str) -> Result<(), WizardError> {
        self.state.setup_mut()?.character_mut(id)?.name = name.to_string();
        Ok(())
    }

    pub fn describe_character(&mut self, id: &str, description: &str) -> Result<(), WizardError> {
        self.state.setup_mut()?.character_mut(id)?.description = description.to_string();
        Ok(())
    }

    /// Loads and attaches a reference image; rejected files leave the character unchanged.
    pub async fn set_reference_image(&mut self, id: &str, path: &Path) -> Result<()> {
        self.state.setup_mut()?.character_mut(id)?;
        let image =
            load_reference_image(path, self.config.generation.max_reference_image_bytes).await?;
        info!("Reference image for {}: {} ({} bytes)", id, image.mime_type, image.data.len());
        self.state.setup_mut()?.character_mut(id)?.reference_image = Some(image);
        Ok(())
    }

    pub fn retitle_scene(&mut self, id: &str, title: &str) -> Result<(), WizardError> {
        self.state.setup_mut()?.scene_mut(id)?.title = title.to_string();
        Ok(())
    }

    // --- Step 2 -> 3: generation ---

    /// Runs every scene, applies whatever was produced and moves to the review step,
    /// even when the run was cut short.
    pub async fn generate_images(&mut self) -> Result<GenerationReport> {
        let (characters, scenes): (Vec<Character>, Vec<Scene>) = {
            let board = self.state.ready_for_generation()?;
            (board.characters.clone(), board.scenes.clone())
        };
        self.ensure_client()?;
        self.state.clear_error();

        let pb = progress_bar(scenes.len() as u64);
        let image_count = self.settings.image_count.get();
        let llm = self.llm.as_deref().ok_or(WizardError::MissingCredential)?;
        let state = &mut self.state;

        let report = ImageGenerator::new(llm, &mut self.queue, image_count)
            .generate_all(&characters, &scenes, &mut |i: usize, total: usize| {
                state.set_busy(format!("Generating images for scene {}/{}...", i, total));
                if let Some(message) = state.busy() {
                    pb.set_message(message.to_string());
                }
                pb.set_position((i - 1) as u64);
            })
            .await;
        pb.finish_with_message("Generation complete");
        self.state.clear_busy();

        apply_report(self.state.setup_mut()?, &report)?;
        self.record_failures(&report);
        self.state.begin_review()?;

        info!(
            "Generated {} images across {} scenes",
            report.images_generated(),
            report.results.len()
        );
        Ok(report)
    }

    // --- Step 3: review ---

    /// Regenerates one scene's candidates; other scenes are left alone.
    pub async fn regenerate_scene(
        &mut self,
        scene_id: &str,
        refinement: &str,
    ) -> Result<GenerationReport> {
        let (characters, scene, scene_number) = {
            let board = self.state.review_mut()?;
            let number = board.scene_number(scene_id)?;
            (board.characters.clone(), board.scene(scene_id)?.clone(), number)
        };
        self.ensure_client()?;
        self.state.clear_error();

        self.announce_busy(format!("Regenerating images for scene {}...", scene_number));

        let image_count = self.settings.image_count.get();
        let llm = self.llm.as_deref().ok_or(WizardError::MissingCredential)?;
        let report = ImageGenerator::new(llm, &mut self.queue, image_count)
            .regenerate(&characters, &scene, scene_number, Some(refinement))
            .await;
        self.state.clear_busy();

        apply_report(self.state.review_mut()?, &report)?;
        self.record_failures(&report);
        Ok(report)
    }

    pub fn select_image(&mut self, scene_id: &str, slot: usize) -> Result<(), WizardError> {
        self.state.review_mut()?.scene_mut(scene_id)?.select(slot)
    }

    /// File names the export would write, for confirmation before packing.
    pub fn export_preview(&self) -> Result<Vec<String>, WizardError> {
        let board = self.state.review()?;
        Ok(selected_entries(board)
            .into_iter()
            .map(|e| e.file_name)
            .collect())
    }

    pub fn default_export_path(&self) -> String {
        Path::new(&self.config.output_folder)
            .join(&self.config.generation.archive_name)
            .to_string_lossy()
            .to_string()
    }

    /// Packs the selected images into a zip written at `destination`; returns the file count.
    pub async fn export(&self, destination: &str) -> Result<usize> {
        let board = self.state.review()?;
        let count = selected_entries(board).len();
        let archive = build_archive(board)?;
        self.storage
            .write(destination, &archive)
            .await
            .with_context(|| format!("Failed to write {}", destination))?;
        info!("Exported {} images to {}", count, destination);
        Ok(count)
    }

    /// Saves one candidate as `scene_{n}_{A|B}.{ext}` in the output folder.
    pub async fn save_candidate(&self, scene_id: &str, slot: usize) -> Result<String> {
        let board = self.state.review()?;
        let scene = board.scene(scene_id)?;
        let image = scene
            .generated_images()
            .get(slot)
            .and_then(ImageSlot::image)
            .ok_or_else(|| WizardError::NoSuchImage {
                scene: scene_id.to_string(),
                slot,
            })?;

        let name = candidate_file_name(board.scene_number(scene_id)?, slot, image);
        let destination = Path::new(&self.config.output_folder)
            .join(name)
            .to_string_lossy()
            .to_string();
        self.storage.write(&destination, &image.data).await?;
        Ok(destination)
    }

    /// Full reset back to step 1.
    pub fn reset(&mut self) {
        self.state.reset();
        self.last_script.clear();
        self.refresh_credential_banner();
    }

    fn record_failures(&mut self, report: &GenerationReport) {
        if let Some(message) = report.last_message() {
            self.state.set_error(message);
        }
        if let Some(kind) = report.fatal {
            warn!("Generation aborted: {:?}", kind);
        }
    }
}

/// Writes each attempted scene's new slots by id, dropping its previous selection.
fn apply_report(board: &mut Storyboard, report: &GenerationReport) -> Result<(), WizardError> {
    for (scene_id, slots) in &report.results {
        board.scene_mut(scene_id)?.replace_images(slots.clone());
    }
    Ok(())
}

fn progress_bar(len: u64) -> ProgressBar {
    let pb = ProgressBar::new(len);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
    {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb
}
