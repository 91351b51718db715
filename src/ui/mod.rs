use crate::core::state::{ImageSlot, Storyboard, WizardStep};
use crate::services::export::slot_label;
use crate::services::setup;
use crate::services::workflow::WorkflowManager;
use anyhow::Result;
use inquire::error::InquireError;
use inquire::{Confirm, Select, Text};
use log::warn;
use std::fmt;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    LoadScript,
    TypeScript,
    ReusePrevious,
    RenameCharacter,
    DescribeCharacter,
    SetReferenceImage,
    RetitleScene,
    Generate,
    SelectImage,
    Regenerate,
    SaveImage,
    Export,
    Settings,
    StartOver,
    Quit,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Action::LoadScript => "Load a script from the input folder",
            Action::TypeScript => "Type or paste a script",
            Action::ReusePrevious => "Analyze the previous script again",
            Action::RenameCharacter => "Rename a character",
            Action::DescribeCharacter => "Describe a character",
            Action::SetReferenceImage => "Set a character's reference image",
            Action::RetitleScene => "Edit a scene title",
            Action::Generate => "Generate images",
            Action::SelectImage => "Select an image for a scene",
            Action::Regenerate => "Regenerate a scene",
            Action::SaveImage => "Save a single image",
            Action::Export => "Export selected images (.zip)",
            Action::Settings => "Settings",
            Action::StartOver => "Start over",
            Action::Quit => "Quit",
        };
        f.write_str(label)
    }
}

/// A labelled choice carrying an id, so prompts show names but act on ids.
struct Choice<T> {
    label: String,
    value: T,
}

impl<T> fmt::Display for Choice<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}

fn is_cancel(e: &InquireError) -> bool {
    matches!(
        e,
        InquireError::OperationCanceled | InquireError::OperationInterrupted
    )
}

/// Runs the three-step wizard until the user quits.
pub async fn run(manager: &mut WorkflowManager) -> Result<()> {
    loop {
        let step = manager.state().step();
        println!();
        println!("== Step {} ==", step);
        if let Some(message) = manager.state().error() {
            println!("! {}", message);
        }

        let action = match prompt_action(manager) {
            Ok(action) => action,
            Err(e) if is_cancel(&e) => Action::Quit,
            Err(e) => return Err(e.into()),
        };
        if action == Action::Quit {
            println!("Bye.");
            return Ok(());
        }

        if let Err(e) = dispatch(manager, action).await {
            match e.downcast_ref::<InquireError>() {
                Some(inner) if is_cancel(inner) => println!("Cancelled."),
                _ => {
                    warn!("{} failed: {:#}", action, e);
                    println!("Error: {}", e);
                }
            }
        }
    }
}

fn prompt_action(manager: &WorkflowManager) -> Result<Action, InquireError> {
    let mut actions = Vec::new();
    match manager.state().step() {
        WizardStep::Input => {
            actions.push(Action::LoadScript);
            actions.push(Action::TypeScript);
            if !manager.last_script().is_empty() {
                actions.push(Action::ReusePrevious);
            }
        }
        WizardStep::SetupReview => {
            if let Some(board) = manager.state().storyboard() {
                print_setup(board);
            }
            actions.extend([
                Action::Generate,
                Action::SetReferenceImage,
                Action::RenameCharacter,
                Action::DescribeCharacter,
                Action::RetitleScene,
                Action::StartOver,
            ]);
        }
        WizardStep::ReviewSelection => {
            if let Some(board) = manager.state().storyboard() {
                print_review(board);
            }
            actions.extend([
                Action::SelectImage,
                Action::Regenerate,
                Action::SaveImage,
                Action::Export,
                Action::StartOver,
            ]);
        }
    }
    actions.push(Action::Settings);
    actions.push(Action::Quit);
    Select::new("What next?", actions).prompt()
}

async fn dispatch(manager: &mut WorkflowManager, action: Action) -> Result<()> {
    match action {
        Action::LoadScript => {
            let scripts = manager.input_scripts().await?;
            if scripts.is_empty() {
                println!(
                    "No .txt scripts in {}. Put one there or type the script instead.",
                    manager.config().input_folder
                );
                return Ok(());
            }
            let key = Select::new("Script:", scripts).prompt()?;
            let script = manager.read_script(&key).await?;
            manager.analyze(&script).await?;
        }
        Action::TypeScript => {
            let script = prompt_multiline()?;
            manager.analyze(&script).await?;
        }
        Action::ReusePrevious => {
            let script = manager.last_script().to_string();
            manager.analyze(&script).await?;
        }
        Action::RenameCharacter => {
            let id = pick_character(manager)?;
            let name = Text::new("New name:").prompt()?;
            manager.rename_character(&id, name.trim())?;
        }
        Action::DescribeCharacter => {
            let id = pick_character(manager)?;
            let description = Text::new("Appearance (used in every prompt):").prompt()?;
            manager.describe_character(&id, description.trim())?;
        }
        Action::SetReferenceImage => {
            let id = pick_character(manager)?;
            let path = Text::new("Path to a PNG or JPEG image:").prompt()?;
            manager.set_reference_image(&id, Path::new(path.trim())).await?;
            println!("Reference image attached.");
        }
        Action::RetitleScene => {
            let id = pick_scene(manager)?;
            let title = Text::new("New title:").prompt()?;
            manager.retitle_scene(&id, title.trim())?;
        }
        Action::Generate => {
            let report = manager.generate_images().await?;
            println!(
                "Generated {} images for {} scenes.",
                report.images_generated(),
                report.results.len()
            );
        }
        Action::SelectImage => {
            let id = pick_scene(manager)?;
            let slot = pick_candidate(manager, &id)?;
            manager.select_image(&id, slot)?;
        }
        Action::Regenerate => {
            let id = pick_scene(manager)?;
            let refinement = Text::new("Extra instructions (optional):").prompt()?;
            let report = manager.regenerate_scene(&id, &refinement).await?;
            println!("Regenerated {} images.", report.images_generated());
        }
        Action::SaveImage => {
            let id = pick_scene(manager)?;
            let slot = pick_candidate(manager, &id)?;
            let path = manager.save_candidate(&id, slot).await?;
            println!("Saved {}", path);
        }
        Action::Export => export(manager).await?,
        Action::Settings => {
            if let Some(settings) = setup::run_setup(manager.settings())? {
                manager.save_settings(settings).await?;
                println!("Settings saved.");
            }
        }
        Action::StartOver => {
            let confirmed = Confirm::new("Discard this storyboard and start over?")
                .with_default(false)
                .prompt()?;
            if confirmed {
                manager.reset();
            }
        }
        Action::Quit => {}
    }
    Ok(())
}

async fn export(manager: &WorkflowManager) -> Result<()> {
    let files = manager.export_preview()?;
    if files.is_empty() {
        println!("Select at least one image before exporting.");
        return Ok(());
    }
    println!("The archive will contain {} files:", files.len());
    for file in &files {
        println!("  {}", file);
    }

    let default_path = manager.default_export_path();
    let destination = if manager.config().unattended {
        default_path
    } else {
        match Text::new("Save archive to:")
            .with_default(&default_path)
            .prompt()
        {
            Ok(path) => path.trim().to_string(),
            Err(e) if is_cancel(&e) => {
                println!("Export cancelled.");
                return Ok(());
            }
            Err(e) => {
                warn!("Save location prompt failed ({}), using {}", e, default_path);
                default_path
            }
        }
    };

    let count = manager.export(&destination).await?;
    println!("Exported {} images to {}", count, destination);
    Ok(())
}

/// Reads lines until an empty one.
fn prompt_multiline() -> Result<String, InquireError> {
    println!("Enter the dialogue one line at a time (e.g. JOHN: Hi). Finish with an empty line.");
    let mut lines = Vec::new();
    loop {
        let line = Text::new(">").prompt()?;
        if line.trim().is_empty() {
            break;
        }
        lines.push(line);
    }
    Ok(lines.join("\n"))
}

fn storyboard(manager: &WorkflowManager) -> Result<&Storyboard> {
    manager
        .state()
        .storyboard()
        .ok_or_else(|| anyhow::anyhow!("No storyboard yet"))
}

fn pick_character(manager: &WorkflowManager) -> Result<String> {
    let choices: Vec<Choice<String>> = storyboard(manager)?
        .characters
        .iter()
        .map(|c| Choice {
            label: c.name.clone(),
            value: c.id.clone(),
        })
        .collect();
    Ok(Select::new("Character:", choices).prompt()?.value)
}

fn pick_scene(manager: &WorkflowManager) -> Result<String> {
    let choices: Vec<Choice<String>> = storyboard(manager)?
        .scenes
        .iter()
        .enumerate()
        .map(|(i, s)| Choice {
            label: format!("Scene {}: {}", i + 1, s.title),
            value: s.id.clone(),
        })
        .collect();
    Ok(Select::new("Scene:", choices).prompt()?.value)
}

fn pick_candidate(manager: &WorkflowManager, scene_id: &str) -> Result<usize> {
    let scene = storyboard(manager)?.scene(scene_id)?;
    let choices: Vec<Choice<usize>> = scene
        .generated_images()
        .iter()
        .enumerate()
        .filter_map(|(i, slot)| {
            slot.image().map(|image| Choice {
                label: format!("Image {} ({}, {} KB)", slot_label(i), image.mime_type, image.data.len() / 1024),
                value: i,
            })
        })
        .collect();
    if choices.is_empty() {
        anyhow::bail!("Scene has no generated images; regenerate it first");
    }
    Ok(Select::new("Image:", choices).prompt()?.value)
}

fn print_setup(board: &Storyboard) {
    let complete = board.characters.iter().filter(|c| c.is_complete()).count();
    println!("Characters ({}/{} ready):", complete, board.characters.len());
    for c in &board.characters {
        let mark = if c.is_complete() { "x" } else { " " };
        let description = if c.description.is_empty() { "-" } else { c.description.as_str() };
        println!("  [{}] {}: {}", mark, c.name, description);
    }
    println!("Scenes:");
    for (i, s) in board.scenes.iter().enumerate() {
        println!("  {}. {}  |  {}", i + 1, s.title, s.dialogue);
    }
}

fn print_review(board: &Storyboard) {
    for (i, s) in board.scenes.iter().enumerate() {
        let slots: Vec<String> = s
            .generated_images()
            .iter()
            .enumerate()
            .map(|(j, slot)| {
                let label = slot_label(j);
                match slot {
                    ImageSlot::Empty => format!("{}: failed", label),
                    ImageSlot::Image(_) if s.selected_slot() == Some(j) => format!("{}: selected", label),
                    ImageSlot::Image(_) => format!("{}: ready", label),
                }
            })
            .collect();
        let summary = if slots.is_empty() {
            "not generated".to_string()
        } else {
            slots.join(", ")
        };
        println!("  {}. {} [{}]", i + 1, s.title, summary);
    }
}
