use crate::core::settings::{ImageCount, Settings};
use anyhow::Result;
use inquire::error::InquireError;
use inquire::{Password, PasswordDisplayMode, Select};
use std::fmt;

/// What to do with the stored API key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyChoice {
    Keep,
    Replace(String),
    Clear,
}

impl fmt::Display for KeyChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyChoice::Keep => f.write_str("Keep the current key"),
            KeyChoice::Replace(_) => f.write_str("Enter a new key"),
            KeyChoice::Clear => f.write_str("Remove the stored key"),
        }
    }
}

/// New settings from the dialog's answers. A blank replacement clears the key.
pub fn apply_choices(current: &Settings, key: KeyChoice, image_count: ImageCount) -> Settings {
    let api_key = match key {
        KeyChoice::Keep => current.api_key.clone(),
        KeyChoice::Replace(key) => Some(key),
        KeyChoice::Clear => None,
    };
    Settings {
        api_key,
        image_count,
    }
    .normalized()
}

/// Interactive settings dialog. `Ok(None)` means the user cancelled.
pub fn run_setup(current: &Settings) -> Result<Option<Settings>> {
    match prompt_settings(current) {
        Ok(settings) => Ok(Some(settings)),
        Err(InquireError::OperationCanceled) | Err(InquireError::OperationInterrupted) => {
            println!("Settings unchanged.");
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

fn prompt_settings(current: &Settings) -> Result<Settings, InquireError> {
    println!("Gemini API key: get one at https://aistudio.google.com/app/apikey");
    println!("The key is stored only on this machine.");

    let key = if current.api_key.is_some() {
        let options = vec![
            KeyChoice::Keep,
            KeyChoice::Replace(String::new()),
            KeyChoice::Clear,
        ];
        match Select::new("API key:", options).prompt()? {
            KeyChoice::Replace(_) => KeyChoice::Replace(prompt_key()?),
            other => other,
        }
    } else {
        KeyChoice::Replace(prompt_key()?)
    };

    let counts = vec![ImageCount::One, ImageCount::Two];
    let cursor = counts
        .iter()
        .position(|c| *c == current.image_count)
        .unwrap_or(1);
    let image_count = Select::new("Images per scene:", counts)
        .with_starting_cursor(cursor)
        .prompt()?;

    Ok(apply_choices(current, key, image_count))
}

fn prompt_key() -> Result<String, InquireError> {
    Password::new("Enter your Gemini API key (leave blank to clear):")
        .with_display_mode(PasswordDisplayMode::Masked)
        .without_confirmation()
        .prompt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn current() -> Settings {
        Settings {
            api_key: Some("old".to_string()),
            image_count: ImageCount::Two,
        }
    }

    #[test]
    fn test_keep_and_replace() {
        let kept = apply_choices(&current(), KeyChoice::Keep, ImageCount::One);
        assert_eq!(kept.api_key.as_deref(), Some("old"));
        assert_eq!(kept.image_count, ImageCount::One);

        let replaced = apply_choices(&current(), KeyChoice::Replace(" new ".into()), ImageCount::Two);
        assert_eq!(replaced.api_key.as_deref(), Some("new"));
    }

    #[test]
    fn test_blank_or_clear_removes_key() {
        let blank = apply_choices(&current(), KeyChoice::Replace(String::new()), ImageCount::Two);
        assert!(blank.api_key.is_none());
        let cleared = apply_choices(&current(), KeyChoice::Clear, ImageCount::Two);
        assert!(cleared.api_key.is_none());
    }
}
