use anyhow::Result;
use dialogue2cartoon::core::config::Config;
use dialogue2cartoon::core::io::{NativeStorage, Storage};
use dialogue2cartoon::services::workflow::WorkflowManager;
use dialogue2cartoon::ui;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    // 1. Load or create config
    let config = match Config::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Error loading config: {}", e);
            eprintln!("Please fix or delete 'config.yml' to regenerate the defaults.");
            return Err(e);
        }
    };

    config.ensure_directories()?;

    // 2. Settings and the Gemini client
    let storage: Arc<dyn Storage> = Arc::new(NativeStorage::new("."));
    let mut manager = WorkflowManager::new(config, storage).await?;

    // 3. Run the wizard
    ui::run(&mut manager).await
}
