pub mod config;
pub mod error;
pub mod io;
pub mod settings;
pub mod state;
