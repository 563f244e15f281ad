pub mod audio;
pub mod commands;
pub mod db;
pub mod models;
pub mod notify;
pub mod sensing;
pub mod settings;
pub mod timer;
pub mod utils;

pub use db::Database;
pub use sensing::{DetectorClient, SensingController};
pub use settings::SettingsStore;
pub use timer::PhaseController;
