use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;

/// Database filename inside the state directory.
const DATABASE_FILE: &str = "conveyor.db";

#[derive(Clone, Debug)]
pub struct Config {
    /// Directory for persistent state (SQLite database).
    /// Defaults to current working directory.
    pub state_dir: PathBuf,
    /// Actor name recorded on runs started by this process when the caller
    /// does not supply one (e.g. background automation).
    pub default_actor: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let state_dir = env::var("CONVEYOR_STATE_DIR")
            .map(PathBuf::from)
            .or_else(|_| env::current_dir())
            .context("CONVEYOR_STATE_DIR not set and current directory is unavailable")?;

        let default_actor =
            env::var("CONVEYOR_ACTOR").unwrap_or_else(|_| "conveyor".to_string());

        Ok(Self {
            state_dir,
            default_actor,
        })
    }

    /// Path to the SQLite database file.
    pub fn database_path(&self) -> PathBuf {
        self.state_dir.join(DATABASE_FILE)
    }
}
