use std::path::PathBuf;
use std::time::Duration;

use anyhow::{ensure, Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;

/// Run configuration. Built once and passed by value; nothing reads it globally.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub database: PathBuf,
    /// Per-document network timeout.
    pub timeout_secs: u64,
    /// Documents committed per transaction.
    pub batch_size: usize,
    pub ftp_workers: usize,
    pub http_workers: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            database: PathBuf::from("data/repec.sqlite"),
            timeout_secs: 60,
            batch_size: 1000,
            ftp_workers: 8,
            http_workers: 32,
        }
    }
}

impl Settings {
    /// Defaults, then `redif.toml` if present, then `REDIF_*` environment variables.
    pub fn load() -> Result<Self> {
        let d = Settings::default();
        let settings: Settings = Config::builder()
            .set_default("database", d.database.to_string_lossy().into_owned())?
            .set_default("timeout_secs", d.timeout_secs)?
            .set_default("batch_size", d.batch_size as u64)?
            .set_default("ftp_workers", d.ftp_workers as u64)?
            .set_default("http_workers", d.http_workers as u64)?
            .add_source(File::with_name("redif").required(false))
            .add_source(Environment::with_prefix("REDIF").try_parsing(true))
            .build()
            .context("Failed to read configuration")?
            .try_deserialize()
            .context("Invalid configuration")?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(self.batch_size > 0, "batch_size must be at least 1");
        ensure!(self.ftp_workers > 0, "ftp_workers must be at least 1");
        ensure!(self.http_workers > 0, "http_workers must be at least 1");
        ensure!(self.timeout_secs > 0, "timeout_secs must be at least 1");
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
