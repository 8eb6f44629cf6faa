use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::domain::Mode;

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoredSettings {
    #[serde(default)]
    mode: Option<String>,
}

/// The persisted filtering mode, kept as `{"mode": "..."}`.
#[derive(Debug, Clone)]
pub struct ModeStore {
    path: PathBuf,
}

impl ModeStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// A missing file or empty value reads as [`Mode::Off`].
    pub async fn load(&self) -> Result<Mode> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Mode::Off),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to read {}", self.path.display()))
            }
        };
        let settings: StoredSettings = serde_json::from_str(&raw)
            .with_context(|| format!("{} is not valid settings JSON", self.path.display()))?;
        Ok(Mode::from_optional(settings.mode.as_deref())?)
    }

    pub async fn save(&self, mode: Mode) -> Result<()> {
        let settings = StoredSettings {
            mode: Some(mode.as_str().to_string()),
        };
        let body = serde_json::to_vec_pretty(&settings)?;
        tokio::fs::write(&self.path, body)
            .await
            .with_context(|| format!("failed to write {}", self.path.display()))?;
        tracing::debug!(target: "mode", mode = %mode, path = %self.path.display(), "mode persisted");
        Ok(())
    }
}
