//! Runtime configuration (settings.toml).

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::Result;

/// Top-level settings file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub query: QuerySettings,
}

/// Collect-all query tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuerySettings {
    /// How long a collect-all waits for stragglers before marking them
    /// timed out, in milliseconds.
    #[serde(default = "default_deadline_ms")]
    pub deadline_ms: u64,
}

fn default_deadline_ms() -> u64 {
    3000
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self {
            deadline_ms: default_deadline_ms(),
        }
    }
}

impl QuerySettings {
    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }
}

impl Settings {
    /// Loads settings from a toml file.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = tokio::fs::read_to_string(path.as_ref()).await?;
        let settings = toml::from_str(&content)?;
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio::fs;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.query.deadline_ms, 3000);
        assert_eq!(settings.query.deadline(), Duration::from_secs(3));
    }

    #[test]
    fn test_missing_sections_fall_back_to_defaults() {
        let settings: Settings = toml::from_str("").unwrap();
        assert_eq!(settings.query.deadline_ms, 3000);
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.toml");
        fs::write(
            &path,
            r#"
[query]
deadline_ms = 250
"#,
        )
        .await
        .unwrap();

        let settings = Settings::load(&path).await.unwrap();
        assert_eq!(settings.query.deadline(), Duration::from_millis(250));
    }

    #[tokio::test]
    async fn test_load_rejects_bad_toml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.toml");
        fs::write(&path, "[query]\ndeadline_ms = \"soon\"\n").await.unwrap();
        assert!(Settings::load(&path).await.is_err());
    }
}
