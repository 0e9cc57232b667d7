use anyhow::Context;
use merge_matcher::MatcherConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub matcher: MatcherConfig,
    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Filter directive used when `RUST_LOG` is not set.
    #[serde(default = "default_level")]
    pub level: String,
    /// Also write logs to `treemerge.log` in this directory.
    #[serde(default)]
    pub dir: Option<PathBuf>,
    #[serde(default = "default_true")]
    pub ansi: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_level(),
            dir: None,
            ansi: default_true(),
        }
    }
}

fn default_level() -> String {
    "info".into()
}
fn default_true() -> bool {
    true
}

impl Settings {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading settings from {}", path.display()))?;
        let settings: Settings = serde_json::from_str(&content)
            .with_context(|| format!("parsing settings in {}", path.display()))?;
        settings.matcher.cost_model.validate()?;
        Ok(settings)
    }

    /// Loads `path` if given, the defaults otherwise.
    pub fn load_or_default(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    /// Writes the settings as pretty JSON. Uses tmp+rename so readers never
    /// see a partial file.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, content)?;
        std::fs::rename(&tmp, path)
            .with_context(|| format!("writing settings to {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");

        let mut settings = Settings::default();
        settings.matcher.use_cost_model = true;
        settings.matcher.cost_model.iterations = 7;
        settings.logging.dir = Some(dir.path().join("logs"));
        settings.save(&path).unwrap();

        let loaded = Settings::load(&path).unwrap();
        assert!(loaded.matcher.use_cost_model);
        assert_eq!(loaded.matcher.cost_model.iterations, 7);
        assert_eq!(loaded.logging.dir, settings.logging.dir);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_missing_sections_use_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"matcher": {"cost_model": {"beta": 5.0}}}"#).unwrap();

        let loaded = Settings::load(&path).unwrap();
        assert!(loaded.matcher.use_equality_matcher);
        assert_eq!(loaded.matcher.cost_model.beta, 5.0);
        assert_eq!(loaded.matcher.cost_model.iterations, 100);
        assert_eq!(loaded.logging.level, "info");
    }

    #[test]
    fn test_invalid_parameters_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"matcher": {"cost_model": {"p_assign": 1.5}}}"#).unwrap();

        let err = Settings::load(&path).unwrap_err();
        assert!(err.to_string().contains("p_assign"), "{err}");
    }

    #[test]
    fn test_load_or_default_without_path() {
        let settings = Settings::load_or_default(None).unwrap();
        assert!(!settings.matcher.use_cost_model);
    }
}
