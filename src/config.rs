use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct CookiejarConfig {
    /// `:memory:` or a database file path
    pub database: Option<String>,
    /// Log every statement sent to the store
    pub echo: Option<bool>,
}

impl CookiejarConfig {
    /// Fill unset fields from `other`
    pub fn or(self, other: CookiejarConfig) -> Self {
        Self {
            database: self.database.or(other.database),
            echo: self.echo.or(other.echo),
        }
    }
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from("cookiejar.toml")
}

pub fn load_config(path: Option<&Path>) -> Result<Option<CookiejarConfig>> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
    if !path.exists() {
        return Ok(None);
    }

    let contents = std::fs::read_to_string(&path)?;
    let config: CookiejarConfig = toml::from_str(&contents)
        .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
    tracing::debug!("Loaded config from {}", path.display());
    Ok(Some(config))
}

pub fn write_config(path: &Path, config: &CookiejarConfig, force: bool) -> Result<()> {
    if path.exists() && !force {
        return Err(Error::Config(format!(
            "config already exists at {} (use --force to overwrite)",
            path.display()
        )));
    }

    let contents = toml::to_string_pretty(config).map_err(|e| Error::Config(e.to_string()))?;
    std::fs::write(path, contents)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_config_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_config(Some(&dir.path().join("nope.toml"))).unwrap().is_none());
    }

    #[test]
    fn test_write_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cookiejar.toml");
        let config = CookiejarConfig {
            database: Some("jar.db".into()),
            echo: Some(true),
        };
        write_config(&path, &config, false).unwrap();
        assert_eq!(load_config(Some(&path)).unwrap(), Some(config.clone()));

        assert!(matches!(write_config(&path, &config, false), Err(Error::Config(_))));
        write_config(&path, &config, true).unwrap();
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cookiejar.toml");
        std::fs::write(&path, "echo = \"loud\"").unwrap();
        assert!(matches!(load_config(Some(&path)), Err(Error::Config(_))));
    }

    #[test]
    fn test_flags_override_file() {
        let flags = CookiejarConfig { database: None, echo: Some(true) };
        let file = CookiejarConfig { database: Some("jar.db".into()), echo: Some(false) };
        let merged = flags.or(file);
        assert_eq!(merged.database.as_deref(), Some("jar.db"));
        assert_eq!(merged.echo, Some(true));
    }
}
