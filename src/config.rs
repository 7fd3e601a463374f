use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::coordinator::DEFAULT_PORT;
use crate::prelude::*;

/// Settings loadable from an optional TOML file, with CLI flags (see
/// `main.rs`) layered over whatever this resolves to. All fields are
/// optional in the file itself; `resolve` fills in defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileConfig {
    pub display_name: Option<String>,
    pub save_dir: Option<PathBuf>,
    pub port: Option<u16>,
}

impl FileConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config = toml::from_str(&contents)?;
        Ok(config)
    }
}

/// Fully-resolved configuration the application actually runs with.
#[derive(Debug, Clone)]
pub struct Config {
    pub display_name: String,
    pub save_dir: PathBuf,
    pub port: u16,
}

impl Config {
    /// Builds a `Config` from an optional loaded file, falling back to
    /// this host's name, `~/Downloads` (or the current directory if the
    /// home directory can't be resolved), and the default port.
    pub fn resolve(file: Option<FileConfig>) -> Self {
        let file = file.unwrap_or_default();

        let display_name = file
            .display_name
            .unwrap_or_else(crate::discovery::local_instance_name);

        let save_dir = file.save_dir.unwrap_or_else(default_save_dir);

        let port = file.port.unwrap_or(DEFAULT_PORT);

        Self {
            display_name,
            save_dir,
            port,
        }
    }
}

fn default_save_dir() -> PathBuf {
    match dirs::home_dir() {
        Some(home) => home.join("Downloads"),
        None => {
            warn!("could not resolve a home directory, saving files to the current directory");
            PathBuf::from(".")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_without_a_file_fills_in_defaults() {
        let config = Config::resolve(None);
        assert_eq!(config.port, DEFAULT_PORT);
        assert!(!config.display_name.is_empty());
    }

    #[test]
    fn resolve_prefers_file_values_when_present() {
        let file = FileConfig {
            display_name: Some("explicit-name".to_owned()),
            save_dir: Some(PathBuf::from("/tmp/explicit")),
            port: Some(1234),
        };
        let config = Config::resolve(Some(file));
        assert_eq!(config.display_name, "explicit-name");
        assert_eq!(config.save_dir, PathBuf::from("/tmp/explicit"));
        assert_eq!(config.port, 1234);
    }

    #[test]
    fn load_parses_a_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("peerdrop.toml");
        std::fs::write(&path, "display_name = \"bob\"\nport = 9090\n").unwrap();

        let file = FileConfig::load(&path).unwrap();
        assert_eq!(file.display_name.as_deref(), Some("bob"));
        assert_eq!(file.port, Some(9090));
        assert_eq!(file.save_dir, None);
    }
}
