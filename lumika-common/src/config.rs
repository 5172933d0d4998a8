//! Configuration loading and root folder resolution

use crate::{Error, Result};
use std::path::PathBuf;

/// Root folder resolution priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. TOML config file
/// 4. OS-dependent compiled default (fallback)
pub fn resolve_root_folder(
    cli_arg: Option<&str>,
    env_var_name: &str,
    config_file_key: Option<&str>,
) -> Result<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Ok(PathBuf::from(path));
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        return Ok(PathBuf::from(path));
    }

    // Priority 3: TOML config file
    if let Some(key) = config_file_key {
        if let Ok(config_path) = load_config_file() {
            if let Ok(toml_content) = std::fs::read_to_string(&config_path) {
                if let Ok(config) = toml::from_str::<toml::Value>(&toml_content) {
                    if let Some(root_folder) = config.get(key).and_then(|v| v.as_str()) {
                        return Ok(PathBuf::from(root_folder));
                    }
                }
            }
        }
    }

    // Priority 4: OS-dependent compiled default
    Ok(get_default_root_folder())
}

/// Get default configuration file path for the platform
fn load_config_file() -> Result<PathBuf> {
    let config_dir = if cfg!(target_os = "linux") {
        // Try ~/.config/lumika/config.toml first, then /etc/lumika/config.toml
        let user_config = dirs::config_dir().map(|d| d.join("lumika").join("config.toml"));
        let system_config = PathBuf::from("/etc/lumika/config.toml");

        if let Some(path) = user_config {
            if path.exists() {
                return Ok(path);
            }
        }
        if system_config.exists() {
            return Ok(system_config);
        }
        return Err(Error::Config("No config file found".to_string()));
    } else if cfg!(target_os = "macos") || cfg!(target_os = "windows") {
        dirs::config_dir()
            .map(|d| d.join("lumika").join("config.toml"))
            .ok_or_else(|| Error::Config("Could not determine config directory".to_string()))?
    } else {
        return Err(Error::Config("Unsupported platform".to_string()));
    };

    if config_dir.exists() {
        Ok(config_dir)
    } else {
        Err(Error::Config(format!(
            "Config file not found: {:?}",
            config_dir
        )))
    }
}

/// Get OS-dependent default root folder path
fn get_default_root_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        // ~/.local/share/lumika (or /var/lib/lumika for system-wide)
        dirs::data_local_dir()
            .map(|d| d.join("lumika"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/lumika"))
    } else if cfg!(target_os = "macos") {
        // ~/Library/Application Support/lumika
        dirs::data_dir()
            .map(|d| d.join("lumika"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/lumika"))
    } else if cfg!(target_os = "windows") {
        // %LOCALAPPDATA%\lumika
        dirs::data_local_dir()
            .map(|d| d.join("lumika"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\lumika"))
    } else {
        PathBuf::from("./lumika_data")
    }
}

/// On-disk layout of the Lumika data directory.
///
/// The root folder holds the SQLite database plus the derivative cache
/// (thumbnails, video posters) keyed by media id.
#[derive(Debug, Clone)]
pub struct DataLayout {
    root: PathBuf,
}

impl DataLayout {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &PathBuf {
        &self.root
    }

    /// Path of the shared SQLite database
    pub fn database_path(&self) -> PathBuf {
        self.root.join("lumika.db")
    }

    /// Directory receiving encoded derivatives, one subdirectory per media id
    pub fn derivative_cache_dir(&self) -> PathBuf {
        self.root.join("cache")
    }

    /// Create the root folder and cache directory if missing
    pub fn ensure_directories(&self) -> Result<()> {
        std::fs::create_dir_all(&self.root)?;
        std::fs::create_dir_all(self.derivative_cache_dir())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_argument_wins() {
        let root = resolve_root_folder(Some("/tmp/explicit"), "LUMIKA_TEST_UNSET", None).unwrap();
        assert_eq!(root, PathBuf::from("/tmp/explicit"));
    }

    #[test]
    fn layout_paths_derive_from_root() {
        let layout = DataLayout::new(PathBuf::from("/data/lumika"));
        assert_eq!(layout.database_path(), PathBuf::from("/data/lumika/lumika.db"));
        assert_eq!(
            layout.derivative_cache_dir(),
            PathBuf::from("/data/lumika/cache")
        );
    }
}
