//! Loading and saving configuration files.

use std::fs;
use std::path::{Path, PathBuf};

use quick_xml::de::from_str;
use quick_xml::se::to_string;

use super::{ConfigError, StackerConfig};

fn is_json(path: &Path) -> bool {
    path.extension().map(|e| e == "json").unwrap_or(false)
}

/// Load and validate a configuration file (JSON by extension, XML otherwise).
pub fn load_config(path: &Path) -> Result<StackerConfig, ConfigError> {
    let contents = fs::read_to_string(path)?;

    let config: StackerConfig = if is_json(path) {
        serde_json::from_str(&contents)?
    } else {
        from_str(&contents)?
    };

    config.validate()?;
    tracing::info!(path = %path.display(), "loaded configuration");
    Ok(config)
}

/// Save a configuration file, creating parent directories.
pub fn save_config(config: &StackerConfig, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let contents = if is_json(path) {
        serde_json::to_string_pretty(config)?
    } else {
        let xml = to_string(config)?;
        format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n{}", xml)
    };

    fs::write(path, contents)?;
    Ok(())
}

/// `<config dir>/can-stacker/config.xml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|mut p| {
        p.push("can-stacker");
        p.push("config.xml");
        p
    })
}

/// Explicit path, else the per-user default if present, else built-in defaults.
pub fn resolve_config(explicit: Option<&Path>) -> Result<StackerConfig, ConfigError> {
    if let Some(path) = explicit {
        return load_config(path);
    }

    match default_config_path() {
        Some(path) if path.exists() => load_config(&path),
        _ => {
            tracing::info!("no configuration file found, using defaults");
            Ok(StackerConfig::default())
        }
    }
}
