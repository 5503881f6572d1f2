//! Where vinyl keeps its configuration

use std::path::PathBuf;

/// File name of the main configuration file
pub const CONFIG_FILE_NAME: &str = "config.yaml";

/// Per-user configuration directory
///
/// `$XDG_CONFIG_HOME/vinyl` on Linux, the platform equivalent elsewhere,
/// or `./.vinyl` if the platform reports no config directory.
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .map(|dir| dir.join("vinyl"))
        .unwrap_or_else(|| PathBuf::from(".vinyl"))
}

/// Full path of the main configuration file
pub fn default_config_path() -> PathBuf {
    default_config_dir().join(CONFIG_FILE_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_dir_is_app_specific() {
        let dir = default_config_dir();
        assert!(dir.ends_with("vinyl") || dir.ends_with(".vinyl"));
    }

    #[test]
    fn test_config_path_includes_filename() {
        assert!(default_config_path().ends_with(CONFIG_FILE_NAME));
    }
}
