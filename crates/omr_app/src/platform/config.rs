use std::path::PathBuf;

use omr_engine::EngineConfig;

pub const SERVICE_URL_VAR: &str = "OMR_SERVICE_URL";
pub const DOWNLOAD_DIR_VAR: &str = "OMR_DOWNLOAD_DIR";

/// Engine settings with the service url and download directory taken from the
/// environment when set.
pub fn engine_config_from_env() -> EngineConfig {
    engine_config_with(|name| std::env::var(name).ok())
}

fn engine_config_with(lookup: impl Fn(&str) -> Option<String>) -> EngineConfig {
    let non_blank = |name: &str| {
        lookup(name)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    };

    let download_dir = non_blank(DOWNLOAD_DIR_VAR)
        .map(PathBuf::from)
        .unwrap_or_else(default_download_dir);
    let mut config = EngineConfig::default_with_download_dir(download_dir);
    if let Some(url) = non_blank(SERVICE_URL_VAR) {
        config.service.base_url = url;
    }
    config
}

fn default_download_dir() -> PathBuf {
    std::env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join("downloads")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_without_environment() {
        let config = engine_config_with(|_| None);
        assert_eq!(config.service.base_url, "http://localhost:8000");
        assert!(config.download_dir.ends_with("downloads"));
    }

    #[test]
    fn environment_overrides_url_and_download_dir() {
        let config = engine_config_with(|name| match name {
            SERVICE_URL_VAR => Some(" https://omr.example.edu/api ".to_string()),
            DOWNLOAD_DIR_VAR => Some("/tmp/omr".to_string()),
            _ => None,
        });
        assert_eq!(config.service.base_url, "https://omr.example.edu/api");
        assert_eq!(config.download_dir, PathBuf::from("/tmp/omr"));
    }

    #[test]
    fn blank_values_are_ignored() {
        let config = engine_config_with(|_| Some("   ".to_string()));
        assert_eq!(config.service.base_url, "http://localhost:8000");
        assert!(config.download_dir.ends_with("downloads"));
    }
}
