use serde::Deserialize;
use std::path::Path;

/// Server runtime configuration, loaded from a TOML file.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_world_path")]
    pub world_path: String,
    /// Seconds a session may sit idle before the connection closes.
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    #[serde(default = "default_region_width")]
    pub region_width: u32,
    #[serde(default = "default_region_height")]
    pub region_height: u32,
    /// Seconds between periodic world saves; 0 disables autosave.
    #[serde(default = "default_autosave_interval_secs")]
    pub autosave_interval_secs: u64,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_bind() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    8040
}
fn default_world_path() -> String {
    "./data/world.json".to_string()
}
fn default_idle_timeout_secs() -> u64 {
    20
}
fn default_region_width() -> u32 {
    10
}
fn default_region_height() -> u32 {
    10
}
fn default_autosave_interval_secs() -> u64 {
    300
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind: default_bind(),
            port: default_port(),
            world_path: default_world_path(),
            idle_timeout_secs: default_idle_timeout_secs(),
            region_width: default_region_width(),
            region_height: default_region_height(),
            autosave_interval_secs: default_autosave_interval_secs(),
            log_level: default_log_level(),
        }
    }
}

impl ServerConfig {
    pub fn from_file(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Cannot read {}: {}", path.display(), e))?;
        Self::from_toml_str(&content, path)
    }

    pub fn from_toml_str(content: &str, source_path: &Path) -> Result<Self, String> {
        let config: ServerConfig =
            toml::from_str(content).map_err(|e| format!("{}: {}", source_path.display(), e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), String> {
        let mut errors = Vec::new();

        if !(1024..=65535).contains(&self.port) {
            errors.push(format!(
                "port must be 1024-65535, got {}. Example: port = 8040",
                self.port
            ));
        }

        if self.idle_timeout_secs == 0 {
            errors.push(format!(
                "idle_timeout_secs must be > 0, got {}. Example: idle_timeout_secs = 20",
                self.idle_timeout_secs
            ));
        }

        if self.region_width == 0 || self.region_height == 0 {
            errors.push(format!(
                "region dimensions must be > 0, got {}x{}. Example: region_width = 10",
                self.region_width, self.region_height
            ));
        }

        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.log_level.as_str()) {
            errors.push(format!(
                "log_level must be one of {:?}, got '{}'. Example: log_level = \"info\"",
                valid_levels, self.log_level
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors.join("\n"))
        }
    }
}
