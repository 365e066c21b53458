use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::{BufRead, BufReader, Read};
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::constants::{DEFAULT_PORT, INIT_DELAY_MS};
use crate::init::RefitPolicy;

// Tile URL overrides, first match wins
const TILE_URL_VARS: &[&str] = &["MAP_TILE_URL", "NEXT_PUBLIC_MAP_TILE_URL"];
const LOGS_FILE_VAR: &str = "TRAVEL_LOG_FILE";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub port: u16,
    /// Empty renders no tiles.
    #[serde(default)]
    pub tile_url: String,
    pub logs_file: Option<String>,
    pub init_delay_ms: u64,
    #[serde(with = "refit_serde")]
    pub refit: RefitPolicy,
    #[serde(default)]
    pub auto_open_browser: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            tile_url: String::new(),
            logs_file: None,
            init_delay_ms: INIT_DELAY_MS,
            refit: RefitPolicy::default(),
            auto_open_browser: false,
        }
    }
}

mod refit_serde {
    use super::RefitPolicy;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(policy: &RefitPolicy, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(super::refit_name(*policy))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<RefitPolicy, D::Error> {
        let raw = String::deserialize(d)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

fn refit_name(policy: RefitPolicy) -> &'static str {
    match policy {
        RefitPolicy::Always => "always",
        RefitPolicy::First => "first",
    }
}

impl Settings {
    /// File settings, then environment overrides.
    pub fn load() -> Result<Self> {
        let mut settings = Self::load_from(&Self::config_path())?;
        settings.apply_env(|key| std::env::var(key).ok());
        Ok(settings)
    }

    pub fn load_from(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            return Ok(Settings::default());
        }
        let file = File::open(config_path).context("Failed to open config file")?;
        Self::parse(file)
    }

    pub fn parse<R: Read>(source: R) -> Result<Self> {
        let reader = BufReader::new(source);
        let mut settings = Settings::default();
        let mut config_map = HashMap::new();

        for line in reader.lines() {
            let line = line.context("Failed to read line from config")?;
            let line = line.trim();
            if line.starts_with('#') || line.is_empty() {
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                config_map.insert(key.trim().to_string(), value.trim().trim_matches('"').to_string());
            }
        }

        if let Some(port_str) = config_map.get("port") {
            match port_str.parse::<u16>() {
                Ok(port) => settings.port = port,
                Err(_) => warn!(value = %port_str, "invalid port in config, using default"),
            }
        }
        if let Some(tile_url) = config_map.get("tile_url") {
            settings.tile_url = tile_url.clone();
        }
        if let Some(logs_file) = config_map.get("logs_file") {
            if !logs_file.is_empty() {
                settings.logs_file = Some(logs_file.clone());
            }
        }
        if let Some(delay_str) = config_map.get("init_delay_ms") {
            match delay_str.parse::<u64>() {
                Ok(delay) => settings.init_delay_ms = delay,
                Err(_) => warn!(value = %delay_str, "invalid init_delay_ms in config, using default"),
            }
        }
        if let Some(refit_str) = config_map.get("refit") {
            match refit_str.parse::<RefitPolicy>() {
                Ok(refit) => settings.refit = refit,
                Err(e) => warn!(error = %e, "invalid refit in config, using default"),
            }
        }
        if let Some(auto_open_str) = config_map.get("auto_open_browser") {
            if let Ok(auto_open) = auto_open_str.parse::<bool>() {
                settings.auto_open_browser = auto_open;
            }
        }

        Ok(settings)
    }

    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = TILE_URL_VARS.iter().find_map(|key| lookup(key)) {
            self.tile_url = url;
        }
        if let Some(path) = lookup(LOGS_FILE_VAR).filter(|p| !p.is_empty()) {
            self.logs_file = Some(path);
        }
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).context("Creating config directory")?;
        }
        std::fs::write(&config_path, self.to_ini()).context("Failed to write to config file")?;
        Ok(())
    }

    pub fn to_ini(&self) -> String {
        let mut content = String::new();
        content.push_str("# Travel Log Map Configuration File\n");
        content.push_str(&format!("port = {}\n", self.port));
        content.push_str(&format!("tile_url = \"{}\"\n", self.tile_url));
        if let Some(ref logs_file) = self.logs_file {
            content.push_str(&format!("logs_file = \"{}\"\n", logs_file));
        }
        content.push_str(&format!("init_delay_ms = {}\n", self.init_delay_ms));
        content.push_str(&format!("refit = {}\n", refit_name(self.refit)));
        content.push_str(&format!("auto_open_browser = {}\n", self.auto_open_browser));
        content
    }

    pub fn config_path() -> PathBuf {
        let mut path = std::env::current_exe()
            .unwrap_or_default()
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .to_path_buf();

        if path.ends_with("target/debug") || path.ends_with("target/release") {
            path.pop();
            path.pop();
        }
        path.push("travel_log_map.ini");
        path
    }
}
