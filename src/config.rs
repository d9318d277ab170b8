//! ==============================================================================
//! config.rs - Runtime Configuration Loader
//! ==============================================================================
//!
//! purpose:
//!     defines the schema for `host.toml`.
//!     loads configuration from file or falls back to defaults.
//!
//! structure:
//!     - PollingConfig: How often the status page refreshes from the controller.
//!     - LinkConfig: Which peripheral link to open (mock or serial).
//!     - StoreConfig: Where the last known snapshot is persisted.
//!     - ServerConfig / WeatherConfig / LoggingConfig: outer surfaces.
//!     - FarmConfig: Per-farm set-points and crop metadata, owned by a
//!       single ConfigContext and updated by value.
//!
//! ==============================================================================

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, RwLock};

/// Root configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct HostConfig {
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub link: LinkConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub weather: WeatherConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub farms: FarmConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PollingConfig {
    pub interval_seconds: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self { interval_seconds: 10 }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LinkKind {
    Mock,
    Serial,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LinkConfig {
    pub kind: LinkKind,
    /// serial device bound to the paired module (e.g. an rfcomm bridge)
    #[serde(default = "default_device")]
    pub device: String,
    #[serde(default = "default_baud")]
    pub baud_rate: u32,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// fixes the mock generator for reproducible runs
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_device() -> String {
    "/dev/rfcomm0".to_string()
}

fn default_baud() -> u32 {
    9600
}

fn default_timeout_ms() -> u64 {
    2000
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            kind: LinkKind::Mock,
            device: default_device(),
            baud_rate: default_baud(),
            timeout_ms: default_timeout_ms(),
            seed: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    File,
    Memory,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    pub kind: StoreKind,
    pub path: String,
    /// name of the record holding the last snapshot
    #[serde(default = "default_record")]
    pub record: String,
}

fn default_record() -> String {
    "systemStatus".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            kind: StoreKind::File,
            path: "data/status.json".to_string(),
            record: default_record(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind: "0.0.0.0:3000".to_string() }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct WeatherConfig {
    pub city: String,
    /// environment variable holding the OpenWeather key
    pub api_key_env: String,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            city: "London".to_string(),
            api_key_env: "OPENWEATHER_API_KEY".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub show_status_data: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), show_status_data: true }
    }
}

impl HostConfig {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| anyhow::anyhow!("Failed to read config file: {}", e))?;

        Self::parse(&content)
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let config: HostConfig = toml::from_str(content)
            .map_err(|e| anyhow::anyhow!("Failed to parse config: {}", e))?;
        config.farms.check()?;
        Ok(config)
    }

    /// Load with default fallback
    pub fn load_or_default() -> Self {
        let paths = [
            std::path::PathBuf::from("config").join("host.toml"),
            std::path::PathBuf::from("..").join("config").join("host.toml"),
        ];

        for path in &paths {
            if path.exists() {
                match Self::load(path) {
                    Ok(config) => {
                        println!("[CONFIG] Loaded from {}", path.display());
                        return config;
                    }
                    Err(e) => {
                        println!("[CONFIG] Warning: Failed to load {}: {}", path.display(), e);
                    }
                }
            }
        }

        println!("[CONFIG] Warning: No config file found - using defaults");
        Self::default()
    }

    /// Print configuration summary
    pub fn print_summary(&self) {
        println!("┌─────────────────────────────────────────┐");
        println!("│           HOST CONFIGURATION            │");
        println!("├─────────────────────────────────────────┤");
        println!("│ Link: {:?} ({})", self.link.kind, self.link.device);
        println!("│ Store: {:?} ({})", self.store.kind, self.store.path);
        println!("│ Poll Interval: {}s", self.polling.interval_seconds);
        println!("│ Listen: {}", self.server.bind);
        println!("│ Log Level: {}", self.logging.level);
        println!("├─────────────────────────────────────────┤");
    }
}

// ==============================================================================
// farm configuration
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("ideal moisture for {farm} must be between 0 and 100 (got {value})")]
    IdealOutOfRange { farm: &'static str, value: u32 },
}

/// set-points and crop metadata for both farms
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FarmConfig {
    pub ideal_moisture_a: u32,
    pub ideal_moisture_b: u32,
    pub crop_name_a: String,
    pub crop_name_b: String,
    pub location: String,
    pub soil_type_a: String,
    pub soil_type_b: String,
    pub altitude_a: f64,
    pub altitude_b: f64,
    pub crop_type_a: String,
    pub crop_type_b: String,
}

impl Default for FarmConfig {
    fn default() -> Self {
        Self {
            ideal_moisture_a: 60,
            ideal_moisture_b: 70,
            crop_name_a: String::new(),
            crop_name_b: String::new(),
            location: String::new(),
            soil_type_a: String::new(),
            soil_type_b: String::new(),
            altitude_a: 0.0,
            altitude_b: 0.0,
            crop_type_a: String::new(),
            crop_type_b: String::new(),
        }
    }
}

/// partial update; `None` leaves a field as it is
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FarmConfigUpdate {
    pub ideal_moisture_a: Option<u32>,
    pub ideal_moisture_b: Option<u32>,
    pub crop_name_a: Option<String>,
    pub crop_name_b: Option<String>,
    pub location: Option<String>,
    pub soil_type_a: Option<String>,
    pub soil_type_b: Option<String>,
    pub altitude_a: Option<f64>,
    pub altitude_b: Option<f64>,
    pub crop_type_a: Option<String>,
    pub crop_type_b: Option<String>,
}

impl FarmConfig {
    /// returns the updated configuration; `self` is left untouched
    pub fn apply(&self, update: FarmConfigUpdate) -> Result<FarmConfig, ConfigError> {
        let next = FarmConfig {
            ideal_moisture_a: update.ideal_moisture_a.unwrap_or(self.ideal_moisture_a),
            ideal_moisture_b: update.ideal_moisture_b.unwrap_or(self.ideal_moisture_b),
            crop_name_a: update.crop_name_a.unwrap_or_else(|| self.crop_name_a.clone()),
            crop_name_b: update.crop_name_b.unwrap_or_else(|| self.crop_name_b.clone()),
            location: update.location.unwrap_or_else(|| self.location.clone()),
            soil_type_a: update.soil_type_a.unwrap_or_else(|| self.soil_type_a.clone()),
            soil_type_b: update.soil_type_b.unwrap_or_else(|| self.soil_type_b.clone()),
            altitude_a: update.altitude_a.unwrap_or(self.altitude_a),
            altitude_b: update.altitude_b.unwrap_or(self.altitude_b),
            crop_type_a: update.crop_type_a.unwrap_or_else(|| self.crop_type_a.clone()),
            crop_type_b: update.crop_type_b.unwrap_or_else(|| self.crop_type_b.clone()),
        };
        next.check()?;
        Ok(next)
    }

    fn check(&self) -> Result<(), ConfigError> {
        for (farm, value) in [("Farm A", self.ideal_moisture_a), ("Farm B", self.ideal_moisture_b)] {
            if value > 100 {
                return Err(ConfigError::IdealOutOfRange { farm, value });
            }
        }
        Ok(())
    }
}

/// single owner of the live farm configuration
///
/// handed to whichever component needs it; there is no global copy.
#[derive(Clone, Default)]
pub struct ConfigContext {
    farms: Arc<RwLock<FarmConfig>>,
}

impl ConfigContext {
    pub fn new(farms: FarmConfig) -> Self {
        Self { farms: Arc::new(RwLock::new(farms)) }
    }

    pub fn get(&self) -> FarmConfig {
        self.farms.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// apply an update and swap in the resulting value
    pub fn update(&self, update: FarmConfigUpdate) -> Result<FarmConfig, ConfigError> {
        let mut guard = self.farms.write().unwrap_or_else(|e| e.into_inner());
        let next = guard.apply(update)?;
        *guard = next.clone();
        tracing::info!(?next, "farm configuration updated");
        Ok(next)
    }
}
