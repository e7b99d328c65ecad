// src/config.rs

use crate::utils::precision::ExtraDigits;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct DisplayConfig {
    pub price_extra_digits: u32,
    pub volume_extra_digits: u32,
}

impl DisplayConfig {
    pub fn extra_digits(&self) -> ExtraDigits {
        ExtraDigits {
            price: self.price_extra_digits,
            volume: self.volume_extra_digits,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    /// Base URL of the auction gateway.
    pub endpoint: String,
    /// Principal of the trader.
    pub owner: String,
    pub paper_mode: bool,
    pub default_pair: String,
    pub language: String,
    pub preferences_file: String,
    pub log_dir: String,
    pub refresh_interval_secs: u64,
    pub history_limit: usize,
    pub display: DisplayConfig,
}

impl AppConfig {
    pub fn new() -> Result<Self, ConfigError> {
        Self::from_file("Settings")
    }

    /// Defaults, then the optional file `name`, then `APP__*` environment variables.
    pub fn from_file(name: &str) -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .set_default("endpoint", "http://127.0.0.1:4943/")?
            .set_default("owner", "2vxsx-fae")?
            .set_default("paper_mode", true)?
            .set_default("default_pair", "BTC/USDC")?
            .set_default("language", "en")?
            .set_default("preferences_file", "terminal_prefs.json")?
            .set_default("log_dir", "logs")?
            .set_default("refresh_interval_secs", 15)?
            .set_default("history_limit", 200)?
            .set_default("display.price_extra_digits", 4)?
            .set_default("display.volume_extra_digits", 2)?
            .add_source(File::with_name(name).required(false))
            .add_source(Environment::with_prefix("APP").separator("__"));

        let config = builder.build()?;
        config.try_deserialize()
    }
}
