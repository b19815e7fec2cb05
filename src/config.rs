// Copyright 2025 Fernando Borretti
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::path::Path;

use memorize_core::error::Fallible;
use memorize_core::error::fail;
use memorize_core::xp::XpConfig;
use serde::Deserialize;

pub const DEFAULT_CONFIG_PATH: &str = "memorize.toml";

/// Settings read from `memorize.toml`. Every key is optional.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Path to the SQLite database.
    pub database: String,
    /// The user whose library is reviewed.
    pub user: String,
    pub xp: XpConfig,
    /// Seed for the XP rolls. Seeded from the clock when absent.
    pub seed: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: "memorize.sqlite3".to_string(),
            user: "default".to_string(),
            xp: XpConfig::default(),
            seed: None,
        }
    }
}

impl Config {
    pub fn parse(text: &str) -> Fallible<Self> {
        let config: Config = toml::from_str(text)?;
        if !(0.0..=1.0).contains(&config.xp.chance) {
            return fail(format!(
                "xp.chance must be between 0 and 1, got {}",
                config.xp.chance
            ));
        }
        Ok(config)
    }

    /// Load the configuration at `path`. Without an explicit path, a missing
    /// `memorize.toml` means the defaults.
    pub fn load(path: Option<&str>) -> Fallible<Self> {
        let explicit = path.is_some();
        let path = Path::new(path.unwrap_or(DEFAULT_CONFIG_PATH));
        if !path.exists() {
            if explicit {
                return fail(format!("config file {} does not exist", path.display()));
            }
            log::debug!("No config file, using defaults");
            return Ok(Config::default());
        }
        let text = std::fs::read_to_string(path)?;
        let config = Config::parse(&text)?;
        log::debug!("Loaded config from {}", path.display());
        Ok(config)
    }
}
