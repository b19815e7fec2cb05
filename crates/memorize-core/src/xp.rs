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

use serde::Deserialize;
use serde::Serialize;

use crate::rng::TinyRng;

/// Decides how much XP the user earns for each rated card.
pub trait XpPolicy: Send {
    fn award(&mut self) -> u32;
}

impl<F> XpPolicy for F
where
    F: FnMut() -> u32 + Send,
{
    fn award(&mut self) -> u32 {
        self()
    }
}

/// XP settings.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct XpConfig {
    /// Probability that a rated card earns XP.
    pub chance: f64,
    /// XP earned when the roll succeeds.
    pub amount: u32,
}

impl Default for XpConfig {
    fn default() -> Self {
        Self {
            chance: 0.5,
            amount: 1,
        }
    }
}

/// Awards a fixed amount of XP with a fixed probability.
pub struct ChanceXp {
    config: XpConfig,
    rng: TinyRng,
}

impl ChanceXp {
    pub fn new(config: XpConfig, seed: u64) -> Self {
        Self {
            config,
            rng: TinyRng::from_seed(seed),
        }
    }
}

impl XpPolicy for ChanceXp {
    fn award(&mut self) -> u32 {
        if self.rng.chance(self.config.chance) {
            self.config.amount
        } else {
            0
        }
    }
}
