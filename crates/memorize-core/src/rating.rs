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

use crate::error::ErrorReport;
use crate::error::fail;

/// How well the user recalled a card, as reported by the user.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub enum Rating {
    Forgot,
    Struggled,
    Easy,
}

/// Easiness lost on a forgotten card.
const FORGOT_PENALTY: f64 = 0.2;

/// Easiness lost on a card the user struggled with.
const STRUGGLED_PENALTY: f64 = 0.15;

/// Easiness gained on an easy card.
const EASY_BONUS: f64 = 0.15;

impl Rating {
    pub const ALL: [Rating; 3] = [Rating::Forgot, Rating::Struggled, Rating::Easy];

    pub fn as_str(&self) -> &str {
        match self {
            Rating::Forgot => "forgot",
            Rating::Struggled => "struggled",
            Rating::Easy => "easy",
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Rating::Forgot => "Forgot",
            Rating::Struggled => "Struggled",
            Rating::Easy => "Easy",
        }
    }

    pub fn emoji(&self) -> &str {
        match self {
            Rating::Forgot => "😕",
            Rating::Struggled => "😎",
            Rating::Easy => "🥳",
        }
    }

    /// The change applied to a card's easiness factor.
    pub fn ease_delta(&self) -> f64 {
        match self {
            Rating::Forgot => -FORGOT_PENALTY,
            Rating::Struggled => -STRUGGLED_PENALTY,
            Rating::Easy => EASY_BONUS,
        }
    }

    /// The streak after a review with this rating.
    pub fn next_streak(&self, streak: u32) -> u32 {
        match self {
            Rating::Forgot => 0,
            Rating::Struggled => streak,
            Rating::Easy => streak.saturating_add(1),
        }
    }

    /// Whether the review counts towards the card's correct attempts. Only
    /// forgetting a card is incorrect.
    pub fn is_correct(&self) -> bool {
        !matches!(self, Rating::Forgot)
    }

    /// The message shown to the user after rating a card.
    pub fn feedback(&self, streak: u32, mastery_threshold: u32) -> &'static str {
        match self {
            Rating::Easy if streak >= mastery_threshold => "Mastered!",
            Rating::Easy if streak > 2 => "On a roll!",
            Rating::Easy => "Great!",
            Rating::Struggled => "Good luck!",
            Rating::Forgot => "Better luck next time!",
        }
    }
}

impl TryFrom<String> for Rating {
    type Error = ErrorReport;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "forgot" => Ok(Rating::Forgot),
            "struggled" => Ok(Rating::Struggled),
            "easy" => Ok(Rating::Easy),
            _ => fail(format!("invalid rating string: {value}")),
        }
    }
}
