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

use std::error::Error;
use std::fmt::Display;
use std::fmt::Formatter;

use crate::types::card::CardId;

#[derive(Debug, PartialEq)]
pub struct ErrorReport {
    message: String,
}

impl ErrorReport {
    pub fn new(msg: impl Into<String>) -> Self {
        ErrorReport {
            message: msg.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<std::io::Error> for ErrorReport {
    fn from(value: std::io::Error) -> Self {
        ErrorReport {
            message: format!("I/O error: {value:#?}"),
        }
    }
}

impl From<serde_json::Error> for ErrorReport {
    fn from(value: serde_json::Error) -> Self {
        ErrorReport {
            message: format!("JSON error: {value:#?}"),
        }
    }
}

impl From<tokio::task::JoinError> for ErrorReport {
    fn from(value: tokio::task::JoinError) -> Self {
        ErrorReport {
            message: format!("background task failed: {value}"),
        }
    }
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for ErrorReport {
    fn from(value: rusqlite::Error) -> Self {
        ErrorReport {
            message: format!("SQLite error: {value:#?}"),
        }
    }
}

#[cfg(feature = "config")]
impl From<toml::de::Error> for ErrorReport {
    fn from(value: toml::de::Error) -> Self {
        ErrorReport {
            message: format!("TOML error: {value}"),
        }
    }
}

impl Display for ErrorReport {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "error: {}", self.message)
    }
}

impl Error for ErrorReport {
    fn description(&self) -> &str {
        &self.message
    }
}

pub type Fallible<T> = Result<T, ErrorReport>;

pub fn fail<T>(msg: impl Into<String>) -> Fallible<T> {
    Err(ErrorReport {
        message: msg.into(),
    })
}

/// A problem a review session ran into and reported instead of aborting.
#[derive(Clone, Debug, PartialEq)]
pub enum Issue {
    /// The card had no learning record. It was reviewed as a new card.
    RecordNotFound { card: CardId },
    /// Writing the reviewed card's state back to the store failed.
    PersistenceFailure { card: CardId, message: String },
    /// The stored record broke an invariant, so the card was skipped.
    InvariantViolation { card: CardId, message: String },
    /// The session had no cards to review.
    EmptyScope,
}

impl Issue {
    pub fn is_persistence_failure(&self) -> bool {
        matches!(self, Issue::PersistenceFailure { .. })
    }
}

impl Display for Issue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Issue::RecordNotFound { card } => {
                write!(f, "no record for card {card}, reviewing it as new")
            }
            Issue::PersistenceFailure { card, message } => {
                write!(f, "unable to save review of card {card}: {message}")
            }
            Issue::InvariantViolation { card, message } => {
                write!(f, "skipped malformed card {card}: {message}")
            }
            Issue::EmptyScope => write!(f, "there are no cards to review"),
        }
    }
}
