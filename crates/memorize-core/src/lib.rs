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

//! memorize-core: review scheduling for the memorize spaced repetition system.
//!
//! This library provides the storage-agnostic parts of memorize:
//! - The rating model and the streak-based scheduler
//! - Review sessions over a section, a deck, or a whole library
//! - The end-of-session recap
//! - The document store contract, with an in-memory implementation

pub mod clock;
pub mod error;
pub mod library;
pub mod paths;
pub mod rating;
pub mod recap;
pub mod rng;
pub mod scheduler;
pub mod session;
pub mod store;
pub mod types;
pub mod xp;

// Re-exports for convenience
pub use clock::{Clock, FixedClock};
pub use error::{ErrorReport, Fallible, Issue, fail};
pub use rating::Rating;
pub use recap::Recap;
pub use scheduler::{RatingOutcome, apply_rating};
pub use session::{ReviewSession, Scope, SessionContext, SessionState};
pub use store::{MemoryStore, RemoteStore};
pub use types::card::{Card, CardId, DeckId, SectionId};
pub use types::record::CardRecord;
pub use types::timestamp::Timestamp;
pub use xp::{ChanceXp, XpConfig, XpPolicy};
