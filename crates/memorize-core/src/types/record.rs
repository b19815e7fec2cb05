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

use serde_json::Value;

use crate::error::ErrorReport;
use crate::error::Fallible;
use crate::error::fail;
use crate::rating::Rating;
use crate::scheduler::DEFAULT_EASE;
use crate::scheduler::MASTERY_STREAK_THRESHOLD;
use crate::scheduler::MAX_EASE;
use crate::scheduler::MIN_EASE;
use crate::store::Document;
use crate::store::Fields;
use crate::types::card::CardId;
use crate::types::card::DeckId;
use crate::types::card::SectionId;
use crate::types::timestamp::Timestamp;

/// The most recent completed review of a card.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LastReview {
    pub rating: Rating,
    pub date: Timestamp,
    pub view_time_ms: u64,
}

/// One past review of a card.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HistoryEntry {
    pub rating: Rating,
    pub date: Timestamp,
    pub view_time_ms: u64,
    /// The due date the review produced.
    pub next: Timestamp,
}

impl HistoryEntry {
    /// The id of the history document for the review with this zero-based
    /// index. Ids sort in the order the reviews happened.
    pub fn document_id(index: usize) -> String {
        format!("{index:06}")
    }

    pub fn from_document(doc: &Document) -> Fallible<Self> {
        let rating = match doc.str_field("rating") {
            Some(rating) => Rating::try_from(rating.to_string())?,
            None => return fail(format!("history entry {} has no rating", doc.path)),
        };
        let Some(date) = doc.timestamp_field("date")? else {
            return fail(format!("history entry {} has no date", doc.path));
        };
        let Some(next) = doc.timestamp_field("next")? else {
            return fail(format!("history entry {} has no next date", doc.path));
        };
        let view_time_ms = doc.fields.get("viewTime").and_then(Value::as_u64).unwrap_or(0);
        Ok(HistoryEntry {
            rating,
            date,
            view_time_ms,
            next,
        })
    }

    pub fn to_fields(&self) -> Fields {
        let mut fields = Fields::new();
        fields.insert("rating".into(), self.rating.as_str().into());
        fields.insert("date".into(), self.date.to_string().into());
        fields.insert("viewTime".into(), Value::from(self.view_time_ms));
        fields.insert("next".into(), self.next.to_string().into());
        fields
    }
}

/// A user's learning state for one card.
#[derive(Clone, Debug, PartialEq)]
pub struct CardRecord {
    pub id: CardId,
    pub deck_id: DeckId,
    pub section_id: SectionId,
    pub easiness: f64,
    /// Consecutive easy ratings.
    pub streak: u32,
    pub total_attempts: u32,
    pub correct_attempts: u32,
    pub is_new: bool,
    /// Cached `streak >= MASTERY_STREAK_THRESHOLD`.
    pub is_mastered: bool,
    /// `None` while the card is new.
    pub due_date: Option<Timestamp>,
    pub last_review: Option<LastReview>,
    /// Every review of the card, oldest first.
    pub history: Vec<HistoryEntry>,
}

impl CardRecord {
    /// The state of a card the user has never reviewed.
    pub fn new(id: CardId, deck_id: DeckId, section_id: SectionId) -> Self {
        CardRecord {
            id,
            deck_id,
            section_id,
            easiness: DEFAULT_EASE,
            streak: 0,
            total_attempts: 0,
            correct_attempts: 0,
            is_new: true,
            is_mastered: false,
            due_date: None,
            last_review: None,
            history: Vec::new(),
        }
    }

    /// Whether the card has been reviewed before and is due at `now`.
    pub fn is_due(&self, now: Timestamp) -> bool {
        !self.is_new && self.due_date.is_some_and(|due| due <= now)
    }

    /// Check the record's invariants.
    pub fn check(&self) -> Fallible<()> {
        let violation = |msg: String| -> Fallible<()> {
            fail(format!("record of card {} is malformed: {msg}", self.id))
        };
        if self.correct_attempts > self.total_attempts {
            return violation(format!(
                "{} correct attempts out of {}",
                self.correct_attempts, self.total_attempts
            ));
        }
        if self.is_new != (self.total_attempts == 0) {
            return violation(format!(
                "new flag is {} after {} attempts",
                self.is_new, self.total_attempts
            ));
        }
        if self.is_new != self.due_date.is_none() || self.is_new != self.last_review.is_none() {
            return violation("due date and last review must be set exactly when the card is not new".into());
        }
        if self.streak > self.total_attempts {
            return violation(format!(
                "streak of {} after {} attempts",
                self.streak, self.total_attempts
            ));
        }
        if self.is_mastered != (self.streak >= MASTERY_STREAK_THRESHOLD) {
            return violation(format!(
                "mastered flag is {} with a streak of {}",
                self.is_mastered, self.streak
            ));
        }
        if !(MIN_EASE..=MAX_EASE).contains(&self.easiness) {
            return violation(format!("easiness {} is out of range", self.easiness));
        }
        if self.history.len() != self.total_attempts as usize {
            return violation(format!(
                "{} history entries for {} attempts",
                self.history.len(),
                self.total_attempts
            ));
        }
        Ok(())
    }

    /// Reads a record document. The history lives in a subcollection and is
    /// attached separately with [`CardRecord::with_history`]. The `new` flag
    /// is required; other missing fields take their new-card defaults.
    pub fn from_document(deck_id: &DeckId, doc: &Document) -> Fallible<Self> {
        let Some(is_new) = doc.bool_field("new") else {
            return fail(format!("record {} has no new flag", doc.path));
        };
        let last_review = match doc.fields.get("last") {
            None | Some(Value::Null) => None,
            Some(Value::Object(last)) => {
                let last = Document::new(format!("{}#last", doc.path), last.clone());
                let rating = match last.str_field("rating") {
                    Some(rating) => Rating::try_from(rating.to_string())?,
                    None => return fail(format!("last review of {} has no rating", doc.path)),
                };
                let Some(date) = last.timestamp_field("date")? else {
                    return fail(format!("last review of {} has no date", doc.path));
                };
                let view_time_ms = last.fields.get("viewTime").and_then(Value::as_u64).unwrap_or(0);
                Some(LastReview {
                    rating,
                    date,
                    view_time_ms,
                })
            }
            Some(other) => {
                return Err(ErrorReport::new(format!(
                    "last review of {} is not a map: {other}",
                    doc.path
                )));
            }
        };
        Ok(CardRecord {
            id: CardId::new(doc.id()),
            deck_id: deck_id.clone(),
            section_id: SectionId::new(doc.str_field("section").unwrap_or_default()),
            easiness: doc.f64_field("e").unwrap_or(DEFAULT_EASE),
            streak: doc.u32_field("streak")?.unwrap_or(0),
            total_attempts: doc.u32_field("count")?.unwrap_or(0),
            correct_attempts: doc.u32_field("correct")?.unwrap_or(0),
            is_new,
            is_mastered: doc.bool_field("mastered").unwrap_or(false),
            due_date: doc.timestamp_field("due")?,
            last_review,
            history: Vec::new(),
        })
    }

    pub fn with_history(mut self, history: Vec<HistoryEntry>) -> Self {
        self.history = history;
        self
    }

    /// The record document's fields. The history is not included.
    pub fn to_fields(&self) -> Fields {
        let mut fields = Fields::new();
        fields.insert("new".into(), self.is_new.into());
        fields.insert(
            "due".into(),
            self.due_date
                .map(|due| Value::from(due.to_string()))
                .unwrap_or(Value::Null),
        );
        fields.insert("section".into(), self.section_id.as_str().into());
        fields.insert("streak".into(), self.streak.into());
        fields.insert("e".into(), self.easiness.into());
        fields.insert("correct".into(), self.correct_attempts.into());
        fields.insert("count".into(), self.total_attempts.into());
        fields.insert("mastered".into(), self.is_mastered.into());
        let last = match &self.last_review {
            Some(last) => {
                let mut map = Fields::new();
                map.insert("rating".into(), last.rating.as_str().into());
                map.insert("date".into(), last.date.to_string().into());
                map.insert("viewTime".into(), Value::from(last.view_time_ms));
                Value::Object(map)
            }
            None => Value::Null,
        };
        fields.insert("last".into(), last);
        fields
    }
}
