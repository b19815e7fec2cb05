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

use crate::error::Fallible;
use crate::rating::Rating;
use crate::types::record::CardRecord;
use crate::types::record::HistoryEntry;
use crate::types::record::LastReview;
use crate::types::timestamp::Timestamp;

/// The easiness factor of a card that has never been reviewed.
pub const DEFAULT_EASE: f64 = 2.5;

/// The lowest easiness factor a card can have.
pub const MIN_EASE: f64 = 1.3;

/// The highest easiness factor a card can have.
pub const MAX_EASE: f64 = 3.0;

/// Consecutive easy ratings needed for a card to count as mastered.
pub const MASTERY_STREAK_THRESHOLD: u32 = 3;

/// The minimum review interval in days.
const MIN_INTERVAL: f64 = 1.0;

/// The maximum review interval in days.
const MAX_INTERVAL: f64 = 365.0;

/// The interval in days after the second consecutive easy rating. Later
/// intervals grow from this one by the easiness factor.
const SECOND_INTERVAL: f64 = 6.0;

pub type Easiness = f64;

/// The result of rating a card.
#[derive(Clone, Debug, PartialEq)]
pub struct RatingOutcome {
    /// The card's state after the review.
    pub record: CardRecord,
    /// Whether this review made the card mastered.
    pub newly_mastered: bool,
    /// Days until the card is due again.
    pub interval_days: i64,
}

pub fn new_easiness(e: Easiness, rating: Rating) -> Easiness {
    (e + rating.ease_delta()).clamp(MIN_EASE, MAX_EASE)
}

/// The review interval in days for a card with the given streak and easiness.
/// Non-decreasing in both arguments. A streak of zero, which is what
/// forgetting a card leads to, always gets the minimum interval.
pub fn interval(streak: u32, e: Easiness) -> i64 {
    let raw: f64 = match streak {
        0 | 1 => MIN_INTERVAL,
        2 => SECOND_INTERVAL,
        n => {
            let exponent = i32::try_from(n - 2).unwrap_or(i32::MAX);
            SECOND_INTERVAL * e.powi(exponent)
        }
    };
    raw.round().clamp(MIN_INTERVAL, MAX_INTERVAL) as i64
}

/// Apply a review to a card's learning state.
///
/// Fails only if `record` is malformed; the returned record always satisfies
/// [`CardRecord::check`].
pub fn apply_rating(
    record: &CardRecord,
    rating: Rating,
    view_time_ms: u64,
    now: Timestamp,
) -> Fallible<RatingOutcome> {
    record.check()?;
    let easiness: Easiness = new_easiness(record.easiness, rating);
    let streak: u32 = rating.next_streak(record.streak);
    let interval_days: i64 = interval(streak, easiness);
    let due_date: Timestamp = now.plus_days(interval_days);
    let is_mastered: bool = streak >= MASTERY_STREAK_THRESHOLD;
    let mut history: Vec<HistoryEntry> = record.history.clone();
    history.push(HistoryEntry {
        rating,
        date: now,
        view_time_ms,
        next: due_date,
    });
    let updated = CardRecord {
        id: record.id.clone(),
        deck_id: record.deck_id.clone(),
        section_id: record.section_id.clone(),
        easiness,
        streak,
        total_attempts: record.total_attempts + 1,
        correct_attempts: record.correct_attempts + u32::from(rating.is_correct()),
        is_new: false,
        is_mastered,
        due_date: Some(due_date),
        last_review: Some(LastReview {
            rating,
            date: now,
            view_time_ms,
        }),
        history,
    };
    Ok(RatingOutcome {
        record: updated,
        newly_mastered: is_mastered && !record.is_mastered,
        interval_days,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::card::CardId;
    use crate::types::card::DeckId;
    use crate::types::card::SectionId;

    fn ts(s: &str) -> Timestamp {
        Timestamp::try_from(s.to_string()).unwrap()
    }

    fn fresh() -> CardRecord {
        CardRecord::new(CardId::new("c1"), DeckId::new("d1"), SectionId::unsectioned())
    }

    /// Rate a fresh card with each rating in turn, one day apart.
    fn sim(ratings: &[Rating]) -> Vec<RatingOutcome> {
        let mut now = ts("2024-01-01T09:00:00.000");
        let mut record = fresh();
        let mut outcomes = Vec::new();
        for rating in ratings {
            let outcome = apply_rating(&record, *rating, 1000, now).unwrap();
            record = outcome.record.clone();
            outcomes.push(outcome);
            now = now.plus_days(1);
        }
        outcomes
    }

    #[test]
    fn test_first_review() -> Fallible<()> {
        let now = ts("2024-01-01T09:00:00.000");
        let outcome = apply_rating(&fresh(), Rating::Easy, 2500, now)?;
        let record = outcome.record;
        assert!(!record.is_new);
        assert_eq!(record.streak, 1);
        assert_eq!(record.total_attempts, 1);
        assert_eq!(record.correct_attempts, 1);
        assert!((record.easiness - 2.65).abs() < 1e-9);
        assert_eq!(outcome.interval_days, 1);
        assert_eq!(record.due_date, Some(ts("2024-01-02T09:00:00.000")));
        assert_eq!(
            record.last_review,
            Some(LastReview {
                rating: Rating::Easy,
                date: now,
                view_time_ms: 2500
            })
        );
        assert_eq!(record.history.len(), 1);
        assert_eq!(record.history[0].next, ts("2024-01-02T09:00:00.000"));
        assert!(!outcome.newly_mastered);
        record.check()
    }

    #[test]
    fn test_three_easies_master_once() {
        let outcomes = sim(&[Rating::Easy; 5]);
        let newly: Vec<bool> = outcomes.iter().map(|o| o.newly_mastered).collect();
        assert_eq!(newly, vec![false, false, true, false, false]);
        let mastered: Vec<bool> = outcomes.iter().map(|o| o.record.is_mastered).collect();
        assert_eq!(mastered, vec![false, false, true, true, true]);
    }

    #[test]
    fn test_forgot_resets_streak_and_mastery() {
        let outcomes = sim(&[Rating::Easy, Rating::Easy, Rating::Easy, Rating::Easy, Rating::Forgot]);
        let last = outcomes.last().unwrap();
        assert_eq!(last.record.streak, 0);
        assert!(!last.record.is_mastered);
        assert_eq!(last.interval_days, 1);
        assert_eq!(last.record.correct_attempts, 4);
        assert_eq!(last.record.total_attempts, 5);
    }

    #[test]
    fn test_struggled_keeps_streak() {
        let outcomes = sim(&[Rating::Easy, Rating::Easy, Rating::Struggled]);
        let last = outcomes.last().unwrap();
        assert_eq!(last.record.streak, 2);
        assert_eq!(last.record.correct_attempts, 3);
        assert!(last.record.easiness < outcomes[1].record.easiness);
    }

    #[test]
    fn test_easiness_stays_in_bounds() {
        let low = sim(&[Rating::Forgot; 20]);
        assert_eq!(low.last().unwrap().record.easiness, MIN_EASE);
        let high = sim(&[Rating::Easy; 20]);
        assert_eq!(high.last().unwrap().record.easiness, MAX_EASE);
    }

    #[test]
    fn test_invariants_hold_for_mixed_sequences() {
        let pattern = [
            Rating::Easy,
            Rating::Forgot,
            Rating::Struggled,
            Rating::Easy,
            Rating::Easy,
            Rating::Easy,
            Rating::Struggled,
            Rating::Forgot,
        ];
        for (i, outcome) in sim(&pattern).iter().enumerate() {
            let record = &outcome.record;
            assert!(record.check().is_ok());
            assert!(record.correct_attempts <= record.total_attempts);
            assert!(record.easiness >= MIN_EASE);
            assert_eq!(record.history.len(), i + 1);
            assert_eq!(record.history.len(), record.total_attempts as usize);
        }
    }

    #[test]
    fn test_interval_is_monotone() {
        for streak in 0..12 {
            let mut e = MIN_EASE;
            while e < MAX_EASE {
                let next_e = e + 0.05;
                assert!(interval(streak, e) <= interval(streak, next_e));
                assert!(interval(streak, e) <= interval(streak + 1, e));
                e = next_e;
            }
        }
        assert_eq!(interval(0, MAX_EASE), 1);
        assert_eq!(interval(2, MIN_EASE), 6);
        assert_eq!(interval(3, 2.5), 15);
        assert_eq!(interval(u32::MAX, MAX_EASE), 365);
    }

    #[test]
    fn test_malformed_record_fails() {
        let mut record = fresh();
        record.correct_attempts = 1;
        let now = ts("2024-01-01T09:00:00.000");
        assert!(apply_rating(&record, Rating::Easy, 0, now).is_err());
    }
}
