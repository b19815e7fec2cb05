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

//! End-of-session summary.

use serde::Serialize;

use crate::error::Issue;
use crate::rating::Rating;
use crate::session::ReviewData;
use crate::types::card::CardId;
use crate::types::card::DeckId;
use crate::types::card::SectionId;
use crate::types::timestamp::Timestamp;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RatingCounts {
    pub forgot: usize,
    pub struggled: usize,
    pub easy: usize,
}

impl RatingCounts {
    pub fn get(&self, rating: Rating) -> usize {
        match rating {
            Rating::Forgot => self.forgot,
            Rating::Struggled => self.struggled,
            Rating::Easy => self.easy,
        }
    }

    pub fn total(&self) -> usize {
        self.forgot + self.struggled + self.easy
    }

    fn add(&mut self, rating: Rating) {
        match rating {
            Rating::Forgot => self.forgot += 1,
            Rating::Struggled => self.struggled += 1,
            Rating::Easy => self.easy += 1,
        }
    }
}

/// The reviews of one deck or one section.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct GroupSummary {
    pub cards: usize,
    pub ratings: RatingCounts,
    /// Whether any of the reviewed cards was new.
    pub has_new_cards: bool,
}

impl GroupSummary {
    fn add(&mut self, rating: Rating, is_new: bool) {
        self.cards += 1;
        self.ratings.add(rating);
        self.has_new_cards |= is_new;
    }

    /// Whether more than a third of the group's reviews had this rating.
    pub fn is_frequent(&self, rating: Rating) -> bool {
        self.ratings.get(rating) > self.cards / 3
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RecapCard {
    pub id: CardId,
    pub deck_id: DeckId,
    pub section_id: SectionId,
    pub front: String,
    pub rating: Rating,
    pub was_new: bool,
    pub newly_mastered: bool,
    pub xp: u32,
    pub next: Option<Timestamp>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Recap {
    pub ratings: RatingCounts,
    pub newly_mastered: usize,
    pub new_cards: usize,
    pub initial_xp: u64,
    pub xp_gained: u64,
    /// Per-deck summaries, in the order the decks were first reviewed.
    pub decks: Vec<(DeckId, GroupSummary)>,
    /// Per-section summaries, in the order the sections were first reviewed.
    pub sections: Vec<((DeckId, SectionId), GroupSummary)>,
    pub cards: Vec<RecapCard>,
    pub persistence_failures: usize,
    #[serde(skip)]
    pub issues: Vec<Issue>,
}

fn entry<'a, K: PartialEq, V: Default>(groups: &'a mut Vec<(K, V)>, key: K) -> &'a mut V {
    let index = match groups.iter().position(|(k, _)| *k == key) {
        Some(index) => index,
        None => {
            groups.push((key, V::default()));
            groups.len() - 1
        }
    };
    &mut groups[index].1
}

impl Recap {
    /// Summarize the rated cards of a session. Unrated entries are ignored.
    pub fn from_reviews(reviews: &[ReviewData], initial_xp: u64, issues: &[Issue]) -> Self {
        let mut recap = Recap {
            ratings: RatingCounts::default(),
            newly_mastered: 0,
            new_cards: 0,
            initial_xp,
            xp_gained: 0,
            decks: Vec::new(),
            sections: Vec::new(),
            cards: Vec::new(),
            persistence_failures: issues.iter().filter(|i| i.is_persistence_failure()).count(),
            issues: issues.to_vec(),
        };
        for review in reviews {
            let Some(rating) = review.rating else {
                continue;
            };
            let was_new = review.record.is_new;
            let newly_mastered = review.newly_mastered.unwrap_or(false);
            recap.ratings.add(rating);
            recap.newly_mastered += usize::from(newly_mastered);
            recap.new_cards += usize::from(was_new);
            recap.xp_gained += u64::from(review.xp_awarded);
            entry(&mut recap.decks, review.card.deck_id.clone()).add(rating, was_new);
            entry(
                &mut recap.sections,
                (review.card.deck_id.clone(), review.card.section_id.clone()),
            )
            .add(rating, was_new);
            recap.cards.push(RecapCard {
                id: review.card.id.clone(),
                deck_id: review.card.deck_id.clone(),
                section_id: review.card.section_id.clone(),
                front: review.card.front.clone(),
                rating,
                was_new,
                newly_mastered,
                xp: review.xp_awarded,
                next: review.reviewed.as_ref().and_then(|record| record.due_date),
            });
        }
        recap
    }

    pub fn final_xp(&self) -> u64 {
        self.initial_xp + self.xp_gained
    }

    pub fn total_cards(&self) -> usize {
        self.ratings.total()
    }

    pub fn deck(&self, deck: &DeckId) -> Option<&GroupSummary> {
        self.decks.iter().find(|(id, _)| id == deck).map(|(_, g)| g)
    }

    pub fn section(&self, deck: &DeckId, section: &SectionId) -> Option<&GroupSummary> {
        self.sections
            .iter()
            .find(|((d, s), _)| d == deck && s == section)
            .map(|(_, g)| g)
    }

    /// Decks where more than a third of the reviews had this rating.
    pub fn frequent_decks(&self, rating: Rating) -> Vec<&DeckId> {
        self.decks
            .iter()
            .filter(|(_, group)| group.is_frequent(rating))
            .map(|(id, _)| id)
            .collect()
    }

    /// Sections where more than a third of the reviews had this rating.
    pub fn frequent_sections(&self, rating: Rating) -> Vec<&(DeckId, SectionId)> {
        self.sections
            .iter()
            .filter(|(_, group)| group.is_frequent(rating))
            .map(|(key, _)| key)
            .collect()
    }

    pub fn cards_for_rating(&self, rating: Rating) -> impl Iterator<Item = &RecapCard> {
        self.cards.iter().filter(move |card| card.rating == rating)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::apply_rating;
    use crate::types::card::Card;
    use crate::types::record::CardRecord;

    fn ts(s: &str) -> Timestamp {
        Timestamp::try_from(s.to_string()).unwrap()
    }

    fn review(deck: &str, section: &str, id: &str, record: CardRecord, rating: Rating, xp: u32) -> ReviewData {
        let now = ts("2024-03-01T10:00:00.000");
        let card = Card {
            id: CardId::new(id),
            deck_id: DeckId::new(deck),
            section_id: SectionId::new(section),
            front: id.to_uppercase(),
            back: String::new(),
            created_at: None,
            updated_at: None,
            views: 0,
            skips: 0,
        };
        let outcome = apply_rating(&record, rating, 0, now).unwrap();
        ReviewData {
            card,
            record,
            presented_at: now,
            rating: Some(rating),
            reviewed: Some(outcome.record),
            newly_mastered: Some(outcome.newly_mastered),
            xp_awarded: xp,
            persisted: true,
        }
    }

    fn fresh(deck: &str, section: &str, id: &str) -> CardRecord {
        CardRecord::new(CardId::new(id), DeckId::new(deck), SectionId::new(section))
    }

    fn two_easies(deck: &str, section: &str, id: &str) -> CardRecord {
        let mut record = fresh(deck, section, id);
        let now = ts("2024-02-01T10:00:00.000");
        for _ in 0..2 {
            record = apply_rating(&record, Rating::Easy, 0, now).unwrap().record;
        }
        record
    }

    #[test]
    fn test_empty_recap() {
        let recap = Recap::from_reviews(&[], 12, &[Issue::EmptyScope]);
        assert_eq!(recap.ratings, RatingCounts::default());
        assert_eq!(recap.total_cards(), 0);
        assert_eq!(recap.newly_mastered, 0);
        assert_eq!(recap.new_cards, 0);
        assert_eq!(recap.xp_gained, 0);
        assert_eq!(recap.final_xp(), 12);
        assert!(recap.decks.is_empty());
        assert!(recap.sections.is_empty());
        assert_eq!(recap.persistence_failures, 0);
    }

    #[test]
    fn test_counts_and_breakdowns() {
        let reviews = vec![
            review("d1", "", "a", fresh("d1", "", "a"), Rating::Easy, 1),
            review("d1", "s1", "b", two_easies("d1", "s1", "b"), Rating::Easy, 0),
            review("d2", "", "c", two_easies("d2", "", "c"), Rating::Forgot, 1),
            review("d1", "s1", "d", two_easies("d1", "s1", "d"), Rating::Struggled, 1),
        ];
        let issues = vec![Issue::PersistenceFailure {
            card: CardId::new("c"),
            message: "offline".to_string(),
        }];
        let recap = Recap::from_reviews(&reviews, 10, &issues);
        assert_eq!(
            recap.ratings,
            RatingCounts {
                forgot: 1,
                struggled: 1,
                easy: 2
            }
        );
        assert_eq!(recap.newly_mastered, 1);
        assert_eq!(recap.new_cards, 1);
        assert_eq!(recap.xp_gained, 3);
        assert_eq!(recap.final_xp(), 13);
        assert_eq!(recap.persistence_failures, 1);

        let d1 = recap.deck(&DeckId::new("d1")).unwrap();
        assert_eq!(d1.cards, 3);
        assert!(d1.has_new_cards);
        let d2 = recap.deck(&DeckId::new("d2")).unwrap();
        assert!(!d2.has_new_cards);
        assert_eq!(d2.ratings.forgot, 1);

        let s1 = recap
            .section(&DeckId::new("d1"), &SectionId::new("s1"))
            .unwrap();
        assert_eq!(s1.cards, 2);
        assert!(!s1.has_new_cards);
        assert_eq!(recap.decks[0].0, DeckId::new("d1"));

        assert_eq!(recap.frequent_decks(Rating::Forgot), vec![&DeckId::new("d2")]);
        assert_eq!(recap.frequent_decks(Rating::Easy), vec![&DeckId::new("d1")]);
        let easy: Vec<&str> = recap
            .cards_for_rating(Rating::Easy)
            .map(|c| c.id.as_str())
            .collect();
        assert_eq!(easy, vec!["a", "b"]);
    }

    #[test]
    fn test_unrated_entries_are_ignored() {
        let mut unrated = review("d1", "", "a", fresh("d1", "", "a"), Rating::Easy, 1);
        unrated.rating = None;
        let recap = Recap::from_reviews(&[unrated], 0, &[]);
        assert_eq!(recap.total_cards(), 0);
        assert_eq!(recap.xp_gained, 0);
    }
}
