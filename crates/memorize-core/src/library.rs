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

//! The user's library: the decks they have added, in the order they added
//! them, and each deck's sections.

use serde::Serialize;
use serde_json::Value;

use crate::error::Fallible;
use crate::paths;
use crate::store::Document;
use crate::store::Fields;
use crate::store::Filter;
use crate::store::OrderBy;
use crate::store::RemoteStore;
use crate::types::card::Card;
use crate::types::card::CardId;
use crate::types::card::DeckId;
use crate::types::card::SectionId;
use crate::types::record::CardRecord;
use crate::types::record::HistoryEntry;
use crate::types::timestamp::Timestamp;

#[derive(Clone, Debug, PartialEq)]
pub struct Section {
    pub id: SectionId,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DeckEntry {
    pub id: DeckId,
    /// The unsectioned section first, then the deck's sections in order.
    pub sections: Vec<Section>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Library {
    pub decks: Vec<DeckEntry>,
}

impl Library {
    pub async fn load<S: RemoteStore>(store: &S, uid: &str) -> Fallible<Self> {
        let deck_docs = store
            .query(&paths::user_decks(uid), &[], Some(&OrderBy::asc("added")), None)
            .await?;
        let mut decks = Vec::with_capacity(deck_docs.len());
        for deck_doc in deck_docs {
            let id = DeckId::new(deck_doc.id());
            let section_docs = store
                .query(&paths::deck_sections(&id), &[], Some(&OrderBy::asc("order")), None)
                .await?;
            let mut sections = vec![Section {
                id: SectionId::unsectioned(),
                name: "Unsectioned".to_string(),
            }];
            sections.extend(section_docs.iter().map(|doc| Section {
                id: SectionId::new(doc.id()),
                name: doc.str_field("name").unwrap_or_default().to_string(),
            }));
            decks.push(DeckEntry { id, sections });
        }
        log::debug!("Loaded library of {uid} with {} decks", decks.len());
        Ok(Library { decks })
    }

    pub fn deck(&self, id: &DeckId) -> Option<&DeckEntry> {
        self.decks.iter().find(|deck| &deck.id == id)
    }
}

/// Publish a card's content to its deck.
pub async fn publish_card<S: RemoteStore>(store: &S, card: &Card) -> Fallible<()> {
    store
        .set_document(&paths::deck_card(&card.deck_id, &card.id), card.to_fields())
        .await
}

/// Publish a named section of a deck at the given position.
pub async fn publish_section<S: RemoteStore>(
    store: &S,
    deck: &DeckId,
    section: &Section,
    order: u32,
) -> Fallible<()> {
    let mut fields = Fields::new();
    fields.insert("name".into(), section.name.clone().into());
    fields.insert("order".into(), Value::from(order));
    store
        .set_document(&format!("{}/{}", paths::deck_sections(deck), section.id), fields)
        .await
}

/// Add a deck to the user's library and create a new-card record for every
/// card of the deck that has none. Returns the number of records created.
pub async fn acquire_deck<S: RemoteStore>(
    store: &S,
    uid: &str,
    deck: &DeckId,
    now: Timestamp,
) -> Fallible<usize> {
    let user_deck = paths::user_deck(uid, deck);
    if store.get_document(&user_deck).await?.is_none() {
        let mut fields = Fields::new();
        fields.insert("added".into(), now.to_string().into());
        store.set_document(&user_deck, fields).await?;
    }
    let mut created = 0;
    for card_doc in store.query(&paths::deck_cards(deck), &[], None, None).await? {
        let card = Card::from_document(deck, &card_doc)?;
        let path = paths::record(uid, deck, &card.id);
        if store.get_document(&path).await?.is_none() {
            let record = CardRecord::new(card.id, deck.clone(), card.section_id);
            store.set_document(&path, record.to_fields()).await?;
            created += 1;
        }
    }
    log::debug!("Acquired deck {deck} for {uid}, {created} new records");
    Ok(created)
}

/// Remove a deck from the user's library along with every learning record
/// and review history for its cards.
pub async fn remove_deck<S: RemoteStore>(store: &S, uid: &str, deck: &DeckId) -> Fallible<()> {
    for record_doc in store.query(&paths::records(uid, deck), &[], None, None).await? {
        let card = CardId::new(record_doc.id());
        for entry in store
            .query(&paths::history(uid, deck, &card), &[], None, None)
            .await?
        {
            store.delete_document(&entry.path).await?;
        }
        store.delete_document(&record_doc.path).await?;
    }
    store.delete_document(&paths::user_deck(uid, deck)).await?;
    log::debug!("Removed deck {deck} from the library of {uid}");
    Ok(())
}

/// Load a card's learning record together with its review history, or `None`
/// if the user has no record for the card.
pub async fn load_record<S: RemoteStore>(
    store: &S,
    uid: &str,
    deck: &DeckId,
    card: &CardId,
) -> Fallible<Option<CardRecord>> {
    let Some(doc) = store.get_document(&paths::record(uid, deck, card)).await? else {
        return Ok(None);
    };
    let history = store
        .query(&paths::history(uid, deck, card), &[], Some(&OrderBy::asc("date")), None)
        .await?
        .iter()
        .map(HistoryEntry::from_document)
        .collect::<Fallible<Vec<HistoryEntry>>>()?;
    Ok(Some(CardRecord::from_document(deck, &doc)?.with_history(history)))
}

/// How many of a deck's cards are due, new, and mastered.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeckCounts {
    pub deck: DeckId,
    pub total: usize,
    pub due: usize,
    pub new: usize,
    pub mastered: usize,
}

pub async fn deck_counts<S: RemoteStore>(
    store: &S,
    uid: &str,
    now: Timestamp,
) -> Fallible<Vec<DeckCounts>> {
    let library = Library::load(store, uid).await?;
    let mut counts = Vec::with_capacity(library.decks.len());
    for deck in library.decks {
        let docs: Vec<Document> = store
            .query(&paths::records(uid, &deck.id), &[], None, None)
            .await?;
        let due = store
            .query(
                &paths::records(uid, &deck.id),
                &[Filter::eq("new", false), Filter::le("due", now.to_string())],
                None,
                None,
            )
            .await?
            .len();
        counts.push(DeckCounts {
            deck: deck.id,
            total: docs.len(),
            due,
            new: docs
                .iter()
                .filter(|doc| doc.bool_field("new") == Some(true))
                .count(),
            mastered: docs
                .iter()
                .filter(|doc| doc.bool_field("mastered").unwrap_or(false))
                .count(),
        });
    }
    Ok(counts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rating::Rating;
    use crate::scheduler::apply_rating;
    use crate::store::MemoryStore;

    fn ts(s: &str) -> Timestamp {
        Timestamp::try_from(s.to_string()).unwrap()
    }

    fn card(deck: &str, id: &str, section: &str) -> Card {
        Card {
            id: CardId::new(id),
            deck_id: DeckId::new(deck),
            section_id: SectionId::new(section),
            front: format!("front of {id}"),
            back: format!("back of {id}"),
            created_at: None,
            updated_at: None,
            views: 0,
            skips: 0,
        }
    }

    #[tokio::test]
    async fn test_load_orders_decks_and_sections() -> Fallible<()> {
        let store = MemoryStore::new();
        let d1 = DeckId::new("zeta");
        let d2 = DeckId::new("alpha");
        let late = Section {
            id: SectionId::new("a-late"),
            name: "Late".to_string(),
        };
        let early = Section {
            id: SectionId::new("b-early"),
            name: "Early".to_string(),
        };
        publish_section(&store, &d1, &late, 2).await?;
        publish_section(&store, &d1, &early, 1).await?;
        acquire_deck(&store, "u1", &d1, ts("2024-01-01T00:00:00.000")).await?;
        acquire_deck(&store, "u1", &d2, ts("2024-01-02T00:00:00.000")).await?;

        let library = Library::load(&store, "u1").await?;
        let ids: Vec<&DeckId> = library.decks.iter().map(|d| &d.id).collect();
        assert_eq!(ids, vec![&d1, &d2]);
        let sections: Vec<&str> = library.decks[0]
            .sections
            .iter()
            .map(|s| s.id.as_str())
            .collect();
        assert_eq!(sections, vec!["", "b-early", "a-late"]);
        assert_eq!(library.deck(&d2).unwrap().sections.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_acquire_is_idempotent() -> Fallible<()> {
        let store = MemoryStore::new();
        let deck = DeckId::new("d1");
        publish_card(&store, &card("d1", "c1", "")).await?;
        publish_card(&store, &card("d1", "c2", "s1")).await?;
        let now = ts("2024-01-01T00:00:00.000");
        assert_eq!(acquire_deck(&store, "u1", &deck, now).await?, 2);
        assert_eq!(acquire_deck(&store, "u1", &deck, now).await?, 0);

        let record = load_record(&store, "u1", &deck, &CardId::new("c2"))
            .await?
            .unwrap();
        assert!(record.is_new);
        assert_eq!(record.section_id, SectionId::new("s1"));
        assert!(load_record(&store, "u1", &deck, &CardId::new("c3")).await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_remove_deck_deletes_records_and_history() -> Fallible<()> {
        let store = MemoryStore::new();
        let deck = DeckId::new("d1");
        publish_card(&store, &card("d1", "c1", "")).await?;
        let now = ts("2024-01-01T00:00:00.000");
        acquire_deck(&store, "u1", &deck, now).await?;
        let record = load_record(&store, "u1", &deck, &CardId::new("c1"))
            .await?
            .unwrap();
        let outcome = apply_rating(&record, Rating::Easy, 0, now)?;
        let history_path = format!(
            "{}/{}",
            paths::history("u1", &deck, &record.id),
            HistoryEntry::document_id(0)
        );
        store
            .set_document(&history_path, outcome.record.history[0].to_fields())
            .await?;

        remove_deck(&store, "u1", &deck).await?;
        assert!(store.get_document(&history_path).await?.is_none());
        assert!(load_record(&store, "u1", &deck, &record.id).await?.is_none());
        assert!(Library::load(&store, "u1").await?.decks.is_empty());
        // The deck's content is untouched.
        assert!(store.get_document(&paths::deck_card(&deck, &record.id)).await?.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn test_deck_counts() -> Fallible<()> {
        let store = MemoryStore::new();
        let deck = DeckId::new("d1");
        for id in ["c1", "c2", "c3"] {
            publish_card(&store, &card("d1", id, "")).await?;
        }
        let now = ts("2024-01-01T00:00:00.000");
        acquire_deck(&store, "u1", &deck, now).await?;
        let record = load_record(&store, "u1", &deck, &CardId::new("c1"))
            .await?
            .unwrap();
        let outcome = apply_rating(&record, Rating::Forgot, 0, now)?;
        store
            .set_document(&paths::record("u1", &deck, &record.id), outcome.record.to_fields())
            .await?;

        let counts = deck_counts(&store, "u1", now).await?;
        assert_eq!(counts[0].total, 3);
        assert_eq!(counts[0].new, 2);
        assert_eq!(counts[0].due, 0);
        let counts = deck_counts(&store, "u1", now.plus_days(1)).await?;
        assert_eq!(counts[0].due, 1);
        assert_eq!(counts[0].mastered, 0);
        Ok(())
    }
}
