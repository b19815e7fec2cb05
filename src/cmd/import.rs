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

use std::collections::HashSet;

use memorize_core::clock::Clock;
use memorize_core::error::Fallible;
use memorize_core::error::fail;
use memorize_core::library::Section;
use memorize_core::library::acquire_deck;
use memorize_core::library::publish_card;
use memorize_core::library::publish_section;
use memorize_core::paths;
use memorize_core::store::RemoteStore;
use memorize_core::types::card::Card;
use memorize_core::types::card::CardId;
use memorize_core::types::card::DeckId;
use memorize_core::types::card::SectionId;
use serde::Deserialize;

/// A deck as written in a deck file.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeckFile {
    pub id: String,
    #[serde(default)]
    pub sections: Vec<SectionEntry>,
    #[serde(default)]
    pub cards: Vec<CardEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SectionEntry {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CardEntry {
    pub id: String,
    /// Cards without a section are unsectioned.
    #[serde(default)]
    pub section: String,
    pub front: String,
    pub back: String,
}

impl DeckFile {
    pub fn parse(text: &str) -> Fallible<Self> {
        let deck: DeckFile = toml::from_str(text)?;
        deck.validate()?;
        Ok(deck)
    }

    fn validate(&self) -> Fallible<()> {
        check_id("deck", &self.id)?;
        let mut sections: HashSet<&str> = HashSet::new();
        for section in self.sections.iter() {
            check_id("section", &section.id)?;
            if !sections.insert(&section.id) {
                return fail(format!("duplicate section: {}", section.id));
            }
        }
        let mut cards: HashSet<&str> = HashSet::new();
        for card in self.cards.iter() {
            check_id("card", &card.id)?;
            if !cards.insert(&card.id) {
                return fail(format!("duplicate card: {}", card.id));
            }
            if !card.section.is_empty() && !sections.contains(card.section.as_str()) {
                return fail(format!(
                    "card {} is in unknown section {}",
                    card.id, card.section
                ));
            }
        }
        Ok(())
    }
}

fn check_id(kind: &str, id: &str) -> Fallible<()> {
    if id.is_empty() || id.contains('/') {
        return fail(format!("invalid {kind} id: '{id}'"));
    }
    Ok(())
}

/// Publish a deck's sections and cards and add the deck to the user's
/// library. Returns the number of new learning records.
pub async fn import_deck<S: RemoteStore, C: Clock>(
    store: &S,
    clock: &C,
    uid: &str,
    deck: &DeckFile,
) -> Fallible<usize> {
    let now = clock.now();
    let deck_id = DeckId::new(deck.id.as_str());
    for (order, entry) in deck.sections.iter().enumerate() {
        let section = Section {
            id: SectionId::new(entry.id.as_str()),
            name: entry.name.clone(),
        };
        publish_section(store, &deck_id, &section, order as u32).await?;
    }
    for entry in deck.cards.iter() {
        let id = CardId::new(entry.id.as_str());
        let existing = store.get_document(&paths::deck_card(&deck_id, &id)).await?;
        let card = match existing {
            Some(doc) => {
                let mut card = Card::from_document(&deck_id, &doc)?;
                card.section_id = SectionId::new(entry.section.as_str());
                card.front = entry.front.clone();
                card.back = entry.back.clone();
                card.updated_at = Some(now);
                card
            }
            None => Card {
                id,
                deck_id: deck_id.clone(),
                section_id: SectionId::new(entry.section.as_str()),
                front: entry.front.clone(),
                back: entry.back.clone(),
                created_at: Some(now),
                updated_at: Some(now),
                views: 0,
                skips: 0,
            },
        };
        publish_card(store, &card).await?;
    }
    log::debug!(
        "Published deck {deck_id}: {} sections, {} cards",
        deck.sections.len(),
        deck.cards.len()
    );
    acquire_deck(store, uid, &deck_id, now).await
}

#[cfg(test)]
mod tests {
    use memorize_core::clock::FixedClock;
    use memorize_core::library::Library;
    use memorize_core::library::load_record;
    use memorize_core::store::MemoryStore;
    use memorize_core::types::timestamp::Timestamp;

    use super::*;

    const DECK: &str = r#"
id = "spanish"

[[sections]]
id = "verbs"
name = "Verbs"

[[cards]]
id = "hola"
front = "hola"
back = "hello"

[[cards]]
id = "ser"
section = "verbs"
front = "ser"
back = "to be"
"#;

    fn clock() -> FixedClock {
        FixedClock::new(Timestamp::try_from("2025-03-10T12:00:00.000".to_string()).unwrap())
    }

    #[test]
    fn test_parse_deck_file() -> Fallible<()> {
        let deck = DeckFile::parse(DECK)?;
        assert_eq!(deck.id, "spanish");
        assert_eq!(deck.sections.len(), 1);
        assert_eq!(deck.cards[0].section, "");
        assert_eq!(deck.cards[1].section, "verbs");
        Ok(())
    }

    #[test]
    fn test_reject_invalid_deck_files() {
        assert!(DeckFile::parse("id = \"a/b\"").is_err());
        let unknown_section = r#"
id = "spanish"
[[cards]]
id = "ser"
section = "verbs"
front = "ser"
back = "to be"
"#;
        assert!(DeckFile::parse(unknown_section).is_err());
        let duplicate = r#"
id = "spanish"
[[cards]]
id = "ser"
front = "ser"
back = "to be"
[[cards]]
id = "ser"
front = "ser"
back = "to be"
"#;
        assert!(DeckFile::parse(duplicate).is_err());
    }

    #[tokio::test]
    async fn test_import_deck() -> Fallible<()> {
        let store = MemoryStore::new();
        let clock = clock();
        let deck = DeckFile::parse(DECK)?;
        assert_eq!(import_deck(&store, &clock, "alice", &deck).await?, 2);

        let library = Library::load(&store, "alice").await?;
        let entry = library.deck(&DeckId::new("spanish")).unwrap();
        assert_eq!(entry.sections.len(), 2);
        assert_eq!(entry.sections[1].name, "Verbs");

        let record = load_record(&store, "alice", &DeckId::new("spanish"), &CardId::new("ser"))
            .await?
            .unwrap();
        assert!(record.is_new);
        assert_eq!(record.section_id, SectionId::new("verbs"));

        // Importing again creates no new records.
        assert_eq!(import_deck(&store, &clock, "alice", &deck).await?, 0);
        Ok(())
    }
}
