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

use std::fmt::Display;
use std::fmt::Formatter;

use clap::ValueEnum;
use memorize_core::clock::Clock;
use memorize_core::error::Fallible;
use memorize_core::library::DeckCounts;
use memorize_core::library::deck_counts;
use memorize_core::paths;
use memorize_core::store::RemoteStore;
use serde::Serialize;
use serde_json::Value;

#[derive(ValueEnum, Clone)]
pub enum StatsFormat {
    /// Plain text output.
    Text,
    /// JSON output.
    Json,
}

impl Display for StatsFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            StatsFormat::Text => write!(f, "text"),
            StatsFormat::Json => write!(f, "json"),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    xp: u64,
    decks: Vec<DeckCounts>,
}

pub async fn collect_stats<S: RemoteStore, C: Clock>(
    store: &S,
    clock: &C,
    uid: &str,
) -> Fallible<Stats> {
    let xp = store
        .get_document(&paths::user(uid))
        .await?
        .and_then(|user| user.fields.get("xp").and_then(Value::as_u64))
        .unwrap_or(0);
    let decks = deck_counts(store, uid, clock.now()).await?;
    Ok(Stats { xp, decks })
}

pub fn render_stats(stats: &Stats, format: StatsFormat) -> Fallible<String> {
    match format {
        StatsFormat::Text => {
            let mut out = format!("XP: {}\n", stats.xp);
            if stats.decks.is_empty() {
                out.push_str("No decks in the library.\n");
            }
            for deck in stats.decks.iter() {
                out.push_str(&format!(
                    "{}: {} cards, {} due, {} new, {} mastered\n",
                    deck.deck, deck.total, deck.due, deck.new, deck.mastered
                ));
            }
            Ok(out)
        }
        StatsFormat::Json => Ok(serde_json::to_string_pretty(stats)?),
    }
}

#[cfg(test)]
mod tests {
    use memorize_core::clock::FixedClock;
    use memorize_core::library::acquire_deck;
    use memorize_core::library::publish_card;
    use memorize_core::store::MemoryStore;
    use memorize_core::types::card::Card;
    use memorize_core::types::card::CardId;
    use memorize_core::types::card::DeckId;
    use memorize_core::types::card::SectionId;
    use memorize_core::types::timestamp::Timestamp;

    use super::*;

    #[tokio::test]
    async fn test_stats() -> Fallible<()> {
        let store = MemoryStore::new();
        let clock =
            FixedClock::new(Timestamp::try_from("2025-03-10T12:00:00.000".to_string())?);
        let deck = DeckId::new("spanish");
        for id in ["hola", "adios"] {
            let card = Card {
                id: CardId::new(id),
                deck_id: deck.clone(),
                section_id: SectionId::unsectioned(),
                front: id.to_string(),
                back: String::new(),
                created_at: None,
                updated_at: None,
                views: 0,
                skips: 0,
            };
            publish_card(&store, &card).await?;
        }
        acquire_deck(&store, "alice", &deck, clock.now()).await?;

        let stats = collect_stats(&store, &clock, "alice").await?;
        assert_eq!(stats.xp, 0);
        let text = render_stats(&stats, StatsFormat::Text)?;
        assert!(text.contains("spanish: 2 cards, 0 due, 2 new, 0 mastered"));
        let json: Value = serde_json::from_str(&render_stats(&stats, StatsFormat::Json)?)?;
        assert_eq!(json["decks"][0]["new"], 2);
        Ok(())
    }
}
