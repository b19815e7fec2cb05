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

//! Where documents live in the store.

use crate::types::card::CardId;
use crate::types::card::DeckId;

pub fn user(uid: &str) -> String {
    format!("users/{uid}")
}

/// The decks a user has added to their library.
pub fn user_decks(uid: &str) -> String {
    format!("users/{uid}/decks")
}

pub fn user_deck(uid: &str, deck: &DeckId) -> String {
    format!("users/{uid}/decks/{deck}")
}

/// The user's learning records for the cards of a deck.
pub fn records(uid: &str, deck: &DeckId) -> String {
    format!("users/{uid}/decks/{deck}/cards")
}

pub fn record(uid: &str, deck: &DeckId, card: &CardId) -> String {
    format!("users/{uid}/decks/{deck}/cards/{card}")
}

pub fn history(uid: &str, deck: &DeckId, card: &CardId) -> String {
    format!("users/{uid}/decks/{deck}/cards/{card}/history")
}

pub fn deck_cards(deck: &DeckId) -> String {
    format!("decks/{deck}/cards")
}

pub fn deck_card(deck: &DeckId, card: &CardId) -> String {
    format!("decks/{deck}/cards/{card}")
}

pub fn deck_sections(deck: &DeckId) -> String {
    format!("decks/{deck}/sections")
}
