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

use memorize_core::error::Fallible;
use memorize_core::error::fail;
use memorize_core::library::Library;
use memorize_core::library::remove_deck;
use memorize_core::store::RemoteStore;
use memorize_core::types::card::DeckId;

/// Remove a deck and the user's progress on it from the library.
pub async fn remove<S: RemoteStore>(store: &S, uid: &str, deck: &str) -> Fallible<()> {
    let deck = DeckId::new(deck);
    let library = Library::load(store, uid).await?;
    if library.deck(&deck).is_none() {
        return fail(format!("deck {deck} is not in the library"));
    }
    remove_deck(store, uid, &deck).await
}
