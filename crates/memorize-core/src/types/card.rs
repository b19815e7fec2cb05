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

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::error::Fallible;
use crate::store::Document;
use crate::store::Fields;
use crate::types::timestamp::Timestamp;

macro_rules! string_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

string_id!(
    /// Identifies a card within its deck. A card's learning record shares it.
    CardId
);

string_id!(DeckId);

string_id!(
    /// Identifies a section within its deck. The empty id is the deck's
    /// unsectioned section.
    SectionId
);

impl SectionId {
    pub fn unsectioned() -> Self {
        Self(String::new())
    }

    pub fn is_unsectioned(&self) -> bool {
        self.0.is_empty()
    }
}

/// A card's content, as published by the deck's author.
#[derive(Clone, Debug, PartialEq)]
pub struct Card {
    pub id: CardId,
    pub deck_id: DeckId,
    pub section_id: SectionId,
    pub front: String,
    pub back: String,
    pub created_at: Option<Timestamp>,
    pub updated_at: Option<Timestamp>,
    pub views: u32,
    pub skips: u32,
}

impl Card {
    pub fn from_document(deck_id: &DeckId, doc: &Document) -> Fallible<Self> {
        Ok(Card {
            id: CardId::new(doc.id()),
            deck_id: deck_id.clone(),
            section_id: SectionId::new(doc.str_field("section").unwrap_or_default()),
            front: doc.str_field("front").unwrap_or_default().to_string(),
            back: doc.str_field("back").unwrap_or_default().to_string(),
            created_at: doc.timestamp_field("created")?,
            updated_at: doc.timestamp_field("updated")?,
            views: doc.u32_field("viewCount")?.unwrap_or(0),
            skips: doc.u32_field("skipCount")?.unwrap_or(0),
        })
    }

    pub fn to_fields(&self) -> Fields {
        let mut fields = Fields::new();
        fields.insert("section".into(), self.section_id.as_str().into());
        fields.insert("front".into(), self.front.clone().into());
        fields.insert("back".into(), self.back.clone().into());
        if let Some(created_at) = self.created_at {
            fields.insert("created".into(), created_at.to_string().into());
        }
        if let Some(updated_at) = self.updated_at {
            fields.insert("updated".into(), updated_at.to_string().into());
        }
        fields.insert("viewCount".into(), Value::from(self.views));
        fields.insert("skipCount".into(), Value::from(self.skips));
        fields
    }
}
