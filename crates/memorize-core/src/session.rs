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

//! Review sessions.
//!
//! A session walks the cards of a section, a deck, or the whole library. It
//! first drains the due cards unit by unit, then restarts from the first unit
//! and goes through the new cards. In section and deck sessions a unit is a
//! section; in library sessions a unit is a whole deck.

use std::collections::HashMap;
use std::collections::HashSet;
use std::fmt::Display;
use std::fmt::Formatter;
use std::sync::Arc;
use std::sync::Mutex;

use serde_json::Value;

use crate::clock::Clock;
use crate::error::Fallible;
use crate::error::Issue;
use crate::error::fail;
use crate::library::Library;
use crate::paths;
use crate::rating::Rating;
use crate::recap::Recap;
use crate::scheduler::MASTERY_STREAK_THRESHOLD;
use crate::scheduler::apply_rating;
use crate::store::Change;
use crate::store::ChangeKind;
use crate::store::Document;
use crate::store::Fields;
use crate::store::Filter;
use crate::store::ListenerHandle;
use crate::store::OrderBy;
use crate::store::RemoteStore;
use crate::store::document_id;
use crate::types::card::Card;
use crate::types::card::CardId;
use crate::types::card::DeckId;
use crate::types::card::SectionId;
use crate::types::record::CardRecord;
use crate::types::record::HistoryEntry;
use crate::types::timestamp::Timestamp;
use crate::xp::XpPolicy;

/// Which cards a session reviews.
#[derive(Clone, Debug, PartialEq)]
pub enum Scope {
    Section { deck: DeckId, section: SectionId },
    Deck(DeckId),
    Library,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    AwaitingCard,
    CardPresented,
    AwaitingRating,
    Persisting,
    Finished,
}

impl Display for SessionState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionState::AwaitingCard => "awaiting card",
            SessionState::CardPresented => "card presented",
            SessionState::AwaitingRating => "awaiting rating",
            SessionState::Persisting => "persisting",
            SessionState::Finished => "finished",
        };
        write!(f, "{name}")
    }
}

/// Everything a session needs from the outside world.
pub struct SessionContext<S, C, X> {
    pub store: Arc<S>,
    pub clock: C,
    pub xp: X,
    pub user_id: String,
}

/// A card as it went through the session.
#[derive(Clone, Debug, PartialEq)]
pub struct ReviewData {
    pub card: Card,
    /// The card's state when it was presented.
    pub record: CardRecord,
    pub presented_at: Timestamp,
    pub rating: Option<Rating>,
    /// The card's state after the rating.
    pub reviewed: Option<CardRecord>,
    pub newly_mastered: Option<bool>,
    pub xp_awarded: u32,
    /// Whether the rating was written to the store.
    pub persisted: bool,
}

impl ReviewData {
    pub fn is_new(&self) -> bool {
        self.record.is_new
    }
}

/// What happened when a card was rated.
#[derive(Clone, Debug, PartialEq)]
pub struct RatingReport {
    pub card: CardId,
    pub rating: Rating,
    pub streak: u32,
    pub newly_mastered: bool,
    pub xp_awarded: u32,
    pub due_date: Timestamp,
    pub interval_days: i64,
    pub feedback: &'static str,
    pub persisted: bool,
}

/// Which of a deck's cards a unit covers.
#[derive(Clone, Debug, PartialEq)]
enum Portion {
    Deck,
    Section(SectionId),
    /// Cards whose section is not one of these. Catches cards whose section
    /// was never published or has been deleted.
    Unlisted(Vec<SectionId>),
}

#[derive(Clone, Debug, PartialEq)]
struct Unit {
    deck: DeckId,
    portion: Portion,
}

impl Unit {
    fn filters(&self) -> Vec<Filter> {
        match &self.portion {
            Portion::Section(section) => vec![Filter::eq("section", section.as_str())],
            Portion::Deck | Portion::Unlisted(_) => Vec::new(),
        }
    }

    /// Whether a record or card document belongs to this unit.
    fn contains(&self, doc: &Document) -> bool {
        match &self.portion {
            Portion::Unlisted(listed) => {
                let section = doc.str_field("section").unwrap_or_default();
                !listed.iter().any(|listed| listed.as_str() == section)
            }
            Portion::Deck | Portion::Section(_) => true,
        }
    }

    /// The query limit needed to find one card past `excluded` cards. Unlisted
    /// units filter after the query, so they read everything.
    fn limit(&self, excluded: usize) -> Option<usize> {
        match &self.portion {
            Portion::Unlisted(_) => None,
            Portion::Deck | Portion::Section(_) => Some(excluded + 1),
        }
    }
}

impl Display for Unit {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.portion {
            Portion::Deck => write!(f, "{}", self.deck),
            Portion::Section(section) => write!(f, "{}/{}", self.deck, section),
            Portion::Unlisted(_) => write!(f, "{}/(unlisted sections)", self.deck),
        }
    }
}

enum Candidate {
    /// A card with a learning record.
    Recorded(Document),
    /// A card of the deck the user has no record for yet.
    Unrecorded(Document),
}

type CardKey = (DeckId, CardId);

pub struct ReviewSession<S, C, X> {
    context: SessionContext<S, C, X>,
    scope: Scope,
    units: Vec<Unit>,
    cursor: usize,
    reviewing_new_cards: bool,
    state: SessionState,
    current: Option<ReviewData>,
    reviews: Vec<ReviewData>,
    initial_xp: u64,
    due_at_start: usize,
    /// Cards presented or skipped this session. They are never presented again.
    handled: HashSet<CardKey>,
    /// Cards removed from the store while the session was running.
    removed: Arc<Mutex<HashSet<CardKey>>>,
    issues: Vec<Issue>,
    _listeners: Vec<ListenerHandle>,
}

impl<S, C, X> ReviewSession<S, C, X>
where
    S: RemoteStore,
    C: Clock,
    X: XpPolicy,
{
    pub async fn start(context: SessionContext<S, C, X>, scope: Scope) -> Fallible<Self> {
        let store = context.store.clone();
        let uid = context.user_id.clone();
        let library = Library::load(store.as_ref(), &uid).await?;
        let units: Vec<Unit> = match &scope {
            Scope::Section { deck, section } => {
                if library.deck(deck).is_none() {
                    return fail(format!("deck {deck} is not in the library"));
                }
                vec![Unit {
                    deck: deck.clone(),
                    portion: Portion::Section(section.clone()),
                }]
            }
            Scope::Deck(deck) => match library.deck(deck) {
                Some(entry) => {
                    let mut units: Vec<Unit> = entry
                        .sections
                        .iter()
                        .map(|section| Unit {
                            deck: deck.clone(),
                            portion: Portion::Section(section.id.clone()),
                        })
                        .collect();
                    units.push(Unit {
                        deck: deck.clone(),
                        portion: Portion::Unlisted(
                            entry.sections.iter().map(|section| section.id.clone()).collect(),
                        ),
                    });
                    units
                }
                None => return fail(format!("deck {deck} is not in the library")),
            },
            Scope::Library => library
                .decks
                .iter()
                .map(|deck| Unit {
                    deck: deck.id.clone(),
                    portion: Portion::Deck,
                })
                .collect(),
        };

        let initial_xp: u64 = store
            .get_document(&paths::user(&uid))
            .await?
            .and_then(|user| user.fields.get("xp").and_then(Value::as_u64))
            .unwrap_or(0);

        // Size up the scope.
        let now = context.clock.now();
        let mut cards_in_scope = 0;
        let mut due_at_start = 0;
        for unit in units.iter() {
            let filters = unit.filters();
            let records: Vec<Document> = store
                .query(&paths::records(&uid, &unit.deck), &filters, None, None)
                .await?
                .into_iter()
                .filter(|doc| unit.contains(doc))
                .collect();
            let contents = store
                .query(&paths::deck_cards(&unit.deck), &filters, None, None)
                .await?
                .into_iter()
                .filter(|doc| unit.contains(doc))
                .count();
            cards_in_scope += records.len().max(contents);
            due_at_start += records
                .iter()
                .filter(|doc| {
                    Filter::eq("new", false).matches(&doc.fields)
                        && Filter::le("due", now.to_string()).matches(&doc.fields)
                })
                .count();
        }

        // Watch for cards and records disappearing mid-session.
        let removed: Arc<Mutex<HashSet<CardKey>>> = Arc::new(Mutex::new(HashSet::new()));
        let mut listeners = Vec::new();
        let mut decks: Vec<&DeckId> = units.iter().map(|unit| &unit.deck).collect();
        decks.dedup();
        for deck in decks {
            for collection in [paths::deck_cards(deck), paths::records(&uid, deck)] {
                let removed = removed.clone();
                let deck = deck.clone();
                listeners.push(store.add_change_listener(
                    &collection,
                    Box::new(move |change: &Change| {
                        if change.kind == ChangeKind::Removed {
                            let card = CardId::new(document_id(&change.path));
                            removed.lock().unwrap().insert((deck.clone(), card));
                        }
                    }),
                ));
            }
        }

        let mut session = ReviewSession {
            context,
            scope,
            units,
            cursor: 0,
            reviewing_new_cards: false,
            state: SessionState::AwaitingCard,
            current: None,
            reviews: Vec::new(),
            initial_xp,
            due_at_start,
            handled: HashSet::new(),
            removed,
            issues: Vec::new(),
            _listeners: listeners,
        };
        if cards_in_scope == 0 {
            log::debug!("Nothing to review in {:?}", session.scope);
            session.report(Issue::EmptyScope);
            session.state = SessionState::Finished;
        }
        Ok(session)
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn is_reviewing_new_cards(&self) -> bool {
        self.reviewing_new_cards
    }

    pub fn current(&self) -> Option<&ReviewData> {
        self.current.as_ref()
    }

    pub fn reviews(&self) -> &[ReviewData] {
        &self.reviews
    }

    pub fn issues(&self) -> &[Issue] {
        &self.issues
    }

    /// The number of cards rated so far and the number of cards that were due
    /// when the session started. New cards make the first number outgrow the
    /// second.
    pub fn progress(&self) -> (usize, usize) {
        (self.reviews.len(), self.due_at_start)
    }

    /// XP earned so far.
    pub fn xp_gained(&self) -> u64 {
        self.reviews.iter().map(|r| u64::from(r.xp_awarded)).sum()
    }

    /// Present the next card, or finish the session if there is none left.
    ///
    /// A failed read leaves the session waiting for a card, so the call can
    /// simply be retried.
    pub async fn next_card(&mut self) -> Fallible<Option<&ReviewData>> {
        match self.state {
            SessionState::AwaitingCard => {}
            SessionState::Finished => return Ok(None),
            state => return fail(format!("cannot load the next card while {state}")),
        }
        loop {
            if self.cursor >= self.units.len() {
                if self.reviewing_new_cards {
                    log::debug!("No cards left, session finished");
                    self.state = SessionState::Finished;
                    return Ok(None);
                }
                log::debug!("No due cards left, switching to new cards");
                self.reviewing_new_cards = true;
                self.cursor = 0;
                continue;
            }
            let unit = self.units[self.cursor].clone();
            let Some(candidate) = self.find_candidate(&unit).await? else {
                log::debug!("Unit {unit} exhausted");
                self.cursor += 1;
                continue;
            };
            if let Some(data) = self.prepare(&unit.deck, candidate).await? {
                log::debug!("Presenting card {}/{}", data.card.deck_id, data.card.id);
                self.current = Some(data);
                self.state = SessionState::CardPresented;
                return Ok(self.current.as_ref());
            }
        }
    }

    /// Flip the presented card. Ratings are accepted from here on.
    pub fn reveal(&mut self) -> Fallible<()> {
        match self.state {
            SessionState::CardPresented => {
                self.state = SessionState::AwaitingRating;
                Ok(())
            }
            SessionState::AwaitingRating => Ok(()),
            state => fail(format!("there is no card to reveal while {state}")),
        }
    }

    /// Drop the presented card without rating it.
    pub async fn skip(&mut self) -> Fallible<()> {
        if !matches!(
            self.state,
            SessionState::CardPresented | SessionState::AwaitingRating
        ) {
            return fail(format!("there is no card to skip while {}", self.state));
        }
        let Some(data) = self.current.take() else {
            return fail("there is no card to skip");
        };
        self.state = SessionState::AwaitingCard;
        let mut fields = Fields::new();
        fields.insert("skipCount".into(), Value::from(data.card.skips + 1));
        let path = paths::deck_card(&data.card.deck_id, &data.card.id);
        if let Err(e) = self.context.store.update_document(&path, fields).await {
            log::warn!("Unable to count skip of card {}: {e}", data.card.id);
        }
        Ok(())
    }

    /// Rate the revealed card, save the result, and get ready for the next
    /// card. Failing to save does not stop the session: the failure is
    /// reported as an issue and the session goes on with the in-memory state.
    ///
    /// Saving runs as a separate task, so dropping the returned future does
    /// not abort the write.
    pub async fn rate(&mut self, rating: Rating) -> Fallible<RatingReport> {
        if self.state != SessionState::AwaitingRating {
            return fail(format!("cannot rate a card while {}", self.state));
        }
        let Some(mut data) = self.current.take() else {
            return fail("there is no card to rate");
        };
        let key = (data.card.deck_id.clone(), data.card.id.clone());
        if self.removed.lock().unwrap().contains(&key) {
            self.state = SessionState::AwaitingCard;
            return fail(format!("card {} was removed", data.card.id));
        }

        let now = self.context.clock.now();
        let view_time_ms = now.millis_since(data.presented_at);
        let outcome = match apply_rating(&data.record, rating, view_time_ms, now) {
            Ok(outcome) => outcome,
            Err(e) => {
                self.report(Issue::InvariantViolation {
                    card: data.card.id.clone(),
                    message: e.message().to_string(),
                });
                self.state = SessionState::AwaitingCard;
                return Err(e);
            }
        };
        let xp = self.context.xp.award();

        self.state = SessionState::Persisting;
        let persisted = match self.persist(&outcome.record, xp).await {
            Ok(()) => true,
            Err(e) => {
                self.report(Issue::PersistenceFailure {
                    card: data.card.id.clone(),
                    message: e.message().to_string(),
                });
                false
            }
        };

        let record = &outcome.record;
        let report = RatingReport {
            card: record.id.clone(),
            rating,
            streak: record.streak,
            newly_mastered: outcome.newly_mastered,
            xp_awarded: xp,
            due_date: record.due_date.unwrap_or(now),
            interval_days: outcome.interval_days,
            feedback: rating.feedback(record.streak, MASTERY_STREAK_THRESHOLD),
            persisted,
        };
        data.rating = Some(rating);
        data.newly_mastered = Some(outcome.newly_mastered);
        data.xp_awarded = xp;
        data.persisted = persisted;
        data.reviewed = Some(outcome.record);
        self.reviews.push(data);
        self.state = SessionState::AwaitingCard;
        Ok(report)
    }

    /// A summary of the session so far.
    pub fn recap(&self) -> Recap {
        Recap::from_reviews(&self.reviews, self.initial_xp, &self.issues)
    }

    /// End the session, at any point, and summarize it.
    pub fn finish(self) -> Recap {
        self.recap()
    }

    fn report(&mut self, issue: Issue) {
        match &issue {
            Issue::RecordNotFound { .. } | Issue::EmptyScope => log::info!("{issue}"),
            _ => log::warn!("{issue}"),
        }
        self.issues.push(issue);
    }

    fn is_excluded(&self, key: &CardKey) -> bool {
        self.handled.contains(key) || self.removed.lock().unwrap().contains(key)
    }

    async fn find_candidate(&self, unit: &Unit) -> Fallible<Option<Candidate>> {
        let uid = &self.context.user_id;
        let store = self.context.store.as_ref();
        let mut filters: Vec<Filter> = unit.filters();
        let order = if self.reviewing_new_cards {
            filters.push(Filter::eq("new", true));
            None
        } else {
            filters.push(Filter::eq("new", false));
            filters.push(Filter::le("due", self.context.clock.now().to_string()));
            Some(OrderBy::asc("due"))
        };
        // Excluded cards may fill the first slots, so ask for enough to get
        // past all of them.
        let limit = unit.limit(self.handled.len() + self.removed.lock().unwrap().len());
        let records = store
            .query(&paths::records(uid, &unit.deck), &filters, order.as_ref(), limit)
            .await?;
        let found = records.into_iter().find(|doc| {
            unit.contains(doc) && !self.is_excluded(&(unit.deck.clone(), CardId::new(doc.id())))
        });
        if found.is_some() || !self.reviewing_new_cards {
            return Ok(found.map(Candidate::Recorded));
        }

        // Cards published after the deck was added have no record yet. A
        // record without a `new` flag matches neither phase's query, so it is
        // handed over as is and reported as malformed.
        let mut records: HashMap<String, Document> = store
            .query(&paths::records(uid, &unit.deck), &[], None, None)
            .await?
            .into_iter()
            .map(|doc| (doc.id().to_string(), doc))
            .collect();
        let contents = store
            .query(&paths::deck_cards(&unit.deck), &unit.filters(), None, None)
            .await?;
        for content in contents {
            if !unit.contains(&content)
                || self.is_excluded(&(unit.deck.clone(), CardId::new(content.id())))
            {
                continue;
            }
            match records.remove(content.id()) {
                None => return Ok(Some(Candidate::Unrecorded(content))),
                Some(record) if record.bool_field("new").is_none() => {
                    return Ok(Some(Candidate::Recorded(record)));
                }
                Some(_) => {}
            }
        }
        Ok(None)
    }

    /// Turn a candidate into a card ready to be presented. Returns `None` if
    /// the card has to be skipped.
    async fn prepare(&mut self, deck: &DeckId, candidate: Candidate) -> Fallible<Option<ReviewData>> {
        let uid = self.context.user_id.clone();
        let store = self.context.store.clone();
        let (card_id, record_doc, content_doc) = match candidate {
            Candidate::Recorded(doc) => {
                let card_id = CardId::new(doc.id());
                let content = store.get_document(&paths::deck_card(deck, &card_id)).await?;
                (card_id, Some(doc), content)
            }
            Candidate::Unrecorded(doc) => (CardId::new(doc.id()), None, Some(doc)),
        };
        self.handled.insert((deck.clone(), card_id.clone()));

        let Some(content_doc) = content_doc else {
            log::debug!("Card {deck}/{card_id} no longer exists, skipping it");
            return Ok(None);
        };
        let card = match Card::from_document(deck, &content_doc) {
            Ok(card) => card,
            Err(e) => {
                self.report(Issue::InvariantViolation {
                    card: card_id,
                    message: e.message().to_string(),
                });
                return Ok(None);
            }
        };

        let record = match record_doc {
            Some(doc) => {
                let history_docs = store
                    .query(
                        &paths::history(&uid, deck, &card_id),
                        &[],
                        Some(&OrderBy::asc("date")),
                        None,
                    )
                    .await?;
                let decoded = history_docs
                    .iter()
                    .map(HistoryEntry::from_document)
                    .collect::<Fallible<Vec<HistoryEntry>>>()
                    .and_then(|history| {
                        let record = CardRecord::from_document(deck, &doc)?.with_history(history);
                        record.check()?;
                        Ok(record)
                    });
                match decoded {
                    Ok(record) => record,
                    Err(e) => {
                        self.report(Issue::InvariantViolation {
                            card: card_id,
                            message: e.message().to_string(),
                        });
                        return Ok(None);
                    }
                }
            }
            None => {
                self.report(Issue::RecordNotFound {
                    card: card_id.clone(),
                });
                CardRecord::new(card_id, deck.clone(), card.section_id.clone())
            }
        };

        Ok(Some(ReviewData {
            card,
            record,
            presented_at: self.context.clock.now(),
            rating: None,
            reviewed: None,
            newly_mastered: None,
            xp_awarded: 0,
            persisted: false,
        }))
    }

    /// Write a reviewed record, its newest history entry, and the XP award
    /// in a single batch, so a failure never leaves a record without its
    /// history.
    async fn persist(&self, record: &CardRecord, xp: u32) -> Fallible<()> {
        let store = self.context.store.clone();
        let uid = self.context.user_id.clone();
        let mut writes: Vec<(String, Fields)> = vec![(
            paths::record(&uid, &record.deck_id, &record.id),
            record.to_fields(),
        )];
        if let Some(entry) = record.history.last() {
            writes.push((
                format!(
                    "{}/{}",
                    paths::history(&uid, &record.deck_id, &record.id),
                    HistoryEntry::document_id(record.history.len() - 1)
                ),
                entry.to_fields(),
            ));
        }
        let task = tokio::spawn(async move {
            if xp > 0 {
                let user_path = paths::user(&uid);
                let mut user = store
                    .get_document(&user_path)
                    .await?
                    .map(|doc| doc.fields)
                    .unwrap_or_default();
                let total = user.get("xp").and_then(Value::as_u64).unwrap_or(0);
                user.insert("xp".into(), Value::from(total + u64::from(xp)));
                writes.push((user_path, user));
            }
            store.set_documents(writes).await
        });
        task.await?
    }
}
