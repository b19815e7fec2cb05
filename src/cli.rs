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

use std::sync::Arc;

use clap::Parser;
use clap::Subcommand;
use memorize_core::clock::SystemClock;
use memorize_core::error::Fallible;
use memorize_core::error::fail;
use memorize_core::session::Scope;
use memorize_core::types::card::DeckId;
use memorize_core::types::card::SectionId;

use crate::cmd::import::DeckFile;
use crate::cmd::import::import_deck;
use crate::cmd::remove::remove;
use crate::cmd::review::review;
use crate::cmd::stats::StatsFormat;
use crate::cmd::stats::collect_stats;
use crate::cmd::stats::render_stats;
use crate::config::Config;
use crate::db::SqliteStore;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to the config file. By default, memorize.toml in the current directory is used if it exists.
    #[arg(long, global = true)]
    config: Option<String>,
    /// Path to the database. Overrides the config file.
    #[arg(long, global = true)]
    database: Option<String>,
    /// The user whose library to use. Overrides the config file.
    #[arg(long, global = true)]
    user: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Review cards in the terminal. By default, the whole library is reviewed.
    Review {
        /// Only review cards from this deck.
        #[arg(long)]
        deck: Option<String>,
        /// Only review cards from this section of the deck. Requires --deck.
        #[arg(long, requires = "deck")]
        section: Option<String>,
    },
    /// Publish a deck from a TOML file and add it to the library.
    Import {
        /// Path to the deck file.
        file: String,
    },
    /// Print library statistics.
    Stats {
        /// Which output format to use.
        #[arg(long, default_value_t = StatsFormat::Text)]
        format: StatsFormat,
    },
    /// Remove a deck and all progress on it from the library.
    Remove {
        /// The deck's id.
        deck: String,
    },
}

fn review_scope(deck: Option<String>, section: Option<String>) -> Fallible<Scope> {
    match (deck, section) {
        (None, None) => Ok(Scope::Library),
        (Some(deck), None) => Ok(Scope::Deck(DeckId::new(deck))),
        (Some(deck), Some(section)) => Ok(Scope::Section {
            deck: DeckId::new(deck),
            section: SectionId::new(section),
        }),
        (None, Some(_)) => fail("--section requires --deck"),
    }
}

pub async fn entrypoint() -> Fallible<()> {
    let cli: Cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(database) = cli.database {
        config.database = database;
    }
    if let Some(user) = cli.user {
        config.user = user;
    }
    let store = Arc::new(SqliteStore::new(&config.database)?);
    log::debug!(
        "Using database {} ({} documents) as {}",
        config.database,
        store.document_count()?,
        config.user
    );
    match cli.command {
        Command::Review { deck, section } => {
            let scope = review_scope(deck, section)?;
            review(store, SystemClock, &config, scope).await
        }
        Command::Import { file } => {
            let text = std::fs::read_to_string(&file)?;
            let deck = DeckFile::parse(&text)?;
            let created = import_deck(store.as_ref(), &SystemClock, &config.user, &deck).await?;
            println!(
                "Imported deck {} with {} cards ({created} new).",
                deck.id,
                deck.cards.len()
            );
            Ok(())
        }
        Command::Stats { format } => {
            let stats = collect_stats(store.as_ref(), &SystemClock, &config.user).await?;
            print!("{}", render_stats(&stats, format)?);
            Ok(())
        }
        Command::Remove { deck } => {
            remove(store.as_ref(), &config.user, &deck).await?;
            println!("Removed deck {deck}.");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_review_scope() -> Fallible<()> {
        assert_eq!(review_scope(None, None)?, Scope::Library);
        assert_eq!(
            review_scope(Some("spanish".to_string()), None)?,
            Scope::Deck(DeckId::new("spanish"))
        );
        assert_eq!(
            review_scope(Some("spanish".to_string()), Some("verbs".to_string()))?,
            Scope::Section {
                deck: DeckId::new("spanish"),
                section: SectionId::new("verbs"),
            }
        );
        assert!(review_scope(None, Some("verbs".to_string())).is_err());
        Ok(())
    }

    #[test]
    fn test_parse_review_command() {
        let cli = Cli::try_parse_from(["memorize", "review", "--deck", "spanish", "--user", "bob"])
            .unwrap();
        assert_eq!(cli.user.as_deref(), Some("bob"));
        match cli.command {
            Command::Review { deck, section } => {
                assert_eq!(deck.as_deref(), Some("spanish"));
                assert_eq!(section, None);
            }
            _ => panic!("expected review"),
        }
        assert!(Cli::try_parse_from(["memorize", "review", "--section", "verbs"]).is_err());
    }
}
