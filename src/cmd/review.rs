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

use std::io::Write;
use std::sync::Arc;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use memorize_core::clock::Clock;
use memorize_core::error::Fallible;
use memorize_core::rating::Rating;
use memorize_core::recap::Recap;
use memorize_core::session::ReviewSession;
use memorize_core::session::Scope;
use memorize_core::session::SessionContext;
use memorize_core::store::RemoteStore;
use memorize_core::xp::ChanceXp;
use memorize_core::xp::XpPolicy;
use tokio::io::AsyncBufRead;
use tokio::io::AsyncBufReadExt;
use tokio::io::BufReader;

use crate::config::Config;

pub async fn review<S: RemoteStore, C: Clock>(
    store: Arc<S>,
    clock: C,
    config: &Config,
    scope: Scope,
) -> Fallible<()> {
    let seed = config.seed.unwrap_or_else(|| {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos() as u64
    });
    let context = SessionContext {
        store,
        clock,
        xp: ChanceXp::new(config.xp, seed),
        user_id: config.user.clone(),
    };
    let mut session = ReviewSession::start(context, scope).await?;
    let stdin = BufReader::new(tokio::io::stdin());
    let mut stdout = std::io::stdout();
    let outcome = tokio::select! {
        result = review_loop(&mut session, stdin, &mut stdout) => result,
        _ = tokio::signal::ctrl_c() => {
            println!();
            log::debug!("Interrupted, ending the session");
            Ok(())
        }
    };
    if let Err(e) = &outcome {
        log::error!("Review ended early: {e}");
    }
    let recap = session.finish();
    print!("{}", render_recap(&recap));
    outcome
}

/// Present cards and read answers from `input` until the session runs out
/// of cards or the user quits. A card that fails to load can be retried.
pub async fn review_loop<S, C, X, R, W>(
    session: &mut ReviewSession<S, C, X>,
    input: R,
    out: &mut W,
) -> Fallible<()>
where
    S: RemoteStore,
    C: Clock,
    X: XpPolicy,
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let mut lines = input.lines();
    loop {
        let (reviewed, due) = session.progress();
        let data = match session.next_card().await {
            Ok(Some(data)) => data,
            Ok(None) => break,
            Err(e) => {
                log::warn!("Unable to load the next card: {e}");
                writeln!(out, "Could not load the next card: {e}")?;
                writeln!(out, "(enter: retry, q: quit)")?;
                match lines.next_line().await? {
                    Some(line) if line.trim() != "q" => continue,
                    _ => break,
                }
            }
        };
        let front = data.card.front.clone();
        let back = data.card.back.clone();
        let label = if session.is_reviewing_new_cards() {
            "new".to_string()
        } else {
            format!("{}/{}", reviewed + 1, due)
        };
        writeln!(out, "\n[{label}] {front}")?;
        writeln!(out, "(enter: show answer, s: skip, q: quit)")?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        match line.trim() {
            "q" => break,
            "s" => {
                if let Err(e) = session.skip().await {
                    writeln!(out, "{e}")?;
                }
                continue;
            }
            _ => {}
        }
        session.reveal()?;
        writeln!(out, "{back}")?;
        let rating = loop {
            writeln!(out, "(1: forgot, 2: struggled, 3: easy, q: quit)")?;
            let Some(line) = lines.next_line().await? else {
                return Ok(());
            };
            let line = line.trim();
            if line == "q" {
                return Ok(());
            }
            match parse_rating(line) {
                Some(rating) => break rating,
                None => writeln!(out, "Unknown rating: {line}")?,
            }
        };
        match session.rate(rating).await {
            Ok(report) => {
                writeln!(
                    out,
                    "{} {} Next review in {} day{}.",
                    rating.emoji(),
                    report.feedback,
                    report.interval_days,
                    if report.interval_days == 1 { "" } else { "s" }
                )?;
                if report.xp_awarded > 0 {
                    writeln!(out, "+{} XP", report.xp_awarded)?;
                }
                if !report.persisted {
                    writeln!(out, "Warning: this review could not be saved.")?;
                }
            }
            Err(e) => writeln!(out, "{e}")?,
        }
    }
    Ok(())
}

fn parse_rating(input: &str) -> Option<Rating> {
    match input {
        "1" => Some(Rating::Forgot),
        "2" => Some(Rating::Struggled),
        "3" => Some(Rating::Easy),
        other => Rating::try_from(other.to_lowercase()).ok(),
    }
}

pub fn render_recap(recap: &Recap) -> String {
    let mut out = String::from("\nSession complete.\n");
    if recap.total_cards() == 0 {
        out.push_str("No cards were reviewed.\n");
    } else {
        out.push_str(&format!(
            "Reviewed {} cards ({} new).\n",
            recap.total_cards(),
            recap.new_cards
        ));
        for rating in Rating::ALL {
            out.push_str(&format!(
                "{} {}: {}\n",
                rating.emoji(),
                rating.title(),
                recap.ratings.get(rating)
            ));
        }
        if recap.newly_mastered > 0 {
            out.push_str(&format!("Mastered {} cards.\n", recap.newly_mastered));
        }
    }
    out.push_str(&format!(
        "XP: {} -> {} (+{})\n",
        recap.initial_xp,
        recap.final_xp(),
        recap.xp_gained
    ));
    let easy = recap.frequent_decks(Rating::Easy);
    if !easy.is_empty() {
        out.push_str(&format!("Easy decks: {}\n", join(&easy)));
    }
    let forgot = recap.frequent_decks(Rating::Forgot);
    if !forgot.is_empty() {
        out.push_str(&format!("Decks to work on: {}\n", join(&forgot)));
    }
    for card in recap.cards.iter() {
        let next = card
            .next
            .map(|next| next.into_inner().format("%Y-%m-%d").to_string())
            .unwrap_or_default();
        out.push_str(&format!(
            "  {} {}  (next: {next})\n",
            card.rating.emoji(),
            card.front
        ));
    }
    if recap.persistence_failures > 0 {
        out.push_str(&format!(
            "{} reviews could not be saved.\n",
            recap.persistence_failures
        ));
    }
    out
}

fn join<T: ToString>(items: &[T]) -> String {
    items
        .iter()
        .map(|item| item.to_string())
        .collect::<Vec<String>>()
        .join(", ")
}
