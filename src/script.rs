//! CSV scenario replay.
//!
//! Reads a command script, feeds it through the engine and writes the final
//! account balances as CSV. Rows reference accounts and offers by name and
//! bookings by a scenario-local label assigned on the `book` row.

use std::collections::HashMap;
use std::io;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_stream::{Stream, StreamExt};
use tracing::info;

use crate::Credits;
use crate::engine::{BookingRequest, Engine, EngineError};
use crate::model::{BookingId, BookingStatus, OfferId, UserId};

/// Errors that can occur when parsing script rows.
#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("line {line}: failed to parse row: {source}")]
    Parse { line: usize, source: csv::Error },

    #[error("line {line}: unrecognized op '{op}'")]
    UnrecognizedOp { line: usize, op: String },

    #[error("line {line}: {op} missing {field}")]
    MissingField {
        line: usize,
        op: &'static str,
        field: &'static str,
    },

    #[error("line {line}: bad {field}: {source}")]
    BadDate {
        line: usize,
        field: &'static str,
        source: chrono::ParseError,
    },

    #[error("line {line}: bad {field}: {source}")]
    BadNumber {
        line: usize,
        field: &'static str,
        source: std::num::ParseIntError,
    },
}

/// One replayable engine command.
#[derive(Debug, Clone)]
pub enum Command {
    Signup {
        name: String,
        credits: Credits,
    },
    Offer {
        owner: String,
        title: String,
        cost: Credits,
    },
    Book {
        requester: String,
        offer: String,
        label: String,
        date_start: DateTime<Utc>,
        date_end: DateTime<Utc>,
    },
    Accept {
        actor: String,
        label: String,
    },
    Cancel {
        actor: String,
        label: String,
        reason: Option<String>,
    },
    Complete {
        actor: String,
        label: String,
    },
    Review {
        actor: String,
        label: String,
        rating: u8,
        comment: Option<String>,
    },
}

#[derive(Debug, Deserialize)]
struct InputRow {
    op: String,
    actor: String,
    offer: Option<String>,
    booking: Option<String>,
    amount: Option<String>,
    date_start: Option<String>,
    date_end: Option<String>,
    note: Option<String>,
}

#[derive(Debug, Serialize)]
struct OutputRow {
    account: String,
    credits: String,
    reserved: String,
}

fn required(
    value: Option<String>,
    line: usize,
    op: &'static str,
    field: &'static str,
) -> Result<String, ScriptError> {
    value
        .filter(|v| !v.is_empty())
        .ok_or(ScriptError::MissingField { line, op, field })
}

fn parse_date(value: String, line: usize, field: &'static str) -> Result<DateTime<Utc>, ScriptError> {
    DateTime::parse_from_rfc3339(&value)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|source| ScriptError::BadDate { line, field, source })
}

fn parse_u64(value: String, line: usize, field: &'static str) -> Result<u64, ScriptError> {
    value
        .parse()
        .map_err(|source| ScriptError::BadNumber { line, field, source })
}

fn parse_u8(value: String, line: usize, field: &'static str) -> Result<u8, ScriptError> {
    value
        .parse()
        .map_err(|source| ScriptError::BadNumber { line, field, source })
}

/// Read commands from a csv script file.
pub fn read_commands(
    path: impl AsRef<Path>,
) -> impl Iterator<Item = Result<Command, ScriptError>> {
    let reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .expect("failed to open csv file");

    reader
        .into_deserialize::<InputRow>()
        .enumerate()
        .map(|(idx, result)| {
            let line = idx + 2; // 1-indexed, skip header
            let row = result.map_err(|source| ScriptError::Parse { line, source })?;
            let note = row.note.filter(|n| !n.is_empty());
            match row.op.as_str() {
                "signup" => Ok(Command::Signup {
                    name: row.actor,
                    credits: Credits::new(parse_u64(
                        required(row.amount, line, "signup", "amount")?,
                        line,
                        "amount",
                    )?),
                }),
                "offer" => Ok(Command::Offer {
                    owner: row.actor,
                    title: required(row.offer, line, "offer", "offer")?,
                    cost: Credits::new(parse_u64(
                        required(row.amount, line, "offer", "amount")?,
                        line,
                        "amount",
                    )?),
                }),
                "book" => Ok(Command::Book {
                    requester: row.actor,
                    offer: required(row.offer, line, "book", "offer")?,
                    label: required(row.booking, line, "book", "booking")?,
                    date_start: parse_date(
                        required(row.date_start, line, "book", "date_start")?,
                        line,
                        "date_start",
                    )?,
                    date_end: parse_date(
                        required(row.date_end, line, "book", "date_end")?,
                        line,
                        "date_end",
                    )?,
                }),
                "accept" => Ok(Command::Accept {
                    actor: row.actor,
                    label: required(row.booking, line, "accept", "booking")?,
                }),
                "cancel" => Ok(Command::Cancel {
                    actor: row.actor,
                    label: required(row.booking, line, "cancel", "booking")?,
                    reason: note,
                }),
                "complete" => Ok(Command::Complete {
                    actor: row.actor,
                    label: required(row.booking, line, "complete", "booking")?,
                }),
                "review" => Ok(Command::Review {
                    actor: row.actor,
                    label: required(row.booking, line, "review", "booking")?,
                    rating: parse_u8(
                        required(row.amount, line, "review", "amount")?,
                        line,
                        "amount",
                    )?,
                    comment: note,
                }),
                other => Err(ScriptError::UnrecognizedOp {
                    line,
                    op: other.to_string(),
                }),
            }
        })
}

/// Errors while replaying a command against the engine.
#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("unknown account '{0}'")]
    UnknownAccount(String),

    #[error("unknown offer '{0}'")]
    UnknownOffer(String),

    #[error("unknown booking '{0}'")]
    UnknownBooking(String),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Drives a command stream through the engine, resolving script names to
/// entity ids.
pub struct ScriptRunner {
    engine: Arc<Engine>,
    accounts: HashMap<String, UserId>,
    offers: HashMap<String, OfferId>,
    bookings: HashMap<String, BookingId>,
}

impl ScriptRunner {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self {
            engine,
            accounts: HashMap::new(),
            offers: HashMap::new(),
            bookings: HashMap::new(),
        }
    }

    /// Replay the whole stream. A failed command is logged and skipped,
    /// never fatal to the run.
    pub async fn run(&mut self, mut stream: impl Stream<Item = Command> + Unpin) {
        while let Some(command) = stream.next().await {
            if let Err(e) = self.apply(command).await {
                info!(reason = %e, "command skipped");
            }
        }
    }

    /// Replay a single command.
    pub async fn apply(&mut self, command: Command) -> Result<(), ReplayError> {
        match command {
            Command::Signup { name, credits } => {
                let id = self.engine.create_account(name.clone(), credits).await;
                self.accounts.insert(name, id);
            }
            Command::Offer { owner, title, cost } => {
                let owner = self.account(&owner)?;
                let id = self
                    .engine
                    .publish_offer(owner, title.clone(), cost)
                    .await
                    .map_err(EngineError::from)?;
                self.offers.insert(title, id);
            }
            Command::Book {
                requester,
                offer,
                label,
                date_start,
                date_end,
            } => {
                let requester = self.account(&requester)?;
                let offer = self.offer(&offer)?;
                let id = self
                    .engine
                    .create_booking(
                        requester,
                        BookingRequest {
                            offer,
                            date_start,
                            date_end,
                            timezone: None,
                            notes: None,
                        },
                    )
                    .await
                    .map_err(EngineError::from)?;
                self.bookings.insert(label, id);
            }
            Command::Accept { actor, label } => {
                self.transition(&actor, &label, BookingStatus::Accepted, None)
                    .await?;
            }
            Command::Cancel {
                actor,
                label,
                reason,
            } => {
                self.transition(&actor, &label, BookingStatus::Canceled, reason)
                    .await?;
            }
            Command::Complete { actor, label } => {
                self.transition(&actor, &label, BookingStatus::Completed, None)
                    .await?;
            }
            Command::Review {
                actor,
                label,
                rating,
                comment,
            } => {
                let actor = self.account(&actor)?;
                let booking = self.booking(&label)?;
                self.engine
                    .submit_review(actor, booking, rating, comment)
                    .await
                    .map_err(EngineError::from)?;
            }
        }
        Ok(())
    }

    async fn transition(
        &self,
        actor: &str,
        label: &str,
        target: BookingStatus,
        reason: Option<String>,
    ) -> Result<(), ReplayError> {
        let actor = self.account(actor)?;
        let booking = self.booking(label)?;
        self.engine
            .transition_booking(actor, booking, target, reason)
            .await
            .map_err(EngineError::from)?;
        Ok(())
    }

    fn account(&self, name: &str) -> Result<UserId, ReplayError> {
        self.accounts
            .get(name)
            .copied()
            .ok_or_else(|| ReplayError::UnknownAccount(name.to_string()))
    }

    fn offer(&self, title: &str) -> Result<OfferId, ReplayError> {
        self.offers
            .get(title)
            .copied()
            .ok_or_else(|| ReplayError::UnknownOffer(title.to_string()))
    }

    fn booking(&self, label: &str) -> Result<BookingId, ReplayError> {
        self.bookings
            .get(label)
            .copied()
            .ok_or_else(|| ReplayError::UnknownBooking(label.to_string()))
    }

    /// Final balances, sorted by account name.
    pub async fn balances(&self) -> Vec<crate::model::Account> {
        let mut accounts = self.engine.accounts().await;
        accounts.sort_by(|a, b| a.name.cmp(&b.name));
        accounts
    }
}

/// Write account balances to stdout in csv format.
pub fn write_balances(accounts: impl IntoIterator<Item = crate::model::Account>) {
    let stdout = io::stdout();
    let mut writer = csv::Writer::from_writer(stdout.lock());

    for account in accounts {
        let row = OutputRow {
            account: account.name,
            credits: account.credits.to_string(),
            reserved: account.reserved.to_string(),
        };
        writer.serialize(&row).expect("failed to write csv row");
    }

    writer.flush().expect("failed to flush csv writer");
}
