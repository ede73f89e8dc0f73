//! SQLite persistence for review outcomes, known submissions and the job queue.
//!
//! [`Database`] owns the connection and schema; [`SqliteOutcomeStore`]
//! implements the [`OutcomeStore`] upsert/load boundary; [`SqliteSubmissions`]
//! records submissions and answers which ones are overdue for review.

pub mod db;
pub mod outcomes;
pub mod submissions;

pub use db::{format_timestamp, parse_timestamp, Database};
pub use outcomes::{OutcomeStore, SqliteOutcomeStore};
pub use submissions::{SqliteSubmissions, Submission};
