//! `habitpush-store`: read access to recipients and habits.
//!
//! The dispatcher only sees the [`HabitStore`] trait. [`SqliteStore`] is the
//! bundled implementation; deployments backed by another database implement
//! the trait themselves.

pub mod db;
pub mod error;
pub mod sqlite;
pub mod store;

pub use error::{Result, StoreError};
pub use sqlite::SqliteStore;
pub use store::{HabitRow, HabitStore, InvalidHabit};
