use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};
use tracing::{debug, info};

use habitpush_core::{Habit, HabitId, HabitSnapshot, Recipient, RecipientId};

use crate::{
    db::init_db,
    error::{Result, StoreError},
    store::{HabitRow, HabitStore, InvalidHabit},
};

const HABIT_SELECT_SQL: &str = "SELECT id, recipient_id, name, reminder_hour, reminder_minute, streak
     FROM habits";

/// Map a SELECT row (column order from HABIT_SELECT_SQL) to a Habit.
fn row_to_habit(row: &rusqlite::Row<'_>) -> rusqlite::Result<Habit> {
    let streak: i64 = row.get(5)?;
    let streak =
        u32::try_from(streak).map_err(|_| rusqlite::Error::IntegralValueOutOfRange(5, streak))?;
    Ok(Habit {
        id: HabitId(row.get(0)?),
        recipient_id: RecipientId(row.get(1)?),
        snapshot: HabitSnapshot {
            name: row.get(2)?,
            reminder_hour: row.get(3)?,
            reminder_minute: row.get(4)?,
            streak,
        },
    })
}

/// Decode one habit row, keeping a row-level decode failure next to its id.
fn row_to_habit_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<HabitRow> {
    match row_to_habit(row) {
        Ok(habit) => Ok(Ok(habit)),
        Err(e) if is_row_invalid(&e) => Ok(Err(InvalidHabit {
            habit_id: HabitId(row.get(0)?),
            reason: invalid_reason(&e),
        })),
        Err(e) => Err(e),
    }
}

fn is_row_invalid(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::IntegralValueOutOfRange(..)
            | rusqlite::Error::InvalidColumnType(..)
            | rusqlite::Error::FromSqlConversionFailure(..)
    )
}

fn invalid_reason(e: &rusqlite::Error) -> String {
    match e {
        rusqlite::Error::IntegralValueOutOfRange(5, v) => format!("streak {v} out of range"),
        other => other.to_string(),
    }
}

fn row_to_recipient(row: &rusqlite::Row<'_>) -> rusqlite::Result<Recipient> {
    Ok(Recipient {
        id: RecipientId(row.get(0)?),
        display_name: row.get(1)?,
        push_token: row.get(2)?,
    })
}

/// Derived fields the dispatcher writes back when a reminder is set up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleMarker {
    pub notification_scheduled: bool,
    pub scheduled_time: Option<String>,
}

/// SQLite-backed [`HabitStore`].
///
/// Holds a single connection behind a mutex; every statement is short, so
/// callers on the async runtime take the lock directly.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Wrap `conn`, initialising the schema if needed.
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open (or create) the database file at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref())?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        info!(path = %path.as_ref().display(), "habit store opened");
        Self::new(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Self::new(conn)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Insert or update a recipient and its push token.
    pub fn upsert_recipient(
        &self,
        id: &RecipientId,
        display_name: Option<&str>,
        push_token: Option<&str>,
    ) -> Result<Recipient> {
        let conn = self.lock()?;
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO recipients (id, display_name, push_token, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)
             ON CONFLICT(id) DO UPDATE SET
                display_name = excluded.display_name,
                push_token   = excluded.push_token,
                updated_at   = excluded.updated_at",
            rusqlite::params![id.as_str(), display_name, push_token, now],
        )?;
        debug!(recipient_id = %id, has_token = push_token.is_some(), "recipient upserted");
        Ok(Recipient {
            id: id.clone(),
            display_name: display_name.map(String::from),
            push_token: push_token.map(String::from),
        })
    }

    /// Create a habit for `recipient_id` with a fresh id.
    pub fn insert_habit(&self, recipient_id: &RecipientId, snapshot: &HabitSnapshot) -> Result<Habit> {
        let conn = self.lock()?;
        let now = Utc::now().to_rfc3339();
        let id = HabitId::new();
        conn.execute(
            "INSERT INTO habits
             (id, recipient_id, name, reminder_hour, reminder_minute, streak,
              notification_scheduled, scheduled_time, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, NULL, ?7, ?7)",
            rusqlite::params![
                id.as_str(),
                recipient_id.as_str(),
                snapshot.name,
                snapshot.reminder_hour,
                snapshot.reminder_minute,
                snapshot.streak,
                now
            ],
        )?;
        info!(recipient_id = %recipient_id, habit_id = %id, name = %snapshot.name, "habit created");
        Ok(Habit {
            id,
            recipient_id: recipient_id.clone(),
            snapshot: snapshot.clone(),
        })
    }

    pub fn get_habit(&self, recipient_id: &RecipientId, habit_id: &HabitId) -> Result<Option<Habit>> {
        let conn = self.lock()?;
        Self::fetch_habit(&conn, recipient_id, habit_id)
    }

    fn fetch_habit(
        conn: &Connection,
        recipient_id: &RecipientId,
        habit_id: &HabitId,
    ) -> Result<Option<Habit>> {
        let sql = format!("{HABIT_SELECT_SQL} WHERE recipient_id = ?1 AND id = ?2");
        let habit = conn
            .query_row(
                &sql,
                rusqlite::params![recipient_id.as_str(), habit_id.as_str()],
                row_to_habit,
            )
            .optional()
            .map_err(|e| {
                if is_row_invalid(&e) {
                    StoreError::InvalidRow(format!("{habit_id}: {}", invalid_reason(&e)))
                } else {
                    StoreError::Database(e)
                }
            })?;
        Ok(habit)
    }

    /// Set a habit's streak. Returns the (before, after) pair for an update event.
    pub fn set_streak(
        &self,
        recipient_id: &RecipientId,
        habit_id: &HabitId,
        streak: u32,
    ) -> Result<(Habit, Habit)> {
        self.update_habit(recipient_id, habit_id, |s| s.streak = streak)
    }

    /// Change (or clear) a habit's reminder time.
    pub fn set_reminder(
        &self,
        recipient_id: &RecipientId,
        habit_id: &HabitId,
        hour: Option<i64>,
        minute: Option<i64>,
    ) -> Result<(Habit, Habit)> {
        self.update_habit(recipient_id, habit_id, |s| {
            s.reminder_hour = hour;
            s.reminder_minute = minute;
        })
    }

    fn update_habit(
        &self,
        recipient_id: &RecipientId,
        habit_id: &HabitId,
        apply: impl FnOnce(&mut HabitSnapshot),
    ) -> Result<(Habit, Habit)> {
        let conn = self.lock()?;
        let before = Self::fetch_habit(&conn, recipient_id, habit_id)?
            .ok_or_else(|| StoreError::NotFound(format!("habit {recipient_id}/{habit_id}")))?;
        let mut after = before.clone();
        apply(&mut after.snapshot);

        let now = Utc::now().to_rfc3339();
        conn.execute(
            "UPDATE habits SET name = ?3, reminder_hour = ?4, reminder_minute = ?5,
                streak = ?6, updated_at = ?7
             WHERE recipient_id = ?1 AND id = ?2",
            rusqlite::params![
                recipient_id.as_str(),
                habit_id.as_str(),
                after.snapshot.name,
                after.snapshot.reminder_hour,
                after.snapshot.reminder_minute,
                after.snapshot.streak,
                now
            ],
        )?;
        debug!(recipient_id = %recipient_id, habit_id = %habit_id, "habit updated");
        Ok((before, after))
    }

    /// Read back the derived schedule fields of a habit.
    pub fn schedule_marker(
        &self,
        recipient_id: &RecipientId,
        habit_id: &HabitId,
    ) -> Result<Option<ScheduleMarker>> {
        let conn = self.lock()?;
        let marker = conn
            .query_row(
                "SELECT notification_scheduled, scheduled_time FROM habits
                 WHERE recipient_id = ?1 AND id = ?2",
                rusqlite::params![recipient_id.as_str(), habit_id.as_str()],
                |row| {
                    Ok(ScheduleMarker {
                        notification_scheduled: row.get::<_, i64>(0)? != 0,
                        scheduled_time: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(marker)
    }
}

#[async_trait]
impl HabitStore for SqliteStore {
    async fn list_recipients(&self) -> Result<Vec<Recipient>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached(
            "SELECT id, display_name, push_token FROM recipients ORDER BY created_at",
        )?;
        let recipients = stmt
            .query_map([], row_to_recipient)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(recipients)
    }

    async fn get_recipient(&self, id: &RecipientId) -> Result<Option<Recipient>> {
        let conn = self.lock()?;
        let recipient = conn
            .query_row(
                "SELECT id, display_name, push_token FROM recipients WHERE id = ?1",
                [id.as_str()],
                row_to_recipient,
            )
            .optional()?;
        Ok(recipient)
    }

    async fn list_habits(&self, recipient_id: &RecipientId) -> Result<Vec<HabitRow>> {
        let conn = self.lock()?;
        let sql = format!("{HABIT_SELECT_SQL} WHERE recipient_id = ?1 ORDER BY created_at");
        let mut stmt = conn.prepare_cached(&sql)?;
        let habits = stmt
            .query_map([recipient_id.as_str()], row_to_habit_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        let invalid = habits.iter().filter(|h| h.is_err()).count();
        if invalid > 0 {
            debug!(%recipient_id, invalid, "habit listing has unreadable rows");
        }
        Ok(habits)
    }

    async fn mark_scheduled(
        &self,
        recipient_id: &RecipientId,
        habit_id: &HabitId,
        summary: &str,
    ) -> Result<()> {
        let conn = self.lock()?;
        let now = Utc::now().to_rfc3339();
        let n = conn.execute(
            "UPDATE habits SET notification_scheduled = 1, scheduled_time = ?3, updated_at = ?4
             WHERE recipient_id = ?1 AND id = ?2",
            rusqlite::params![recipient_id.as_str(), habit_id.as_str(), summary, now],
        )?;
        if n == 0 {
            return Err(StoreError::NotFound(format!("habit {recipient_id}/{habit_id}")));
        }
        Ok(())
    }
}
