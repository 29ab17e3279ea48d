use anyhow::{Result, bail};
use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::FromRow;
use sqlx::types::Json;

/// Status every guest starts in unless told otherwise.
pub const STATUS_PENDING: &str = "pending";

/// Status of a guest who accepted the invitation.
pub const STATUS_CONFIRMED: &str = "confirmed";

// ---------------------------------------------------------------------------
// Guest document
// ---------------------------------------------------------------------------

/// A new entry for a status bucket of a [`GuestDocument`].
#[derive(Debug, Clone, PartialEq)]
pub struct GuestSummary {
    pub name: String,
    pub telegram_id: Option<String>,
}

impl GuestSummary {
    /// Summary for a freshly added guest. Empty contact ids are dropped.
    pub fn new(name: impl Into<String>, telegram_id: Option<&str>) -> Self {
        Self {
            name: name.into(),
            telegram_id: telegram_id.filter(|t| !t.is_empty()).map(str::to_owned),
        }
    }

    fn into_value(self) -> Value {
        let mut entry = Map::new();
        entry.insert("name".to_owned(), Value::String(self.name));
        if let Some(telegram_id) = self.telegram_id {
            entry.insert("telegram_id".to_owned(), Value::String(telegram_id));
        }
        Value::Object(entry)
    }
}

/// The `holidays.guests` column: guest summaries grouped by status.
///
/// The column can be rewritten by other tools, so entries are kept as raw
/// JSON: an entry without a string `name` (or `null`) is carried through
/// and counted but never matched, and a key whose value is not a list reads
/// as an empty bucket. Status keys are an open set; a key that is absent
/// behaves like an empty bucket too.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GuestDocument(pub Map<String, Value>);

fn entry_name(entry: &Value) -> Option<&str> {
    entry.get("name").and_then(Value::as_str)
}

impl GuestDocument {
    /// Document for a new holiday: empty `pending` and `confirmed` buckets.
    pub fn with_default_buckets() -> Self {
        let mut buckets = Map::new();
        buckets.insert(STATUS_PENDING.to_owned(), Value::Array(Vec::new()));
        buckets.insert(STATUS_CONFIRMED.to_owned(), Value::Array(Vec::new()));
        Self(buckets)
    }

    /// Entries under `status`, empty when the key is absent or not a list.
    pub fn bucket(&self, status: &str) -> &[Value] {
        match self.0.get(status) {
            Some(Value::Array(entries)) => entries,
            _ => &[],
        }
    }

    /// Names in the `status` bucket, in order. Unnamed entries are skipped.
    pub fn names(&self, status: &str) -> Vec<&str> {
        self.bucket(status).iter().filter_map(entry_name).collect()
    }

    /// Total number of entries across all list buckets.
    pub fn total(&self) -> usize {
        self.0
            .values()
            .filter_map(Value::as_array)
            .map(Vec::len)
            .sum()
    }

    fn bucket_mut(&mut self, status: &str) -> Result<&mut Vec<Value>> {
        match self
            .0
            .entry(status)
            .or_insert_with(|| Value::Array(Vec::new()))
        {
            Value::Array(entries) => Ok(entries),
            other => bail!("guest bucket {status:?} is not a list: {other}"),
        }
    }

    /// Append `summary` to the `status` bucket, creating the bucket if needed.
    ///
    /// Fails when `status` already holds something other than a list.
    pub fn push(&mut self, status: &str, summary: GuestSummary) -> Result<()> {
        self.bucket_mut(status)?.push(summary.into_value());
        Ok(())
    }

    /// Remove and return the first entry named `name` in the `status` bucket.
    ///
    /// Leaves the document untouched (no bucket is created) when nothing
    /// matches.
    pub fn take_first_by_name(&mut self, status: &str, name: &str) -> Option<Value> {
        let Some(Value::Array(entries)) = self.0.get_mut(status) else {
            return None;
        };
        let pos = entries.iter().position(|e| entry_name(e) == Some(name))?;
        Some(entries.remove(pos))
    }

    /// Move the first entry named `name` from bucket `from` to the end of
    /// bucket `to`, even when both are the same bucket. Returns `false`,
    /// changing nothing, when no entry matches.
    ///
    /// Fails when `to` holds something other than a list; the document is
    /// then left half-edited and must be discarded.
    pub fn move_by_name(&mut self, from: &str, to: &str, name: &str) -> Result<bool> {
        match self.take_first_by_name(from, name) {
            Some(entry) => {
                self.bucket_mut(to)?.push(entry);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

// ---------------------------------------------------------------------------
// Row structs
// ---------------------------------------------------------------------------

/// A holiday -- an event with a theme, a location and a guest roster.
///
/// `guests_count` mirrors [`GuestDocument::total`] of `guests`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Holiday {
    pub id: i32,
    pub theme: String,
    pub details: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub location_address: Option<String>,
    pub guests_count: i32,
    pub guests: Json<GuestDocument>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A guest row -- the authoritative record for one invitee.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Guest {
    pub id: i32,
    pub holiday_id: i32,
    pub name: String,
    pub telegram_id: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A restaurant available for booking.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Restaurant {
    pub id: i32,
    pub name: String,
    pub address: String,
    pub menu: serde_json::Value,
    pub schedule_open: NaiveTime,
    pub schedule_close: NaiveTime,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
