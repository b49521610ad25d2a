use serde::Serialize;
use time::OffsetDateTime;

/// A tune row as stored, with its surrogate id and insertion time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct StoredTune {
    pub id: i64,
    pub book_number: i32,
    pub reference_number: String,
    pub title: String,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub tune_type: String,
    pub meter: String,
    pub key_signature: String,
    pub abc_notation: String,
    pub file_path: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Collection-wide totals. Empty type and key values are not counted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct Summary {
    pub total_tunes: i64,
    pub total_books: i64,
    pub total_types: i64,
    pub total_keys: i64,
    pub most_common_type: Option<String>,
    pub most_common_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct BookCount {
    pub book_number: i32,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct ValueCount {
    pub value: String,
    pub count: i64,
}
