/// Database row types. These map directly to SQLite rows.
/// Distinct from helpmate-types API models to keep the DB layer independent.
use chrono::{DateTime, SecondsFormat, Utc};

/// Timestamps are stored as fixed-width RFC 3339 strings so that text order
/// matches time order.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: String,
    pub username: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub profile_picture: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct ServiceRow {
    pub id: String,
    pub user_id: String,
    pub username: String,
    pub title: String,
    pub body: String,
    pub category: String,
    pub image: String,
    pub address: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub zip: Option<String>,
    pub phone: Option<String>,
    pub status: bool,
    pub service_type: String,
    pub created_at: String,
    pub updated_at: String,
}

/// A service joined with its owner's profile, if one exists.
#[derive(Debug, Clone)]
pub struct ServiceWithOwnerRow {
    pub service: ServiceRow,
    pub owner: Option<UserRow>,
}

/// Values for a new `services` row. `status` and `image` are already
/// defaulted by the caller.
#[derive(Debug, Clone)]
pub struct NewService {
    pub id: String,
    pub user_id: String,
    pub username: String,
    pub title: String,
    pub body: String,
    pub category: String,
    pub image: String,
    pub address: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub zip: Option<String>,
    pub phone: Option<String>,
    pub status: bool,
    pub service_type: String,
    pub created_at: String,
}

/// Partial update of a service; `None` leaves the column untouched.
#[derive(Debug, Clone, Default)]
pub struct ServiceChanges {
    pub title: Option<String>,
    pub body: Option<String>,
    pub category: Option<String>,
    pub image: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub zip: Option<String>,
    pub phone: Option<String>,
    pub status: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct ConversationRow {
    pub id: String,
    pub participant_low: String,
    pub participant_high: String,
    pub created_at: String,
    /// Message ids in append order.
    pub message_ids: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct MessageRow {
    pub id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub message: String,
    pub created_at: String,
}

/// Outcome of appending a message to the pair's conversation.
#[derive(Debug, Clone)]
pub struct SentMessage {
    pub conversation_id: String,
    /// `true` when this message opened the conversation.
    pub conversation_created: bool,
    pub message: MessageRow,
}
