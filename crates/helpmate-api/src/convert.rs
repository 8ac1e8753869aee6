//! Row -> API model conversion. Rows that fail to parse are logged and
//! replaced with defaults rather than failing the whole response.

use chrono::{DateTime, Utc};
use tracing::warn;
use uuid::Uuid;

use helpmate_db::models::{MessageRow, ServiceRow, UserRow};
use helpmate_types::models::{Message, Service, ServiceType, UserProfile};

fn parse_uuid(raw: &str, what: &str, row_id: &str) -> Uuid {
    raw.parse().unwrap_or_else(|e| {
        warn!("Corrupt {} '{}' on row '{}': {}", what, raw, row_id, e);
        Uuid::default()
    })
}

fn parse_timestamp(raw: &str, row_id: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|e| {
            warn!("Corrupt timestamp '{}' on row '{}': {}", raw, row_id, e);
            DateTime::default()
        })
}

pub(crate) fn service(row: ServiceRow) -> Service {
    let service_type = row.service_type.parse().unwrap_or_else(|e| {
        warn!("Corrupt service_type on service '{}': {}", row.id, e);
        ServiceType::HelpWanted
    });

    Service {
        id: parse_uuid(&row.id, "id", &row.id),
        user_id: parse_uuid(&row.user_id, "user_id", &row.id),
        created_at: parse_timestamp(&row.created_at, &row.id),
        updated_at: parse_timestamp(&row.updated_at, &row.id),
        title: row.title,
        body: row.body,
        category: row.category,
        image: row.image,
        address: row.address,
        city: row.city,
        country: row.country,
        zip: row.zip,
        phone: row.phone,
        status: row.status,
        service_type,
        username: row.username,
    }
}

pub(crate) fn profile(row: UserRow) -> UserProfile {
    UserProfile {
        id: parse_uuid(&row.id, "id", &row.id),
        username: row.username,
        first_name: row.first_name,
        last_name: row.last_name,
        email: row.email,
        profile_picture: row.profile_picture,
    }
}

pub(crate) fn message(row: MessageRow) -> Message {
    Message {
        id: parse_uuid(&row.id, "id", &row.id),
        sender_id: parse_uuid(&row.sender_id, "sender_id", &row.id),
        receiver_id: parse_uuid(&row.receiver_id, "receiver_id", &row.id),
        created_at: parse_timestamp(&row.created_at, &row.id),
        message: row.message,
    }
}
