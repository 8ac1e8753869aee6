use crate::Database;
use crate::models::{
    ConversationRow, MessageRow, NewService, SentMessage, ServiceChanges, ServiceRow,
    ServiceWithOwnerRow, UserRow,
};
use anyhow::Result;
use helpmate_types::models::ServiceType;
use rusqlite::types::ToSql;
use rusqlite::{Connection, OptionalExtension, Row};

const SERVICE_COLUMNS: &str = "s.id, s.user_id, s.username, s.title, s.body, s.category, s.image,
     s.address, s.city, s.country, s.zip, s.phone, s.status, s.service_type,
     s.created_at, s.updated_at";

/// Number of columns in `SERVICE_COLUMNS`; owner columns follow it in joins.
const SERVICE_COLUMN_COUNT: usize = 16;

const USER_COLUMNS: &str =
    "u.id, u.username, u.first_name, u.last_name, u.email, u.profile_picture, u.created_at";

/// Columns matched by the free-text query: listing fields plus the joined
/// owner profile.
const SEARCH_COLUMNS: [&str; 11] = [
    "s.title",
    "s.body",
    "s.address",
    "s.city",
    "s.country",
    "s.zip",
    "s.phone",
    "u.username",
    "u.first_name",
    "u.last_name",
    "u.email",
];

/// Filters for `search_services`. Every field is optional; an empty filter
/// returns all listings.
#[derive(Debug, Clone, Default)]
pub struct ServiceFilter {
    /// Case-insensitive substring, matched against `SEARCH_COLUMNS`.
    pub query: Option<String>,
    pub status: Option<bool>,
    pub service_type: Option<ServiceType>,
}

/// Orders a participant pair so that (a, b) and (b, a) map to the same row.
pub fn participant_pair<'a>(a: &'a str, b: &'a str) -> (&'a str, &'a str) {
    if a <= b { (a, b) } else { (b, a) }
}

impl Database {
    // -- Users --

    /// Insert or replace the profile for `user.id`.
    pub fn upsert_user(&self, user: &UserRow) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO users (id, username, first_name, last_name, email, profile_picture, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(id) DO UPDATE SET
                    username = excluded.username,
                    first_name = excluded.first_name,
                    last_name = excluded.last_name,
                    email = excluded.email,
                    profile_picture = excluded.profile_picture",
                rusqlite::params![
                    user.id,
                    user.username,
                    user.first_name,
                    user.last_name,
                    user.email,
                    user.profile_picture,
                    user.created_at,
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "u.id", id))
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "u.username", username))
    }

    // -- Services --

    pub fn insert_service(&self, service: &NewService) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO services (id, user_id, username, title, body, category, image,
                                       address, city, country, zip, phone, status, service_type,
                                       created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?15)",
                rusqlite::params![
                    service.id,
                    service.user_id,
                    service.username,
                    service.title,
                    service.body,
                    service.category,
                    service.image,
                    service.address,
                    service.city,
                    service.country,
                    service.zip,
                    service.phone,
                    service.status,
                    service.service_type,
                    service.created_at,
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_service(&self, id: &str) -> Result<Option<ServiceRow>> {
        self.with_conn(|conn| query_service(conn, id))
    }

    /// Apply `changes` and return the updated row, or `None` if no such service.
    pub fn update_service(
        &self,
        id: &str,
        changes: &ServiceChanges,
        updated_at: &str,
    ) -> Result<Option<ServiceRow>> {
        self.with_conn_mut(|conn| {
            let updated = conn.execute(
                "UPDATE services SET
                    title = COALESCE(?2, title),
                    body = COALESCE(?3, body),
                    category = COALESCE(?4, category),
                    image = COALESCE(?5, image),
                    address = COALESCE(?6, address),
                    city = COALESCE(?7, city),
                    country = COALESCE(?8, country),
                    zip = COALESCE(?9, zip),
                    phone = COALESCE(?10, phone),
                    status = COALESCE(?11, status),
                    updated_at = ?12
                 WHERE id = ?1",
                rusqlite::params![
                    id,
                    changes.title,
                    changes.body,
                    changes.category,
                    changes.image,
                    changes.address,
                    changes.city,
                    changes.country,
                    changes.zip,
                    changes.phone,
                    changes.status,
                    updated_at,
                ],
            )?;

            if updated == 0 {
                return Ok(None);
            }
            query_service(conn, id)
        })
    }

    /// Returns `true` if a row was removed.
    pub fn delete_service(&self, id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let removed = conn.execute("DELETE FROM services WHERE id = ?1", [id])?;
            Ok(removed > 0)
        })
    }

    /// All listings matching `filter`, in creation order, with owner profiles.
    pub fn search_services(&self, filter: &ServiceFilter) -> Result<Vec<ServiceWithOwnerRow>> {
        self.with_conn(|conn| query_services(conn, filter))
    }

    pub fn get_services_by_user(&self, user_id: &str) -> Result<Vec<ServiceRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {SERVICE_COLUMNS} FROM services s WHERE s.user_id = ?1 ORDER BY s.rowid"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([user_id], |row| service_from_row(row))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Conversations & messages --

    /// Find or create the conversation for the pair, store the message and
    /// append it to the conversation, all in one transaction.
    pub fn send_message(
        &self,
        conversation_id: &str,
        message: &MessageRow,
    ) -> Result<SentMessage> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let (low, high) = participant_pair(&message.sender_id, &message.receiver_id);

            let inserted = tx.execute(
                "INSERT INTO conversations (id, participant_low, participant_high, created_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (participant_low, participant_high) DO NOTHING",
                rusqlite::params![conversation_id, low, high, message.created_at],
            )?;

            let conversation_id: String = tx.query_row(
                "SELECT id FROM conversations WHERE participant_low = ?1 AND participant_high = ?2",
                [low, high],
                |row| row.get(0),
            )?;

            tx.execute(
                "INSERT INTO messages (id, sender_id, receiver_id, message, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![
                    message.id,
                    message.sender_id,
                    message.receiver_id,
                    message.message,
                    message.created_at,
                ],
            )?;

            tx.execute(
                "INSERT INTO conversation_messages (conversation_id, position, message_id)
                 VALUES (?1,
                         (SELECT COALESCE(MAX(position), 0) + 1
                          FROM conversation_messages WHERE conversation_id = ?1),
                         ?2)",
                [&conversation_id, &message.id],
            )?;

            tx.commit()?;

            Ok(SentMessage {
                conversation_id,
                conversation_created: inserted == 1,
                message: message.clone(),
            })
        })
    }

    /// The conversation between two users, in either order.
    pub fn get_conversation(&self, a: &str, b: &str) -> Result<Option<ConversationRow>> {
        self.with_conn(|conn| {
            let (low, high) = participant_pair(a, b);
            let conversation = conn
                .query_row(
                    "SELECT id, participant_low, participant_high, created_at
                     FROM conversations WHERE participant_low = ?1 AND participant_high = ?2",
                    [low, high],
                    |row| {
                        Ok(ConversationRow {
                            id: row.get(0)?,
                            participant_low: row.get(1)?,
                            participant_high: row.get(2)?,
                            created_at: row.get(3)?,
                            message_ids: Vec::new(),
                        })
                    },
                )
                .optional()?;

            let Some(mut conversation) = conversation else {
                return Ok(None);
            };

            let mut stmt = conn.prepare(
                "SELECT message_id FROM conversation_messages
                 WHERE conversation_id = ?1 ORDER BY position",
            )?;
            conversation.message_ids = stmt
                .query_map([&conversation.id], |row| row.get(0))?
                .collect::<std::result::Result<Vec<String>, _>>()?;

            Ok(Some(conversation))
        })
    }

    /// Messages exchanged between two users, in append order. Empty when they
    /// never talked.
    pub fn get_messages_between(&self, a: &str, b: &str) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let (low, high) = participant_pair(a, b);
            let mut stmt = conn.prepare(
                "SELECT m.id, m.sender_id, m.receiver_id, m.message, m.created_at
                 FROM conversations c
                 JOIN conversation_messages cm ON cm.conversation_id = c.id
                 JOIN messages m ON m.id = cm.message_id
                 WHERE c.participant_low = ?1 AND c.participant_high = ?2
                 ORDER BY cm.position",
            )?;

            let rows = stmt
                .query_map([low, high], |row| {
                    Ok(MessageRow {
                        id: row.get(0)?,
                        sender_id: row.get(1)?,
                        receiver_id: row.get(2)?,
                        message: row.get(3)?,
                        created_at: row.get(4)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }
}

fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<UserRow>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users u WHERE {column} = ?1");
    let mut stmt = conn.prepare(&sql)?;

    let row = stmt
        .query_row([value], |row| user_from_row(row, 0))
        .optional()?;

    Ok(row)
}

fn query_service(conn: &Connection, id: &str) -> Result<Option<ServiceRow>> {
    let sql = format!("SELECT {SERVICE_COLUMNS} FROM services s WHERE s.id = ?1");
    let mut stmt = conn.prepare(&sql)?;

    let row = stmt.query_row([id], |row| service_from_row(row)).optional()?;

    Ok(row)
}

fn query_services(conn: &Connection, filter: &ServiceFilter) -> Result<Vec<ServiceWithOwnerRow>> {
    let mut clauses: Vec<String> = Vec::new();
    let mut params: Vec<Box<dyn ToSql>> = Vec::new();

    if let Some(needle) = filter.query.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
        // Same folding as the `fold()` SQL function applied to each column
        params.push(Box::new(needle.to_lowercase()));
        let idx = params.len();
        let any_column = SEARCH_COLUMNS
            .iter()
            .map(|col| format!("instr(fold(COALESCE({col}, '')), ?{idx}) > 0"))
            .collect::<Vec<_>>()
            .join(" OR ");
        clauses.push(format!("({any_column})"));
    }

    if let Some(status) = filter.status {
        params.push(Box::new(status));
        clauses.push(format!("s.status = ?{}", params.len()));
    }

    if let Some(service_type) = filter.service_type {
        params.push(Box::new(service_type.as_str()));
        clauses.push(format!("s.service_type = ?{}", params.len()));
    }

    let where_clause = if clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", clauses.join(" AND "))
    };

    // JOIN users to fetch owner profiles in a single query
    let sql = format!(
        "SELECT {SERVICE_COLUMNS}, {USER_COLUMNS}
         FROM services s
         LEFT JOIN users u ON u.id = s.user_id
         {where_clause}
         ORDER BY s.rowid"
    );

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(rusqlite::params_from_iter(params.iter()), |row| {
            let service = service_from_row(row)?;
            let owner_id: Option<String> = row.get(SERVICE_COLUMN_COUNT)?;
            let owner = match owner_id {
                Some(_) => Some(user_from_row(row, SERVICE_COLUMN_COUNT)?),
                None => None,
            };
            Ok(ServiceWithOwnerRow { service, owner })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

fn service_from_row(row: &Row<'_>) -> rusqlite::Result<ServiceRow> {
    Ok(ServiceRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        username: row.get(2)?,
        title: row.get(3)?,
        body: row.get(4)?,
        category: row.get(5)?,
        image: row.get(6)?,
        address: row.get(7)?,
        city: row.get(8)?,
        country: row.get(9)?,
        zip: row.get(10)?,
        phone: row.get(11)?,
        status: row.get(12)?,
        service_type: row.get(13)?,
        created_at: row.get(14)?,
        updated_at: row.get(15)?,
    })
}

fn user_from_row(row: &Row<'_>, offset: usize) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(offset)?,
        username: row.get(offset + 1)?,
        first_name: row.get(offset + 2)?,
        last_name: row.get(offset + 3)?,
        email: row.get(offset + 4)?,
        profile_picture: row.get(offset + 5)?,
        created_at: row.get(offset + 6)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: &str = "2024-05-01T10:00:00.000000Z";

    fn user(id: &str, username: &str) -> UserRow {
        UserRow {
            id: id.into(),
            username: username.into(),
            first_name: Some("Grace".into()),
            last_name: Some("Hopper".into()),
            email: Some(format!("{username}@example.org")),
            profile_picture: None,
            created_at: NOW.into(),
        }
    }

    fn service(id: &str, user_id: &str, title: &str, kind: ServiceType) -> NewService {
        NewService {
            id: id.into(),
            user_id: user_id.into(),
            username: "owner".into(),
            title: title.into(),
            body: "details".into(),
            category: "home".into(),
            image: "default-image.png".into(),
            address: Some("1 Main St".into()),
            city: Some("Springfield".into()),
            country: Some("US".into()),
            zip: Some("12345".into()),
            phone: Some("555-0100".into()),
            status: true,
            service_type: kind.as_str().into(),
            created_at: NOW.into(),
        }
    }

    fn message(id: &str, from: &str, to: &str, text: &str) -> MessageRow {
        MessageRow {
            id: id.into(),
            sender_id: from.into(),
            receiver_id: to.into(),
            message: text.into(),
            created_at: NOW.into(),
        }
    }

    fn titles(rows: &[ServiceWithOwnerRow]) -> Vec<&str> {
        rows.iter().map(|r| r.service.title.as_str()).collect()
    }

    #[test]
    fn upsert_user_replaces_profile_fields() {
        let db = Database::open_in_memory().unwrap();
        db.upsert_user(&user("u1", "grace")).unwrap();

        let mut changed = user("u1", "ghopper");
        changed.first_name = None;
        db.upsert_user(&changed).unwrap();

        let stored = db.get_user_by_id("u1").unwrap().unwrap();
        assert_eq!(stored.username, "ghopper");
        assert_eq!(stored.first_name, None);
        assert!(db.get_user_by_username("grace").unwrap().is_none());
    }

    #[test]
    fn search_matches_substring_case_insensitively() {
        let db = Database::open_in_memory().unwrap();
        db.insert_service(&service("s1", "u1", "Plumbing services", ServiceType::OfferingHelp))
            .unwrap();
        db.insert_service(&service("s2", "u1", "Dog walking", ServiceType::OfferingHelp))
            .unwrap();

        db.insert_service(&service("s3", "u1", "Déménagement Zürich", ServiceType::HelpWanted))
            .unwrap();

        let filter = ServiceFilter { query: Some("PLUMB".into()), ..Default::default() };
        let rows = db.search_services(&filter).unwrap();
        assert_eq!(titles(&rows), ["Plumbing services"]);

        for query in ["zÜRICH", "DÉM", "déménagement"] {
            let filter = ServiceFilter { query: Some(query.into()), ..Default::default() };
            let rows = db.search_services(&filter).unwrap();
            assert_eq!(titles(&rows), ["Déménagement Zürich"], "query {query}");
        }
    }

    #[test]
    fn search_matches_joined_owner_fields() {
        let db = Database::open_in_memory().unwrap();
        db.upsert_user(&user("u1", "grace")).unwrap();
        db.insert_service(&service("s1", "u1", "Tutoring", ServiceType::OfferingHelp))
            .unwrap();
        db.insert_service(&service("s2", "u2", "Moving boxes", ServiceType::HelpWanted))
            .unwrap();

        let filter = ServiceFilter { query: Some("hopper".into()), ..Default::default() };
        let rows = db.search_services(&filter).unwrap();
        assert_eq!(titles(&rows), ["Tutoring"]);
        assert_eq!(rows[0].owner.as_ref().unwrap().username, "grace");

        let all = db.search_services(&ServiceFilter::default()).unwrap();
        assert_eq!(titles(&all), ["Tutoring", "Moving boxes"]);
        assert!(all[1].owner.is_none());
    }

    #[test]
    fn search_treats_query_literally() {
        let db = Database::open_in_memory().unwrap();
        db.insert_service(&service("s1", "u1", "100% reliable", ServiceType::OfferingHelp))
            .unwrap();
        db.insert_service(&service("s2", "u1", "Gardening", ServiceType::OfferingHelp))
            .unwrap();

        let filter = ServiceFilter { query: Some("%".into()), ..Default::default() };
        assert_eq!(titles(&db.search_services(&filter).unwrap()), ["100% reliable"]);
    }

    #[test]
    fn search_filters_by_type_and_status() {
        let db = Database::open_in_memory().unwrap();
        db.insert_service(&service("s1", "u1", "Need a painter", ServiceType::HelpWanted))
            .unwrap();
        db.insert_service(&service("s2", "u1", "I paint walls", ServiceType::OfferingHelp))
            .unwrap();
        let mut inactive = service("s3", "u1", "Old request", ServiceType::HelpWanted);
        inactive.status = false;
        db.insert_service(&inactive).unwrap();

        let wanted = ServiceFilter {
            service_type: Some(ServiceType::HelpWanted),
            ..Default::default()
        };
        let rows = db.search_services(&wanted).unwrap();
        assert_eq!(titles(&rows), ["Need a painter", "Old request"]);
        assert!(rows.iter().all(|r| r.service.service_type == "help-wanted"));

        let active_wanted = ServiceFilter {
            status: Some(true),
            service_type: Some(ServiceType::HelpWanted),
            ..Default::default()
        };
        assert_eq!(titles(&db.search_services(&active_wanted).unwrap()), ["Need a painter"]);

        let inactive_only = ServiceFilter { status: Some(false), ..Default::default() };
        assert_eq!(titles(&db.search_services(&inactive_only).unwrap()), ["Old request"]);
    }

    #[test]
    fn blank_query_is_ignored() {
        let db = Database::open_in_memory().unwrap();
        db.insert_service(&service("s1", "u1", "Anything", ServiceType::HelpWanted))
            .unwrap();

        let filter = ServiceFilter { query: Some("   ".into()), ..Default::default() };
        assert_eq!(db.search_services(&filter).unwrap().len(), 1);
    }

    #[test]
    fn update_keeps_omitted_fields() {
        let db = Database::open_in_memory().unwrap();
        db.insert_service(&service("s1", "u1", "Plumbing", ServiceType::OfferingHelp))
            .unwrap();

        let changes = ServiceChanges {
            title: Some("Plumbing & heating".into()),
            status: Some(false),
            ..Default::default()
        };
        let updated = db
            .update_service("s1", &changes, "2024-05-02T10:00:00.000000Z")
            .unwrap()
            .unwrap();

        assert_eq!(updated.title, "Plumbing & heating");
        assert!(!updated.status);
        assert_eq!(updated.body, "details");
        assert_eq!(updated.city.as_deref(), Some("Springfield"));
        assert_eq!(updated.created_at, NOW);
        assert_eq!(updated.updated_at, "2024-05-02T10:00:00.000000Z");
    }

    #[test]
    fn update_and_delete_missing_service() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.update_service("nope", &ServiceChanges::default(), NOW).unwrap().is_none());
        assert!(!db.delete_service("nope").unwrap());
    }

    #[test]
    fn delete_removes_service_once() {
        let db = Database::open_in_memory().unwrap();
        db.insert_service(&service("s1", "u1", "Plumbing", ServiceType::OfferingHelp))
            .unwrap();

        assert!(db.delete_service("s1").unwrap());
        assert!(db.get_service("s1").unwrap().is_none());
        assert!(!db.delete_service("s1").unwrap());
    }

    #[test]
    fn services_by_user_only_returns_owned() {
        let db = Database::open_in_memory().unwrap();
        db.insert_service(&service("s1", "u1", "Mine", ServiceType::OfferingHelp)).unwrap();
        db.insert_service(&service("s2", "u2", "Theirs", ServiceType::OfferingHelp)).unwrap();
        let mut inactive = service("s3", "u1", "Mine too", ServiceType::HelpWanted);
        inactive.status = false;
        db.insert_service(&inactive).unwrap();

        let rows = db.get_services_by_user("u1").unwrap();
        let titles: Vec<_> = rows.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, ["Mine", "Mine too"]);
    }

    #[test]
    fn one_conversation_per_pair() {
        let db = Database::open_in_memory().unwrap();

        let first = db.send_message("c1", &message("m1", "alice", "bob", "hi")).unwrap();
        assert!(first.conversation_created);
        assert_eq!(first.conversation_id, "c1");

        // Reply in the other direction reuses the same conversation
        let second = db.send_message("c2", &message("m2", "bob", "alice", "hey")).unwrap();
        assert!(!second.conversation_created);
        assert_eq!(second.conversation_id, "c1");

        let count: i64 = db
            .with_conn(|conn| {
                Ok(conn.query_row("SELECT COUNT(*) FROM conversations", [], |r| r.get(0))?)
            })
            .unwrap();
        assert_eq!(count, 1);

        let conversation = db.get_conversation("bob", "alice").unwrap().unwrap();
        assert_eq!(conversation.message_ids, ["m1", "m2"]);
    }

    #[test]
    fn history_is_in_append_order() {
        let db = Database::open_in_memory().unwrap();
        db.send_message("c1", &message("m-b", "alice", "bob", "first")).unwrap();
        db.send_message("c9", &message("m-a", "bob", "alice", "second")).unwrap();
        db.send_message("c9", &message("m-c", "alice", "carol", "elsewhere")).unwrap();

        let texts: Vec<_> = db
            .get_messages_between("bob", "alice")
            .unwrap()
            .into_iter()
            .map(|m| m.message)
            .collect();
        assert_eq!(texts, ["first", "second"]);
    }

    #[test]
    fn missing_conversation_is_none() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.get_conversation("alice", "bob").unwrap().is_none());
        assert!(db.get_messages_between("alice", "bob").unwrap().is_empty());
    }

    #[test]
    fn failed_send_leaves_nothing_behind() {
        let db = Database::open_in_memory().unwrap();
        db.send_message("c1", &message("m1", "alice", "bob", "hi")).unwrap();

        // Duplicate message id fails after the conversation insert for a new pair
        let err = db.send_message("c2", &message("m1", "alice", "carol", "dup"));
        assert!(err.is_err());
        assert!(db.get_conversation("alice", "carol").unwrap().is_none());
    }

    #[test]
    fn participant_pair_is_order_independent() {
        assert_eq!(participant_pair("b", "a"), ("a", "b"));
        assert_eq!(participant_pair("a", "b"), ("a", "b"));
        assert_eq!(participant_pair("a", "a"), ("a", "a"));
    }
}
