use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id              TEXT PRIMARY KEY,
                username        TEXT NOT NULL UNIQUE,
                first_name      TEXT,
                last_name       TEXT,
                email           TEXT,
                profile_picture TEXT,
                created_at      TEXT NOT NULL
            );

            -- user_id has no FK: identities live in the auth service and may
            -- not have a profile row here.
            CREATE TABLE services (
                id              TEXT PRIMARY KEY,
                user_id         TEXT NOT NULL,
                username        TEXT NOT NULL,
                title           TEXT NOT NULL,
                body            TEXT NOT NULL,
                category        TEXT NOT NULL,
                image           TEXT NOT NULL,
                address         TEXT,
                city            TEXT,
                country         TEXT,
                zip             TEXT,
                phone           TEXT,
                status          INTEGER NOT NULL DEFAULT 1,
                service_type    TEXT NOT NULL
                    CHECK (service_type IN ('help-wanted', 'offering-help')),
                created_at      TEXT NOT NULL,
                updated_at      TEXT NOT NULL
            );

            CREATE INDEX idx_services_user ON services(user_id);

            -- Participants are stored normalized (low < high by string order)
            -- so the pair is unique regardless of who wrote first.
            CREATE TABLE conversations (
                id              TEXT PRIMARY KEY,
                participant_low  TEXT NOT NULL,
                participant_high TEXT NOT NULL,
                created_at      TEXT NOT NULL,
                UNIQUE (participant_low, participant_high)
            );

            CREATE TABLE messages (
                id              TEXT PRIMARY KEY,
                sender_id       TEXT NOT NULL,
                receiver_id     TEXT NOT NULL,
                message         TEXT NOT NULL,
                created_at      TEXT NOT NULL
            );

            CREATE TABLE conversation_messages (
                conversation_id TEXT NOT NULL REFERENCES conversations(id),
                position        INTEGER NOT NULL,
                message_id      TEXT NOT NULL UNIQUE REFERENCES messages(id),
                PRIMARY KEY (conversation_id, position)
            );

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn running_twice_is_a_no_op() {
        let conn = Connection::open_in_memory().unwrap();
        run(&conn).unwrap();
        run(&conn).unwrap();

        let rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_version", [], |r| r.get(0))
            .unwrap();
        assert_eq!(rows, 1);
    }

    #[test]
    fn rejects_unknown_service_type() {
        let conn = Connection::open_in_memory().unwrap();
        run(&conn).unwrap();

        let result = conn.execute(
            "INSERT INTO services (id, user_id, username, title, body, category, image,
                                   service_type, created_at, updated_at)
             VALUES ('s', 'u', 'n', 't', 'b', 'c', 'i', 'for-sale', 'now', 'now')",
            [],
        );
        assert!(result.is_err());
    }
}
