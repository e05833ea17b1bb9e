use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (consultations)");
        conn.execute_batch(
            "
            -- Written by the scheduling service; read-only for consultations
            CREATE TABLE appointments (
                id          TEXT PRIMARY KEY,
                patient_id  TEXT NOT NULL,
                doctor_id   TEXT NOT NULL,
                status      TEXT NOT NULL DEFAULT 'pending'
            );

            CREATE TABLE consultations (
                appointment_id  TEXT PRIMARY KEY,
                patient_id      TEXT NOT NULL,
                doctor_id       TEXT NOT NULL,
                is_active       INTEGER NOT NULL DEFAULT 1,
                started_at      INTEGER NOT NULL,
                ended_at        INTEGER,
                last_activity   INTEGER NOT NULL,
                created_at      INTEGER NOT NULL
            );

            CREATE INDEX idx_consultations_patient
                ON consultations(patient_id, is_active, last_activity);
            CREATE INDEX idx_consultations_doctor
                ON consultations(doctor_id, is_active, last_activity);

            CREATE TABLE messages (
                seq             INTEGER PRIMARY KEY AUTOINCREMENT,
                id              TEXT NOT NULL UNIQUE,
                appointment_id  TEXT NOT NULL REFERENCES consultations(appointment_id),
                sender_id       TEXT NOT NULL,
                sender_role     TEXT NOT NULL,
                kind            TEXT NOT NULL,
                content         TEXT,
                file_url        TEXT,
                file_name       TEXT,
                file_size       INTEGER,
                created_at      INTEGER NOT NULL,
                read            INTEGER NOT NULL DEFAULT 0,
                read_at         INTEGER
            );

            CREATE INDEX idx_messages_consultation
                ON messages(appointment_id, seq);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    if version < 2 {
        info!("Running migration v2 (stored files)");
        conn.execute_batch(
            "
            CREATE TABLE files (
                id            TEXT PRIMARY KEY,
                owner_id      TEXT NOT NULL,
                file_name     TEXT NOT NULL,
                content_type  TEXT NOT NULL,
                size          INTEGER NOT NULL,
                created_at    INTEGER NOT NULL
            );

            INSERT INTO schema_version (version) VALUES (2);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
