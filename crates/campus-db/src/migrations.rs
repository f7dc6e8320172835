use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

/// Deleting a user leaves their grades, diplomas and messages behind; the
/// tables carry no foreign keys so that deletion never fails on them.
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
                display_name    TEXT NOT NULL,
                password        TEXT NOT NULL,
                role            TEXT NOT NULL DEFAULT 'student'
                                CHECK (role IN ('student', 'teacher', 'admin')),
                created_at      TEXT NOT NULL
            );

            CREATE TABLE grades (
                id              TEXT PRIMARY KEY,
                user_id         TEXT NOT NULL,
                author_id       TEXT NOT NULL,
                subject         TEXT NOT NULL,
                score           REAL NOT NULL,
                weight          REAL,
                attachment      TEXT,
                created_at      TEXT NOT NULL
            );

            CREATE INDEX idx_grades_user ON grades(user_id);

            CREATE TABLE diplomas (
                id              TEXT PRIMARY KEY,
                user_id         TEXT NOT NULL,
                title           TEXT NOT NULL,
                average         REAL NOT NULL,
                issued_at       TEXT NOT NULL,
                attachment      TEXT
            );

            CREATE INDEX idx_diplomas_user ON diplomas(user_id);

            CREATE TABLE messages (
                seq             INTEGER PRIMARY KEY AUTOINCREMENT,
                id              TEXT NOT NULL UNIQUE,
                author_id       TEXT NOT NULL,
                text            TEXT NOT NULL,
                created_at      TEXT NOT NULL
            );

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
