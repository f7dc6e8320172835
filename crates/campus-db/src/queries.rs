use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row};
use uuid::Uuid;

use campus_types::api::{DiplomaView, GradeView};
use campus_types::models::{ChatMessage, Diploma, GradeRecord, Role, User};

use crate::Database;
use crate::models::{DiplomaRow, GradeRow, MessageRow, UserRow};

const USER_COLUMNS: &str = "id, username, display_name, password, role, created_at";

impl Database {
    // -- Users --

    pub fn count_users(&self) -> Result<i64> {
        self.with_conn(|conn| {
            Ok(conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?)
        })
    }

    pub fn create_user(
        &self,
        id: Uuid,
        username: &str,
        display_name: &str,
        password_hash: &str,
        role: Role,
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO users (id, username, display_name, password, role, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    id.to_string(),
                    username,
                    display_name,
                    password_hash,
                    role.as_str(),
                    Utc::now().to_rfc3339()
                ],
            )?;
            Ok(())
        })
    }

    /// Inserts an admin only while the table is empty. Returns false when a
    /// user already exists.
    pub fn create_first_admin(
        &self,
        id: Uuid,
        username: &str,
        display_name: &str,
        password_hash: &str,
    ) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let inserted = conn.execute(
                "INSERT INTO users (id, username, display_name, password, role, created_at)
                 SELECT ?1, ?2, ?3, ?4, 'admin', ?5
                 WHERE NOT EXISTS (SELECT 1 FROM users)",
                rusqlite::params![
                    id.to_string(),
                    username,
                    display_name,
                    password_hash,
                    Utc::now().to_rfc3339()
                ],
            )?;
            Ok(inserted == 1)
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {} FROM users WHERE username = ?1", USER_COLUMNS);
            Ok(conn.query_row(&sql, [username], user_row).optional()?)
        })
    }

    pub fn get_user(&self, id: Uuid) -> Result<Option<User>> {
        let row = self.with_conn(|conn| {
            let sql = format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS);
            Ok(conn.query_row(&sql, [id.to_string()], user_row).optional()?)
        })?;
        row.map(UserRow::into_user).transpose()
    }

    pub fn list_users(&self) -> Result<Vec<User>> {
        let rows = self.with_conn(|conn| {
            let sql = format!("SELECT {} FROM users ORDER BY rowid ASC", USER_COLUMNS);
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([], user_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })?;
        rows.into_iter().map(UserRow::into_user).collect()
    }

    /// Removes only the user row; their grades, diplomas and messages stay.
    pub fn delete_user(&self, id: Uuid) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let n = conn.execute("DELETE FROM users WHERE id = ?1", [id.to_string()])?;
            Ok(n > 0)
        })
    }

    pub fn update_password(&self, id: Uuid, password_hash: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let n = conn.execute(
                "UPDATE users SET password = ?1 WHERE id = ?2",
                rusqlite::params![password_hash, id.to_string()],
            )?;
            Ok(n > 0)
        })
    }

    pub fn update_role(&self, id: Uuid, role: Role) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let n = conn.execute(
                "UPDATE users SET role = ?1 WHERE id = ?2",
                rusqlite::params![role.as_str(), id.to_string()],
            )?;
            Ok(n > 0)
        })
    }

    // -- Grades --

    pub fn insert_grade(&self, grade: &GradeRecord) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO grades (id, user_id, author_id, subject, score, weight, attachment, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                rusqlite::params![
                    grade.id.to_string(),
                    grade.user_id.to_string(),
                    grade.author_id.to_string(),
                    grade.subject,
                    grade.score,
                    grade.weight,
                    grade.attachment,
                    grade.created_at.to_rfc3339()
                ],
            )?;
            Ok(())
        })
    }

    pub fn grades_for_user(&self, user_id: Uuid) -> Result<Vec<GradeRecord>> {
        let rows = self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, author_id, subject, score, weight, attachment, created_at
                 FROM grades WHERE user_id = ?1 ORDER BY rowid ASC",
            )?;
            let rows = stmt
                .query_map([user_id.to_string()], grade_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })?;
        rows.into_iter().map(GradeRow::into_record).collect()
    }

    pub fn get_grade(&self, id: Uuid) -> Result<Option<GradeRecord>> {
        let row = self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT id, user_id, author_id, subject, score, weight, attachment, created_at
                     FROM grades WHERE id = ?1",
                    [id.to_string()],
                    grade_row,
                )
                .optional()?)
        })?;
        row.map(GradeRow::into_record).transpose()
    }

    /// Grades joined with student and author display names, newest first.
    /// `owner` restricts the listing to one student.
    pub fn list_grades(&self, owner: Option<Uuid>) -> Result<Vec<GradeView>> {
        let rows = self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT g.id, g.user_id, g.author_id, g.subject, g.score, g.weight, g.attachment,
                        g.created_at, s.display_name, a.display_name
                 FROM grades g
                 LEFT JOIN users s ON s.id = g.user_id
                 LEFT JOIN users a ON a.id = g.author_id
                 WHERE ?1 IS NULL OR g.user_id = ?1
                 ORDER BY g.rowid DESC",
            )?;
            let rows = stmt
                .query_map([owner.map(|id| id.to_string())], |row| {
                    Ok((grade_row(row)?, row.get::<_, Option<String>>(8)?, row.get::<_, Option<String>>(9)?))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })?;

        rows.into_iter()
            .map(|(grade, student_name, author_name)| {
                Ok(GradeView {
                    record: grade.into_record()?,
                    student_name,
                    author_name,
                })
            })
            .collect()
    }

    pub fn delete_grade(&self, id: Uuid) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let n = conn.execute("DELETE FROM grades WHERE id = ?1", [id.to_string()])?;
            Ok(n > 0)
        })
    }

    // -- Diplomas --

    pub fn insert_diploma(&self, diploma: &Diploma) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO diplomas (id, user_id, title, average, issued_at, attachment)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    diploma.id.to_string(),
                    diploma.user_id.to_string(),
                    diploma.title,
                    diploma.average,
                    diploma.issued_at.to_rfc3339(),
                    diploma.attachment
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_diploma(&self, id: Uuid) -> Result<Option<Diploma>> {
        let row = self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT id, user_id, title, average, issued_at, attachment
                     FROM diplomas WHERE id = ?1",
                    [id.to_string()],
                    diploma_row,
                )
                .optional()?)
        })?;
        row.map(DiplomaRow::into_diploma).transpose()
    }

    /// Diplomas joined with the holder's display name. `owner` restricts the
    /// listing to one holder.
    pub fn list_diplomas(&self, owner: Option<Uuid>) -> Result<Vec<DiplomaView>> {
        let rows = self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT d.id, d.user_id, d.title, d.average, d.issued_at, d.attachment, u.display_name
                 FROM diplomas d
                 LEFT JOIN users u ON u.id = d.user_id
                 WHERE ?1 IS NULL OR d.user_id = ?1
                 ORDER BY d.rowid ASC",
            )?;
            let rows = stmt
                .query_map([owner.map(|id| id.to_string())], |row| {
                    Ok((diploma_row(row)?, row.get::<_, Option<String>>(6)?))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })?;

        rows.into_iter()
            .map(|(diploma, display_name)| {
                Ok(DiplomaView {
                    diploma: diploma.into_diploma()?,
                    display_name,
                })
            })
            .collect()
    }

    pub fn delete_diploma(&self, id: Uuid) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let n = conn.execute("DELETE FROM diplomas WHERE id = ?1", [id.to_string()])?;
            Ok(n > 0)
        })
    }

    // -- Messages --

    /// Appends one chat line and returns its sequence number. The author
    /// check and the insert are one statement; an unknown author writes
    /// nothing and yields `None`.
    pub fn append_message(
        &self,
        id: Uuid,
        author_id: Uuid,
        text: &str,
        created_at: DateTime<Utc>,
    ) -> Result<Option<i64>> {
        self.with_conn_mut(|conn| {
            let inserted = conn.execute(
                "INSERT INTO messages (id, author_id, text, created_at)
                 SELECT ?1, ?2, ?3, ?4
                 WHERE EXISTS (SELECT 1 FROM users WHERE id = ?2)",
                rusqlite::params![id.to_string(), author_id.to_string(), text, created_at.to_rfc3339()],
            )?;
            if inserted == 0 {
                return Ok(None);
            }
            Ok(Some(conn.last_insert_rowid()))
        })
    }

    /// The whole log, newest first.
    pub fn list_messages(&self) -> Result<Vec<ChatMessage>> {
        self.with_conn(query_messages)?
            .into_iter()
            .map(MessageRow::into_message)
            .collect()
    }
}

fn query_messages(conn: &Connection) -> Result<Vec<MessageRow>> {
    // JOIN users to fetch the display name in a single query
    let mut stmt = conn.prepare(
        "SELECT m.seq, m.id, m.author_id, u.display_name, m.text, m.created_at
         FROM messages m
         LEFT JOIN users u ON m.author_id = u.id
         ORDER BY m.seq DESC",
    )?;

    let rows = stmt
        .query_map([], |row| {
            Ok(MessageRow {
                seq: row.get(0)?,
                id: row.get(1)?,
                author_id: row.get(2)?,
                author_display_name: row.get(3)?,
                text: row.get(4)?,
                created_at: row.get(5)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

fn user_row(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        username: row.get(1)?,
        display_name: row.get(2)?,
        password: row.get(3)?,
        role: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn grade_row(row: &Row<'_>) -> rusqlite::Result<GradeRow> {
    Ok(GradeRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        author_id: row.get(2)?,
        subject: row.get(3)?,
        score: row.get(4)?,
        weight: row.get(5)?,
        attachment: row.get(6)?,
        created_at: row.get(7)?,
    })
}

fn diploma_row(row: &Row<'_>) -> rusqlite::Result<DiplomaRow> {
    Ok(DiplomaRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        title: row.get(2)?,
        average: row.get(3)?,
        issued_at: row.get(4)?,
        attachment: row.get(5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db_with_user(role: Role) -> (Database, Uuid) {
        let db = Database::open_in_memory().unwrap();
        let id = Uuid::new_v4();
        db.create_user(id, "alice", "Alice", "hash", role).unwrap();
        (db, id)
    }

    fn grade(user_id: Uuid, author_id: Uuid, score: f64, weight: Option<f64>) -> GradeRecord {
        GradeRecord {
            id: Uuid::new_v4(),
            user_id,
            author_id,
            subject: "Maths".into(),
            score,
            weight,
            attachment: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn first_admin_only_once() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.create_first_admin(Uuid::new_v4(), "root", "Root", "h").unwrap());
        assert!(!db.create_first_admin(Uuid::new_v4(), "other", "Other", "h").unwrap());
        assert_eq!(db.count_users().unwrap(), 1);

        let users = db.list_users().unwrap();
        assert_eq!(users[0].role, Role::Admin);
    }

    #[test]
    fn appended_message_is_listed_first() {
        let (db, alice) = db_with_user(Role::Student);

        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        let s1 = db.append_message(first, alice, "hello", Utc::now()).unwrap().unwrap();
        let s2 = db.append_message(second, alice, "", Utc::now()).unwrap().unwrap();
        assert!(s2 > s1);

        let log = db.list_messages().unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].id, second);
        assert_eq!(log[0].text, "");
        assert_eq!(log[1].id, first);
        assert_eq!(log[1].author_display_name.as_deref(), Some("Alice"));
    }

    #[test]
    fn append_from_unknown_author_writes_nothing() {
        let (db, _) = db_with_user(Role::Student);
        let result = db.append_message(Uuid::new_v4(), Uuid::new_v4(), "ghost", Utc::now());
        assert_eq!(result.unwrap(), None);
        assert!(db.list_messages().unwrap().is_empty());
    }

    #[test]
    fn append_after_author_deleted_writes_nothing() {
        let (db, alice) = db_with_user(Role::Student);
        assert!(db.delete_user(alice).unwrap());

        let result = db.append_message(Uuid::new_v4(), alice, "late", Utc::now());
        assert_eq!(result.unwrap(), None);
        assert!(db.list_messages().unwrap().is_empty());
    }

    #[test]
    fn deleting_user_keeps_their_rows() {
        let (db, alice) = db_with_user(Role::Student);
        db.append_message(Uuid::new_v4(), alice, "still here", Utc::now()).unwrap();
        db.insert_grade(&grade(alice, alice, 12.0, None)).unwrap();

        assert!(db.delete_user(alice).unwrap());
        assert!(!db.delete_user(alice).unwrap());

        let log = db.list_messages().unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].author_display_name, None);
        assert_eq!(db.grades_for_user(alice).unwrap().len(), 1);
    }

    #[test]
    fn grade_listing_filters_by_owner() {
        let (db, alice) = db_with_user(Role::Student);
        let bob = Uuid::new_v4();
        db.create_user(bob, "bob", "Bob", "hash", Role::Student).unwrap();
        let teacher = Uuid::new_v4();
        db.create_user(teacher, "prof", "Prof", "hash", Role::Teacher).unwrap();

        db.insert_grade(&grade(alice, teacher, 10.0, Some(2.0))).unwrap();
        db.insert_grade(&grade(bob, teacher, 16.0, None)).unwrap();

        let all = db.list_grades(None).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].student_name.as_deref(), Some("Bob"));
        assert_eq!(all[0].author_name.as_deref(), Some("Prof"));

        let mine = db.list_grades(Some(alice)).unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].record.weight, Some(2.0));
    }

    #[test]
    fn null_weight_round_trips_as_none() {
        let (db, alice) = db_with_user(Role::Student);
        let g = grade(alice, alice, 14.5, None);
        db.insert_grade(&g).unwrap();

        let stored = db.get_grade(g.id).unwrap().unwrap();
        assert_eq!(stored.weight, None);
        assert_eq!(stored.score, 14.5);
        assert!(db.delete_grade(g.id).unwrap());
        assert!(db.get_grade(g.id).unwrap().is_none());
    }

    #[test]
    fn role_update_is_persisted() {
        let (db, alice) = db_with_user(Role::Student);
        assert!(db.update_role(alice, Role::Teacher).unwrap());
        assert_eq!(db.get_user(alice).unwrap().unwrap().role, Role::Teacher);
        assert!(!db.update_role(Uuid::new_v4(), Role::Admin).unwrap());
    }
}
