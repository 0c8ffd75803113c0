use crate::Database;
use crate::models::{UserRow, VideoRow};
use anyhow::Result;
use rusqlite::Connection;

const USER_COLUMNS: &str = "id, username, email, full_name, avatar_url, cover_image_url, \
     password_hash, refresh_token, created_at, updated_at";

const VIDEO_COLUMNS: &str = "id, media_url, thumbnail_url, title, description, duration_secs, \
     views, is_published, owner_id, created_at, updated_at";

impl Database {
    // -- Users --

    #[allow(clippy::too_many_arguments)]
    pub fn create_user(
        &self,
        id: &str,
        username: &str,
        email: &str,
        full_name: &str,
        avatar_url: &str,
        cover_image_url: Option<&str>,
        password_hash: &str,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, username, email, full_name, avatar_url, cover_image_url, password_hash)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                (id, username, email, full_name, avatar_url, cover_image_url, password_hash),
            )?;
            Ok(())
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "username", username))
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "email", email))
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id", id))
    }

    /// Overwrite the stored password hash. The caller hashes first; this
    /// column never sees a raw secret.
    pub fn update_password(&self, id: &str, password_hash: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE users SET password_hash = ?2, updated_at = datetime('now') WHERE id = ?1",
                (id, password_hash),
            )?;
            Ok(())
        })
    }

    pub fn update_account(&self, id: &str, full_name: &str, email: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE users SET full_name = ?2, email = ?3, updated_at = datetime('now') WHERE id = ?1",
                (id, full_name, email),
            )?;
            Ok(())
        })
    }

    pub fn update_avatar(&self, id: &str, avatar_url: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE users SET avatar_url = ?2, updated_at = datetime('now') WHERE id = ?1",
                (id, avatar_url),
            )?;
            Ok(())
        })
    }

    // -- Session record --

    /// Unconditional overwrite, used on login where no previous token is
    /// expected to survive.
    pub fn set_refresh_token(&self, id: &str, token: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE users SET refresh_token = ?2, updated_at = datetime('now') WHERE id = ?1",
                (id, token),
            )?;
            Ok(())
        })
    }

    /// Compare-and-swap rotation: the new token is stored only if the
    /// currently stored value still equals `previous`. Returns false when a
    /// concurrent rotation already replaced it, and the caller must reject.
    pub fn rotate_refresh_token(&self, id: &str, previous: &str, next: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE users SET refresh_token = ?3, updated_at = datetime('now')
                 WHERE id = ?1 AND refresh_token = ?2",
                (id, previous, next),
            )?;
            Ok(changed > 0)
        })
    }

    pub fn clear_refresh_token(&self, id: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE users SET refresh_token = NULL, updated_at = datetime('now') WHERE id = ?1",
                [id],
            )?;
            Ok(())
        })
    }

    // -- Videos --

    #[allow(clippy::too_many_arguments)]
    pub fn create_video(
        &self,
        id: &str,
        media_url: &str,
        thumbnail_url: &str,
        title: &str,
        description: &str,
        duration_secs: f64,
        owner_id: &str,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO videos (id, media_url, thumbnail_url, title, description, duration_secs, owner_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                (id, media_url, thumbnail_url, title, description, duration_secs, owner_id),
            )?;
            Ok(())
        })
    }

    pub fn get_video(&self, id: &str) -> Result<Option<VideoRow>> {
        self.with_conn(|conn| query_video(conn, id))
    }

    /// Bump the view counter. Returns the new count, or None for an unknown
    /// video id.
    pub fn increment_views(&self, id: &str) -> Result<Option<i64>> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE videos SET views = views + 1, updated_at = datetime('now') WHERE id = ?1",
                [id],
            )?;
            if changed == 0 {
                return Ok(None);
            }
            let views = conn.query_row("SELECT views FROM videos WHERE id = ?1", [id], |row| {
                row.get(0)
            })?;
            Ok(Some(views))
        })
    }

    /// Flip the published flag. Returns the new state, or None for an
    /// unknown video id.
    pub fn toggle_published(&self, id: &str) -> Result<Option<bool>> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE videos SET is_published = 1 - is_published, updated_at = datetime('now')
                 WHERE id = ?1",
                [id],
            )?;
            if changed == 0 {
                return Ok(None);
            }
            let published =
                conn.query_row("SELECT is_published FROM videos WHERE id = ?1", [id], |row| {
                    row.get(0)
                })?;
            Ok(Some(published))
        })
    }

    // -- Watch history --

    pub fn record_watch(&self, user_id: &str, video_id: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO watch_history (user_id, video_id) VALUES (?1, ?2)",
                (user_id, video_id),
            )?;
            Ok(())
        })
    }

    /// Video ids in watch order. Weak references: ids whose video no longer
    /// exists are still returned here and skipped at resolution time.
    pub fn get_watch_history(&self, user_id: &str) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare("SELECT video_id FROM watch_history WHERE user_id = ?1 ORDER BY id")?;
            let ids = stmt
                .query_map([user_id], |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(ids)
        })
    }
}

fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<UserRow>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE {column} = ?1");
    let mut stmt = conn.prepare(&sql)?;

    let row = stmt
        .query_row([value], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                username: row.get(1)?,
                email: row.get(2)?,
                full_name: row.get(3)?,
                avatar_url: row.get(4)?,
                cover_image_url: row.get(5)?,
                password_hash: row.get(6)?,
                refresh_token: row.get(7)?,
                created_at: row.get(8)?,
                updated_at: row.get(9)?,
            })
        })
        .optional()?;

    Ok(row)
}

fn query_video(conn: &Connection, id: &str) -> Result<Option<VideoRow>> {
    let sql = format!("SELECT {VIDEO_COLUMNS} FROM videos WHERE id = ?1");
    let mut stmt = conn.prepare(&sql)?;

    let row = stmt
        .query_row([id], |row| {
            Ok(VideoRow {
                id: row.get(0)?,
                media_url: row.get(1)?,
                thumbnail_url: row.get(2)?,
                title: row.get(3)?,
                description: row.get(4)?,
                duration_secs: row.get(5)?,
                views: row.get(6)?,
                is_published: row.get(7)?,
                owner_id: row.get(8)?,
                created_at: row.get(9)?,
                updated_at: row.get(10)?,
            })
        })
        .optional()?;

    Ok(row)
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{Database, is_unique_violation};

    fn db() -> Database {
        Database::open_in_memory().unwrap()
    }

    fn seed_user(db: &Database, id: &str, username: &str, email: &str) {
        db.create_user(
            id,
            username,
            email,
            "Alice Example",
            "https://cdn.example/avatar.png",
            None,
            "$argon2id$v=19$m=19456,t=2,p=1$c2FsdHNhbHQ$aGFzaGhhc2g",
        )
        .unwrap();
    }

    #[test]
    fn create_and_fetch_user() {
        let db = db();
        seed_user(&db, "u-1", "alice", "alice@x.com");

        let row = db.get_user_by_username("alice").unwrap().unwrap();
        assert_eq!(row.id, "u-1");
        assert_eq!(row.email, "alice@x.com");
        assert_eq!(row.cover_image_url, None);
        assert_eq!(row.refresh_token, None);

        assert!(db.get_user_by_id("u-1").unwrap().is_some());
        assert!(db.get_user_by_email("alice@x.com").unwrap().is_some());
        assert!(db.get_user_by_username("nobody").unwrap().is_none());
    }

    #[test]
    fn duplicate_username_is_rejected_and_nothing_persists() {
        let db = db();
        seed_user(&db, "u-1", "alice", "alice@x.com");

        let err = db
            .create_user(
                "u-2",
                "alice",
                "other@x.com",
                "Second Alice",
                "https://cdn.example/a2.png",
                None,
                "$argon2id$v=19$m=19456,t=2,p=1$c2FsdHNhbHQ$b3RoZXJoYXNo",
            )
            .unwrap_err();
        assert!(is_unique_violation(&err));

        // The rejected write left no partial row behind.
        assert!(db.get_user_by_email("other@x.com").unwrap().is_none());
        assert_eq!(db.get_user_by_username("alice").unwrap().unwrap().id, "u-1");
    }

    #[test]
    fn duplicate_email_is_rejected() {
        let db = db();
        seed_user(&db, "u-1", "alice", "alice@x.com");

        let err = db
            .create_user(
                "u-2",
                "bob",
                "alice@x.com",
                "Bob",
                "https://cdn.example/b.png",
                None,
                "$argon2id$v=19$m=19456,t=2,p=1$c2FsdHNhbHQ$Ym9iaGFzaA",
            )
            .unwrap_err();
        assert!(is_unique_violation(&err));
        assert!(db.get_user_by_username("bob").unwrap().is_none());
    }

    #[test]
    fn refresh_rotation_is_compare_and_swap() {
        let db = db();
        seed_user(&db, "u-1", "alice", "alice@x.com");

        db.set_refresh_token("u-1", "token-a").unwrap();
        assert_eq!(
            db.get_user_by_id("u-1").unwrap().unwrap().refresh_token.as_deref(),
            Some("token-a")
        );

        // First rotation wins.
        assert!(db.rotate_refresh_token("u-1", "token-a", "token-b").unwrap());

        // A second rotation presenting the stale previous value loses.
        assert!(!db.rotate_refresh_token("u-1", "token-a", "token-c").unwrap());
        assert_eq!(
            db.get_user_by_id("u-1").unwrap().unwrap().refresh_token.as_deref(),
            Some("token-b")
        );

        db.clear_refresh_token("u-1").unwrap();
        assert_eq!(db.get_user_by_id("u-1").unwrap().unwrap().refresh_token, None);
    }

    #[test]
    fn password_update_replaces_hash_only() {
        let db = db();
        seed_user(&db, "u-1", "alice", "alice@x.com");

        db.update_password("u-1", "$argon2id$v=19$m=19456,t=2,p=1$bmV3c2FsdA$bmV3aGFzaA")
            .unwrap();
        let row = db.get_user_by_id("u-1").unwrap().unwrap();
        assert!(row.password_hash.contains("bmV3aGFzaA"));
        assert_eq!(row.username, "alice");
    }

    #[test]
    fn video_lifecycle() {
        let db = db();
        seed_user(&db, "u-1", "alice", "alice@x.com");
        db.create_video(
            "v-1",
            "https://media.example/v-1.mp4",
            "https://media.example/v-1.jpg",
            "First upload",
            "A description",
            12.5,
            "u-1",
        )
        .unwrap();

        let row = db.get_video("v-1").unwrap().unwrap();
        assert_eq!(row.title, "First upload");
        assert_eq!(row.views, 0);
        assert!(row.is_published);

        assert_eq!(db.increment_views("v-1").unwrap(), Some(1));
        assert_eq!(db.increment_views("v-1").unwrap(), Some(2));
        assert_eq!(db.increment_views("missing").unwrap(), None);

        assert_eq!(db.toggle_published("v-1").unwrap(), Some(false));
        assert_eq!(db.toggle_published("v-1").unwrap(), Some(true));
        assert_eq!(db.toggle_published("missing").unwrap(), None);
    }

    #[test]
    fn watch_history_preserves_order_and_allows_dangling_ids() {
        let db = db();
        seed_user(&db, "u-1", "alice", "alice@x.com");

        // v-2 is never created: weak references may dangle.
        db.record_watch("u-1", "v-1").unwrap();
        db.record_watch("u-1", "v-2").unwrap();
        db.record_watch("u-1", "v-1").unwrap();

        let ids = db.get_watch_history("u-1").unwrap();
        assert_eq!(ids, vec!["v-1", "v-2", "v-1"]);
    }
}
