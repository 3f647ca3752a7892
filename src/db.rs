use std::path::Path;
use std::time::Duration;

use rusqlite::{Connection, ErrorCode, OptionalExtension, params};
use tracing::{debug, info};

use crate::error::{AppError, Result};
use crate::models::{Comment, Listing, ProfileUpdate, Session, UserProfile};
use crate::slug;
use crate::validate::ValidListing;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub(crate) const LISTING_COLUMNS: &str = "id, slug, post_type, title, category_id, category_name, \
     country, city, salary, work_type, description, contact_phone, contact_email, owner_id, \
     like_count, rating, created_at, updated_at";

const PROFILE_COLUMNS: &str =
    "id, email, display_name, phone, country, city, category_id, created_at, updated_at";

const COMMENT_COLUMNS: &str = "c.id, c.listing_id, c.author_id, u.display_name, c.text, \
     c.parent_id, c.created_at, c.updated_at";

pub struct Database {
    pub(crate) conn: Connection,
}

/// Outcome of looking a listing up by slug or id.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Found(Box<Listing>),
    /// The key identified a listing but is not its canonical slug.
    Redirect(String),
    NotFound,
}

/// Timestamp in the same shape SQLite's `strftime('%Y-%m-%dT%H:%M:%fZ')` produces,
/// so stored values compare correctly as text.
pub fn now_stamp() -> String {
    stamp(chrono::Utc::now())
}

pub fn stamp(at: chrono::DateTime<chrono::Utc>) -> String {
    at.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Self::configure(&conn)?;
        debug!("Opened database at {}", path.display());
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::configure(&conn)?;
        Ok(Self { conn })
    }

    fn configure(conn: &Connection) -> Result<()> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.pragma_update(None, "foreign_keys", true)?;
        // WAL keeps readers going while a like toggle holds the write lock.
        // In-memory databases report "memory" and that is fine.
        let _mode: String = conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        Ok(())
    }

    pub fn init(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                email TEXT NOT NULL UNIQUE COLLATE NOCASE,
                password_hash TEXT NOT NULL,
                display_name TEXT NOT NULL,
                phone TEXT,
                country TEXT,
                city TEXT,
                category_id TEXT,
                created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            );

            CREATE TABLE IF NOT EXISTS sessions (
                token TEXT PRIMARY KEY,
                user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                expires_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS listings (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                slug TEXT NOT NULL DEFAULT '',
                post_type TEXT NOT NULL CHECK (post_type IN ('seeking_worker', 'seeking_job')),
                title TEXT NOT NULL,
                category_id TEXT,
                category_name TEXT,
                country TEXT NOT NULL,
                city TEXT,
                salary TEXT,
                work_type TEXT NOT NULL CHECK (work_type IN ('full_time', 'part_time', 'remote', 'freelance', 'contract')),
                description TEXT NOT NULL,
                contact_phone TEXT,
                contact_email TEXT,
                owner_id INTEGER NOT NULL REFERENCES users(id),
                like_count INTEGER NOT NULL DEFAULT 0,
                rating REAL NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            );

            CREATE TABLE IF NOT EXISTS interests (
                user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                listing_id INTEGER NOT NULL REFERENCES listings(id),
                created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                PRIMARY KEY (user_id, listing_id)
            );

            CREATE TABLE IF NOT EXISTS comments (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                listing_id INTEGER NOT NULL REFERENCES listings(id),
                author_id INTEGER NOT NULL REFERENCES users(id),
                text TEXT NOT NULL,
                parent_id INTEGER REFERENCES comments(id) ON DELETE CASCADE,
                created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            );

            -- like_count always follows the interests table
            CREATE TRIGGER IF NOT EXISTS interests_after_insert AFTER INSERT ON interests
            BEGIN
                UPDATE listings SET like_count = like_count + 1 WHERE id = NEW.listing_id;
            END;

            CREATE TRIGGER IF NOT EXISTS interests_after_delete AFTER DELETE ON interests
            BEGIN
                UPDATE listings SET like_count = MAX(like_count - 1, 0) WHERE id = OLD.listing_id;
            END;

            CREATE UNIQUE INDEX IF NOT EXISTS idx_listings_slug ON listings(slug) WHERE slug <> '';
            CREATE INDEX IF NOT EXISTS idx_listings_created ON listings(created_at);
            CREATE INDEX IF NOT EXISTS idx_listings_filters ON listings(post_type, country, city, category_id, work_type);
            CREATE INDEX IF NOT EXISTS idx_interests_listing ON interests(listing_id);
            CREATE INDEX IF NOT EXISTS idx_comments_listing ON comments(listing_id);
            CREATE INDEX IF NOT EXISTS idx_comments_parent ON comments(parent_id);
            CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions(user_id);
            "#,
        )?;
        info!("Schema ready");
        Ok(())
    }

    pub fn ensure_initialized(&self) -> Result<()> {
        let tables: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='listings'",
            [],
            |row| row.get(0),
        )?;
        if tables == 0 {
            return Err(AppError::NotInitialized);
        }
        Ok(())
    }

    // --- User operations ---

    pub fn insert_user(&self, email: &str, password_hash: &str, display_name: &str) -> Result<i64> {
        let inserted = self.conn.execute(
            "INSERT INTO users (email, password_hash, display_name) VALUES (?1, ?2, ?3)",
            params![email.trim(), password_hash, display_name.trim()],
        );
        match inserted {
            Ok(_) => Ok(self.conn.last_insert_rowid()),
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                Err(AppError::EmailTaken(email.trim().to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// `(user id, password hash)` for an email, if registered.
    pub fn user_credentials(&self, email: &str) -> Result<Option<(i64, String)>> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, password_hash FROM users WHERE email = ?1",
                [email.trim()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?)
    }

    pub fn get_profile(&self, user_id: i64) -> Result<Option<UserProfile>> {
        Ok(self
            .conn
            .query_row(
                &format!("SELECT {PROFILE_COLUMNS} FROM users WHERE id = ?1"),
                [user_id],
                Self::row_to_profile,
            )
            .optional()?)
    }

    pub fn update_profile(&self, user_id: i64, update: &ProfileUpdate) -> Result<UserProfile> {
        let trimmed = |v: &Option<String>| v.as_deref().map(str::trim).map(str::to_string);
        let blank_to_null = |v: Option<String>| v.filter(|s| !s.is_empty());

        let changed = self.conn.execute(
            "UPDATE users SET
                display_name = COALESCE(?2, display_name),
                phone = CASE WHEN ?3 IS NULL THEN phone ELSE NULLIF(?3, '') END,
                country = CASE WHEN ?4 IS NULL THEN country ELSE NULLIF(?4, '') END,
                city = CASE WHEN ?5 IS NULL THEN city ELSE NULLIF(?5, '') END,
                category_id = CASE WHEN ?6 IS NULL THEN category_id ELSE NULLIF(?6, '') END,
                updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
             WHERE id = ?1",
            params![
                user_id,
                blank_to_null(trimmed(&update.display_name)),
                trimmed(&update.phone),
                trimmed(&update.country).map(|c| c.to_uppercase()),
                trimmed(&update.city).map(|c| c.to_lowercase()),
                trimmed(&update.category_id).map(|c| c.to_lowercase()),
            ],
        )?;
        if changed == 0 {
            return Err(AppError::not_found("user", user_id));
        }
        self.get_profile(user_id)?
            .ok_or_else(|| AppError::not_found("user", user_id))
    }

    fn row_to_profile(row: &rusqlite::Row) -> rusqlite::Result<UserProfile> {
        Ok(UserProfile {
            id: row.get(0)?,
            email: row.get(1)?,
            display_name: row.get(2)?,
            phone: row.get(3)?,
            country: row.get(4)?,
            city: row.get(5)?,
            category_id: row.get(6)?,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }

    // --- Session operations ---

    pub fn insert_session(&self, token: &str, user_id: i64, expires_at: &str) -> Result<Session> {
        self.conn.execute(
            "INSERT INTO sessions (token, user_id, expires_at) VALUES (?1, ?2, ?3)",
            params![token, user_id, expires_at],
        )?;
        self.get_session(token)?
            .ok_or_else(|| AppError::not_found("session", "new"))
    }

    /// A session that exists and has not expired.
    pub fn get_session(&self, token: &str) -> Result<Option<Session>> {
        Ok(self
            .conn
            .query_row(
                "SELECT token, user_id, created_at, expires_at FROM sessions
                 WHERE token = ?1 AND expires_at > ?2",
                params![token, now_stamp()],
                |row| {
                    Ok(Session {
                        token: row.get(0)?,
                        user_id: row.get(1)?,
                        created_at: row.get(2)?,
                        expires_at: row.get(3)?,
                    })
                },
            )
            .optional()?)
    }

    pub fn delete_session(&self, token: &str) -> Result<bool> {
        Ok(self.conn.execute("DELETE FROM sessions WHERE token = ?1", [token])? > 0)
    }

    pub fn purge_expired_sessions(&self) -> Result<usize> {
        Ok(self
            .conn
            .execute("DELETE FROM sessions WHERE expires_at <= ?1", [now_stamp()])?)
    }

    // --- Listing operations ---

    pub fn insert_listing(&mut self, owner_id: i64, listing: &ValidListing) -> Result<Listing> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO listings (post_type, title, category_id, category_name, country, city,
                salary, work_type, description, contact_phone, contact_email, owner_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                listing.post_type,
                listing.title,
                listing.category_id,
                listing.category_name,
                listing.country,
                listing.city,
                listing.salary,
                listing.work_type,
                listing.description,
                listing.contact_phone,
                listing.contact_email,
                owner_id,
            ],
        )?;
        let id = tx.last_insert_rowid();
        tx.execute(
            "UPDATE listings SET slug = ?1 WHERE id = ?2",
            params![slug::canonical(&listing.title, id), id],
        )?;
        tx.commit()?;

        info!(listing_id = id, owner_id, "Listing created");
        self.get_listing(id)?
            .ok_or_else(|| AppError::not_found("listing", id))
    }

    /// Replace a listing's editable fields. Only the owner may edit.
    pub fn update_listing(&mut self, user_id: i64, id: i64, listing: &ValidListing) -> Result<Listing> {
        let existing = self
            .get_listing(id)?
            .ok_or_else(|| AppError::not_found("listing", id))?;
        if existing.owner_id != user_id {
            return Err(AppError::Forbidden {
                user_id,
                entity: "listing",
                id,
            });
        }

        self.conn.execute(
            "UPDATE listings SET post_type = ?2, title = ?3, category_id = ?4, category_name = ?5,
                country = ?6, city = ?7, salary = ?8, work_type = ?9, description = ?10,
                contact_phone = ?11, contact_email = ?12, slug = ?13,
                updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
             WHERE id = ?1",
            params![
                id,
                listing.post_type,
                listing.title,
                listing.category_id,
                listing.category_name,
                listing.country,
                listing.city,
                listing.salary,
                listing.work_type,
                listing.description,
                listing.contact_phone,
                listing.contact_email,
                slug::canonical(&listing.title, id),
            ],
        )?;

        info!(listing_id = id, "Listing updated");
        self.get_listing(id)?
            .ok_or_else(|| AppError::not_found("listing", id))
    }

    pub fn get_listing(&self, id: i64) -> Result<Option<Listing>> {
        Ok(self
            .conn
            .query_row(
                &format!("SELECT {LISTING_COLUMNS} FROM listings WHERE id = ?1"),
                [id],
                Self::row_to_listing,
            )
            .optional()?)
    }

    pub fn get_listing_by_slug(&self, slug: &str) -> Result<Option<Listing>> {
        Ok(self
            .conn
            .query_row(
                &format!("SELECT {LISTING_COLUMNS} FROM listings WHERE slug = ?1"),
                [slug],
                Self::row_to_listing,
            )
            .optional()?)
    }

    /// Slug-or-id lookup. Bare ids and outdated slugs resolve to a redirect.
    pub fn resolve_listing(&self, key: &str) -> Result<Resolution> {
        let key = key.trim();
        if let Some(listing) = self.get_listing_by_slug(key)? {
            return Ok(Resolution::Found(Box::new(listing)));
        }

        let Some(id) = slug::trailing_id(key) else {
            return Ok(Resolution::NotFound);
        };
        match self.get_listing(id)? {
            Some(listing) => Ok(Resolution::Redirect(listing.slug)),
            None => Ok(Resolution::NotFound),
        }
    }

    pub fn listing_count(&self) -> Result<i64> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM listings", [], |row| row.get(0))?)
    }

    /// `(slug, updated_at)` for every listing, newest first.
    pub fn listing_slugs(&self) -> Result<Vec<(String, String)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT slug, updated_at FROM listings ORDER BY created_at DESC, id DESC")?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub(crate) fn row_to_listing(row: &rusqlite::Row) -> rusqlite::Result<Listing> {
        Ok(Listing {
            id: row.get(0)?,
            slug: row.get(1)?,
            post_type: row.get(2)?,
            title: row.get(3)?,
            category_id: row.get(4)?,
            category_name: row.get(5)?,
            country: row.get(6)?,
            city: row.get(7)?,
            salary: row.get(8)?,
            work_type: row.get(9)?,
            description: row.get(10)?,
            contact_phone: row.get(11)?,
            contact_email: row.get(12)?,
            owner_id: row.get(13)?,
            like_count: row.get(14)?,
            rating: row.get(15)?,
            created_at: row.get(16)?,
            updated_at: row.get(17)?,
        })
    }

    // --- Comment operations ---

    pub fn insert_comment(
        &self,
        listing_id: i64,
        author_id: i64,
        text: &str,
        parent_id: Option<i64>,
    ) -> Result<Comment> {
        if self.get_listing(listing_id)?.is_none() {
            return Err(AppError::not_found("listing", listing_id));
        }
        if let Some(parent_id) = parent_id {
            // A reply must hang off a comment on the same listing.
            match self.get_comment(parent_id)? {
                Some(parent) if parent.listing_id == listing_id => {}
                _ => return Err(AppError::not_found("comment", parent_id)),
            }
        }

        self.conn.execute(
            "INSERT INTO comments (listing_id, author_id, text, parent_id) VALUES (?1, ?2, ?3, ?4)",
            params![listing_id, author_id, text, parent_id],
        )?;
        let id = self.conn.last_insert_rowid();
        debug!(comment_id = id, listing_id, "Comment stored");
        self.get_comment(id)?
            .ok_or_else(|| AppError::not_found("comment", id))
    }

    pub fn get_comment(&self, id: i64) -> Result<Option<Comment>> {
        Ok(self
            .conn
            .query_row(
                &format!(
                    "SELECT {COMMENT_COLUMNS} FROM comments c JOIN users u ON u.id = c.author_id
                     WHERE c.id = ?1"
                ),
                [id],
                Self::row_to_comment,
            )
            .optional()?)
    }

    /// Flat comments of a listing in creation order.
    pub fn list_comments(&self, listing_id: i64) -> Result<Vec<Comment>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {COMMENT_COLUMNS} FROM comments c JOIN users u ON u.id = c.author_id
             WHERE c.listing_id = ?1 ORDER BY c.created_at, c.id"
        ))?;
        let rows = stmt.query_map([listing_id], Self::row_to_comment)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn authored_comment(&self, author_id: i64, id: i64) -> Result<Comment> {
        let comment = self
            .get_comment(id)?
            .ok_or_else(|| AppError::not_found("comment", id))?;
        if comment.author_id != author_id {
            return Err(AppError::Forbidden {
                user_id: author_id,
                entity: "comment",
                id,
            });
        }
        Ok(comment)
    }

    pub fn update_comment_text(&self, author_id: i64, id: i64, text: &str) -> Result<Comment> {
        self.authored_comment(author_id, id)?;
        self.conn.execute(
            "UPDATE comments SET text = ?2, updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
             WHERE id = ?1",
            params![id, text],
        )?;
        self.get_comment(id)?
            .ok_or_else(|| AppError::not_found("comment", id))
    }

    /// Delete a comment and, through the cascade, all of its replies.
    /// Returns how many comments were removed.
    pub fn delete_comment(&self, author_id: i64, id: i64) -> Result<usize> {
        self.authored_comment(author_id, id)?;
        let subtree: i64 = self.conn.query_row(
            "WITH RECURSIVE subtree(id) AS (
                SELECT ?1
                UNION ALL
                SELECT c.id FROM comments c JOIN subtree s ON c.parent_id = s.id
             )
             SELECT COUNT(*) FROM subtree",
            [id],
            |row| row.get(0),
        )?;
        self.conn.execute("DELETE FROM comments WHERE id = ?1", [id])?;
        info!(comment_id = id, removed = subtree, "Comment deleted");
        Ok(subtree as usize)
    }

    fn row_to_comment(row: &rusqlite::Row) -> rusqlite::Result<Comment> {
        Ok(Comment {
            id: row.get(0)?,
            listing_id: row.get(1)?,
            author_id: row.get(2)?,
            author_name: row.get(3)?,
            text: row.get(4)?,
            parent_id: row.get(5)?,
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
        })
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::validate;

    #[test]
    fn init_is_idempotent() {
        let db = db();
        db.init().unwrap();
        db.ensure_initialized().unwrap();
        assert!(matches!(
            Database::open_in_memory().unwrap().ensure_initialized(),
            Err(AppError::NotInitialized)
        ));
    }

    #[test]
    fn duplicate_email_is_reported() {
        let db = db();
        user(&db, "a@x.io");
        let err = db.insert_user("A@X.io", "h", "A").unwrap_err();
        assert!(matches!(err, AppError::EmailTaken(_)));
    }

    #[test]
    fn listing_gets_canonical_slug() {
        let mut db = db();
        let owner = user(&db, "owner@x.io");
        let listing = listing(&mut db, owner, &draft("Rust Developer"));
        assert_eq!(listing.slug, format!("rust-developer-{}", listing.id));
        assert_eq!(listing.like_count, 0);
        assert_eq!(db.listing_count().unwrap(), 1);
    }

    #[test]
    fn only_owner_can_edit_and_slug_follows_title() {
        let mut db = db();
        let owner = user(&db, "owner@x.io");
        let other = user(&db, "other@x.io");
        let created = listing(&mut db, owner, &draft("Accountant"));

        let edited = validate::listing(&draft("Senior Accountant")).unwrap();
        let err = db.update_listing(other, created.id, &edited).unwrap_err();
        assert!(matches!(err, AppError::Forbidden { .. }));

        let updated = db.update_listing(owner, created.id, &edited).unwrap();
        assert_eq!(updated.title, "Senior Accountant");
        assert_eq!(updated.slug, format!("senior-accountant-{}", created.id));
    }

    #[test]
    fn resolves_slug_id_and_stale_slug() {
        let mut db = db();
        let owner = user(&db, "owner@x.io");
        let created = listing(&mut db, owner, &draft("Driver"));

        match db.resolve_listing(&created.slug).unwrap() {
            Resolution::Found(found) => assert_eq!(found.id, created.id),
            other => panic!("expected found, got {other:?}"),
        }
        assert_eq!(
            db.resolve_listing(&created.id.to_string()).unwrap(),
            Resolution::Redirect(created.slug.clone())
        );
        assert_eq!(
            db.resolve_listing(&format!("old-title-{}", created.id)).unwrap(),
            Resolution::Redirect(created.slug.clone())
        );
        assert_eq!(db.resolve_listing("nothing-here").unwrap(), Resolution::NotFound);
        assert_eq!(db.resolve_listing("999").unwrap(), Resolution::NotFound);
    }

    #[test]
    fn profile_update_keeps_untouched_fields_and_clears_blanks() {
        let db = db();
        let id = user(&db, "p@x.io");
        let profile = db
            .update_profile(
                id,
                &ProfileUpdate {
                    phone: Some("0501234567".to_string()),
                    country: Some("jo".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(profile.country.as_deref(), Some("JO"));
        assert_eq!(profile.display_name, "p");

        let cleared = db
            .update_profile(
                id,
                &ProfileUpdate {
                    phone: Some(String::new()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(cleared.phone, None);
        assert_eq!(cleared.country.as_deref(), Some("JO"));
        assert!(matches!(
            db.update_profile(999, &ProfileUpdate::default()),
            Err(AppError::NotFound { .. })
        ));
    }

    #[test]
    fn reply_parent_must_be_on_same_listing() {
        let mut db = db();
        let owner = user(&db, "owner@x.io");
        let a = listing(&mut db, owner, &draft("First"));
        let b = listing(&mut db, owner, &draft("Second"));
        let on_a = db.insert_comment(a.id, owner, "hello", None).unwrap();

        let err = db.insert_comment(b.id, owner, "reply", Some(on_a.id)).unwrap_err();
        assert!(matches!(err, AppError::NotFound { entity: "comment", .. }));
        assert!(db.insert_comment(a.id, owner, "reply", Some(on_a.id)).is_ok());
    }

    #[test]
    fn deleting_comment_cascades_to_replies() {
        let mut db = db();
        let owner = user(&db, "owner@x.io");
        let other = user(&db, "other@x.io");
        let l = listing(&mut db, owner, &draft("Chef"));
        let root = db.insert_comment(l.id, owner, "root", None).unwrap();
        let reply = db.insert_comment(l.id, other, "reply", Some(root.id)).unwrap();
        db.insert_comment(l.id, owner, "nested", Some(reply.id)).unwrap();
        db.insert_comment(l.id, other, "sibling", None).unwrap();

        assert!(matches!(
            db.delete_comment(other, root.id),
            Err(AppError::Forbidden { .. })
        ));
        assert_eq!(db.delete_comment(owner, root.id).unwrap(), 3);

        let left: Vec<_> = db.list_comments(l.id).unwrap().into_iter().map(|c| c.text).collect();
        assert_eq!(left, vec!["sibling"]);
    }

    #[test]
    fn expired_sessions_are_invisible() {
        let db = db();
        let id = user(&db, "s@x.io");
        db.insert_session("live", id, "9999-01-01T00:00:00.000Z").unwrap();
        db.conn
            .execute(
                "INSERT INTO sessions (token, user_id, expires_at) VALUES ('old', ?1, '2000-01-01T00:00:00.000Z')",
                [id],
            )
            .unwrap();

        assert!(db.get_session("live").unwrap().is_some());
        assert!(db.get_session("old").unwrap().is_none());
        assert_eq!(db.purge_expired_sessions().unwrap(), 1);
        assert!(db.delete_session("live").unwrap());
    }
}
