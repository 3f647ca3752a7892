use rusqlite::{OptionalExtension, TransactionBehavior, params};
use serde::Serialize;
use tracing::{info, warn};

use crate::db::{Database, LISTING_COLUMNS};
use crate::error::{AppError, Result};
use crate::models::{Interest, Listing};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LikeState {
    pub liked: bool,
    pub like_count: i64,
}

/// A listing whose stored counter disagreed with its interest records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CounterDrift {
    pub listing_id: i64,
    pub stored: i64,
    pub actual: i64,
}

impl Database {
    /// Flip `user_id`'s interest in a listing and move the counter with it.
    ///
    /// Runs as one `BEGIN IMMEDIATE` transaction, so concurrent toggles on the
    /// same listing queue behind the write lock instead of losing updates.
    /// The counter itself is maintained by the triggers on `interests`.
    pub fn toggle_like(&mut self, listing_id: i64, user_id: i64) -> Result<LikeState> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let before: i64 = tx
            .query_row(
                "SELECT like_count FROM listings WHERE id = ?1",
                [listing_id],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| AppError::not_found("listing", listing_id))?;

        let member = tx
            .query_row(
                "SELECT 1 FROM interests WHERE user_id = ?1 AND listing_id = ?2",
                params![user_id, listing_id],
                |_| Ok(()),
            )
            .optional()?
            .is_some();

        if member {
            tx.execute(
                "DELETE FROM interests WHERE user_id = ?1 AND listing_id = ?2",
                params![user_id, listing_id],
            )?;
        } else {
            tx.execute(
                "INSERT INTO interests (user_id, listing_id) VALUES (?1, ?2)",
                params![user_id, listing_id],
            )?;
        }

        let like_count: i64 = tx.query_row(
            "SELECT like_count FROM listings WHERE id = ?1",
            [listing_id],
            |row| row.get(0),
        )?;
        tx.commit()?;

        info!(listing_id, user_id, liked = !member, before, after = like_count, "Like toggled");
        Ok(LikeState {
            liked: !member,
            like_count,
        })
    }

    pub fn is_liked(&self, listing_id: i64, user_id: i64) -> Result<bool> {
        Ok(self
            .conn
            .query_row(
                "SELECT 1 FROM interests WHERE user_id = ?1 AND listing_id = ?2",
                params![user_id, listing_id],
                |_| Ok(()),
            )
            .optional()?
            .is_some())
    }

    /// Listings a user has liked with the interest record, most recently liked first.
    pub fn liked_listings(&self, user_id: i64) -> Result<Vec<(Listing, Interest)>> {
        let columns: Vec<String> = LISTING_COLUMNS
            .split(',')
            .map(|c| format!("l.{}", c.trim()))
            .collect();
        let offset = columns.len();
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {}, i.user_id, i.listing_id, i.created_at
             FROM interests i JOIN listings l ON l.id = i.listing_id
             WHERE i.user_id = ?1 ORDER BY i.created_at DESC, l.id DESC",
            columns.join(", ")
        ))?;
        let rows = stmt.query_map([user_id], |row| {
            let listing = Database::row_to_listing(row)?;
            let interest = Interest {
                user_id: row.get(offset)?,
                listing_id: row.get(offset + 1)?,
                created_at: row.get(offset + 2)?,
            };
            Ok((listing, interest))
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Recompute every counter from the interests table, fixing and reporting drift.
    pub fn reconcile_like_counts(&mut self) -> Result<Vec<CounterDrift>> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let drift = {
            let mut stmt = tx.prepare(
                "SELECT l.id, l.like_count, COUNT(i.user_id)
                 FROM listings l LEFT JOIN interests i ON i.listing_id = l.id
                 GROUP BY l.id
                 HAVING l.like_count <> COUNT(i.user_id)
                 ORDER BY l.id",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok(CounterDrift {
                    listing_id: row.get(0)?,
                    stored: row.get(1)?,
                    actual: row.get(2)?,
                })
            })?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        };

        for d in &drift {
            warn!(listing_id = d.listing_id, stored = d.stored, actual = d.actual, "Like counter drift");
            tx.execute(
                "UPDATE listings SET like_count = ?2 WHERE id = ?1",
                params![d.listing_id, d.actual],
            )?;
        }
        tx.commit()?;
        Ok(drift)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::*;
    use std::thread;

    #[test]
    fn toggle_twice_restores_state() {
        let mut db = db();
        let owner = user(&db, "owner@x.io");
        let fan = user(&db, "fan@x.io");
        let l = listing(&mut db, owner, &draft("Nurse"));

        let first = db.toggle_like(l.id, fan).unwrap();
        assert_eq!(first, LikeState { liked: true, like_count: 1 });
        assert!(db.is_liked(l.id, fan).unwrap());

        let second = db.toggle_like(l.id, fan).unwrap();
        assert_eq!(second, LikeState { liked: false, like_count: 0 });
        assert!(!db.is_liked(l.id, fan).unwrap());
        assert_eq!(db.get_listing(l.id).unwrap().unwrap().like_count, 0);
    }

    #[test]
    fn counts_each_user_once() {
        let mut db = db();
        let owner = user(&db, "owner@x.io");
        let a = user(&db, "a@x.io");
        let b = user(&db, "b@x.io");
        let l = listing(&mut db, owner, &draft("Teacher"));

        db.toggle_like(l.id, a).unwrap();
        let state = db.toggle_like(l.id, b).unwrap();
        assert_eq!(state.like_count, 2);
        let liked = db.liked_listings(a).unwrap();
        assert_eq!(liked.len(), 1);
        let (listing, interest) = &liked[0];
        assert_eq!(listing.id, l.id);
        assert_eq!(listing.like_count, 2);
        assert_eq!(interest.user_id, a);
        assert_eq!(interest.listing_id, l.id);
        assert!(interest.created_at.ends_with('Z'));
        assert!(db.liked_listings(owner).unwrap().is_empty());
    }

    #[test]
    fn unknown_listing_is_not_found() {
        let mut db = db();
        let fan = user(&db, "fan@x.io");
        assert!(matches!(
            db.toggle_like(404, fan),
            Err(AppError::NotFound { entity: "listing", .. })
        ));
    }

    #[test]
    fn concurrent_toggles_do_not_lose_updates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("likes.db");

        let mut setup = Database::open(&path).unwrap();
        setup.init().unwrap();
        let owner = user(&setup, "owner@x.io");
        let users: Vec<i64> = (0..2).map(|i| user(&setup, &format!("u{i}@x.io"))).collect();
        let l = listing(&mut setup, owner, &draft("Welder"));

        // Each user toggles an odd number of times, so both end up liking.
        let handles: Vec<_> = users
            .iter()
            .map(|&user_id| {
                let path = path.clone();
                thread::spawn(move || {
                    let mut db = Database::open(&path).unwrap();
                    for _ in 0..25 {
                        db.toggle_like(l.id, user_id).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let listing = setup.get_listing(l.id).unwrap().unwrap();
        assert_eq!(listing.like_count, 2);
        for user_id in users {
            assert!(setup.is_liked(l.id, user_id).unwrap());
        }
        assert!(setup.reconcile_like_counts().unwrap().is_empty());
    }

    #[test]
    fn reconcile_repairs_out_of_band_writes() {
        let mut db = db();
        let owner = user(&db, "owner@x.io");
        let fan = user(&db, "fan@x.io");
        let l = listing(&mut db, owner, &draft("Plumber"));
        db.toggle_like(l.id, fan).unwrap();

        db.conn
            .execute("UPDATE listings SET like_count = 7 WHERE id = ?1", [l.id])
            .unwrap();

        let drift = db.reconcile_like_counts().unwrap();
        assert_eq!(
            drift,
            vec![CounterDrift {
                listing_id: l.id,
                stored: 7,
                actual: 1
            }]
        );
        assert_eq!(db.get_listing(l.id).unwrap().unwrap().like_count, 1);
        assert!(db.reconcile_like_counts().unwrap().is_empty());
    }
}
