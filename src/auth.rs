use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use chrono::Duration;
use rand::distributions::{Alphanumeric, DistString};
use tracing::{info, warn};

use crate::db::{Database, stamp};
use crate::error::{AppError, Result};
use crate::models::{ProfileUpdate, Session, UserProfile};
use crate::validate;

const TOKEN_LENGTH: usize = 48;

/// Ten years. Longer lifetimes are clamped so expiry stamps stay in range.
pub const MAX_SESSION_TTL_HOURS: i64 = 24 * 365 * 10;

/// Email/password accounts and the sessions issued for them.
pub struct Auth<'a> {
    db: &'a Database,
    session_ttl: Duration,
}

impl<'a> Auth<'a> {
    pub fn new(db: &'a Database, session_ttl_hours: i64) -> Self {
        let hours = session_ttl_hours.clamp(1, MAX_SESSION_TTL_HOURS);
        if hours != session_ttl_hours {
            warn!(requested = session_ttl_hours, hours, "Session lifetime out of range, clamped");
        }
        Self {
            db,
            session_ttl: Duration::hours(hours),
        }
    }

    pub fn sign_up(&self, email: &str, password: &str, display_name: &str) -> Result<Session> {
        validate::sign_up(email, password, display_name)?;
        let hash = hash_password(password)?;
        let user_id = self.db.insert_user(email, &hash, display_name)?;
        info!(user_id, "Account created");
        self.issue(user_id)
    }

    pub fn sign_in(&self, email: &str, password: &str) -> Result<Session> {
        let Some((user_id, hash)) = self.db.user_credentials(email)? else {
            warn!("Sign-in for unknown email");
            return Err(AppError::InvalidCredentials);
        };
        if !verify_password(password, &hash) {
            warn!(user_id, "Sign-in with wrong password");
            return Err(AppError::InvalidCredentials);
        }
        self.issue(user_id)
    }

    pub fn sign_out(&self, token: &str) -> Result<()> {
        if self.db.delete_session(token)? {
            info!("Session revoked");
        }
        Ok(())
    }

    /// The live session behind a token.
    pub fn authenticate(&self, token: &str) -> Result<Session> {
        self.db
            .get_session(token.trim())?
            .ok_or(AppError::Unauthorized)
    }

    pub fn profile(&self, session: &Session) -> Result<UserProfile> {
        self.db
            .get_profile(session.user_id)?
            .ok_or_else(|| AppError::not_found("user", session.user_id))
    }

    pub fn update_profile(&self, session: &Session, update: &ProfileUpdate) -> Result<UserProfile> {
        let current = self.profile(session)?;
        let update = validate::profile_update(update, &current)?;
        self.db.update_profile(session.user_id, &update)
    }

    fn issue(&self, user_id: i64) -> Result<Session> {
        let purged = self.db.purge_expired_sessions()?;
        if purged > 0 {
            info!(purged, "Expired sessions removed");
        }
        let token = Alphanumeric.sample_string(&mut rand::thread_rng(), TOKEN_LENGTH);
        let expires_at = stamp(chrono::Utc::now() + self.session_ttl);
        self.db.insert_session(&token, user_id, &expires_at)
    }
}

pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::PasswordHash(e.to_string()))
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash) else {
        warn!("Stored password hash is malformed");
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::db;

    #[test]
    fn sign_up_then_sign_in() {
        let db = db();
        let auth = Auth::new(&db, 24);

        let session = auth.sign_up("layla@example.com", "correct horse", "ليلى").unwrap();
        assert_eq!(session.token.len(), TOKEN_LENGTH);
        assert_eq!(auth.profile(&session).unwrap().display_name, "ليلى");

        let again = auth.sign_in("LAYLA@example.com", "correct horse").unwrap();
        assert_eq!(again.user_id, session.user_id);
        assert_ne!(again.token, session.token);
    }

    #[test]
    fn wrong_password_and_unknown_email_look_the_same() {
        let db = db();
        let auth = Auth::new(&db, 24);
        auth.sign_up("omar@example.com", "password123", "Omar").unwrap();

        assert!(matches!(
            auth.sign_in("omar@example.com", "password124"),
            Err(AppError::InvalidCredentials)
        ));
        assert!(matches!(
            auth.sign_in("nobody@example.com", "password123"),
            Err(AppError::InvalidCredentials)
        ));
    }

    #[test]
    fn duplicate_sign_up_is_rejected() {
        let db = db();
        let auth = Auth::new(&db, 24);
        auth.sign_up("omar@example.com", "password123", "Omar").unwrap();
        assert!(matches!(
            auth.sign_up("omar@example.com", "password456", "Omar 2"),
            Err(AppError::EmailTaken(_))
        ));
    }

    #[test]
    fn sign_out_revokes_token() {
        let db = db();
        let auth = Auth::new(&db, 24);
        let session = auth.sign_up("huda@example.com", "password123", "Huda").unwrap();

        assert_eq!(auth.authenticate(&session.token).unwrap(), session);
        auth.sign_out(&session.token).unwrap();
        assert!(matches!(auth.authenticate(&session.token), Err(AppError::Unauthorized)));
        auth.sign_out(&session.token).unwrap();
    }

    #[test]
    fn profile_update_is_validated() {
        let db = db();
        let auth = Auth::new(&db, 24);
        let session = auth.sign_up("sami@example.com", "password123", "Sami").unwrap();

        let bad = ProfileUpdate {
            country: Some("Atlantis".to_string()),
            ..Default::default()
        };
        assert!(matches!(auth.update_profile(&session, &bad), Err(AppError::Validation(_))));

        let good = ProfileUpdate {
            city: Some("Amman".to_string()),
            country: Some("jo".to_string()),
            category_id: Some("software".to_string()),
            ..Default::default()
        };
        let profile = auth.update_profile(&session, &good).unwrap();
        assert_eq!(profile.city.as_deref(), Some("amman"));
        assert_eq!(profile.category_id.as_deref(), Some("software"));

        let elsewhere = ProfileUpdate {
            city: Some("cairo".to_string()),
            ..Default::default()
        };
        assert!(matches!(auth.update_profile(&session, &elsewhere), Err(AppError::Validation(_))));
        let by_name = ProfileUpdate {
            city: Some("إربد".to_string()),
            ..Default::default()
        };
        assert_eq!(auth.update_profile(&session, &by_name).unwrap().city.as_deref(), Some("irbid"));
    }

    #[test]
    fn oversized_session_lifetime_is_clamped() {
        let db = db();
        let horizon = stamp(chrono::Utc::now() + Duration::hours(MAX_SESSION_TTL_HOURS + 24));

        for ttl in [i64::MAX, 1_000_000_000_000] {
            let auth = Auth::new(&db, ttl);
            let session = auth
                .sign_up(&format!("ttl{ttl}@example.com"), "password123", "Nour")
                .unwrap();
            assert!(session.expires_at < horizon);
            assert_eq!(auth.authenticate(&session.token).unwrap().user_id, session.user_id);
        }

        let session = Auth::new(&db, -5).sign_in("ttl1000000000000@example.com", "password123").unwrap();
        assert!(session.expires_at > stamp(chrono::Utc::now()));
    }

    #[test]
    fn malformed_hash_never_verifies() {
        assert!(!verify_password("x", "not-a-phc-string"));
        let hash = hash_password("secret-pass").unwrap();
        assert!(verify_password("secret-pass", &hash));
    }
}
