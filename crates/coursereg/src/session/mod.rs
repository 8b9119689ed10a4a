//! Server-issued sessions.
//!
//! A session scopes cart ownership. Tokens handed to clients are
//! `<id>.<signature>`, where the signature is a SHA-256 digest of the server
//! secret and the id, so a client cannot pick or guess another session's id.
//! Sessions expire a fixed time after they are issued.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

/// How long a session lives when no TTL is configured.
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(8 * 60 * 60);

/// Opaque identifier of a session.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Generates a fresh random id (16 bytes, hex).
    pub fn generate() -> Self {
        let bytes: [u8; 16] = rand::thread_rng().gen();
        Self(hex::encode(&bytes))
    }

    pub(crate) fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Only show a prefix in logs
        let prefix = self.0.get(..8).unwrap_or(&self.0);
        write!(f, "{prefix}...")
    }
}

/// Durable identity of a student, supplied by the identity provider (or
/// generated for demo sessions).
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Session {
    pub id: SessionId,
    pub user_id: UserId,
    pub display_name: String,
    pub is_demo: bool,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// A session together with the token the client must present.
#[derive(Debug, Clone, Serialize)]
pub struct IssuedSession {
    pub token: String,
    pub session: Session,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("Missing session token")]
    Missing,

    #[error("Malformed session token")]
    Malformed,

    #[error("Session token signature mismatch")]
    BadSignature,

    #[error("Unknown session")]
    Unknown,

    #[error("Session expired")]
    Expired,

    /// No identity-provider secret is configured, so logins are refused
    #[error("Login is not enabled on this server")]
    LoginDisabled,

    #[error("Identity provider secret missing or wrong")]
    IdentityRejected,
}

/// Issues, resolves and revokes sessions.
pub struct SessionManager {
    secret: Vec<u8>,
    /// Shared with the identity provider; required to log in as a user
    login_secret: Option<Vec<u8>>,
    ttl: chrono::Duration,
    sessions: DashMap<SessionId, Session>,
}

impl SessionManager {
    /// Creates a manager signing with `secret`, or with a random per-process
    /// secret when none is configured.
    pub fn new(secret: Option<&str>) -> Self {
        let secret = match secret {
            Some(s) if !s.is_empty() => s.as_bytes().to_vec(),
            _ => {
                warn!("No session secret configured; sessions will not survive a restart");
                let bytes: [u8; 32] = rand::thread_rng().gen();
                bytes.to_vec()
            }
        };

        Self {
            secret,
            login_secret: None,
            ttl: chrono::Duration::seconds(DEFAULT_SESSION_TTL.as_secs() as i64),
            sessions: DashMap::new(),
        }
    }

    /// Sets how long issued sessions live.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        self
    }

    /// Sets the secret the identity provider presents on login. Without one,
    /// only demo sessions can be created.
    pub fn with_login_secret(mut self, login_secret: Option<&str>) -> Self {
        self.login_secret = login_secret
            .filter(|s| !s.is_empty())
            .map(|s| s.as_bytes().to_vec());
        self
    }

    /// Checks the secret presented alongside a login request.
    pub fn authorize_login(&self, presented: Option<&str>) -> Result<(), SessionError> {
        let Some(expected) = &self.login_secret else {
            return Err(SessionError::LoginDisabled);
        };
        match presented {
            Some(p) if constant_time_eq(p.as_bytes(), expected) => Ok(()),
            _ => Err(SessionError::IdentityRejected),
        }
    }

    /// Starts an anonymous demo session with a generated user.
    pub fn create_demo(&self) -> IssuedSession {
        let id = SessionId::generate();
        let short = id.as_str().get(..8).unwrap_or(id.as_str()).to_string();
        let now = Utc::now();
        let session = Session {
            user_id: UserId::new(format!("demo-{}", id.as_str())),
            display_name: format!("Demo User {short}"),
            is_demo: true,
            created_at: now,
            expires_at: self.expiry_from(now),
            id,
        };
        info!(session = %session.id, "Created demo session");
        self.issue(session)
    }

    /// Starts a session for an identity vouched for by the identity provider.
    /// Callers must check [`Self::authorize_login`] first.
    pub fn login(&self, user_id: UserId, display_name: Option<String>) -> IssuedSession {
        let now = Utc::now();
        let session = Session {
            id: SessionId::generate(),
            display_name: display_name.unwrap_or_else(|| user_id.to_string()),
            user_id,
            is_demo: false,
            created_at: now,
            expires_at: self.expiry_from(now),
        };
        info!(session = %session.id, user = %session.user_id, "Created login session");
        self.issue(session)
    }

    /// Verifies a client token and returns its live session.
    pub fn resolve(&self, token: &str) -> Result<Session, SessionError> {
        let (raw_id, signature) = token.trim().split_once('.').ok_or(SessionError::Malformed)?;
        if raw_id.is_empty() || signature.is_empty() {
            return Err(SessionError::Malformed);
        }

        let id = SessionId::from_raw(raw_id);
        if !constant_time_eq(self.sign(&id).as_bytes(), signature.as_bytes()) {
            return Err(SessionError::BadSignature);
        }

        let session = self
            .sessions
            .get(&id)
            .map(|s| s.clone())
            .ok_or(SessionError::Unknown)?;
        if session.is_expired(Utc::now()) {
            return Err(SessionError::Expired);
        }
        Ok(session)
    }

    /// Removes every expired session and returns them.
    pub fn reap_expired(&self) -> Vec<Session> {
        let now = Utc::now();
        let expired: Vec<SessionId> = self
            .sessions
            .iter()
            .filter(|s| s.is_expired(now))
            .map(|s| s.id.clone())
            .collect();

        let reaped: Vec<Session> = expired
            .iter()
            .filter_map(|id| self.sessions.remove_if(id, |_, s| s.is_expired(now)))
            .map(|(_, s)| s)
            .collect();
        if !reaped.is_empty() {
            info!(count = reaped.len(), "Reaped expired sessions");
        }
        reaped
    }

    /// Removes a session. Returns the removed session, if any.
    pub fn revoke(&self, id: &SessionId) -> Option<Session> {
        let removed = self.sessions.remove(id).map(|(_, s)| s);
        if removed.is_some() {
            info!(session = %id, "Revoked session");
        }
        removed
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn issue(&self, session: Session) -> IssuedSession {
        let token = format!("{}.{}", session.id.as_str(), self.sign(&session.id));
        self.sessions.insert(session.id.clone(), session.clone());
        IssuedSession { token, session }
    }

    fn expiry_from(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_add_signed(self.ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    fn sign(&self, id: &SessionId) -> String {
        let mut hasher = Sha256::new();
        hasher.update(&self.secret);
        hasher.update(b":");
        hasher.update(id.as_str().as_bytes());
        let digest = hasher.finalize();
        hex::encode(&digest[..16])
    }
}

/// Compares without short-circuiting on the first differing byte.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Helper module for hex encoding.
mod hex {
    pub fn encode(bytes: &[u8]) -> String {
        bytes.iter().map(|b| format!("{:02x}", b)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_demo_session_round_trip() {
        let manager = SessionManager::new(Some("secret"));
        let issued = manager.create_demo();

        let resolved = manager.resolve(&issued.token).unwrap();
        assert_eq!(resolved.id, issued.session.id);
        assert!(resolved.is_demo);
        assert!(resolved.user_id.as_str().starts_with("demo-"));
    }

    #[test]
    fn test_login_session_keeps_user_id() {
        let manager = SessionManager::new(Some("secret"));
        let issued = manager.login(UserId::new("n12345"), Some("Ada".to_string()));

        let resolved = manager.resolve(&issued.token).unwrap();
        assert_eq!(resolved.user_id, UserId::new("n12345"));
        assert_eq!(resolved.display_name, "Ada");
        assert!(!resolved.is_demo);
    }

    #[test]
    fn test_client_chosen_id_is_rejected() {
        let manager = SessionManager::new(Some("secret"));
        let issued = manager.create_demo();

        assert_eq!(
            manager.resolve(issued.session.id.as_str()),
            Err(SessionError::Malformed)
        );
        assert_eq!(
            manager.resolve(&format!("{}.deadbeef", issued.session.id.as_str())),
            Err(SessionError::BadSignature)
        );
        assert_eq!(
            manager.resolve("1700000000000.abc"),
            Err(SessionError::BadSignature)
        );
    }

    #[test]
    fn test_tokens_are_bound_to_secret() {
        let a = SessionManager::new(Some("secret-a"));
        let b = SessionManager::new(Some("secret-b"));
        let issued = a.create_demo();
        assert_eq!(b.resolve(&issued.token), Err(SessionError::BadSignature));
    }

    #[test]
    fn test_revoked_session_is_unknown() {
        let manager = SessionManager::new(None);
        let issued = manager.create_demo();
        assert!(manager.revoke(&issued.session.id).is_some());
        assert_eq!(manager.resolve(&issued.token), Err(SessionError::Unknown));
        assert!(manager.revoke(&issued.session.id).is_none());
        assert!(manager.is_empty());
    }

    #[test]
    fn test_expired_session_is_rejected_then_reaped() {
        let manager = SessionManager::new(Some("secret")).with_ttl(Duration::ZERO);
        let issued = manager.create_demo();
        let live = SessionManager::new(Some("secret")).create_demo();

        assert_eq!(manager.resolve(&issued.token), Err(SessionError::Expired));
        assert!(!live.session.is_expired(Utc::now()));

        let reaped = manager.reap_expired();
        assert_eq!(reaped.len(), 1);
        assert_eq!(reaped[0].id, issued.session.id);
        assert!(manager.is_empty());
        assert_eq!(manager.resolve(&issued.token), Err(SessionError::Unknown));
    }

    #[test]
    fn test_login_requires_identity_secret() {
        let disabled = SessionManager::new(Some("secret"));
        assert_eq!(
            disabled.authorize_login(Some("anything")),
            Err(SessionError::LoginDisabled)
        );

        let manager = SessionManager::new(Some("secret")).with_login_secret(Some("idp-shared"));
        assert_eq!(manager.authorize_login(None), Err(SessionError::IdentityRejected));
        assert_eq!(
            manager.authorize_login(Some("idp-share")),
            Err(SessionError::IdentityRejected)
        );
        assert_eq!(manager.authorize_login(Some("idp-shared")), Ok(()));
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"ab"));
        assert!(constant_time_eq(b"", b""));
    }
}
