//! Session manager: bearer token → logged-in identity with idle expiry.
//!
//! Session lifecycle: ACTIVE → EXPIRED (detected lazily) → removed.
//!
//! Expiry is a sliding window: each successful `validate` moves the deadline
//! to `now + timeout`. A session that reaches the timeout is removed by the
//! first `validate` that sees it, or by the periodic `sweep_expired`.
//! Logout removes a session immediately.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::distributions::Alphanumeric;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use subtle::ConstantTimeEq;

use crate::config;
use crate::db::{DatabaseError, RecordStore};
use crate::models::User;

// ═══════════════════════════════════════════════════════════
// Error type
// ═══════════════════════════════════════════════════════════

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("Missing, expired or unknown session token")]
    Unauthorized,
    #[error("User already exists: {0}")]
    UserExists(String),
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

// ═══════════════════════════════════════════════════════════
// Clock and token source
// ═══════════════════════════════════════════════════════════

/// Monotonic millisecond clock.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;
}

/// Milliseconds since the clock was created.
#[derive(Debug)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        u64::try_from(self.origin.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        let by = u64::try_from(by.as_millis()).unwrap_or(u64::MAX);
        self.now.fetch_add(by, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Source of fresh session tokens.
pub trait TokenSource: Send {
    fn generate(&mut self) -> String;
}

/// Fixed-length tokens drawn uniformly from `[A-Za-z0-9]`.
#[derive(Debug)]
pub struct AlphanumericTokens<R> {
    rng: R,
    len: usize,
}

impl AlphanumericTokens<StdRng> {
    /// Seeded from the operating system.
    pub fn from_entropy() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Deterministic sequence, for tests and reproducible runs.
    pub fn seeded(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }
}

impl<R: Rng> AlphanumericTokens<R> {
    pub fn with_rng(rng: R) -> Self {
        Self {
            rng,
            len: config::SESSION_TOKEN_LEN,
        }
    }
}

impl<R: Rng + Send> TokenSource for AlphanumericTokens<R> {
    fn generate(&mut self) -> String {
        (&mut self.rng)
            .sample_iter(&Alphanumeric)
            .take(self.len)
            .map(char::from)
            .collect()
    }
}

/// First characters of a token, safe to log.
pub fn token_prefix(token: &str) -> String {
    token.chars().take(8).collect()
}

// ═══════════════════════════════════════════════════════════
// Types
// ═══════════════════════════════════════════════════════════

/// What a user logs in with. The password is compared exactly.
#[derive(Debug, Clone)]
pub enum Credentials {
    Username { username: String, password: String },
    Email { email: String, password: String },
}

impl Credentials {
    pub fn username(username: &str, password: &str) -> Self {
        Self::Username {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn email(email: &str, password: &str) -> Self {
        Self::Email {
            email: email.into(),
            password: password.into(),
        }
    }

    fn password(&self) -> &str {
        match self {
            Self::Username { password, .. } | Self::Email { password, .. } => password,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub token: String,
    pub username: String,
    pub display_name: String,
    pub created_at_ms: u64,
    pub last_accessed_ms: u64,
}

impl Session {
    pub fn idle_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.last_accessed_ms)
    }

    pub fn is_expired(&self, now_ms: u64, timeout_ms: u64) -> bool {
        self.idle_ms(now_ms) >= timeout_ms
    }

    fn identity(&self) -> SessionIdentity {
        SessionIdentity {
            username: self.username.clone(),
            display_name: self.display_name.clone(),
        }
    }
}

/// The logged-in identity a valid token resolves to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionIdentity {
    pub username: String,
    pub display_name: String,
}

/// Result of a successful login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginGrant {
    pub token: String,
    #[serde(flatten)]
    pub identity: SessionIdentity,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub username: String,
    pub full_name: String,
    pub age_secs: u64,
    pub expires_in_secs: u64,
    pub active_sessions: usize,
}

// ═══════════════════════════════════════════════════════════
// SessionManager
// ═══════════════════════════════════════════════════════════

pub struct SessionManager {
    sessions: HashMap<String, Session>,
    timeout_ms: u64,
    clock: Arc<dyn Clock>,
    tokens: Box<dyn TokenSource>,
}

impl SessionManager {
    /// Real clock, OS-seeded tokens.
    pub fn new(timeout: Duration) -> Self {
        Self::with_parts(
            timeout,
            Arc::new(SystemClock::new()),
            Box::new(AlphanumericTokens::from_entropy()),
        )
    }

    pub fn with_parts(
        timeout: Duration,
        clock: Arc<dyn Clock>,
        tokens: Box<dyn TokenSource>,
    ) -> Self {
        Self {
            sessions: HashMap::new(),
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            clock,
            tokens,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    /// Check credentials against the user collection and open a session.
    ///
    /// Username and email match ignoring case; the password must match
    /// exactly.
    pub fn login(
        &mut self,
        store: &RecordStore,
        credentials: &Credentials,
    ) -> Result<LoginGrant, AuthError> {
        let user = match credentials {
            Credentials::Username { username, .. } => store.find_by_key::<User>(username),
            Credentials::Email { email, .. } => {
                let email = email.trim();
                store.find_first::<User>(|u| u.email.eq_ignore_ascii_case(email))
            }
        };

        let Some(user) = user else {
            tracing::info!("Login rejected: unknown user");
            return Err(AuthError::InvalidCredentials);
        };
        let matches: bool = user
            .password
            .as_bytes()
            .ct_eq(credentials.password().as_bytes())
            .into();
        if !matches {
            tracing::info!(username = %user.username, "Login rejected: wrong password");
            return Err(AuthError::InvalidCredentials);
        }

        Ok(self.open_session(user))
    }

    /// Start a session for an already-authenticated user.
    pub fn open_session(&mut self, user: &User) -> LoginGrant {
        let mut token = self.tokens.generate();
        while self.sessions.contains_key(&token) {
            token = self.tokens.generate();
        }

        let now = self.now_ms();
        let session = Session {
            token: token.clone(),
            username: user.username.clone(),
            display_name: user.full_name.clone(),
            created_at_ms: now,
            last_accessed_ms: now,
        };
        let identity = session.identity();
        self.sessions.insert(token.clone(), session);

        tracing::info!(
            username = %user.username,
            token = %token_prefix(&token),
            active = self.sessions.len(),
            "Session opened"
        );
        LoginGrant { token, identity }
    }

    /// Resolve a token and slide its deadline. An expired session is removed.
    pub fn validate(&mut self, token: &str) -> Result<SessionIdentity, AuthError> {
        let now = self.now_ms();
        let timeout_ms = self.timeout_ms;

        let Some(session) = self.sessions.get_mut(token) else {
            return Err(AuthError::Unauthorized);
        };
        if session.is_expired(now, timeout_ms) {
            let username = session.username.clone();
            self.sessions.remove(token);
            tracing::info!(%username, token = %token_prefix(token), "Session expired");
            return Err(AuthError::Unauthorized);
        }

        session.last_accessed_ms = now;
        Ok(session.identity())
    }

    /// Remove a session. Returns whether one existed.
    pub fn logout(&mut self, token: &str) -> bool {
        let removed = self.sessions.remove(token);
        if let Some(session) = &removed {
            tracing::info!(
                username = %session.username,
                token = %token_prefix(token),
                "Session closed"
            );
        }
        removed.is_some()
    }

    /// Drop every session whose idle time has reached the timeout.
    pub fn sweep_expired(&mut self) -> usize {
        let now = self.now_ms();
        let timeout_ms = self.timeout_ms;
        let before = self.sessions.len();
        self.sessions.retain(|_, s| !s.is_expired(now, timeout_ms));
        let removed = before - self.sessions.len();
        if removed > 0 {
            tracing::info!(removed, remaining = self.sessions.len(), "Swept expired sessions");
        }
        removed
    }

    /// Validate `token`, then describe its session.
    pub fn session_info(
        &mut self,
        store: &RecordStore,
        token: &str,
    ) -> Result<SessionInfo, AuthError> {
        let identity = self.validate(token)?;
        let session = self.sessions.get(token).ok_or(AuthError::Unauthorized)?;
        let now = self.now_ms();

        let full_name = store
            .find_by_key::<User>(&identity.username)
            .map(|u| u.full_name.clone())
            .unwrap_or(identity.display_name);

        Ok(SessionInfo {
            username: identity.username,
            full_name,
            age_secs: now.saturating_sub(session.created_at_ms) / 1000,
            expires_in_secs: self.timeout_ms.saturating_sub(session.idle_ms(now)) / 1000,
            active_sessions: self.sessions.len(),
        })
    }

    /// Look at a session without refreshing it.
    pub fn get(&self, token: &str) -> Option<&Session> {
        self.sessions.get(token)
    }

    /// All sessions, oldest first.
    pub fn sessions(&self) -> Vec<&Session> {
        let mut all: Vec<&Session> = self.sessions.values().collect();
        all.sort_by(|a, b| {
            a.created_at_ms
                .cmp(&b.created_at_ms)
                .then_with(|| a.username.cmp(&b.username))
        });
        all
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UserRole;

    const HOUR: Duration = Duration::from_secs(3600);

    fn store_with(users: &[(&str, &str, &str)]) -> RecordStore {
        let mut store = RecordStore::in_memory();
        for (username, password, email) in users {
            store
                .create(User::new(
                    username,
                    password,
                    &format!("Dr. {username}"),
                    email,
                    "MD-1",
                    "Cardiology",
                    UserRole::Doctor,
                ))
                .unwrap();
        }
        store
    }

    fn manager() -> (SessionManager, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let manager = SessionManager::with_parts(
            HOUR,
            clock.clone(),
            Box::new(AlphanumericTokens::seeded(7)),
        );
        (manager, clock)
    }

    #[test]
    fn login_validate_expire_sweep() {
        let store = store_with(&[("doc1", "pw1", "doc1@hospital.com")]);
        let (mut sessions, clock) = manager();

        let grant = sessions
            .login(&store, &Credentials::username("doc1", "pw1"))
            .unwrap();
        assert_eq!(sessions.validate(&grant.token).unwrap().username, "doc1");

        clock.advance(HOUR + Duration::from_millis(1));
        assert!(matches!(
            sessions.validate(&grant.token),
            Err(AuthError::Unauthorized)
        ));
        assert_eq!(sessions.sweep_expired(), 0);
        assert_eq!(sessions.len(), 0);
    }

    #[test]
    fn tokens_are_32_alphanumeric_and_distinct() {
        let store = store_with(&[("doc1", "pw1", "doc1@hospital.com")]);
        let (mut sessions, _) = manager();

        let a = sessions.login(&store, &Credentials::username("doc1", "pw1")).unwrap();
        let b = sessions.login(&store, &Credentials::username("doc1", "pw1")).unwrap();
        for grant in [&a, &b] {
            assert_eq!(grant.token.len(), config::SESSION_TOKEN_LEN);
            assert!(grant.token.chars().all(|c| c.is_ascii_alphanumeric()));
        }
        assert_ne!(a.token, b.token);
        assert_eq!(sessions.len(), 2);
    }

    #[test]
    fn seeded_token_source_is_deterministic() {
        let mut a = AlphanumericTokens::seeded(42);
        let mut b = AlphanumericTokens::seeded(42);
        assert_eq!(a.generate(), b.generate());
    }

    #[test]
    fn username_ignores_case_password_does_not() {
        let store = store_with(&[("doc1", "pw1", "doc1@hospital.com")]);
        let (mut sessions, _) = manager();

        let grant = sessions.login(&store, &Credentials::username("DOC1", "pw1")).unwrap();
        assert_eq!(grant.identity.username, "doc1");
        assert_eq!(grant.identity.display_name, "Dr. doc1");

        assert!(matches!(
            sessions.login(&store, &Credentials::username("doc1", "PW1")),
            Err(AuthError::InvalidCredentials)
        ));
        assert!(matches!(
            sessions.login(&store, &Credentials::username("ghost", "pw1")),
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[test]
    fn login_by_email() {
        let store = store_with(&[("doc1", "pw1", "s.johnson@hospital.com")]);
        let (mut sessions, _) = manager();

        let grant = sessions
            .login(&store, &Credentials::email(" S.Johnson@Hospital.com", "pw1"))
            .unwrap();
        assert_eq!(grant.identity.username, "doc1");
        assert!(sessions
            .login(&store, &Credentials::email("s.johnson@hospital.com", "nope"))
            .is_err());
    }

    #[test]
    fn activity_slides_the_deadline() {
        let store = store_with(&[("doc1", "pw1", "doc1@hospital.com")]);
        let (mut sessions, clock) = manager();
        let grant = sessions.login(&store, &Credentials::username("doc1", "pw1")).unwrap();

        for _ in 0..3 {
            clock.advance(Duration::from_secs(59 * 60));
            assert!(sessions.validate(&grant.token).is_ok());
        }

        clock.advance(HOUR);
        assert!(sessions.validate(&grant.token).is_err());
        assert!(sessions.get(&grant.token).is_none());
    }

    #[test]
    fn logout_invalidates_immediately() {
        let store = store_with(&[("doc1", "pw1", "doc1@hospital.com")]);
        let (mut sessions, _) = manager();
        let grant = sessions.login(&store, &Credentials::username("doc1", "pw1")).unwrap();

        assert!(sessions.logout(&grant.token));
        assert!(sessions.validate(&grant.token).is_err());
        assert!(!sessions.logout(&grant.token));
    }

    #[test]
    fn unknown_token_is_unauthorized() {
        let (mut sessions, _) = manager();
        assert!(matches!(sessions.validate("nope"), Err(AuthError::Unauthorized)));
        assert!(matches!(sessions.validate(""), Err(AuthError::Unauthorized)));
    }

    #[test]
    fn sweep_removes_only_idle_sessions() {
        let store = store_with(&[
            ("doc1", "pw1", "doc1@hospital.com"),
            ("doc2", "pw2", "doc2@hospital.com"),
        ]);
        let (mut sessions, clock) = manager();
        let idle = sessions.login(&store, &Credentials::username("doc1", "pw1")).unwrap();
        let busy = sessions.login(&store, &Credentials::username("doc2", "pw2")).unwrap();

        clock.advance(Duration::from_secs(30 * 60));
        sessions.validate(&busy.token).unwrap();
        clock.advance(Duration::from_secs(30 * 60));

        assert_eq!(sessions.sweep_expired(), 1);
        assert!(sessions.get(&idle.token).is_none());
        assert!(sessions.get(&busy.token).is_some());
    }

    #[test]
    fn session_info_reports_age_and_remaining_time() {
        let store = store_with(&[("doc1", "pw1", "doc1@hospital.com")]);
        let (mut sessions, clock) = manager();
        let grant = sessions.login(&store, &Credentials::username("doc1", "pw1")).unwrap();

        clock.advance(Duration::from_secs(90));
        let info = sessions.session_info(&store, &grant.token).unwrap();
        assert_eq!(info.username, "doc1");
        assert_eq!(info.full_name, "Dr. doc1");
        assert_eq!(info.age_secs, 90);
        assert_eq!(info.expires_in_secs, 3600);
        assert_eq!(info.active_sessions, 1);

        assert!(sessions.session_info(&store, "bogus").is_err());
    }

    #[test]
    fn token_prefix_is_short_and_char_safe() {
        assert_eq!(token_prefix("abcdefghijklmnop"), "abcdefgh");
        assert_eq!(token_prefix("ééé"), "ééé");
    }
}
