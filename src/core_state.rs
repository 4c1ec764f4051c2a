//! Shared application state.
//!
//! `CoreState` owns the record store and the session manager and is shared
//! by `Arc` between the event loop, the diagnostics console and the HTTP
//! middleware. The store sits behind an `RwLock` (most access is reads), the
//! sessions behind a `Mutex` (every validation refreshes a timestamp).
//!
//! Lock order is always store, then sessions. No guard is held across an
//! `.await`.

use std::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::config::Settings;
use crate::db::{self, DirStorage, RecordStore, Storage};
use crate::pharmacy::{self, PharmacyError, RegisterRequest};
use crate::session_manager::{AuthError, Credentials, LoginGrant, SessionIdentity, SessionManager};

// ═══════════════════════════════════════════════════════════
// CoreState
// ═══════════════════════════════════════════════════════════

pub struct CoreState {
    store: RwLock<RecordStore>,
    sessions: Mutex<SessionManager>,
    pub settings: Settings,
}

impl CoreState {
    pub fn new(store: RecordStore, sessions: SessionManager, settings: Settings) -> Self {
        Self {
            store: RwLock::new(store),
            sessions: Mutex::new(sessions),
            settings,
        }
    }

    /// Build the state the binary runs with.
    ///
    /// Falls back to an in-memory store when the data directory cannot be
    /// opened or its files cannot be read. An empty store receives the demo
    /// data set when `settings.seed_demo_data` is on.
    pub fn boot(settings: Settings) -> Self {
        let mut store = open_store(&settings);
        if store.is_empty() && settings.seed_demo_data {
            if let Err(e) = db::seed::load_demo_data(&mut store) {
                tracing::warn!(error = %e, "Failed to load demo data");
            }
        }
        let sessions = SessionManager::new(settings.session_timeout);
        Self::new(store, sessions, settings)
    }

    // ── Store access ────────────────────────────────────────

    pub fn read_store(&self) -> Result<RwLockReadGuard<'_, RecordStore>, CoreError> {
        self.store.read().map_err(|_| CoreError::LockPoisoned)
    }

    pub fn write_store(&self) -> Result<RwLockWriteGuard<'_, RecordStore>, CoreError> {
        self.store.write().map_err(|_| CoreError::LockPoisoned)
    }

    // ── Session access ──────────────────────────────────────

    pub fn lock_sessions(&self) -> Result<MutexGuard<'_, SessionManager>, CoreError> {
        self.sessions.lock().map_err(|_| CoreError::LockPoisoned)
    }

    /// Check credentials and open a session.
    pub fn authenticate(&self, credentials: &Credentials) -> Result<LoginGrant, CoreError> {
        let store = self.read_store()?;
        let mut sessions = self.lock_sessions()?;
        Ok(sessions.login(&store, credentials)?)
    }

    /// Register a new account and open a session for it.
    pub fn register(&self, request: &RegisterRequest) -> Result<LoginGrant, CoreError> {
        let mut store = self.write_store()?;
        let mut sessions = self.lock_sessions()?;
        Ok(pharmacy::register(&mut store, &mut sessions, request)?)
    }

    /// Resolve a token to its identity, refreshing the session.
    pub fn validate_token(&self, token: &str) -> Result<SessionIdentity, CoreError> {
        Ok(self.lock_sessions()?.validate(token)?)
    }

    /// Log a token out. Returns whether a session was removed.
    pub fn invalidate(&self, token: &str) -> Result<bool, CoreError> {
        Ok(self.lock_sessions()?.logout(token))
    }

    pub fn sweep_expired(&self) -> Result<usize, CoreError> {
        Ok(self.lock_sessions()?.sweep_expired())
    }
}

fn open_store(settings: &Settings) -> RecordStore {
    let storage: Box<dyn Storage> = match DirStorage::open(&settings.data_dir) {
        Ok(storage) => Box::new(storage),
        Err(e) => {
            tracing::warn!(
                path = %settings.data_dir.display(),
                error = %e,
                "Storage unavailable; running in memory"
            );
            return RecordStore::in_memory();
        }
    };
    match RecordStore::open(storage) {
        Ok(store) => store,
        Err(e) => {
            tracing::warn!(error = %e, "Saved records unreadable; running in memory");
            RecordStore::in_memory()
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Error types
// ═══════════════════════════════════════════════════════════

/// Errors from CoreState operations.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Internal lock error")]
    LockPoisoned,
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Pharmacy(#[from] PharmacyError),
    #[error("Database error: {0}")]
    Database(#[from] db::DatabaseError),
}
