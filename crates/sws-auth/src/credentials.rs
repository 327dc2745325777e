//! Live credential state and session persistence
//!
//! `Credentials` is the single owner of the access token, refresh token and
//! user id for one client instance. Every service client holds the same
//! `Arc<Credentials>` and reads the tokens when it builds a request, so a
//! refresh committed by one request is picked up by all later requests.
//! Both tokens are swapped under one write lock so a reader never observes
//! a new access token paired with an old refresh token.
//!
//! `SessionStore` persists a `Session` as JSON. All writes use atomic
//! temp-file + rename, and a tokio Mutex serializes concurrent writers.

use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use common::Secret;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::constants::CURRENT_USER;
use crate::error::{Error, Result};
use crate::token::{ExpiresAt, TokenRefreshResponse, TokenUpdate, TokenUpdatedHandler};

struct TokenState {
    access: Secret<String>,
    refresh: Secret<String>,
    user_id: u64,
}

/// Credential state shared by every service of one client.
///
/// One instance per logical session: two instances would run independent
/// refresh cycles against the same refresh token.
pub struct Credentials {
    app_id: String,
    app_secret: Secret<String>,
    state: RwLock<TokenState>,
}

impl Credentials {
    pub fn new(app_id: impl Into<String>, app_secret: Secret<String>) -> Self {
        Self {
            app_id: app_id.into(),
            app_secret,
            state: RwLock::new(TokenState {
                access: Secret::default(),
                refresh: Secret::default(),
                user_id: CURRENT_USER,
            }),
        }
    }

    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    pub fn app_secret(&self) -> &str {
        self.app_secret.expose()
    }

    pub fn access_token(&self) -> String {
        self.read().access.expose().clone()
    }

    pub fn set_access_token(&self, token: impl Into<String>) {
        self.write().access.replace(token.into());
    }

    pub fn refresh_token(&self) -> String {
        self.read().refresh.expose().clone()
    }

    pub fn set_refresh_token(&self, token: impl Into<String>) {
        self.write().refresh.replace(token.into());
    }

    /// User id for user-scoped endpoints; `CURRENT_USER` (0) means "token owner".
    pub fn user_id(&self) -> u64 {
        self.read().user_id
    }

    pub fn set_user_id(&self, user_id: u64) {
        self.write().user_id = user_id;
    }

    /// Commit a refresh result and describe what changed.
    ///
    /// Keeps the current refresh token when the response does not rotate it.
    pub fn commit_refresh(&self, response: &TokenRefreshResponse) -> TokenUpdate {
        let mut state = self.write();
        state.access.replace(response.access.token.clone());
        if let Some(refresh) = &response.refresh
            && !refresh.token.is_empty()
        {
            state.refresh.replace(refresh.token.clone());
        }
        TokenUpdate {
            access_token: state.access.expose().clone(),
            access_token_expires_at: response.access.expires_at.clone(),
            refresh_token: state.refresh.expose().clone(),
            refresh_token_expires_at: response
                .refresh
                .as_ref()
                .and_then(|r| r.expires_at.clone()),
        }
    }

    /// Snapshot the current tokens for persistence.
    pub fn session(&self) -> Session {
        let state = self.read();
        Session {
            access_token: state.access.expose().clone(),
            refresh_token: state.refresh.expose().clone(),
            user_id: state.user_id,
            access_token_expires_at: None,
            refresh_token_expires_at: None,
        }
    }

    /// Seed the credential state from a persisted session.
    pub fn restore(&self, session: &Session) {
        let mut state = self.write();
        state.access.replace(session.access_token.clone());
        state.refresh.replace(session.refresh_token.clone());
        state.user_id = session.user_id;
    }

    fn read(&self) -> RwLockReadGuard<'_, TokenState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, TokenState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("app_id", &self.app_id)
            .field("app_secret", &self.app_secret)
            .field("user_id", &self.user_id())
            .finish_non_exhaustive()
    }
}

/// Persisted session tokens.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct Session {
    #[serde(default)]
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default)]
    pub user_id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token_expires_at: Option<ExpiresAt>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token_expires_at: Option<ExpiresAt>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("user_id", &self.user_id)
            .field("access_token_expires_at", &self.access_token_expires_at)
            .field("refresh_token_expires_at", &self.refresh_token_expires_at)
            .finish_non_exhaustive()
    }
}

/// Session file manager.
///
/// Cloning shares the write lock, so clones handed to the token-updated
/// callback still serialize with direct `save` calls.
#[derive(Clone)]
pub struct SessionStore {
    path: PathBuf,
    lock: Arc<Mutex<()>>,
}

impl SessionStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the persisted session, or `None` if no session file exists yet.
    pub async fn load(&self) -> Result<Option<Session>> {
        let _guard = self.lock.lock().await;
        if !self.path.exists() {
            info!(path = %self.path.display(), "session file not found, starting without a session");
            return Ok(None);
        }
        let contents = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| Error::Io(format!("reading session file: {e}")))?;
        let session: Session = serde_json::from_str(&contents)
            .map_err(|e| Error::SessionParse(format!("parsing session file: {e}")))?;
        info!(path = %self.path.display(), user_id = session.user_id, "loaded session");
        Ok(Some(session))
    }

    /// Persist a session, replacing any previous one.
    pub async fn save(&self, session: &Session) -> Result<()> {
        let _guard = self.lock.lock().await;
        write_atomic(&self.path, session).await
    }

    /// Apply a token update on top of the stored session and persist it.
    pub async fn apply_update(&self, update: &TokenUpdate) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut session = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(session) => session,
                Err(e) => {
                    warn!(
                        path = %self.path.display(),
                        error = %e,
                        "session file unreadable, starting from empty session"
                    );
                    Session::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Session::default(),
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "failed to read session file, starting from empty session"
                );
                Session::default()
            }
        };
        session.access_token = update.access_token.clone();
        session.refresh_token = update.refresh_token.clone();
        session.access_token_expires_at = update.access_token_expires_at.clone();
        session.refresh_token_expires_at = update.refresh_token_expires_at.clone();
        write_atomic(&self.path, &session).await
    }

    /// Remove the session file (sign-out).
    pub async fn clear(&self) -> Result<()> {
        let _guard = self.lock.lock().await;
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Io(format!("removing session file: {e}"))),
        }
    }

    /// Token-updated callback that persists every refresh to this store.
    ///
    /// Persistence failures are logged; the refreshed tokens stay live in
    /// memory either way.
    pub fn updated_handler(&self) -> TokenUpdatedHandler {
        let store = self.clone();
        crate::token::token_updated_handler(move |update: TokenUpdate| {
            let store = store.clone();
            async move {
                if let Err(e) = store.apply_update(&update).await {
                    warn!(path = %store.path.display(), error = %e, "failed to persist refreshed tokens");
                }
            }
        })
    }
}

/// Write the session atomically with owner-only permissions.
async fn write_atomic(path: &Path, session: &Session) -> Result<()> {
    let json = serde_json::to_string_pretty(session)
        .map_err(|e| Error::SessionParse(format!("serializing session: {e}")))?;

    let tmp_path = temp_path(path)?;

    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| Error::Io(format!("writing temp session file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| Error::Io(format!("setting session file permissions: {e}")))?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Io(format!("renaming temp session file: {e}")))?;

    debug!(path = %path.display(), "persisted session");
    Ok(())
}

/// Sibling temp file named after the target, so stores sharing a
/// directory never write to the same temp file.
fn temp_path(path: &Path) -> Result<PathBuf> {
    let dir = path
        .parent()
        .ok_or_else(|| Error::Io("session path has no parent directory".into()))?;
    let name = path
        .file_name()
        .ok_or_else(|| Error::Io("session path has no file name".into()))?;
    Ok(dir.join(format!(
        ".{}.tmp.{}",
        name.to_string_lossy(),
        std::process::id()
    )))
}
