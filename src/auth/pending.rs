use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::error::AuthError;
use super::registry::InstanceAppCredential;
use super::store::write_private;

const PENDING_FILE_VERSION: u32 = 1;

/// Everything the callback needs to finish one sign-in attempt.
///
/// Single use: a [`PendingStore`] hands it out once and forgets it.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingAuthorization {
    pub instance_host: String,
    pub client_id: String,
    pub client_secret: String,
    pub state: String,
    pub created_at: DateTime<Utc>,
}

impl PendingAuthorization {
    pub fn new(app: &InstanceAppCredential, state: impl Into<String>) -> Self {
        Self {
            instance_host: app.instance_host.clone(),
            client_id: app.client_id.clone(),
            client_secret: app.client_secret.clone(),
            state: state.into(),
            created_at: Utc::now(),
        }
    }
}

impl fmt::Debug for PendingAuthorization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingAuthorization")
            .field("instance_host", &self.instance_host)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("state", &self.state)
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// Short-lived, server-side-only store carrying a [`PendingAuthorization`]
/// from the start of a sign-in to its callback.
///
/// `session_key` identifies one browser session (or CLI invocation chain);
/// a new `put` for the same key replaces the previous attempt.
pub trait PendingStore: Send + Sync {
    fn put(
        &self,
        session_key: &str,
        pending: PendingAuthorization,
        ttl: Duration,
    ) -> Result<(), AuthError>;

    /// Remove and return the record. Expired records read as absent.
    fn take(&self, session_key: &str) -> Result<Option<PendingAuthorization>, AuthError>;
}

/// Fresh random session key for a sign-in attempt.
pub fn new_session_key() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

fn expiry(ttl: Duration) -> Result<DateTime<Utc>, AuthError> {
    let ttl = chrono::Duration::from_std(ttl)
        .map_err(|err| AuthError::Configuration(format!("pending TTL out of range: {err}")))?;
    Ok(Utc::now() + ttl)
}

/// In-process pending store.
#[derive(Default)]
pub struct MemoryPendingStore {
    entries: Mutex<HashMap<String, (PendingAuthorization, DateTime<Utc>)>>,
}

impl MemoryPendingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PendingStore for MemoryPendingStore {
    fn put(
        &self,
        session_key: &str,
        pending: PendingAuthorization,
        ttl: Duration,
    ) -> Result<(), AuthError> {
        let expires_at = expiry(ttl)?;
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Utc::now();
        entries.retain(|_, (_, expires)| *expires > now);
        entries.insert(session_key.to_string(), (pending, expires_at));
        Ok(())
    }

    fn take(&self, session_key: &str) -> Result<Option<PendingAuthorization>, AuthError> {
        let removed = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(session_key);
        Ok(removed
            .filter(|(_, expires_at)| *expires_at > Utc::now())
            .map(|(pending, _)| pending))
    }
}

/// Pending store backed by one owner-only TOML file per session key.
///
/// File names are the SHA-256 of the session key, so a directory listing does
/// not reveal live keys. `take` claims the file with a rename before reading
/// it, which lets exactly one of several concurrent callers win.
#[derive(Debug, Clone)]
pub struct FilePendingStore {
    dir: PathBuf,
}

impl FilePendingStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, session_key: &str) -> PathBuf {
        let digest = Sha256::digest(session_key.as_bytes());
        self.dir.join(format!("{digest:x}.toml"))
    }
}

impl PendingStore for FilePendingStore {
    fn put(
        &self,
        session_key: &str,
        pending: PendingAuthorization,
        ttl: Duration,
    ) -> Result<(), AuthError> {
        let file = PendingFile {
            version: PENDING_FILE_VERSION,
            expires_at: expiry(ttl)?,
            pending,
        };
        let serialized = toml::to_string(&file)?;
        write_private(&self.path_for(session_key), serialized.as_bytes())
    }

    fn take(&self, session_key: &str) -> Result<Option<PendingAuthorization>, AuthError> {
        let path = self.path_for(session_key);
        let claimed = path.with_extension(format!("claimed-{}", new_session_key()));
        match fs::rename(&path, &claimed) {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(AuthError::StorageFailed(err.to_string())),
        }
        let raw = fs::read_to_string(&claimed);
        let _ = fs::remove_file(&claimed);
        let file: PendingFile = toml::from_str(&raw?)?;
        if file.version != PENDING_FILE_VERSION || file.expires_at <= Utc::now() {
            return Ok(None);
        }
        Ok(Some(file.pending))
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct PendingFile {
    version: u32,
    expires_at: DateTime<Utc>,
    pending: PendingAuthorization,
}
