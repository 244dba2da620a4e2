use std::fs;
use std::io::Write;
#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::credential::{Credential, Profile};
use super::error::AuthError;

const SESSION_FILE_VERSION: u32 = 1;
pub const SESSION_FILE_NAME: &str = "session.toml";

/// Durable local storage for the signed-in [`Credential`] and its [`Profile`].
///
/// Implementations store both in one record so a profile never outlives the
/// credential it was fetched under. No network I/O happens here; whether the
/// instance still accepts the token is [`SessionValidator`]'s concern.
///
/// [`SessionValidator`]: super::validator::SessionValidator
pub trait CredentialStore: Send + Sync {
    fn get_credential(&self) -> Result<Option<Credential>, AuthError>;
    /// Replace the credential. A profile belonging to a different credential
    /// is dropped in the same write.
    fn set_credential(&self, credential: &Credential) -> Result<(), AuthError>;
    /// Remove the credential and its profile together.
    fn clear_credential(&self) -> Result<(), AuthError>;
    fn get_profile(&self) -> Result<Option<Profile>, AuthError>;
    /// Fails with `StorageFailed` when no credential is stored.
    fn set_profile(&self, profile: &Profile) -> Result<(), AuthError>;
    fn clear_profile(&self) -> Result<(), AuthError>;
    fn set_both(&self, credential: &Credential, profile: &Profile) -> Result<(), AuthError>;

    fn clear(&self) -> Result<(), AuthError> {
        self.clear_credential()
    }

    /// Store `profile` only if `credential` is still the stored credential.
    /// Returns whether the write happened.
    fn refresh_profile(&self, credential: &Credential, profile: &Profile) -> Result<bool, AuthError> {
        if self.get_credential()?.as_ref() != Some(credential) {
            return Ok(false);
        }
        self.set_both(credential, profile)?;
        Ok(true)
    }

    /// Clear the record only if `credential` is still the stored credential.
    /// Returns whether anything was removed.
    fn clear_if_current(&self, credential: &Credential) -> Result<bool, AuthError> {
        if self.get_credential()?.as_ref() != Some(credential) {
            return Ok(false);
        }
        self.clear_credential()?;
        Ok(true)
    }
}

/// The unit every store reads and writes as a whole.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct SessionRecord {
    credential: Credential,
    profile: Option<Profile>,
}

impl SessionRecord {
    fn replace_credential(current: Option<Self>, credential: &Credential) -> Self {
        let profile = current
            .filter(|record| record.credential == *credential)
            .and_then(|record| record.profile);
        Self {
            credential: credential.clone(),
            profile,
        }
    }

    fn with_profile(current: Option<Self>, profile: Option<&Profile>) -> Result<Self, AuthError> {
        let mut record = current.ok_or_else(|| {
            AuthError::StorageFailed("cannot store a profile without a credential".to_string())
        })?;
        record.profile = profile.cloned();
        Ok(record)
    }
}

/// What a read-modify-write decided to do with the record.
enum Change {
    Keep,
    Save(SessionRecord),
    Remove,
}

/// Whole-record load/save shared by the concrete stores.
trait RecordBackend {
    fn load(&self) -> Result<Option<SessionRecord>, AuthError>;
    fn save(&self, record: &SessionRecord) -> Result<(), AuthError>;
    fn remove(&self) -> Result<(), AuthError>;

    /// Read-modify-write of the record, exclusive of other writers.
    fn update<T>(
        &self,
        f: impl FnOnce(Option<SessionRecord>) -> Result<(Change, T), AuthError>,
    ) -> Result<T, AuthError>;
}

/// Implements [`CredentialStore`] as read-modify-write over [`RecordBackend`].
macro_rules! record_credential_store {
    ($store:ty) => {
        impl CredentialStore for $store {
            fn get_credential(&self) -> Result<Option<Credential>, AuthError> {
                Ok(self.load()?.map(|record| record.credential))
            }

            fn set_credential(&self, credential: &Credential) -> Result<(), AuthError> {
                self.update(|current| {
                    let record = SessionRecord::replace_credential(current, credential);
                    Ok((Change::Save(record), ()))
                })
            }

            fn clear_credential(&self) -> Result<(), AuthError> {
                self.remove()
            }

            fn get_profile(&self) -> Result<Option<Profile>, AuthError> {
                Ok(self.load()?.and_then(|record| record.profile))
            }

            fn set_profile(&self, profile: &Profile) -> Result<(), AuthError> {
                self.update(|current| {
                    let record = SessionRecord::with_profile(current, Some(profile))?;
                    Ok((Change::Save(record), ()))
                })
            }

            fn clear_profile(&self) -> Result<(), AuthError> {
                self.update(|current| match current {
                    Some(record) if record.profile.is_some() => {
                        let record = SessionRecord::with_profile(Some(record), None)?;
                        Ok((Change::Save(record), ()))
                    }
                    _ => Ok((Change::Keep, ())),
                })
            }

            fn set_both(&self, credential: &Credential, profile: &Profile) -> Result<(), AuthError> {
                self.save(&SessionRecord {
                    credential: credential.clone(),
                    profile: Some(profile.clone()),
                })
            }

            fn refresh_profile(
                &self,
                credential: &Credential,
                profile: &Profile,
            ) -> Result<bool, AuthError> {
                self.update(|current| match current {
                    Some(record) if record.credential == *credential => Ok((
                        Change::Save(SessionRecord {
                            credential: record.credential,
                            profile: Some(profile.clone()),
                        }),
                        true,
                    )),
                    _ => Ok((Change::Keep, false)),
                })
            }

            fn clear_if_current(&self, credential: &Credential) -> Result<bool, AuthError> {
                self.update(|current| match current {
                    Some(record) if record.credential == *credential => Ok((Change::Remove, true)),
                    _ => Ok((Change::Keep, false)),
                })
            }
        }
    };
}

record_credential_store!(MemoryCredentialStore);
record_credential_store!(FileCredentialStore);

/// In-process credential store.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    record: Mutex<Option<SessionRecord>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RecordBackend for MemoryCredentialStore {
    fn load(&self) -> Result<Option<SessionRecord>, AuthError> {
        Ok(self
            .record
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn save(&self, record: &SessionRecord) -> Result<(), AuthError> {
        *self.record.lock().unwrap_or_else(PoisonError::into_inner) = Some(record.clone());
        Ok(())
    }

    fn remove(&self) -> Result<(), AuthError> {
        *self.record.lock().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }

    fn update<T>(
        &self,
        f: impl FnOnce(Option<SessionRecord>) -> Result<(Change, T), AuthError>,
    ) -> Result<T, AuthError> {
        let mut record = self.record.lock().unwrap_or_else(PoisonError::into_inner);
        let (change, out) = f(record.clone())?;
        match change {
            Change::Keep => {}
            Change::Save(next) => *record = Some(next),
            Change::Remove => *record = None,
        }
        Ok(out)
    }
}

/// File-backed credential store using one versioned TOML file.
///
/// Writes go to a temporary file that is renamed into place, so readers see
/// either the old record or the new one. The file is owner-only on unix.
/// Writers sharing one store (or its clones) are serialized. Separate
/// processes are not.
///
/// # Example
/// ```no_run
/// use fedauth::auth::{Credential, CredentialStore, FileCredentialStore};
///
/// let store = FileCredentialStore::new("/tmp/fedauth");
/// store.set_credential(&Credential::new("tok-1", "social.example"))?;
/// assert!(store.get_credential()?.is_some());
/// # Ok::<(), fedauth::auth::AuthError>(())
/// ```
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

impl FileCredentialStore {
    /// Store `session.toml` inside `dir`.
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self::at_path(dir.as_ref().join(SESSION_FILE_NAME))
    }

    pub fn at_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_record(&self, record: &SessionRecord) -> Result<(), AuthError> {
        let file = SessionFile {
            version: SESSION_FILE_VERSION,
            saved_at: Utc::now(),
            credential: record.credential.clone(),
            profile: record.profile.clone(),
        };
        let serialized = toml::to_string(&file)?;
        write_private(&self.path, serialized.as_bytes())
    }

    fn delete_record(&self) -> Result<(), AuthError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(AuthError::StorageFailed(err.to_string())),
        }
    }
}

impl RecordBackend for FileCredentialStore {
    fn load(&self) -> Result<Option<SessionRecord>, AuthError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(AuthError::StorageFailed(err.to_string())),
        };
        let file: SessionFile = toml::from_str(&raw).map_err(|err| {
            AuthError::StorageFailed(format!("corrupt {}: {}", self.path.display(), err.message()))
        })?;
        if file.version != SESSION_FILE_VERSION {
            return Err(AuthError::StorageFailed(format!(
                "unsupported session file version {} at {}",
                file.version,
                self.path.display()
            )));
        }
        Ok(Some(SessionRecord {
            credential: file.credential,
            profile: file.profile,
        }))
    }

    fn save(&self, record: &SessionRecord) -> Result<(), AuthError> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.write_record(record)
    }

    fn remove(&self) -> Result<(), AuthError> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.delete_record()
    }

    fn update<T>(
        &self,
        f: impl FnOnce(Option<SessionRecord>) -> Result<(Change, T), AuthError>,
    ) -> Result<T, AuthError> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let (change, out) = f(self.load()?)?;
        match change {
            Change::Keep => {}
            Change::Save(record) => self.write_record(&record)?,
            Change::Remove => self.delete_record()?,
        }
        Ok(out)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct SessionFile {
    version: u32,
    saved_at: DateTime<Utc>,
    credential: Credential,
    profile: Option<Profile>,
}

/// Atomically replace `path` with `data`, readable by the owner only.
pub(crate) fn write_private(path: &Path, data: &[u8]) -> Result<(), AuthError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let file_name = path.file_name().ok_or_else(|| {
        AuthError::StorageFailed(format!("{} has no file name", path.display()))
    })?;
    let temp_path = path.with_file_name(format!(
        ".{}.tmp-{}-{}",
        file_name.to_string_lossy(),
        std::process::id(),
        uuid::Uuid::new_v4().simple()
    ));

    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    options.mode(0o600);

    let write_result = (|| -> std::io::Result<()> {
        let mut temp_file = options.open(&temp_path)?;
        temp_file.write_all(data)?;
        temp_file.sync_all()?;
        Ok(())
    })();

    if let Err(err) = write_result {
        let _ = fs::remove_file(&temp_path);
        return Err(AuthError::StorageFailed(err.to_string()));
    }
    if let Err(err) = fs::rename(&temp_path, path) {
        let _ = fs::remove_file(&temp_path);
        return Err(AuthError::StorageFailed(err.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn profile(handle: &str) -> Profile {
        Profile {
            id: "1".to_string(),
            handle: handle.to_string(),
            display_name: handle.to_string(),
            avatar_url: String::new(),
            bio: String::new(),
            url: String::new(),
            follower_count: 0,
            following_count: 0,
            post_count: 0,
            last_post_at: None,
            custom_fields: Vec::new(),
        }
    }

    #[test]
    fn memory_round_trip_and_clear() {
        let store = MemoryCredentialStore::new();
        let credential = Credential::new("tok-1", "social.example");
        store.set_both(&credential, &profile("alice")).unwrap();
        assert_eq!(store.get_credential().unwrap(), Some(credential));
        store.clear().unwrap();
        assert!(store.get_credential().unwrap().is_none());
        assert!(store.get_profile().unwrap().is_none());
    }

    #[test]
    fn same_credential_keeps_profile() {
        let store = MemoryCredentialStore::new();
        let credential = Credential::new("tok-1", "social.example");
        store.set_both(&credential, &profile("alice")).unwrap();
        store.set_credential(&credential).unwrap();
        assert_eq!(store.get_profile().unwrap(), Some(profile("alice")));
    }

    #[test]
    fn clear_profile_keeps_credential() {
        let store = MemoryCredentialStore::new();
        let credential = Credential::new("tok-1", "social.example");
        store.set_both(&credential, &profile("alice")).unwrap();
        store.clear_profile().unwrap();
        assert!(store.get_profile().unwrap().is_none());
        assert_eq!(store.get_credential().unwrap(), Some(credential));
    }

    #[cfg(unix)]
    #[test]
    fn session_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let store = FileCredentialStore::new(dir.path());
        store
            .set_credential(&Credential::new("tok-1", "social.example"))
            .unwrap();
        let mode = fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn write_leaves_no_temp_files() {
        let dir = TempDir::new().unwrap();
        let store = FileCredentialStore::new(dir.path());
        let credential = Credential::new("tok-1", "social.example");
        store.set_both(&credential, &profile("alice")).unwrap();
        store.set_credential(&credential).unwrap();
        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn profile_write_never_reverts_a_concurrent_credential_change() {
        use std::sync::Barrier;

        let old = Credential::new("tok-1", "social.example");
        let new = Credential::new("tok-2", "social.example");
        for _ in 0..200 {
            let store = MemoryCredentialStore::new();
            store.set_credential(&old).unwrap();
            let barrier = Barrier::new(2);
            std::thread::scope(|scope| {
                scope.spawn(|| {
                    barrier.wait();
                    store.set_credential(&new).unwrap();
                });
                scope.spawn(|| {
                    barrier.wait();
                    store.set_profile(&profile("alice")).unwrap();
                });
            });
            assert_eq!(store.get_credential().unwrap(), Some(new.clone()));
        }
    }

    #[test]
    fn conditional_writes_only_touch_the_matching_credential() {
        let dir = TempDir::new().unwrap();
        let store = FileCredentialStore::new(dir.path());
        let old = Credential::new("tok-1", "social.example");
        let new = Credential::new("tok-2", "social.example");

        assert!(!store.refresh_profile(&old, &profile("alice")).unwrap());
        assert!(store.get_credential().unwrap().is_none());

        store.set_credential(&new).unwrap();
        assert!(!store.refresh_profile(&old, &profile("alice")).unwrap());
        assert!(!store.clear_if_current(&old).unwrap());
        assert_eq!(store.get_credential().unwrap(), Some(new.clone()));
        assert!(store.get_profile().unwrap().is_none());

        assert!(store.refresh_profile(&new, &profile("alice")).unwrap());
        assert_eq!(store.get_profile().unwrap(), Some(profile("alice")));
        assert!(store.clear_if_current(&new).unwrap());
        assert!(store.get_credential().unwrap().is_none());
    }
}
