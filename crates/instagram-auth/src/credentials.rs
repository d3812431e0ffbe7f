//! Persisted token record
//!
//! Holds the bearer token in memory and mirrors it to a small JSON file so a
//! renewed token survives restarts. The in-memory record is authoritative for
//! the process lifetime: a failed write is logged and otherwise ignored.
//!
//! All writes use atomic temp-file + rename. The record lock is only held to
//! read or swap the record; file writes are serialized by a separate lock so
//! request-time reads never wait on disk I/O.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// The persisted credential: `{"token": "...", "lastRefreshAt": 1735500000000}`.
///
/// `last_refresh_at` is a unix timestamp in milliseconds, 0 when the token has
/// never been renewed by this service. The legacy keys `CLIENT_TOKEN` and
/// `lastRefresh` are accepted when reading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenRecord {
    #[serde(alias = "CLIENT_TOKEN")]
    pub token: String,
    #[serde(default, alias = "lastRefresh")]
    pub last_refresh_at: u64,
}

impl TokenRecord {
    /// A record for a token that has never been renewed.
    pub fn unrefreshed(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            last_refresh_at: 0,
        }
    }
}

/// Token file manager.
pub struct CredentialStore {
    path: PathBuf,
    state: Mutex<TokenRecord>,
    /// Orders file writes so the newest record is the last one written
    write_lock: Mutex<()>,
}

impl CredentialStore {
    /// Resolve the current token.
    ///
    /// Resolution order: the record at `path` if it is readable and carries a
    /// non-empty token, else `fallback` (normally `CLIENT_TOKEN`). A missing
    /// file is the normal "never refreshed" state; an unreadable one is
    /// logged. Fails with `Error::Configuration` when neither source yields a
    /// token.
    pub async fn load(path: PathBuf, fallback: Option<&str>) -> Result<Self> {
        let persisted = match read_record(&path).await {
            Ok(Some(record)) if !record.token.trim().is_empty() => {
                info!(
                    path = %path.display(),
                    last_refresh_at = record.last_refresh_at,
                    "loaded persisted token"
                );
                Some(record)
            }
            Ok(Some(_)) => {
                warn!(path = %path.display(), "persisted token is empty, using fallback token");
                None
            }
            Ok(None) => {
                info!(path = %path.display(), "token file not found, using fallback token");
                None
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "unreadable token file, using fallback token");
                None
            }
        };

        let record = match persisted {
            Some(record) => record,
            None => match fallback.map(str::trim).filter(|t| !t.is_empty()) {
                Some(token) => TokenRecord::unrefreshed(token),
                None => {
                    return Err(Error::Configuration(format!(
                        "no token in {} and CLIENT_TOKEN is not set",
                        path.display()
                    )));
                }
            },
        };

        Ok(Self {
            path,
            state: Mutex::new(record),
            write_lock: Mutex::new(()),
        })
    }

    /// Clone of the current record.
    pub async fn current(&self) -> TokenRecord {
        self.state.lock().await.clone()
    }

    /// The current bearer token.
    pub async fn token(&self) -> String {
        self.state.lock().await.token.clone()
    }

    /// Whether a usable token is held.
    pub async fn has_token(&self) -> bool {
        !self.state.lock().await.token.is_empty()
    }

    /// Commit a renewed token.
    ///
    /// The in-memory record is replaced first; the file write is best-effort
    /// and a failure is only logged.
    pub async fn save(&self, token: String, refreshed_at: u64) {
        let _write = self.write_lock.lock().await;
        let record = TokenRecord {
            token,
            last_refresh_at: refreshed_at,
        };
        *self.state.lock().await = record.clone();

        if let Err(e) = write_atomic(&self.path, &record).await {
            warn!(path = %self.path.display(), error = %e, "failed to persist token, keeping it in memory");
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Read the record at `path`. `Ok(None)` when the file does not exist.
async fn read_record(path: &Path) -> Result<Option<TokenRecord>> {
    let contents = match tokio::fs::read_to_string(path).await {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(Error::Io(format!("reading token file: {e}"))),
    };
    serde_json::from_str(&contents)
        .map(Some)
        .map_err(|e| Error::CredentialParse(format!("parsing token file: {e}")))
}

/// Write the record atomically (temp file in the same directory, then rename).
/// Permissions are 0600 on unix since the file holds a bearer token.
async fn write_atomic(path: &Path, record: &TokenRecord) -> Result<()> {
    let json = serde_json::to_string_pretty(record)
        .map_err(|e| Error::CredentialParse(format!("serializing token record: {e}")))?;

    let dir = path
        .parent()
        .ok_or_else(|| Error::Io("token path has no parent directory".into()))?;

    let tmp_path = dir.join(format!(".token.tmp.{}", std::process::id()));

    let result = write_and_rename(&tmp_path, path, json.as_bytes()).await;
    if result.is_err() {
        // The temp file may exist even when the write itself failed part way
        match tokio::fs::remove_file(&tmp_path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!(path = %tmp_path.display(), error = %e, "failed to remove temp token file");
            }
        }
        return result;
    }

    debug!(path = %path.display(), "persisted token");
    Ok(())
}

async fn write_and_rename(tmp_path: &Path, path: &Path, contents: &[u8]) -> Result<()> {
    tokio::fs::write(tmp_path, contents)
        .await
        .map_err(|e| Error::Io(format!("writing temp token file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(tmp_path, perms)
            .await
            .map_err(|e| Error::Io(format!("setting token file permissions: {e}")))?;
    }

    tokio::fs::rename(tmp_path, path)
        .await
        .map_err(|e| Error::Io(format!("renaming temp token file: {e}")))
}
