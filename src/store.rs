//! Flat-file persistence for the dashboard state.
//!
//! Writes go to a hidden temp file in the same directory, are fsynced, then
//! renamed over the target, so a reader sees either the old or the new file
//! and never a torn one. Reads are tolerant: a missing file is an empty
//! state and an unreadable one is moved aside (`*.corrupt-<ts>`) so the next
//! write does not destroy the evidence.
//!
//! `CycleLock` is the single-writer guarantee: an advisory `<file>.lock`
//! created with `create_new`, removed on drop, and broken when older than
//! the configured staleness bound (a crashed writer).

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::history;
use crate::model::{FetchStatus, LiveFeedState, PoliticalData};

pub const POLITICAL_FILE: &str = "political_data.json";
pub const LIVE_FILE: &str = "live_feed.json";
pub const STATUS_FILE: &str = "fetch_status.json";

const LOCK_POLL: Duration = Duration::from_millis(200);

#[derive(Debug, Clone)]
pub struct StateStore {
    dir: PathBuf,
}

impl StateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    pub fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("creating data dir {}", self.dir.display()))
    }

    pub fn load_political(&self) -> Result<PoliticalData> {
        let mut data: PoliticalData = self.load_json(POLITICAL_FILE)?;
        let dropped = history::canonicalize(&mut data.history);
        if dropped > 0 {
            warn!(target: "store", dropped, "duplicate history buckets removed on load");
        }
        Ok(data)
    }

    pub fn load_live(&self) -> Result<LiveFeedState> {
        self.load_json(LIVE_FILE)
    }

    pub fn load_status(&self) -> Result<FetchStatus> {
        self.load_json(STATUS_FILE)
    }

    /// Returns the sha256 of the committed bytes.
    pub fn save_political(&self, data: &PoliticalData) -> Result<String> {
        write_json_atomic(&self.path(POLITICAL_FILE), data)
    }

    pub fn save_live(&self, data: &LiveFeedState) -> Result<String> {
        write_json_atomic(&self.path(LIVE_FILE), data)
    }

    pub fn save_status(&self, status: &FetchStatus) -> Result<String> {
        write_json_atomic(&self.path(STATUS_FILE), status)
    }

    /// Take the advisory lock guarding `name`, waiting at most `wait`.
    /// `Ok(None)` means another writer holds it.
    pub async fn lock(
        &self,
        name: &str,
        stale_after: Duration,
        wait: Duration,
    ) -> Result<Option<CycleLock>> {
        CycleLock::acquire(self.path(&format!("{name}.lock")), stale_after, wait).await
    }

    fn load_json<T: DeserializeOwned + Default>(&self, name: &str) -> Result<T> {
        let path = self.path(name);
        let bytes = match fs::read(&path) {
            Ok(b) => b,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(T::default()),
            Err(e) => return Err(e).with_context(|| format!("reading {}", path.display())),
        };
        match serde_json::from_slice::<T>(&bytes) {
            Ok(v) => Ok(v),
            Err(e) => {
                let moved = quarantine(&path)?;
                warn!(
                    target: "store",
                    path = %path.display(),
                    moved_to = %moved.display(),
                    error = %e,
                    "unreadable state file set aside; starting from empty"
                );
                Ok(T::default())
            }
        }
    }
}

fn quarantine(path: &Path) -> Result<PathBuf> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let target = path.with_file_name(format!(
        "{name}.corrupt-{}",
        Utc::now().format("%Y%m%dT%H%M%S")
    ));
    fs::rename(path, &target)
        .with_context(|| format!("moving {} aside", path.display()))?;
    Ok(target)
}

/// Lowercase hex sha256.
pub fn sha256_hex(bytes: &[u8]) -> String {
    use std::fmt::Write as _;
    let digest = Sha256::digest(bytes);
    let mut out = String::with_capacity(64);
    for b in digest.iter() {
        let _ = write!(&mut out, "{b:02x}");
    }
    out
}

/// Serialize `value` as pretty JSON and atomically replace `path` with it.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<String> {
    let mut bytes = serde_json::to_vec_pretty(value).context("serializing state")?;
    bytes.push(b'\n');
    write_bytes_atomic(path, &bytes)?;

    let digest = sha256_hex(&bytes);
    debug!(target: "store", path = %path.display(), bytes = bytes.len(), %digest, "committed");
    Ok(digest)
}

/// Temp file in the target's directory, fsync, rename over the target.
pub fn write_bytes_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .with_context(|| format!("{} has no file name", path.display()))?;
    let tmp = path.with_file_name(format!(".{name}.{}.tmp", std::process::id()));

    let written = (|| -> std::io::Result<()> {
        let mut f = fs::File::create(&tmp)?;
        f.write_all(bytes)?;
        f.sync_all()?;
        fs::rename(&tmp, path)
    })();
    if let Err(e) = written {
        let _ = fs::remove_file(&tmp);
        return Err(e).with_context(|| format!("writing {}", path.display()));
    }
    Ok(())
}

/// Advisory single-writer lock; released on drop.
#[derive(Debug)]
pub struct CycleLock {
    path: PathBuf,
}

impl CycleLock {
    pub async fn acquire(
        path: PathBuf,
        stale_after: Duration,
        wait: Duration,
    ) -> Result<Option<Self>> {
        let mut waited = Duration::ZERO;
        loop {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut f) => {
                    let _ = writeln!(f, "{} {}", std::process::id(), Utc::now().to_rfc3339());
                    return Ok(Some(Self { path }));
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    if is_stale(&path, stale_after) && break_stale(&path)? {
                        continue;
                    }
                    if waited >= wait {
                        return Ok(None);
                    }
                    tokio::time::sleep(LOCK_POLL).await;
                    waited += LOCK_POLL;
                }
                Err(e) => {
                    return Err(e).with_context(|| format!("creating lock {}", path.display()))
                }
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Move a stale lock out of the way and delete it. Two writers may both see
/// the same stale lock; the rename lets only one of them take it, and a lock
/// that was replaced by a live writer in between is put back. Returns
/// whether the caller should retry `create_new` at once.
fn break_stale(path: &Path) -> Result<bool> {
    let seen = match fs::read(path) {
        Ok(b) => b,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(true),
        Err(e) => return Err(e).with_context(|| format!("reading lock {}", path.display())),
    };
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let aside = path.with_file_name(format!(
        "{name}.stale-{}-{}",
        std::process::id(),
        Utc::now().timestamp_nanos_opt().unwrap_or_default()
    ));
    match fs::rename(path, &aside) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(true),
        Err(e) => {
            return Err(e).with_context(|| format!("moving stale lock {}", path.display()))
        }
    }

    if fs::read(&aside).ok().as_deref() != Some(seen.as_slice()) {
        // Someone broke it first and took a fresh lock; hand it back.
        if let Err(e) = fs::hard_link(&aside, path) {
            warn!(target: "store", path = %path.display(), error = %e, "could not restore a live lock");
        }
        let _ = fs::remove_file(&aside);
        return Ok(false);
    }
    warn!(target: "store", path = %path.display(), "breaking stale lock");
    if let Err(e) = fs::remove_file(&aside) {
        warn!(target: "store", path = %aside.display(), error = %e, "stale lock left aside");
    }
    Ok(true)
}

fn is_stale(path: &Path, stale_after: Duration) -> bool {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| t.elapsed().ok())
        .is_some_and(|age| age > stale_after)
}

impl Drop for CycleLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            if e.kind() != ErrorKind::NotFound {
                warn!(target: "store", path = %self.path.display(), error = %e, "failed to release lock");
            }
        }
    }
}
