//! Cache-aside credential cache with sliding expiration and disk snapshots.
//!
//! Read path: check memory first (a hit refreshes the entry's sliding timer);
//! on miss go through the persistent store, populate the cache, and rewrite
//! the snapshot. Write path is write-through. A bounded semaphore sized to
//! the machine's parallelism gates store round-trips so a burst of cache
//! misses cannot exhaust the backend.
//!
//! Snapshot file layout: `count: i32 LE`, then `count` entries of three
//! `u32 LE`-length-prefixed UTF-8 strings (username, salt, verifier).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, trace, warn};

use crate::config::CacheConfig;
use crate::error::{ProtocolError, Result};
use crate::store::{UserRecord, UserStore};

/// A cached user plus its sliding-expiration bookkeeping.
#[derive(Debug, Clone)]
struct CacheEntry {
    user: UserRecord,
    last_access: Instant,
}

impl CacheEntry {
    fn is_expired(&self, window: Duration) -> bool {
        self.last_access.elapsed() > window
    }
}

/// In-memory credential cache fronting a [`UserStore`].
pub struct CredentialCache {
    store: Box<dyn UserStore>,
    entries: Mutex<HashMap<String, CacheEntry>>,
    snapshot_path: PathBuf,
    sliding_window: Duration,
    max_entries: usize,
    store_gate: Semaphore,
}

impl CredentialCache {
    /// Build the cache and seed it from an existing snapshot file, if any.
    /// A corrupt snapshot is discarded with a warning; the persistent store
    /// remains the source of truth.
    pub async fn open(
        store: Box<dyn UserStore>,
        snapshot_path: impl AsRef<Path>,
        sliding_window: Duration,
        max_entries: usize,
    ) -> Result<Self> {
        let snapshot_path = snapshot_path.as_ref().to_path_buf();
        let permits = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);

        let cache = Self {
            store,
            entries: Mutex::new(HashMap::new()),
            snapshot_path,
            sliding_window,
            max_entries,
            store_gate: Semaphore::new(permits),
        };

        match cache.load_snapshot().await {
            Ok(count) if count > 0 => debug!(count, "Credential cache seeded from snapshot"),
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Ignoring unreadable cache snapshot"),
        }
        Ok(cache)
    }

    /// [`Self::open`] with the parameters taken from a [`CacheConfig`].
    pub async fn from_config(store: Box<dyn UserStore>, config: &CacheConfig) -> Result<Self> {
        Self::open(
            store,
            &config.snapshot_path,
            config.sliding_expiration,
            config.max_entries,
        )
        .await
    }

    /// Full read path: cache, then store read-through.
    ///
    /// `Ok(None)` means the user exists nowhere; callers on the handshake path
    /// turn that into the same uniform failure as a bad proof.
    pub async fn get_user(&self, username: &str) -> Result<Option<UserRecord>> {
        if let Some(user) = self.get_user_from_cache(username).await {
            return Ok(Some(user));
        }

        let user = {
            let _permit = self
                .store_gate
                .acquire()
                .await
                .map_err(|_| ProtocolError::ConnectionClosed)?;
            self.store.get(username).await?
        };

        match user {
            Some(user) => {
                trace!(username, "Cache miss, populated from store");
                self.insert_entry(user.clone()).await?;
                Ok(Some(user))
            }
            None => Ok(None),
        }
    }

    /// Cache-only accessor. Honors sliding expiration: an entry idle longer
    /// than the window is unavailable here even though [`Self::get_user`]
    /// can still re-read it from the store.
    pub async fn get_user_from_cache(&self, username: &str) -> Option<UserRecord> {
        let mut entries = self.entries.lock().await;
        match entries.get_mut(username) {
            Some(entry) if !entry.is_expired(self.sliding_window) => {
                entry.last_access = Instant::now();
                trace!(username, "Credential cache hit");
                Some(entry.user.clone())
            }
            Some(_) => {
                entries.remove(username);
                trace!(username, "Credential cache entry expired");
                None
            }
            None => None,
        }
    }

    /// Write-through: persistent store first, then cache, then snapshot.
    /// Returns `false` when the username already existed in the store.
    pub async fn add_user(&self, user: UserRecord) -> Result<bool> {
        let created = {
            let _permit = self
                .store_gate
                .acquire()
                .await
                .map_err(|_| ProtocolError::ConnectionClosed)?;
            self.store.insert(user.clone()).await?
        };

        self.insert_entry(user).await?;
        Ok(created)
    }

    /// Drop one user from the cache and snapshot. The persistent store is
    /// deliberately untouched: this is cache invalidation, not deletion.
    pub async fn remove_user(&self, username: &str) -> Result<bool> {
        let removed = {
            let mut entries = self.entries.lock().await;
            entries.remove(username).is_some()
        };
        if removed {
            self.write_snapshot().await?;
        }
        Ok(removed)
    }

    /// Flush the whole cache (and the snapshot with it).
    pub async fn invalidate(&self) -> Result<()> {
        {
            let mut entries = self.entries.lock().await;
            entries.clear();
        }
        self.write_snapshot().await
    }

    /// Current number of live (possibly expired) entries.
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn insert_entry(&self, user: UserRecord) -> Result<()> {
        {
            let mut entries = self.entries.lock().await;

            entries.retain(|_, entry| !entry.is_expired(self.sliding_window));
            if entries.len() >= self.max_entries {
                Self::evict_oldest(&mut entries);
            }

            entries.insert(
                user.username.clone(),
                CacheEntry {
                    user,
                    last_access: Instant::now(),
                },
            );
        }
        self.write_snapshot().await
    }

    fn evict_oldest(entries: &mut HashMap<String, CacheEntry>) {
        if let Some(oldest) = entries
            .iter()
            .min_by_key(|(_, entry)| entry.last_access)
            .map(|(name, _)| name.clone())
        {
            entries.remove(&oldest);
            debug!(username = %oldest, "Oldest cache entry evicted to make room");
        }
    }

    async fn write_snapshot(&self) -> Result<()> {
        let mut users: Vec<UserRecord> = {
            let entries = self.entries.lock().await;
            entries.values().map(|entry| entry.user.clone()).collect()
        };
        users.sort_by(|a, b| a.username.cmp(&b.username));

        let mut buf = Vec::new();
        buf.extend_from_slice(&(users.len() as i32).to_le_bytes());
        for user in &users {
            write_string(&mut buf, &user.username);
            write_string(&mut buf, &user.salt);
            write_string(&mut buf, &user.verifier);
        }

        tokio::fs::write(&self.snapshot_path, buf)
            .await
            .map_err(|e| ProtocolError::Storage(format!("cannot write cache snapshot: {e}")))
    }

    async fn load_snapshot(&self) -> Result<usize> {
        let bytes = match tokio::fs::read(&self.snapshot_path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(ProtocolError::Storage(format!("cannot read snapshot: {e}"))),
        };

        // Parse fully before touching the map so a corrupt snapshot never
        // leaves a partial seed behind.
        let mut cursor = 0usize;
        let count = read_i32(&bytes, &mut cursor)?;
        // Capacity comes from parsing, not the declared count; a corrupt
        // count must not drive a huge allocation.
        let mut users = Vec::new();
        for _ in 0..count {
            let username = read_string(&bytes, &mut cursor)?;
            let salt = read_string(&bytes, &mut cursor)?;
            let verifier = read_string(&bytes, &mut cursor)?;
            users.push(UserRecord {
                username,
                salt,
                verifier,
            });
        }

        let mut entries = self.entries.lock().await;
        let seeded = users.len();
        for user in users {
            entries.insert(
                user.username.clone(),
                CacheEntry {
                    user,
                    last_access: Instant::now(),
                },
            );
        }
        Ok(seeded)
    }
}

fn write_string(buf: &mut Vec<u8>, value: &str) {
    buf.extend_from_slice(&(value.len() as u32).to_le_bytes());
    buf.extend_from_slice(value.as_bytes());
}

fn read_i32(bytes: &[u8], cursor: &mut usize) -> Result<i32> {
    let end = *cursor + 4;
    let slice = bytes
        .get(*cursor..end)
        .ok_or_else(|| ProtocolError::Storage("snapshot truncated".into()))?;
    *cursor = end;
    Ok(i32::from_le_bytes([slice[0], slice[1], slice[2], slice[3]]))
}

fn read_string(bytes: &[u8], cursor: &mut usize) -> Result<String> {
    let len = u32::try_from(read_i32(bytes, cursor)?)
        .map_err(|_| ProtocolError::Storage("snapshot declares negative string length".into()))?;
    let end = cursor
        .checked_add(len as usize)
        .ok_or_else(|| ProtocolError::Storage("snapshot truncated".into()))?;
    let slice = bytes
        .get(*cursor..end)
        .ok_or_else(|| ProtocolError::Storage("snapshot truncated".into()))?;
    *cursor = end;
    String::from_utf8(slice.to_vec())
        .map_err(|_| ProtocolError::Storage("snapshot contains invalid UTF-8".into()))
}
