//! Bincode-on-disk user table.
//!
//! The whole table is loaded at open and rewritten on every mutation. That is
//! plenty for the account volumes this protocol serves; a heavier database
//! can slot in behind [`UserStore`] without touching the cache layer.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{ProtocolError, Result};
use crate::store::{UserRecord, UserStore};

pub struct FileUserStore {
    path: PathBuf,
    users: Mutex<HashMap<String, UserRecord>>,
}

impl FileUserStore {
    /// Open the table at `path`, creating an empty one if the file is absent.
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let users = match tokio::fs::read(&path).await {
            Ok(bytes) => bincode::deserialize::<Vec<UserRecord>>(&bytes)
                .map_err(|e| ProtocolError::Storage(format!("corrupt user table: {e}")))?
                .into_iter()
                .map(|user| (user.username.clone(), user))
                .collect(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(ProtocolError::Storage(format!("cannot read user table: {e}"))),
        };

        debug!(path = %path.display(), users = users.len(), "User table opened");
        Ok(Self {
            path,
            users: Mutex::new(users),
        })
    }

    async fn persist(&self, users: &HashMap<String, UserRecord>) -> Result<()> {
        let mut records: Vec<&UserRecord> = users.values().collect();
        records.sort_by(|a, b| a.username.cmp(&b.username));

        let bytes = bincode::serialize(&records)?;
        tokio::fs::write(&self.path, bytes)
            .await
            .map_err(|e| ProtocolError::Storage(format!("cannot write user table: {e}")))
    }
}

impl UserStore for FileUserStore {
    fn get(&self, username: &str) -> BoxFuture<'_, Result<Option<UserRecord>>> {
        let username = username.to_string();
        async move {
            let users = self.users.lock().await;
            Ok(users.get(&username).cloned())
        }
        .boxed()
    }

    fn insert(&self, user: UserRecord) -> BoxFuture<'_, Result<bool>> {
        async move {
            let mut users = self.users.lock().await;
            if users.contains_key(&user.username) {
                return Ok(false);
            }
            users.insert(user.username.clone(), user);
            self.persist(&users).await?;
            Ok(true)
        }
        .boxed()
    }

    fn remove(&self, username: &str) -> BoxFuture<'_, Result<bool>> {
        let username = username.to_string();
        async move {
            let mut users = self.users.lock().await;
            if users.remove(&username).is_none() {
                return Ok(false);
            }
            self.persist(&users).await?;
            Ok(true)
        }
        .boxed()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn record(name: &str) -> UserRecord {
        UserRecord {
            username: name.into(),
            salt: "00ff".into(),
            verifier: "aabb".into(),
        }
    }

    #[tokio::test]
    async fn insert_get_remove() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileUserStore::open(dir.path().join("users.bin")).await.unwrap();

        assert!(store.insert(record("Mats")).await.unwrap());
        assert!(!store.insert(record("Mats")).await.unwrap());

        let fetched = store.get("Mats").await.unwrap().unwrap();
        assert_eq!(fetched.salt, "00ff");

        assert!(store.remove("Mats").await.unwrap());
        assert!(store.get("Mats").await.unwrap().is_none());
        assert!(!store.remove("Mats").await.unwrap());
    }

    #[tokio::test]
    async fn survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.bin");

        {
            let store = FileUserStore::open(&path).await.unwrap();
            store.insert(record("Mats")).await.unwrap();
        }

        let reopened = FileUserStore::open(&path).await.unwrap();
        assert!(reopened.get("Mats").await.unwrap().is_some());
    }
}
