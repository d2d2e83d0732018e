//! src/credentials/mod.rs
//!
//! File-backed `CredentialStore`. The whole record is one JSON document:
//! `{"Streamer":{"accessToken":"","refreshToken":""},"Chatbot":{...}}`.
//! Tokens are stored in plain text.

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::Error;
use crate::models::CredentialRecord;
use crate::traits::CredentialStore;

#[derive(Debug, Clone)]
pub struct JsonCredentialStore {
    path: PathBuf,
}

impl JsonCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Same as `new`, but writes an empty record first if the file does not exist yet.
    pub async fn open_or_init(path: impl Into<PathBuf>) -> Result<Self, Error> {
        let store = Self::new(path);
        if !tokio::fs::try_exists(&store.path).await? {
            if let Some(parent) = store.path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            store.save(&CredentialRecord::default()).await?;
            info!("(JsonCredentialStore) created empty credentials file at {}", store.path.display());
        }
        Ok(store)
    }
}

#[async_trait]
impl CredentialStore for JsonCredentialStore {
    async fn load(&self) -> Result<CredentialRecord, Error> {
        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| Error::StoreCorrupt(format!("{}: {e}", self.path.display())))?;
        let record = serde_json::from_str::<CredentialRecord>(&raw)
            .map_err(|e| Error::StoreCorrupt(format!("{}: {e}", self.path.display())))?;
        debug!("(JsonCredentialStore) loaded {}", self.path.display());
        Ok(record)
    }

    async fn save(&self, record: &CredentialRecord) -> Result<(), Error> {
        let json = serde_json::to_string(record)?;
        // write-then-rename: readers never see half a document
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| Error::StoreUnwritable(format!("{}: {e}", tmp.display())))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| Error::StoreUnwritable(format!("{}: {e}", self.path.display())))?;
        debug!("(JsonCredentialStore) saved {}", self.path.display());
        Ok(())
    }
}
