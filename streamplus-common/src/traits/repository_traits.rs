use async_trait::async_trait;

use crate::error::Error;
use crate::models::CredentialRecord;

/// Durable home of the per-role token pairs.
///
/// Single process, single writer. Concurrent edits from outside the process
/// are not detected.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Fails with `Error::StoreCorrupt` when the backing data is missing or unparseable.
    async fn load(&self) -> Result<CredentialRecord, Error>;

    /// Overwrites the whole record. Fails with `Error::StoreUnwritable`.
    async fn save(&self, record: &CredentialRecord) -> Result<(), Error>;
}
