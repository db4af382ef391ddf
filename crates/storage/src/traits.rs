use async_trait::async_trait;

use crate::error::StorageError;

/// Page size used when a caller needs a complete listing.
const LIST_PAGE_SIZE: usize = 1000;

/// One page of a key listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPage {
    /// Keys in ascending lexicographic order.
    pub keys: Vec<String>,
    /// Pass as `start_after` to fetch the next page. `None` on the last page.
    pub next_token: Option<String>,
}

/// Key-addressed blob storage, modelled on an object-storage bucket.
///
/// ## Consistency
///
/// Writes are atomic per key: a reader sees either the previous body or
/// the new one, never a partial write. Listings may lag behind writes
/// (eventual consistency), so callers that need ordering sort keys
/// themselves and tolerate a listed key whose body is not yet readable.
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync + 'static` so a single store can be
/// shared by every worker through an `Arc<dyn ObjectStore>`.
#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    /// Write `body` under `key`, replacing any previous object.
    async fn put_object(&self, key: &str, body: Vec<u8>) -> Result<(), StorageError>;

    /// Read the object under `key`. Returns `Ok(None)` if it does not exist.
    async fn get_object(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// List keys beginning with `prefix`, strictly after `start_after`
    /// when given, returning at most `max_keys` keys per page.
    async fn list_objects(
        &self,
        prefix: &str,
        start_after: Option<&str>,
        max_keys: usize,
    ) -> Result<ListPage, StorageError>;
}

/// Follow continuation tokens until the listing under `prefix` is complete.
pub async fn list_all_keys(
    store: &dyn ObjectStore,
    prefix: &str,
) -> Result<Vec<String>, StorageError> {
    let mut keys = Vec::new();
    let mut token: Option<String> = None;
    loop {
        let page = store
            .list_objects(prefix, token.as_deref(), LIST_PAGE_SIZE)
            .await?;
        keys.extend(page.keys);
        match page.next_token {
            Some(next) => token = Some(next),
            None => return Ok(keys),
        }
    }
}
