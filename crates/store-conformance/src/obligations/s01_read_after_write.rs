//! S1: Read-after-write.
//!
//! A body written under a key reads back byte-for-byte; a key never written
//! reads as absent rather than as an error.

use foursight_storage::ObjectStore;

pub async fn test_s01_read_after_write(store: &dyn ObjectStore) -> Result<(), String> {
    let body = b"{\"status\": \"PASS\"}".to_vec();
    store
        .put_object("results/es_status/2024-02-01T00:00:00.000000.json", body.clone())
        .await
        .map_err(|e| format!("S1: put_object failed: {e}"))?;

    let read = store
        .get_object("results/es_status/2024-02-01T00:00:00.000000.json")
        .await
        .map_err(|e| format!("S1: get_object failed: {e}"))?;
    if read.as_deref() != Some(body.as_slice()) {
        return Err(format!("S1: read back {read:?}, expected the written body"));
    }

    match store.get_object("results/es_status/never-written.json").await {
        Ok(None) => Ok(()),
        Ok(Some(_)) => Err("S1: unwritten key returned a body".to_string()),
        Err(e) => Err(format!("S1: unwritten key returned an error: {e}")),
    }
}
