//! S5: Empty objects.
//!
//! Zero-length bodies (primary markers) are stored, listed, and read back
//! as present-but-empty.

use foursight_storage::{list_all_keys, ObjectStore};

pub async fn test_s05_empty_objects(store: &dyn ObjectStore) -> Result<(), String> {
    let marker = "results/es_status/2024-02-01T00:00:00.000000.primary";
    store
        .put_object(marker, Vec::new())
        .await
        .map_err(|e| format!("S5: put_object failed: {e}"))?;

    match store.get_object(marker).await {
        Ok(Some(body)) if body.is_empty() => {}
        Ok(other) => return Err(format!("S5: expected an empty body, read {other:?}")),
        Err(e) => return Err(format!("S5: get_object failed: {e}")),
    }

    let keys = list_all_keys(store, "results/es_status/")
        .await
        .map_err(|e| format!("S5: listing failed: {e}"))?;
    if keys != [marker] {
        return Err(format!("S5: marker not listed: {keys:?}"));
    }
    Ok(())
}
