//! S2: Last writer wins.
//!
//! A second write to the same key replaces the first and does not create a
//! second listing entry.

use foursight_storage::{list_all_keys, ObjectStore};

pub async fn test_s02_overwrite(store: &dyn ObjectStore) -> Result<(), String> {
    let key = "results/es_status/2024-02-01T00:00:00.000000.json";
    for body in [b"first".to_vec(), b"second".to_vec()] {
        store
            .put_object(key, body)
            .await
            .map_err(|e| format!("S2: put_object failed: {e}"))?;
    }

    let read = store
        .get_object(key)
        .await
        .map_err(|e| format!("S2: get_object failed: {e}"))?;
    if read.as_deref() != Some(b"second".as_slice()) {
        return Err(format!("S2: expected the second body, read {read:?}"));
    }

    let keys = list_all_keys(store, "results/")
        .await
        .map_err(|e| format!("S2: listing failed: {e}"))?;
    if keys != [key] {
        return Err(format!("S2: expected a single key, listed {keys:?}"));
    }
    Ok(())
}
