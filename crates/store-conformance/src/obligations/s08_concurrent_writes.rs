//! S8: Concurrent writers.
//!
//! Many tasks writing distinct keys at once all land, with no body torn or
//! lost.

use std::sync::Arc;

use foursight_storage::{list_all_keys, ObjectStore};

use crate::fixtures;

pub async fn test_s08_concurrent_writes(store: Arc<dyn ObjectStore>) -> Result<(), String> {
    let keys = fixtures::numbered_keys("results/parallel/", 16);
    let mut tasks = Vec::new();
    for key in keys.clone() {
        let store = store.clone();
        tasks.push(tokio::spawn(async move {
            let body = key.repeat(64).into_bytes();
            store.put_object(&key, body).await.map(|_| key)
        }));
    }
    for task in tasks {
        task.await
            .map_err(|e| format!("S8: writer task failed: {e}"))?
            .map_err(|e| format!("S8: put_object failed: {e}"))?;
    }

    let listed = list_all_keys(store.as_ref(), "results/parallel/")
        .await
        .map_err(|e| format!("S8: listing failed: {e}"))?;
    if listed != keys {
        return Err(format!("S8: listed {} of {} keys", listed.len(), keys.len()));
    }
    for key in &keys {
        let body = store
            .get_object(key)
            .await
            .map_err(|e| format!("S8: get_object failed: {e}"))?;
        if body != Some(key.repeat(64).into_bytes()) {
            return Err(format!("S8: body under {key} is wrong"));
        }
    }
    Ok(())
}
