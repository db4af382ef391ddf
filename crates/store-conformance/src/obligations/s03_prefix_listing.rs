//! S3: Prefix listing.
//!
//! Listing returns exactly the keys that start with the prefix, in ascending
//! lexicographic order, including keys in nested "directories".

use foursight_storage::{list_all_keys, ObjectStore};

pub async fn test_s03_prefix_listing(store: &dyn ObjectStore) -> Result<(), String> {
    let keys = [
        "results/es_status/b.json",
        "results/es_status/a.json",
        "results/es_status_v2/a.json",
        "results/ecs_status/a.json",
        "envs/mastertest",
    ];
    for key in keys {
        store
            .put_object(key, key.as_bytes().to_vec())
            .await
            .map_err(|e| format!("S3: put_object({key}) failed: {e}"))?;
    }

    let listed = list_all_keys(store, "results/es_status/")
        .await
        .map_err(|e| format!("S3: listing failed: {e}"))?;
    if listed != ["results/es_status/a.json", "results/es_status/b.json"] {
        return Err(format!("S3: wrong keys under results/es_status/: {listed:?}"));
    }

    let everything = list_all_keys(store, "")
        .await
        .map_err(|e| format!("S3: listing failed: {e}"))?;
    let mut expected: Vec<&str> = keys.to_vec();
    expected.sort_unstable();
    if everything != expected {
        return Err(format!("S3: full listing was {everything:?}, expected {expected:?}"));
    }
    Ok(())
}
