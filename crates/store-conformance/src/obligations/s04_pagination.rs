//! S4: Paginated listing.
//!
//! Pages hold at most `max_keys` keys, continue strictly after the token,
//! and together cover every key exactly once.

use foursight_storage::{list_all_keys, ObjectStore};

use crate::fixtures;

pub async fn test_s04_pagination(store: &dyn ObjectStore) -> Result<(), String> {
    let keys = fixtures::numbered_keys("results/bulk/", 25);
    for key in &keys {
        store
            .put_object(key, Vec::from("x"))
            .await
            .map_err(|e| format!("S4: put_object({key}) failed: {e}"))?;
    }

    let mut collected = Vec::new();
    let mut token: Option<String> = None;
    let mut pages = 0;
    loop {
        let page = store
            .list_objects("results/bulk/", token.as_deref(), 10)
            .await
            .map_err(|e| format!("S4: list_objects failed: {e}"))?;
        if page.keys.len() > 10 {
            return Err(format!("S4: page of {} keys exceeds max_keys", page.keys.len()));
        }
        pages += 1;
        collected.extend(page.keys);
        match page.next_token {
            Some(next) => token = Some(next),
            None => break,
        }
        if pages > 10 {
            return Err("S4: pagination did not terminate".to_string());
        }
    }
    if collected != keys {
        return Err(format!("S4: paged listing returned {} keys out of order or duplicated", collected.len()));
    }
    if pages < 3 {
        return Err(format!("S4: expected at least 3 pages, got {pages}"));
    }

    let all = list_all_keys(store, "results/bulk/")
        .await
        .map_err(|e| format!("S4: list_all_keys failed: {e}"))?;
    if all != keys {
        return Err("S4: list_all_keys disagrees with paged listing".to_string());
    }
    Ok(())
}
