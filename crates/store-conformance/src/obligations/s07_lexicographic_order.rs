//! S7: Lexicographic order is chronological order.
//!
//! Records written out of order are listed, and resolved as latest, by
//! UUID order.

use std::sync::Arc;

use foursight_storage::{CheckRecord, CheckStatus, ObjectStore, ResultStore};

use crate::fixtures::{self, UUIDS};

pub async fn test_s07_lexicographic_order(store: Arc<dyn ObjectStore>) -> Result<(), String> {
    let results = ResultStore::new(store, "results");
    for index in [2, 0, 3, 1] {
        results
            .store(&fixtures::check_record("ecs_status", UUIDS[index], CheckStatus::Pass, false))
            .await
            .map_err(|e| format!("S7: store failed: {e}"))?;
    }

    let uuids = results
        .list_uuids("ecs_status")
        .await
        .map_err(|e| format!("S7: list_uuids failed: {e}"))?;
    if uuids != UUIDS {
        return Err(format!("S7: uuids listed as {uuids:?}"));
    }

    let latest: Option<CheckRecord> = results
        .latest("ecs_status")
        .await
        .map_err(|e| format!("S7: latest failed: {e}"))?;
    match latest {
        Some(record) if record.uuid == UUIDS[3] => Ok(()),
        other => Err(format!("S7: latest was {other:?}")),
    }
}
