//! S6: Result history layout.
//!
//! A result store over the backend writes `<prefix>/<name>/<uuid>.json`
//! bodies and `.primary` markers, and resolves latest and primary from the
//! listing alone.

use std::sync::Arc;

use foursight_storage::{list_all_keys, CheckRecord, CheckStatus, ObjectStore, ResultStore};

use crate::fixtures::{self, UUIDS};

pub async fn test_s06_result_layout(store: Arc<dyn ObjectStore>) -> Result<(), String> {
    let results = ResultStore::new(store.clone(), "results");
    results
        .store(&fixtures::check_record("es_status", UUIDS[0], CheckStatus::Pass, true))
        .await
        .map_err(|e| format!("S6: store failed: {e}"))?;
    results
        .store(&fixtures::check_record("es_status", UUIDS[1], CheckStatus::Warn, false))
        .await
        .map_err(|e| format!("S6: store failed: {e}"))?;

    let keys = list_all_keys(store.as_ref(), "results/")
        .await
        .map_err(|e| format!("S6: listing failed: {e}"))?;
    let expected = [
        format!("results/es_status/{}.json", UUIDS[0]),
        format!("results/es_status/{}.primary", UUIDS[0]),
        format!("results/es_status/{}.json", UUIDS[1]),
    ];
    if keys != expected {
        return Err(format!("S6: layout was {keys:?}, expected {expected:?}"));
    }

    let latest: Option<CheckRecord> = results
        .latest("es_status")
        .await
        .map_err(|e| format!("S6: latest failed: {e}"))?;
    if latest.as_ref().map(|r| r.uuid.as_str()) != Some(UUIDS[1]) {
        return Err(format!("S6: latest was {latest:?}"));
    }

    let primary: Option<CheckRecord> = results
        .primary("es_status")
        .await
        .map_err(|e| format!("S6: primary failed: {e}"))?;
    if primary.as_ref().map(|r| r.uuid.as_str()) != Some(UUIDS[0]) {
        return Err(format!("S6: primary was {primary:?}"));
    }
    Ok(())
}
