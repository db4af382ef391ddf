use std::collections::BTreeSet;
use std::sync::Arc;

use serde_json::{json, Value};
use time::OffsetDateTime;

use crate::error::StorageError;
use crate::record::StoredRecord;
use crate::timestamp::parse_uuid;
use crate::traits::{list_all_keys, ObjectStore};

/// Largest serialized record the store will write.
pub const LAMBDA_MAX_BODY_SIZE: usize = 5_500_000;

const RECORD_SUFFIX: &str = ".json";
const PRIMARY_SUFFIX: &str = ".primary";

/// Append-only, per-name history of results over an [`ObjectStore`].
///
/// Layout:
/// - `<prefix>/<name>/<uuid>.json`: the record body
/// - `<prefix>/<name>/<uuid>.primary`: empty marker, present iff the
///   record's kwargs carry `primary = true`
///
/// Nothing is ever rewritten or compacted. A second write of the same
/// `(name, uuid)` replaces the first (last writer wins).
#[derive(Clone)]
pub struct ResultStore {
    objects: Arc<dyn ObjectStore>,
    prefix: String,
    max_body_size: usize,
}

/// UUIDs found under one name, from a single listing.
struct NameListing {
    records: Vec<String>,
    primaries: BTreeSet<String>,
}

impl ResultStore {
    pub fn new(objects: Arc<dyn ObjectStore>, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into().trim_matches('/').to_string();
        ResultStore {
            objects,
            prefix,
            max_body_size: LAMBDA_MAX_BODY_SIZE,
        }
    }

    /// Override the body limit (tests use small limits).
    pub fn with_max_body_size(mut self, max_body_size: usize) -> Self {
        self.max_body_size = max_body_size;
        self
    }

    pub fn objects(&self) -> &Arc<dyn ObjectStore> {
        &self.objects
    }

    pub fn max_body_size(&self) -> usize {
        self.max_body_size
    }

    fn root(&self) -> String {
        if self.prefix.is_empty() {
            String::new()
        } else {
            format!("{}/", self.prefix)
        }
    }

    fn name_prefix(&self, name: &str) -> String {
        format!("{}{}/", self.root(), name)
    }

    pub fn record_key(&self, name: &str, uuid: &str) -> String {
        format!("{}{}{}", self.name_prefix(name), uuid, RECORD_SUFFIX)
    }

    pub fn primary_marker_key(&self, name: &str, uuid: &str) -> String {
        format!("{}{}{}", self.name_prefix(name), uuid, PRIMARY_SUFFIX)
    }

    // ── Writes ────────────────────────────────────────────────────────────────

    /// Persist `record` under `(name, uuid)`, truncating its bulky output if
    /// the serialized body would exceed the limit. The primary marker is
    /// written after the body, so a marker never points at a missing write.
    ///
    /// Returns the record as stored.
    pub async fn store<R: StoredRecord>(&self, record: &R) -> Result<R, StorageError> {
        let key = self.record_key(record.name(), record.uuid());
        let mut stored = record.clone();
        let body = fit_to_body_limit(&mut stored, &key, self.max_body_size)?;
        self.objects.put_object(&key, body).await?;
        if stored.is_primary() {
            let marker = self.primary_marker_key(stored.name(), stored.uuid());
            self.objects.put_object(&marker, Vec::new()).await?;
        }
        Ok(stored)
    }

    // ── Reads ─────────────────────────────────────────────────────────────────

    /// Read one record. `Ok(None)` if it was never written (or is not yet
    /// visible).
    pub async fn get<R: StoredRecord>(
        &self,
        name: &str,
        uuid: &str,
    ) -> Result<Option<R>, StorageError> {
        let key = self.record_key(name, uuid);
        match self.objects.get_object(&key).await? {
            Some(body) => serde_json::from_slice(&body)
                .map(Some)
                .map_err(|e| StorageError::Corrupted {
                    key,
                    message: e.to_string(),
                }),
            None => Ok(None),
        }
    }

    async fn scan(&self, name: &str) -> Result<NameListing, StorageError> {
        let prefix = self.name_prefix(name);
        let mut records = Vec::new();
        let mut primaries = BTreeSet::new();
        for key in list_all_keys(self.objects.as_ref(), &prefix).await? {
            let Some(rest) = key.strip_prefix(&prefix) else {
                continue;
            };
            if rest.contains('/') {
                continue;
            }
            if let Some(uuid) = rest.strip_suffix(RECORD_SUFFIX) {
                records.push(uuid.to_string());
            } else if let Some(uuid) = rest.strip_suffix(PRIMARY_SUFFIX) {
                primaries.insert(uuid.to_string());
            }
        }
        records.sort();
        Ok(NameListing { records, primaries })
    }

    /// Every stored UUID for `name`, oldest first.
    pub async fn list_uuids(&self, name: &str) -> Result<Vec<String>, StorageError> {
        Ok(self.scan(name).await?.records)
    }

    /// Whether anything has ever been stored for `name`.
    pub async fn has_history(&self, name: &str) -> Result<bool, StorageError> {
        Ok(!self.scan(name).await?.records.is_empty())
    }

    /// The record with the greatest UUID.
    pub async fn latest<R: StoredRecord>(&self, name: &str) -> Result<Option<R>, StorageError> {
        let listing = self.scan(name).await?;
        for uuid in listing.records.iter().rev() {
            if let Some(record) = self.get(name, uuid).await? {
                return Ok(Some(record));
            }
        }
        Ok(None)
    }

    /// The record with the greatest UUID among those run with `primary=true`.
    pub async fn primary<R: StoredRecord>(&self, name: &str) -> Result<Option<R>, StorageError> {
        let listing = self.scan(name).await?;
        for uuid in listing.primaries.iter().rev() {
            if let Some(record) = self.get::<R>(name, uuid).await? {
                if record.is_primary() {
                    return Ok(Some(record));
                }
            }
        }
        Ok(None)
    }

    /// The record whose UUID timestamp is nearest to `target`. Ties go to
    /// the earlier record. UUIDs that do not parse as timestamps are skipped.
    pub async fn closest_to<R: StoredRecord>(
        &self,
        name: &str,
        target: OffsetDateTime,
    ) -> Result<Option<R>, StorageError> {
        let listing = self.scan(name).await?;
        let mut best: Option<(time::Duration, &str)> = None;
        for uuid in &listing.records {
            let Some(at) = parse_uuid(uuid) else {
                tracing::warn!(name, uuid = uuid.as_str(), "skipping result with unparseable uuid");
                continue;
            };
            let distance = (at - target).abs();
            // Ascending iteration plus strict comparison keeps the earlier
            // record on a tie.
            if best.map_or(true, |(d, _)| distance < d) {
                best = Some((distance, uuid.as_str()));
            }
        }
        match best {
            Some((_, uuid)) => self.get(name, uuid).await,
            None => Ok(None),
        }
    }

    /// Up to `limit` records, newest first. `limit == 0` means no limit.
    pub async fn history<R: StoredRecord>(
        &self,
        name: &str,
        limit: usize,
    ) -> Result<Vec<R>, StorageError> {
        let listing = self.scan(name).await?;
        let mut out = Vec::new();
        for uuid in listing.records.iter().rev() {
            if limit != 0 && out.len() >= limit {
                break;
            }
            if let Some(record) = self.get(name, uuid).await? {
                out.push(record);
            }
        }
        Ok(out)
    }

    /// Distinct result names stored under this prefix, sorted.
    pub async fn names(&self) -> Result<Vec<String>, StorageError> {
        let root = self.root();
        let mut names = BTreeSet::new();
        for key in list_all_keys(self.objects.as_ref(), &root).await? {
            if let Some((name, _)) = key[root.len()..].split_once('/') {
                names.insert(name.to_string());
            }
        }
        Ok(names.into_iter().collect())
    }
}

/// Serialize `record`, replacing its bulky output with
/// `{"truncated": true, "head": <first N bytes>}` when the body would
/// exceed `limit`. N shrinks until the serialized record fits.
fn fit_to_body_limit<R: StoredRecord>(
    record: &mut R,
    key: &str,
    limit: usize,
) -> Result<Vec<u8>, StorageError> {
    let encode = |record: &R| {
        serde_json::to_vec(record).map_err(|e| StorageError::Corrupted {
            key: key.to_string(),
            message: e.to_string(),
        })
    };

    let body = encode(record)?;
    if body.len() <= limit {
        return Ok(body);
    }

    let original = std::mem::take(record.bulky_output_mut());
    let text = match original {
        Value::String(s) => s,
        other => other.to_string(),
    };

    *record.bulky_output_mut() = json!({ "truncated": true, "head": "" });
    let base = encode(record)?.len();
    if base > limit {
        return Err(StorageError::BodyTooLarge {
            key: key.to_string(),
            size: base,
            limit,
        });
    }

    let mut budget = (limit - base).min(text.len());
    loop {
        let head = char_prefix(&text, budget);
        *record.bulky_output_mut() = json!({ "truncated": true, "head": head });
        let body = encode(record)?;
        if body.len() <= limit {
            tracing::warn!(
                key,
                original_bytes = text.len(),
                kept_bytes = head.len(),
                "truncated oversized result output"
            );
            return Ok(body);
        }
        // Escaping can inflate the head; shrink by the overshoot.
        budget = budget.saturating_sub((body.len() - limit).max(1));
    }
}

/// The longest prefix of `text` no longer than `max_bytes` that ends on a
/// char boundary.
fn char_prefix(text: &str, max_bytes: usize) -> &str {
    if max_bytes >= text.len() {
        return text;
    }
    let mut end = max_bytes;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}
