//! Fingerprint-gated persistence of chunks.
//!
//! A chunk is only written when its fingerprint differs from the stored one,
//! so unchanged chunks keep their validator across runs. Indices left over
//! from a longer previous run are deleted.

use crate::chunker::Chunk;
use crate::fingerprint::fingerprint;
use crate::metrics_defs::{CHUNKS_DELETED, CHUNKS_WRITTEN};
use crate::stats::RunStats;
use crate::store::{KvStore, StoreError, keys};
use chrono::{SecondsFormat, Utc};
use shared::counter;

/// What a call to [`write_chunks`] changed in the store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WriteOutcome {
    /// 1-based indices whose body and fingerprint were rewritten.
    pub changed: Vec<usize>,
    /// 1-based indices removed because the new run produced fewer chunks.
    pub deleted: Vec<usize>,
    pub previous_total: usize,
    pub total: usize,
}

impl WriteOutcome {
    /// True iff any chunk was rewritten or the number of chunks changed.
    pub fn updated(&self) -> bool {
        !self.changed.is_empty() || self.previous_total != self.total
    }
}

pub async fn write_chunks(
    store: &dyn KvStore,
    chunks: &[Chunk],
    base64_output: bool,
    stats: &RunStats,
) -> Result<WriteOutcome, StoreError> {
    let mode = if base64_output { "1" } else { "0" };
    let mode_changed = store.get(keys::LAST_BASE64_SETTING).await?.as_deref() != Some(mode);

    let previous_total = read_total(store).await?;
    let total = chunks.len();

    let mut changed = Vec::new();
    for (position, chunk) in chunks.iter().enumerate() {
        let index = position + 1;
        let etag = fingerprint(&chunk.body);
        let stored = store.get(&keys::chunk_etag(index)).await?;

        if mode_changed || stored.as_deref() != Some(etag.as_str()) {
            store.put(&keys::chunk_body(index), &chunk.body).await?;
            store.put(&keys::chunk_etag(index), &etag).await?;
            changed.push(index);
        }
    }

    let mut deleted = Vec::new();
    for index in (total + 1)..=previous_total {
        store.delete(&keys::chunk_body(index)).await?;
        store.delete(&keys::chunk_etag(index)).await?;
        deleted.push(index);
    }

    store.put(keys::CHUNKS_TOTAL, &total.to_string()).await?;
    store.put(keys::LAST_BASE64_SETTING, mode).await?;
    store
        .put(
            keys::LAST_UPDATED,
            &Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        )
        .await?;
    store.put_json(keys::LAST_STATS, stats).await?;

    counter!(CHUNKS_WRITTEN).increment(changed.len() as u64);
    counter!(CHUNKS_DELETED).increment(deleted.len() as u64);

    Ok(WriteOutcome {
        changed,
        deleted,
        previous_total,
        total,
    })
}

/// Number of chunks currently published. Missing or unparseable counts as 0.
pub async fn read_total(store: &dyn KvStore) -> Result<usize, StoreError> {
    Ok(store
        .get(keys::CHUNKS_TOTAL)
        .await?
        .and_then(|raw| raw.trim().parse().ok())
        .unwrap_or(0))
}
