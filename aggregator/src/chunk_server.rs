use crate::fingerprint::fingerprint;
use crate::metrics_defs::{CHUNK_NOT_MODIFIED, CHUNK_SERVED};
use crate::store::{KvStore, StoreError, keys};
use crate::writer::read_total;
use shared::counter;

const CHUNK_NAME_PREFIX: &str = "sub_";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChunkLookup {
    NotFound,
    NotModified { etag: String },
    Found { body: String, etag: String },
}

/// Parses an externally visible chunk name such as `sub_3` into its 1-based
/// index.
pub fn parse_chunk_name(name: &str) -> Option<usize> {
    let digits = name.strip_prefix(CHUNK_NAME_PREFIX)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok().filter(|index| *index > 0)
}

/// Looks up chunk `index`. A validator from the caller that matches the
/// stored fingerprint yields `NotModified`.
pub async fn lookup_chunk(
    store: &dyn KvStore,
    index: usize,
    if_none_match: Option<&str>,
) -> Result<ChunkLookup, StoreError> {
    let total = read_total(store).await?;
    if index == 0 || index > total {
        return Ok(ChunkLookup::NotFound);
    }

    let Some(body) = store.get(&keys::chunk_body(index)).await? else {
        return Ok(ChunkLookup::NotFound);
    };

    // Chunks are always written together with their fingerprint. Recompute
    // if it has gone missing.
    let etag = match store.get(&keys::chunk_etag(index)).await? {
        Some(etag) => etag,
        None => fingerprint(&body),
    };

    if if_none_match.is_some_and(|header| etag_matches(header, &etag)) {
        counter!(CHUNK_NOT_MODIFIED).increment(1);
        return Ok(ChunkLookup::NotModified { etag });
    }

    counter!(CHUNK_SERVED).increment(1);
    Ok(ChunkLookup::Found { body, etag })
}

/// Matches an `If-None-Match` header value against a fingerprint. Accepts
/// quoted and bare tags, weak tags, comma separated lists and `*`.
pub fn etag_matches(header: &str, etag: &str) -> bool {
    header.split(',').map(str::trim).any(|candidate| {
        if candidate == "*" {
            return true;
        }
        let candidate = candidate.strip_prefix("W/").unwrap_or(candidate);
        candidate.trim_matches('"') == etag
    })
}
