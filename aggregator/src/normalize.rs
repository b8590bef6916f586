use crate::bulk::{split_lines, unwrap_bulk};
use crate::codec::{self, ProxyRecord};
use indexmap::IndexMap;
use indexmap::map::Entry;
use std::collections::BTreeMap;

/// Counters collected while parsing the fetched texts.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ParseStats {
    pub lines_total: usize,
    pub parsed_by_scheme: BTreeMap<String, usize>,
    pub failed_by_scheme: BTreeMap<String, usize>,
}

impl ParseStats {
    pub fn parsed(&self) -> usize {
        self.parsed_by_scheme.values().sum()
    }

    pub fn failed(&self) -> usize {
        self.failed_by_scheme.values().sum()
    }
}

/// Accumulates records from any number of raw texts.
#[derive(Debug, Default)]
pub struct Normalizer {
    records: Vec<ProxyRecord>,
    stats: ParseStats,
}

/// Output of [`Normalizer::finish`].
#[derive(Debug)]
pub struct Normalized {
    pub unique: Vec<ProxyRecord>,
    pub duplicates: usize,
    pub stats: ParseStats,
}

impl Normalizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Unwraps, splits and parses one fetched text. Lines that fail to parse
    /// are only counted.
    pub fn ingest(&mut self, raw: &str) {
        let body = unwrap_bulk(raw);

        for line in split_lines(&body) {
            self.stats.lines_total += 1;
            let label = codec::scheme_label(line);

            match codec::parse(line) {
                Some(record) => {
                    *self.stats.parsed_by_scheme.entry(label).or_default() += 1;
                    self.records.push(record);
                }
                None => {
                    tracing::debug!(scheme = %label, "dropping unparseable line");
                    *self.stats.failed_by_scheme.entry(label).or_default() += 1;
                }
            }
        }
    }

    pub fn finish(self) -> Normalized {
        let total = self.records.len();
        let unique = dedup(self.records);

        Normalized {
            duplicates: total - unique.len(),
            unique,
            stats: self.stats,
        }
    }
}

/// Keeps the first record for every [`codec::DedupKey`], preserving input
/// order. Records without a server or port are dropped here as well.
pub fn dedup(records: Vec<ProxyRecord>) -> Vec<ProxyRecord> {
    let mut seen: IndexMap<codec::DedupKey, ProxyRecord> = IndexMap::with_capacity(records.len());

    for record in records.into_iter().filter(ProxyRecord::is_valid) {
        if let Entry::Vacant(slot) = seen.entry(record.dedup_key()) {
            slot.insert(record);
        }
    }

    seen.into_values().collect()
}
