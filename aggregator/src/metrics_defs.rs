//! Metrics definitions for the aggregator.

use shared::metrics_defs::{MetricDef, MetricType};

pub const RUN_DURATION: MetricDef = MetricDef {
    name: "aggregator.run.duration",
    metric_type: MetricType::Histogram,
    description: "Time to complete one aggregation run in seconds",
};

pub const RUN_FAILED: MetricDef = MetricDef {
    name: "aggregator.run.failed",
    metric_type: MetricType::Counter,
    description: "Number of aggregation runs aborted by a storage failure",
};

pub const SOURCES_OK: MetricDef = MetricDef {
    name: "aggregator.sources.ok",
    metric_type: MetricType::Counter,
    description: "Number of sources fetched successfully",
};

pub const SOURCES_FAILED: MetricDef = MetricDef {
    name: "aggregator.sources.failed",
    metric_type: MetricType::Counter,
    description: "Number of sources that could not be fetched",
};

pub const RECORDS_PARSED: MetricDef = MetricDef {
    name: "aggregator.records.parsed",
    metric_type: MetricType::Counter,
    description: "Number of lines parsed into a record, tagged by scheme",
};

pub const RECORDS_FAILED: MetricDef = MetricDef {
    name: "aggregator.records.failed",
    metric_type: MetricType::Counter,
    description: "Number of lines that failed to parse, tagged by scheme",
};

pub const RECORDS_UNIQUE: MetricDef = MetricDef {
    name: "aggregator.records.unique",
    metric_type: MetricType::Gauge,
    description: "Number of unique records published by the last run",
};

pub const RECORDS_DUPLICATE: MetricDef = MetricDef {
    name: "aggregator.records.duplicate",
    metric_type: MetricType::Histogram,
    description: "Number of duplicate records dropped per run",
};

pub const CHUNKS_WRITTEN: MetricDef = MetricDef {
    name: "aggregator.chunks.written",
    metric_type: MetricType::Counter,
    description: "Number of chunks rewritten because their fingerprint changed",
};

pub const CHUNKS_DELETED: MetricDef = MetricDef {
    name: "aggregator.chunks.deleted",
    metric_type: MetricType::Counter,
    description: "Number of excess chunks deleted after the chunk count shrank",
};

pub const CHUNK_SERVED: MetricDef = MetricDef {
    name: "aggregator.chunk.served",
    metric_type: MetricType::Counter,
    description: "Number of chunk requests answered with a body",
};

pub const CHUNK_NOT_MODIFIED: MetricDef = MetricDef {
    name: "aggregator.chunk.not_modified",
    metric_type: MetricType::Counter,
    description: "Number of chunk requests answered with 304 Not Modified",
};

pub const REFRESH_RATE_LIMITED: MetricDef = MetricDef {
    name: "aggregator.refresh.rate_limited",
    metric_type: MetricType::Counter,
    description: "Number of refresh requests rejected by the rate limiter",
};

pub const ALL_METRICS: &[MetricDef] = &[
    RUN_DURATION,
    RUN_FAILED,
    SOURCES_OK,
    SOURCES_FAILED,
    RECORDS_PARSED,
    RECORDS_FAILED,
    RECORDS_UNIQUE,
    RECORDS_DUPLICATE,
    CHUNKS_WRITTEN,
    CHUNKS_DELETED,
    CHUNK_SERVED,
    CHUNK_NOT_MODIFIED,
    REFRESH_RATE_LIMITED,
];
