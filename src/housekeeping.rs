//! CRL housekeeping: the periodic job that keeps the store's view of every
//! configured certificate revocation list current.
//!
//! # Features
//! - Fetching CRLs from configured distribution points, with retries
//! - Parsing DER CRLs into metadata (validity window, revoked serials)
//! - Change detection via blob hashes, skipping redundant writes
//! - Per-source health classification and retention-based cleanup
//! - Draining a queue of large CRLs deferred by an upstream component

mod cleanup;
mod errors;
mod fetcher;
mod health;
mod job;
mod parser;
mod queue;
pub mod records;
pub mod scheduler;
mod types;

pub use errors::{FetchError, FetchResult, JobError, ParseError, ParseResult};
pub use fetcher::{CrlFetch, HttpFetcher};
pub use job::HousekeepingJob;
pub use parser::parse_crl;
pub use queue::QueueEntry;
pub use records::RecordStore;
pub use types::{
    CrlFields, CrlMetadata, CrlRecord, HealthState, HealthStatus, PartialRecord, QueueOutcome,
    RecordLookup, RunReport, RunSummary,
};
