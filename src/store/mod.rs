//! Durable state: the theorem store and the job event journal.
//!
//! Two structures survive process restart: the content-addressed theorem
//! table and the append-only job event log. Both live in SQLite behind a
//! mutexed connection; the theorem table's content-hash primary key is the
//! only synchronization concurrent jobs need.

pub mod journal;
pub mod record;
pub mod schema;
pub mod theorems;

pub use journal::JobJournal;
pub use record::{content_hash, cosine, signature, TheoremRecord, SIGNATURE_DIM};
pub use theorems::SqliteTheoremStore;
