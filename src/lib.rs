//! fastfind: a cross-platform, in-memory filesystem search engine. Strings
//! are interned once (`string_pool`), entries live in a fixed-layout
//! `EntryRecord` table (`entry`/`index_store`) indexed by a path trie
//! (`path_trie`), queries compile to a straight-line predicate stack
//! (`query`) backed by a SIMD-accelerated matcher (`matcher`), a worker-pool
//! enumerator walks the filesystem (`enumerator`), a `notify`-backed monitor
//! tracks live changes (`watcher`), and a SQLite+FTS5 layer persists the
//! index across runs (`persistence`). `engine` ties all of it together
//! behind a single orchestrator facade.

pub mod cancellation;
pub mod config;
pub mod engine;
pub mod entry;
pub mod enumerator;
pub mod error;
pub mod ignore_policy;
pub mod index_store;
pub mod logging;
pub mod matcher;
pub mod path_trie;
pub mod persistence;
pub mod query;
pub mod string_pool;
pub mod watcher;

pub use cancellation::CancellationToken;
pub use config::EngineConfig;
pub use engine::{EngineEvent, EngineStatistics, IndexingPhase, SearchEngine};
pub use entry::{EntryAttributes, EntryRecord};
pub use error::{EngineError, EngineResult};
pub use query::{SearchQuery, SearchResult};
pub use watcher::ChangeKind;
