//! # sigsmith-store
//!
//! SQLite persistence for sigsmith: techniques keyed by id, signatures keyed
//! by `(technique_id, format)`, with the upsert/versioning discipline that
//! keeps repeated ingestion idempotent and derived signatures free of
//! duplicates and staleness lies.
//!
//! Invariants enforced here:
//! - a technique's revision advances exactly when its content hash changes;
//! - at most one signature row exists per `(technique_id, format)`;
//! - signatures are only removed by explicit purge, techniques never
//!   silently at all.
//!
//! ## Quick start
//!
//! ```rust
//! use sigsmith_catalog::Technique;
//! use sigsmith_store::{Store, TechniqueFilter, TechniqueUpsert};
//!
//! let store = Store::open_in_memory().unwrap();
//! let mut t = Technique::new("T1055", "Process Injection");
//! t.tactics = vec!["defense-evasion".into()];
//!
//! assert_eq!(store.upsert_technique(&t).unwrap(), TechniqueUpsert::Inserted(1));
//! assert_eq!(store.upsert_technique(&t).unwrap(), TechniqueUpsert::Unchanged(1));
//!
//! let listed = store
//!     .list_techniques(&TechniqueFilter::Tactic("defense-evasion".into()))
//!     .unwrap();
//! assert_eq!(listed[0].id, "T1055");
//! ```

pub mod error;
pub mod store;

pub use error::{Result, StoreError};
pub use store::{SignatureFilter, Store, TechniqueFilter, TechniqueUpsert};
