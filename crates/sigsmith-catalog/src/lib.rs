//! # sigsmith-catalog
//!
//! The technique side of sigsmith: the canonical [`Technique`] model, the
//! STIX 2.1 bundle parser that produces it, and the catalog source that
//! fetches/caches the upstream ATT&CK Enterprise bundle.
//!
//! This crate knows nothing about rule rendering or persistence: it turns
//! raw catalog bytes into typed techniques and nothing more.
//!
//! ## Quick start
//!
//! ```rust
//! use sigsmith_catalog::parse_bundle_str;
//!
//! let json = r#"{
//!     "type": "bundle",
//!     "objects": [{
//!         "type": "attack-pattern",
//!         "name": "Process Injection",
//!         "description": "Adversaries may inject code into processes.",
//!         "external_references": [
//!             {"source_name": "mitre-attack", "external_id": "T1055"}
//!         ],
//!         "kill_chain_phases": [
//!             {"kill_chain_name": "mitre-attack", "phase_name": "defense-evasion"}
//!         ],
//!         "x_mitre_platforms": ["Windows"]
//!     }]
//! }"#;
//!
//! let techniques = parse_bundle_str(json).unwrap();
//! assert_eq!(techniques.len(), 1);
//! assert_eq!(techniques[0].id, "T1055");
//! ```

pub mod error;
pub mod model;
pub mod source;
pub mod stix;

pub use error::{CatalogError, Result};
pub use model::Technique;
pub use source::{CatalogSource, FreshnessPolicy, DEFAULT_BUNDLE_URL};
pub use stix::{parse_bundle_file, parse_bundle_str};
