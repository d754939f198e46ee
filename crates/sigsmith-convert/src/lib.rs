//! # sigsmith-convert
//!
//! The conversion side of sigsmith: the closed set of output dialects
//! ([`Format`]), the pure per-dialect renderers, the [`Signature`] record
//! they produce, and the [`Converter`] engine that fans a batch of
//! techniques out over the requested formats.
//!
//! Everything here is deterministic and side-effect-free: renderers map
//! technique content to rule text byte-for-byte reproducibly, and the
//! engine returns a complete success/skip/failure partition without
//! touching persistence.
//!
//! ## Quick start
//!
//! ```rust
//! use sigsmith_catalog::Technique;
//! use sigsmith_convert::{Converter, Format};
//!
//! let mut t = Technique::new("T1055", "Process Injection");
//! t.tactics = vec!["defense-evasion".into()];
//! t.platforms = vec!["Windows".into()];
//! t.revision = 1;
//!
//! let report = Converter::new(Format::ALL.to_vec())
//!     .convert(&[t], &[], &Default::default());
//! assert_eq!(report.rendered_count(), 3);
//! assert_eq!(report.signatures[0].rule_name, "mitre_t1055_yara");
//! ```

pub mod engine;
pub mod error;
pub mod format;
pub mod hints;
pub mod render;
pub mod signature;

pub use engine::{ConversionFailure, ConversionReport, Converter};
pub use error::RenderError;
pub use format::Format;
pub use render::render;
pub use signature::Signature;
