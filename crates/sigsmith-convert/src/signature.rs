//! The canonical representation of one generated detection rule.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::format::Format;

/// A generated detection rule in one dialect, derived from exactly one
/// technique. At most one current signature exists per
/// `(technique_id, format)` pair; regeneration replaces the body and
/// provenance revision in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signature {
    pub technique_id: String,
    pub format: Format,
    /// Stable rule identifier, derived solely from `(technique_id, format)`
    /// via [`Format::rule_name`].
    pub rule_name: String,
    /// Rendered rule text.
    pub body: String,
    /// The technique revision the body was rendered from.
    pub generated_from_revision: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Signature {
    /// Build a complete signature for freshly rendered rule text.
    pub fn new(
        technique_id: impl Into<String>,
        format: Format,
        body: impl Into<String>,
        generated_from_revision: u64,
    ) -> Self {
        let technique_id = technique_id.into();
        let now = Utc::now();
        Signature {
            rule_name: format.rule_name(&technique_id),
            technique_id,
            format,
            body: body.into(),
            generated_from_revision,
            created_at: now,
            updated_at: now,
        }
    }

    /// A signature is stale when it was rendered from an older technique
    /// revision than the one currently stored.
    pub fn is_stale(&self, current_revision: u64) -> bool {
        self.generated_from_revision != current_revision
    }

    /// Export filename (rule name + dialect extension).
    pub fn file_name(&self) -> String {
        self.format.file_name(&self.technique_id)
    }
}
