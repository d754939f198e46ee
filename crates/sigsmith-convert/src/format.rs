//! The closed set of output rule dialects.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Output rule dialect. A closed set dispatched exhaustively; adding a
/// dialect means the compiler walks you through every match site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    Yara,
    Sigma,
    Kql,
}

impl Format {
    pub const ALL: [Format; 3] = [Format::Yara, Format::Sigma, Format::Kql];

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "yara" => Some(Format::Yara),
            "sigma" => Some(Format::Sigma),
            "kql" => Some(Format::Kql),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Format::Yara => "yara",
            Format::Sigma => "sigma",
            Format::Kql => "kql",
        }
    }

    /// Canonical file extension for exported rules.
    pub fn extension(&self) -> &'static str {
        match self {
            Format::Yara => "yar",
            Format::Sigma => "yml",
            Format::Kql => "kql",
        }
    }

    /// The stable rule identifier for a technique in this dialect, derived
    /// solely from `(technique_id, format)` so re-rendering always names the
    /// rule identically.
    ///
    /// YARA and KQL identifiers must match `[a-zA-Z0-9_]+`, so dots become
    /// underscores: `T1055.012` → `mitre_t1055_012_yara`. Sigma rule names
    /// use the kebab convention: `mitre-t1055-012-sigma`.
    pub fn rule_name(&self, technique_id: &str) -> String {
        let id = technique_id.to_ascii_lowercase();
        match self {
            Format::Yara | Format::Kql => {
                format!("mitre_{}_{}", id.replace('.', "_"), self.as_str())
            }
            Format::Sigma => format!("mitre-{}-{}", id.replace('.', "-"), self.as_str()),
        }
    }

    /// Export filename: rule name plus the canonical extension. Exported
    /// names therefore match in-database rule identifiers.
    pub fn file_name(&self, technique_id: &str) -> String {
        format!("{}.{}", self.rule_name(technique_id), self.extension())
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
