//! The canonical in-memory representation of one ATT&CK technique.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A MITRE ATT&CK technique or sub-technique.
///
/// Produced by the STIX parser ([`crate::stix`]) and stored/loaded by the
/// persistence layer. The `revision` field is owned by the store: parsed
/// techniques carry `0` ("not yet persisted") and receive their real
/// revision on upsert or load.
///
/// List fields (`tactics`, `platforms`, `data_sources`) are kept sorted and
/// deduplicated so that content comparison is independent of upstream
/// ordering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Technique {
    /// External id (`T1055`, `T1055.012`). Unique, immutable once stored.
    pub id: String,
    pub name: String,
    pub description: String,
    /// Kill-chain phase names (e.g. `defense-evasion`). Non-empty for valid
    /// techniques; an empty set makes dialects that require tactics fail
    /// with a render error rather than producing broken rules.
    pub tactics: Vec<String>,
    /// Platform labels. Empty means environment-agnostic.
    pub platforms: Vec<String>,
    pub data_sources: Vec<String>,
    /// Free-text detection guidance from the catalog, used by renderers as
    /// evidence hints.
    pub detection: Option<String>,
    pub is_subtechnique: bool,
    /// Parent technique id for sub-techniques. A weak reference: it may be
    /// dangling during partial catalog loads.
    pub parent_id: Option<String>,
    /// Storage revision. `0` until the store assigns one.
    #[serde(default)]
    pub revision: u64,
}

impl Technique {
    /// Build a technique from its external id and name, deriving the
    /// sub-technique linkage from the dotted id form.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        let id = id.into();
        let parent_id = parent_of(&id);
        Technique {
            is_subtechnique: parent_id.is_some(),
            parent_id,
            id,
            name: name.into(),
            description: String::new(),
            tactics: Vec::new(),
            platforms: Vec::new(),
            data_sources: Vec::new(),
            detection: None,
            revision: 0,
        }
    }

    /// Sort and deduplicate the list fields.
    pub fn normalize(&mut self) {
        for list in [
            &mut self.tactics,
            &mut self.platforms,
            &mut self.data_sources,
        ] {
            list.sort();
            list.dedup();
        }
    }

    /// The base technique id: `T1055.012` → `T1055`, `T1055` → `T1055`.
    pub fn base_id(&self) -> &str {
        self.id.split('.').next().unwrap_or(&self.id)
    }

    /// The ATT&CK site URL for this technique.
    pub fn attack_url(&self) -> String {
        format!(
            "https://attack.mitre.org/techniques/{}/",
            self.id.replace('.', "/")
        )
    }

    /// SHA-256 over the canonical field encoding. `revision` is excluded:
    /// the hash answers "did the catalog content change", which is what
    /// drives revision bumps in the store.
    pub fn content_hash(&self) -> String {
        let mut hasher = Sha256::new();
        for part in [&self.id, &self.name, &self.description] {
            hasher.update(part.as_bytes());
            hasher.update([0x1f]);
        }
        for list in [&self.tactics, &self.platforms, &self.data_sources] {
            let mut sorted: Vec<&str> = list.iter().map(String::as_str).collect();
            sorted.sort_unstable();
            for item in sorted {
                hasher.update(item.as_bytes());
                hasher.update([0x1e]);
            }
            hasher.update([0x1f]);
        }
        if let Some(detection) = &self.detection {
            hasher.update(detection.as_bytes());
        }
        hasher.update([0x1f, self.is_subtechnique as u8]);
        if let Some(parent) = &self.parent_id {
            hasher.update(parent.as_bytes());
        }
        format!("{:x}", hasher.finalize())
    }

    /// Whether this technique applies to the given platform.
    ///
    /// An empty platform set means environment-agnostic (applies to all).
    /// Matching is case-insensitive and a stored label also matches a more
    /// specific query (`Windows` matches `windows server`).
    pub fn applies_to_platform(&self, platform: &str) -> bool {
        if self.platforms.is_empty() {
            return true;
        }
        let query = platform.to_ascii_lowercase();
        self.platforms.iter().any(|p| {
            let stored = p.to_ascii_lowercase();
            stored == query || query.contains(&stored)
        })
    }

    /// Extract cleaned, usable lines from the catalog's detection text:
    /// bullet markers stripped, blank lines dropped, plus `Data Source: X`
    /// entries for each known data source. These are the renderers' prose
    /// evidence hints.
    pub fn detection_patterns(&self) -> Vec<String> {
        let mut patterns = Vec::new();
        if let Some(detection) = &self.detection {
            for line in detection.lines() {
                let cleaned = line.trim().trim_start_matches(['-', '*', ' ']).trim();
                if !cleaned.is_empty() {
                    patterns.push(cleaned.to_string());
                }
            }
        }
        for source in &self.data_sources {
            patterns.push(format!("Data Source: {source}"));
        }
        patterns
    }
}

/// Derive the parent id from a dotted sub-technique id.
/// Returns `None` for top-level technique ids.
pub fn parent_of(id: &str) -> Option<String> {
    id.split_once('.').map(|(parent, _)| parent.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Technique {
        let mut t = Technique::new("T1055", "Process Injection");
        t.description = "Adversaries may inject code into processes.".into();
        t.tactics = vec!["defense-evasion".into(), "privilege-escalation".into()];
        t.platforms = vec!["Windows".into(), "Linux".into()];
        t.detection = Some("Monitor for process access.\n- Look for remote threads".into());
        t.normalize();
        t
    }

    #[test]
    fn parent_derived_from_dotted_id() {
        let sub = Technique::new("T1055.012", "Process Hollowing");
        assert!(sub.is_subtechnique);
        assert_eq!(sub.parent_id.as_deref(), Some("T1055"));
        assert_eq!(sub.base_id(), "T1055");

        let top = Technique::new("T1055", "Process Injection");
        assert!(!top.is_subtechnique);
        assert_eq!(top.parent_id, None);
    }

    #[test]
    fn attack_url_maps_dots_to_slashes() {
        let sub = Technique::new("T1055.012", "Process Hollowing");
        assert_eq!(
            sub.attack_url(),
            "https://attack.mitre.org/techniques/T1055/012/"
        );
    }

    #[test]
    fn content_hash_is_stable() {
        assert_eq!(sample().content_hash(), sample().content_hash());
    }

    #[test]
    fn content_hash_ignores_revision() {
        let mut t = sample();
        let before = t.content_hash();
        t.revision = 7;
        assert_eq!(t.content_hash(), before);
    }

    #[test]
    fn content_hash_ignores_list_order() {
        let mut a = sample();
        a.tactics = vec!["privilege-escalation".into(), "defense-evasion".into()];
        assert_eq!(a.content_hash(), sample().content_hash());
    }

    #[test]
    fn content_hash_changes_with_content() {
        let mut t = sample();
        t.description.push_str(" Updated.");
        assert_ne!(t.content_hash(), sample().content_hash());
    }

    #[test]
    fn platform_applicability() {
        let t = sample();
        assert!(t.applies_to_platform("windows"));
        assert!(t.applies_to_platform("Windows Server 2022"));
        assert!(!t.applies_to_platform("macOS"));

        let agnostic = Technique::new("T1078", "Valid Accounts");
        assert!(agnostic.applies_to_platform("anything"));
    }

    #[test]
    fn detection_patterns_strip_bullets_and_add_sources() {
        let mut t = sample();
        t.data_sources = vec!["Process: OS API Execution".into()];
        let patterns = t.detection_patterns();
        assert!(patterns.contains(&"Monitor for process access.".to_string()));
        assert!(patterns.contains(&"Look for remote threads".to_string()));
        assert!(patterns.contains(&"Data Source: Process: OS API Execution".to_string()));
    }
}
