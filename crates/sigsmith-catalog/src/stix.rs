//! STIX 2.1 bundle parsing.
//!
//! Maps the subset of the ATT&CK Enterprise bundle consumed here
//! (`attack-pattern` objects with their `mitre-attack` external references
//! and kill-chain phases) onto [`Technique`] values. Revoked and deprecated
//! objects are skipped; records that are not ATT&CK techniques (no `T`-prefixed
//! external id) are ignored.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use tracing::debug;

use crate::error::{CatalogError, Result};
use crate::model::{parent_of, Technique};

/// Top-level STIX bundle: a type tag plus a flat object list.
#[derive(Debug, Deserialize)]
pub struct StixBundle {
    #[serde(default)]
    pub objects: Vec<StixObject>,
}

/// The fields of a STIX object this parser cares about. Everything else in
/// the bundle is ignored by serde.
#[derive(Debug, Deserialize)]
pub struct StixObject {
    #[serde(rename = "type")]
    pub object_type: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub external_references: Vec<ExternalReference>,
    #[serde(default)]
    pub kill_chain_phases: Vec<KillChainPhase>,
    #[serde(default, rename = "x_mitre_platforms")]
    pub platforms: Vec<String>,
    #[serde(default, rename = "x_mitre_data_sources")]
    pub data_sources: Vec<String>,
    #[serde(default, rename = "x_mitre_detection")]
    pub detection: Option<String>,
    #[serde(default)]
    pub revoked: bool,
    #[serde(default, rename = "x_mitre_deprecated")]
    pub deprecated: bool,
}

#[derive(Debug, Deserialize)]
pub struct ExternalReference {
    pub source_name: String,
    #[serde(default)]
    pub external_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct KillChainPhase {
    pub kill_chain_name: String,
    pub phase_name: String,
}

/// Parse a STIX bundle from a JSON string into techniques.
///
/// Duplicate external ids within the bundle are an error (the upstream
/// contract promises none; if the promise is broken nothing is silently
/// picked).
pub fn parse_bundle_str(json: &str) -> Result<Vec<Technique>> {
    let bundle: StixBundle = serde_json::from_str(json)?;
    techniques_from_bundle(bundle)
}

/// Parse a STIX bundle from a file on disk.
pub fn parse_bundle_file(path: &Path) -> Result<Vec<Technique>> {
    let json = fs::read_to_string(path)?;
    parse_bundle_str(&json)
}

fn techniques_from_bundle(bundle: StixBundle) -> Result<Vec<Technique>> {
    let mut techniques = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    let mut skipped = 0usize;

    for obj in bundle.objects {
        if obj.object_type != "attack-pattern" {
            continue;
        }
        if obj.revoked || obj.deprecated {
            skipped += 1;
            continue;
        }
        let Some(technique) = technique_from_object(obj) else {
            continue;
        };
        if !seen.insert(technique.id.clone()) {
            return Err(CatalogError::DuplicateId(technique.id));
        }
        techniques.push(technique);
    }

    debug!(
        parsed = techniques.len(),
        skipped_revoked = skipped,
        "parsed STIX bundle"
    );
    Ok(techniques)
}

/// Convert one `attack-pattern` object. Returns `None` for objects without a
/// `T`-prefixed `mitre-attack` external id (tactics, matrices, etc. carry
/// other id shapes).
fn technique_from_object(obj: StixObject) -> Option<Technique> {
    let id = obj
        .external_references
        .iter()
        .find(|r| r.source_name == "mitre-attack")
        .and_then(|r| r.external_id.clone())?;
    if !id.starts_with('T') {
        return None;
    }

    let tactics = obj
        .kill_chain_phases
        .iter()
        .filter(|p| p.kill_chain_name == "mitre-attack")
        .map(|p| p.phase_name.clone())
        .collect();

    let parent_id = parent_of(&id);
    let mut technique = Technique {
        is_subtechnique: parent_id.is_some(),
        parent_id,
        id,
        name: obj.name.unwrap_or_default(),
        description: obj.description.unwrap_or_default(),
        tactics,
        platforms: obj.platforms,
        data_sources: obj.data_sources,
        detection: obj.detection.filter(|d| !d.trim().is_empty()),
        revision: 0,
    };
    technique.normalize();
    Some(technique)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BUNDLE: &str = r#"{
        "type": "bundle",
        "id": "bundle--0001",
        "objects": [
            {
                "type": "attack-pattern",
                "name": "Process Injection",
                "description": "Adversaries may inject code into processes.",
                "external_references": [
                    {"source_name": "mitre-attack", "external_id": "T1055"},
                    {"source_name": "capec", "external_id": "CAPEC-242"}
                ],
                "kill_chain_phases": [
                    {"kill_chain_name": "mitre-attack", "phase_name": "defense-evasion"},
                    {"kill_chain_name": "mitre-attack", "phase_name": "privilege-escalation"},
                    {"kill_chain_name": "lockheed", "phase_name": "exploit"}
                ],
                "x_mitre_platforms": ["Windows", "Linux"],
                "x_mitre_data_sources": ["Process: OS API Execution"],
                "x_mitre_detection": "Monitor for suspicious process access."
            },
            {
                "type": "attack-pattern",
                "name": "Process Hollowing",
                "description": "A sub-technique.",
                "external_references": [
                    {"source_name": "mitre-attack", "external_id": "T1055.012"}
                ],
                "kill_chain_phases": [
                    {"kill_chain_name": "mitre-attack", "phase_name": "defense-evasion"}
                ],
                "x_mitre_platforms": ["Windows"]
            },
            {
                "type": "attack-pattern",
                "name": "Old Technique",
                "revoked": true,
                "external_references": [
                    {"source_name": "mitre-attack", "external_id": "T9999"}
                ]
            },
            {
                "type": "x-mitre-tactic",
                "name": "Defense Evasion",
                "external_references": [
                    {"source_name": "mitre-attack", "external_id": "TA0005"}
                ]
            },
            {
                "type": "relationship"
            }
        ]
    }"#;

    #[test]
    fn parses_attack_patterns_only() {
        let techniques = parse_bundle_str(BUNDLE).unwrap();
        let ids: Vec<&str> = techniques.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, ["T1055", "T1055.012"]);
    }

    #[test]
    fn maps_mitre_kill_chain_phases() {
        let techniques = parse_bundle_str(BUNDLE).unwrap();
        let t1055 = &techniques[0];
        // Sorted by normalize(); the lockheed phase is excluded.
        assert_eq!(t1055.tactics, ["defense-evasion", "privilege-escalation"]);
        assert_eq!(t1055.platforms, ["Linux", "Windows"]);
        assert_eq!(
            t1055.detection.as_deref(),
            Some("Monitor for suspicious process access.")
        );
    }

    #[test]
    fn subtechnique_linkage_derived() {
        let techniques = parse_bundle_str(BUNDLE).unwrap();
        let sub = &techniques[1];
        assert!(sub.is_subtechnique);
        assert_eq!(sub.parent_id.as_deref(), Some("T1055"));
    }

    #[test]
    fn revoked_objects_skipped() {
        let techniques = parse_bundle_str(BUNDLE).unwrap();
        assert!(!techniques.iter().any(|t| t.id == "T9999"));
    }

    #[test]
    fn tactic_ids_are_not_techniques() {
        let techniques = parse_bundle_str(BUNDLE).unwrap();
        // TA0005 starts with 'T' but is an x-mitre-tactic object, not an
        // attack-pattern, so it never reaches the id filter.
        assert!(!techniques.iter().any(|t| t.id == "TA0005"));
    }

    #[test]
    fn duplicate_id_is_an_error() {
        let dup = r#"{
            "objects": [
                {
                    "type": "attack-pattern",
                    "name": "A",
                    "external_references": [
                        {"source_name": "mitre-attack", "external_id": "T1001"}
                    ]
                },
                {
                    "type": "attack-pattern",
                    "name": "B",
                    "external_references": [
                        {"source_name": "mitre-attack", "external_id": "T1001"}
                    ]
                }
            ]
        }"#;
        match parse_bundle_str(dup) {
            Err(CatalogError::DuplicateId(id)) => assert_eq!(id, "T1001"),
            other => panic!("expected DuplicateId, got {other:?}"),
        }
    }

    #[test]
    fn invalid_json_is_an_error() {
        assert!(matches!(
            parse_bundle_str("{not json"),
            Err(CatalogError::Json(_))
        ));
    }
}
