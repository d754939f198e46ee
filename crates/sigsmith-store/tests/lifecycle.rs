//! End-to-end lifecycle tests across catalog parsing, conversion, and
//! persistence: ingest → convert → commit → re-run.

use sigsmith_catalog::parse_bundle_str;
use sigsmith_convert::{Converter, Format};
use sigsmith_store::{SignatureFilter, Store, TechniqueFilter};

const BUNDLE: &str = r#"{
    "type": "bundle",
    "objects": [
        {
            "type": "attack-pattern",
            "name": "Process Injection",
            "description": "Adversaries may inject code into processes.",
            "external_references": [
                {"source_name": "mitre-attack", "external_id": "T1055"}
            ],
            "kill_chain_phases": [
                {"kill_chain_name": "mitre-attack", "phase_name": "defense-evasion"}
            ],
            "x_mitre_platforms": ["Windows"],
            "x_mitre_detection": "Monitor for remote thread creation."
        }
    ]
}"#;

fn ingest(store: &Store, bundle: &str) {
    for technique in parse_bundle_str(bundle).unwrap() {
        store.upsert_technique(&technique).unwrap();
    }
}

fn convert_and_commit(store: &Store, force: bool) -> (usize, usize, usize) {
    let techniques = store.list_techniques(&TechniqueFilter::All).unwrap();
    let existing = store.existing_revisions().unwrap();
    let report = Converter::new(Format::ALL.to_vec())
        .force(force)
        .convert(&techniques, &[], &existing);
    for signature in &report.signatures {
        store.upsert_signature(signature).unwrap();
    }
    (
        report.rendered_count(),
        report.skipped_count(),
        report.failed_count(),
    )
}

#[test]
fn ingest_convert_produces_three_signatures_for_t1055() {
    let store = Store::open_in_memory().unwrap();
    ingest(&store, BUNDLE);

    let (rendered, skipped, failed) = convert_and_commit(&store, false);
    assert_eq!((rendered, skipped, failed), (3, 0, 0));

    let technique = store.get_technique("T1055").unwrap().unwrap();
    let signatures = store
        .list_signatures(&SignatureFilter::Technique("T1055".into()))
        .unwrap();
    assert_eq!(signatures.len(), 3);
    for signature in &signatures {
        assert_eq!(signature.technique_id, "T1055");
        assert_eq!(signature.generated_from_revision, technique.revision);
        assert_eq!(
            signature.rule_name,
            signature.format.rule_name("T1055"),
            "rule names derive from (id, format)"
        );
    }
}

#[test]
fn rerun_without_changes_skips_everything() {
    let store = Store::open_in_memory().unwrap();
    ingest(&store, BUNDLE);
    convert_and_commit(&store, false);

    // Same catalog again: idempotent ingest, nothing re-rendered.
    ingest(&store, BUNDLE);
    let (rendered, skipped, failed) = convert_and_commit(&store, false);
    assert_eq!((rendered, skipped, failed), (0, 3, 0));
}

#[test]
fn upstream_change_marks_signatures_stale_and_regenerates() {
    let store = Store::open_in_memory().unwrap();
    ingest(&store, BUNDLE);
    convert_and_commit(&store, false);
    assert!(store.stale_signatures().unwrap().is_empty());

    let changed = BUNDLE.replace(
        "Adversaries may inject code into processes.",
        "Adversaries may inject code into live processes.",
    );
    ingest(&store, &changed);

    // All three signatures now trail the bumped revision.
    assert_eq!(store.stale_signatures().unwrap().len(), 3);

    let (rendered, skipped, _) = convert_and_commit(&store, false);
    assert_eq!((rendered, skipped), (3, 0));
    assert!(store.stale_signatures().unwrap().is_empty());

    let technique = store.get_technique("T1055").unwrap().unwrap();
    assert_eq!(technique.revision, 2);
}

#[test]
fn force_rerenders_up_to_date_signatures() {
    let store = Store::open_in_memory().unwrap();
    ingest(&store, BUNDLE);
    convert_and_commit(&store, false);

    let (rendered, skipped, _) = convert_and_commit(&store, true);
    assert_eq!((rendered, skipped), (3, 0));
    // Still exactly one row per pair.
    assert_eq!(
        store
            .list_signatures(&SignatureFilter::Technique("T1055".into()))
            .unwrap()
            .len(),
        3
    );
}

#[test]
fn rendered_bodies_are_reproducible_across_runs() {
    let store = Store::open_in_memory().unwrap();
    ingest(&store, BUNDLE);
    convert_and_commit(&store, false);
    let first: Vec<String> = store
        .list_signatures(&SignatureFilter::All)
        .unwrap()
        .into_iter()
        .map(|s| s.body)
        .collect();

    convert_and_commit(&store, true);
    let second: Vec<String> = store
        .list_signatures(&SignatureFilter::All)
        .unwrap()
        .into_iter()
        .map(|s| s.body)
        .collect();

    assert_eq!(first, second);
}
