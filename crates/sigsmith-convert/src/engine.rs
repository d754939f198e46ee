//! The conversion engine: techniques × formats → signatures, with per-pair
//! failure isolation and exact up-to-date skipping.
//!
//! The engine is side-effect-free: it reads techniques and a map of already
//! persisted revisions, and returns data. The caller commits the report to
//! the store, which keeps the engine independently testable and lets the
//! pair work fan out across rayon workers with no shared mutable state.

use std::borrow::Cow;
use std::collections::HashMap;

use rayon::prelude::*;
use sigsmith_catalog::Technique;
use tracing::debug;

use crate::error::RenderError;
use crate::format::Format;
use crate::render::render;
use crate::signature::Signature;

/// One failed `(technique, format)` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionFailure {
    pub technique_id: String,
    pub format: Format,
    pub error: RenderError,
}

/// Complete success/skip/failure partition of one conversion run. Entries
/// are sorted by `(technique_id, format)` so the report is independent of
/// worker completion order.
#[derive(Debug, Default)]
pub struct ConversionReport {
    pub signatures: Vec<Signature>,
    pub skipped: Vec<(String, Format)>,
    pub failures: Vec<ConversionFailure>,
}

impl ConversionReport {
    pub fn rendered_count(&self) -> usize {
        self.signatures.len()
    }

    pub fn skipped_count(&self) -> usize {
        self.skipped.len()
    }

    pub fn failed_count(&self) -> usize {
        self.failures.len()
    }
}

enum Outcome {
    Rendered(Signature),
    Skipped(String, Format),
    Failed(ConversionFailure),
}

/// Renders a batch of techniques into one or more dialects.
#[derive(Debug, Clone)]
pub struct Converter {
    formats: Vec<Format>,
    force: bool,
    inherit_parent: bool,
}

impl Converter {
    pub fn new(formats: Vec<Format>) -> Self {
        Converter {
            formats,
            force: false,
            inherit_parent: false,
        }
    }

    /// Re-render pairs even when the stored signature is already up to date.
    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Sub-technique inheritance policy: when enabled, a sub-technique with
    /// empty `tactics` or `platforms` renders with its parent's values.
    /// Parents are resolved from the conversion inputs (batch + pool); a
    /// dangling parent reference leaves the technique unchanged.
    pub fn inherit_parent(mut self, inherit: bool) -> Self {
        self.inherit_parent = inherit;
        self
    }

    /// Convert `techniques` into every configured format.
    ///
    /// `parent_pool` supplies parents for inheritance that are not part of
    /// the batch itself (it is never converted). `existing` maps persisted
    /// `(technique_id, format)` pairs to the revision their signature was
    /// generated from; a pair is skipped exactly when that revision equals
    /// the technique's current revision and `force` is off.
    pub fn convert(
        &self,
        techniques: &[Technique],
        parent_pool: &[Technique],
        existing: &HashMap<(String, Format), u64>,
    ) -> ConversionReport {
        let parents: HashMap<&str, &Technique> = techniques
            .iter()
            .chain(parent_pool)
            .map(|t| (t.id.as_str(), t))
            .collect();

        let jobs: Vec<(&Technique, Format)> = techniques
            .iter()
            .flat_map(|t| self.formats.iter().map(move |f| (t, *f)))
            .collect();

        let outcomes: Vec<Outcome> = jobs
            .par_iter()
            .map(|&(technique, format)| {
                let key = (technique.id.clone(), format);
                if !self.force && existing.get(&key) == Some(&technique.revision) {
                    return Outcome::Skipped(technique.id.clone(), format);
                }
                let subject = self.effective(technique, &parents);
                match render(&subject, format) {
                    Ok(body) => Outcome::Rendered(Signature::new(
                        technique.id.clone(),
                        format,
                        body,
                        technique.revision,
                    )),
                    Err(error) => Outcome::Failed(ConversionFailure {
                        technique_id: technique.id.clone(),
                        format,
                        error,
                    }),
                }
            })
            .collect();

        let mut report = ConversionReport::default();
        for outcome in outcomes {
            match outcome {
                Outcome::Rendered(sig) => report.signatures.push(sig),
                Outcome::Skipped(id, format) => report.skipped.push((id, format)),
                Outcome::Failed(failure) => report.failures.push(failure),
            }
        }
        report
            .signatures
            .sort_by(|a, b| (&a.technique_id, a.format).cmp(&(&b.technique_id, b.format)));
        report.skipped.sort();
        report
            .failures
            .sort_by(|a, b| (&a.technique_id, a.format).cmp(&(&b.technique_id, b.format)));

        debug!(
            rendered = report.rendered_count(),
            skipped = report.skipped_count(),
            failed = report.failed_count(),
            "conversion run complete"
        );
        report
    }

    /// Apply the inheritance policy: a clone with the parent's tactics /
    /// platforms filled in where the sub-technique's own are empty.
    fn effective<'a>(
        &self,
        technique: &'a Technique,
        parents: &HashMap<&str, &Technique>,
    ) -> Cow<'a, Technique> {
        if !self.inherit_parent || !technique.is_subtechnique {
            return Cow::Borrowed(technique);
        }
        if !technique.tactics.is_empty() && !technique.platforms.is_empty() {
            return Cow::Borrowed(technique);
        }
        let Some(parent) = technique
            .parent_id
            .as_deref()
            .and_then(|id| parents.get(id))
        else {
            return Cow::Borrowed(technique);
        };

        let mut inherited = technique.clone();
        if inherited.tactics.is_empty() {
            inherited.tactics = parent.tactics.clone();
        }
        if inherited.platforms.is_empty() {
            inherited.platforms = parent.platforms.clone();
        }
        Cow::Owned(inherited)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn technique(id: &str, revision: u64) -> Technique {
        let mut t = Technique::new(id, format!("Technique {id}"));
        t.description = "Test description.".into();
        t.tactics = vec!["defense-evasion".into()];
        t.platforms = vec!["Windows".into()];
        t.revision = revision;
        t
    }

    fn all_formats() -> Converter {
        Converter::new(Format::ALL.to_vec())
    }

    #[test]
    fn converts_cartesian_product_sorted() {
        let techniques = vec![technique("T1134", 1), technique("T1055", 1)];
        let report = all_formats().convert(&techniques, &[], &HashMap::new());

        assert_eq!(report.rendered_count(), 6);
        assert!(report.failures.is_empty());
        let order: Vec<(String, Format)> = report
            .signatures
            .iter()
            .map(|s| (s.technique_id.clone(), s.format))
            .collect();
        let mut expected = order.clone();
        expected.sort();
        assert_eq!(order, expected, "signatures sorted by (id, format)");
        assert_eq!(order[0].0, "T1055");
    }

    #[test]
    fn failure_is_isolated_per_pair() {
        let mut tactic_free = technique("T1499", 1);
        tactic_free.tactics.clear();
        let techniques = vec![technique("T1055", 1), tactic_free, technique("T1134", 1)];

        let report = Converter::new(vec![Format::Sigma]).convert(&techniques, &[], &HashMap::new());

        assert_eq!(report.rendered_count(), 2);
        assert_eq!(report.failed_count(), 1);
        let failure = &report.failures[0];
        assert_eq!(failure.technique_id, "T1499");
        assert_eq!(failure.format, Format::Sigma);
        assert!(matches!(
            failure.error,
            RenderError::MissingTactics { .. }
        ));
    }

    #[test]
    fn tactic_free_technique_still_renders_yara_and_kql() {
        let mut tactic_free = technique("T1499", 1);
        tactic_free.tactics.clear();

        let report = all_formats().convert(&[tactic_free], &[], &HashMap::new());
        assert_eq!(report.rendered_count(), 2);
        assert_eq!(report.failed_count(), 1);
    }

    #[test]
    fn up_to_date_pairs_are_skipped_exactly() {
        let t = technique("T1055", 3);
        let mut existing = HashMap::new();
        existing.insert(("T1055".to_string(), Format::Yara), 3u64); // current
        existing.insert(("T1055".to_string(), Format::Sigma), 2u64); // stale

        let report = all_formats().convert(&[t], &[], &existing);

        assert_eq!(report.skipped, vec![("T1055".to_string(), Format::Yara)]);
        let rendered: Vec<Format> = report.signatures.iter().map(|s| s.format).collect();
        assert_eq!(rendered, vec![Format::Sigma, Format::Kql]);
    }

    #[test]
    fn force_overrides_skip() {
        let t = technique("T1055", 3);
        let mut existing = HashMap::new();
        for format in Format::ALL {
            existing.insert(("T1055".to_string(), format), 3u64);
        }

        let report = all_formats().force(true).convert(&[t], &[], &existing);
        assert_eq!(report.rendered_count(), 3);
        assert_eq!(report.skipped_count(), 0);
    }

    #[test]
    fn signatures_carry_current_revision() {
        let t = technique("T1055", 7);
        let report = all_formats().convert(&[t], &[], &HashMap::new());
        assert!(report
            .signatures
            .iter()
            .all(|s| s.generated_from_revision == 7));
    }

    #[test]
    fn inheritance_fills_empty_fields_from_parent() {
        let parent = technique("T1055", 1);
        let mut sub = Technique::new("T1055.012", "Process Hollowing");
        sub.revision = 1;

        // Policy off: the empty-tactics sub-technique fails Sigma.
        let off = Converter::new(vec![Format::Sigma]).convert(
            &[sub.clone()],
            &[parent.clone()],
            &HashMap::new(),
        );
        assert_eq!(off.failed_count(), 1);

        // Policy on: parent tactics flow in and the pair renders.
        let on = Converter::new(vec![Format::Sigma])
            .inherit_parent(true)
            .convert(&[sub], &[parent], &HashMap::new());
        assert_eq!(on.failed_count(), 0);
        assert_eq!(on.rendered_count(), 1);
        assert!(on.signatures[0].body.contains("attack.defense_evasion"));
    }

    #[test]
    fn dangling_parent_is_tolerated() {
        let mut sub = Technique::new("T1055.012", "Process Hollowing");
        sub.revision = 1;

        let report = Converter::new(vec![Format::Yara])
            .inherit_parent(true)
            .convert(&[sub], &[], &HashMap::new());
        // No parent to inherit from: YARA renders without tags.
        assert_eq!(report.rendered_count(), 1);
    }
}
