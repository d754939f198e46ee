//! Format renderers: pure `Technique → rule body` functions, one module per
//! dialect, dispatched exhaustively on [`Format`].
//!
//! Shared contract:
//! - Deterministic: identical technique content yields byte-identical output.
//! - Rule identifiers come from [`Format::rule_name`] only, so re-rendering
//!   replaces rather than duplicates.
//! - Embedded free text is escaped/truncated per the dialect's literal
//!   syntax (helpers below); each module documents its field-to-syntax
//!   table.
//! - Missing required fields surface as [`RenderError`], the renderer's only
//!   failure mode. Renderers know nothing of persistence, fetching, or CLI.

mod kql;
mod sigma;
mod yara;

use sigsmith_catalog::Technique;

use crate::error::{RenderError, Result};
use crate::format::Format;

/// Render one technique into one dialect.
pub fn render(technique: &Technique, format: Format) -> Result<String> {
    if technique.name.trim().is_empty() {
        return Err(RenderError::MissingName {
            id: technique.id.clone(),
        });
    }
    match format {
        Format::Yara => yara::render(technique),
        Format::Sigma => sigma::render(technique),
        Format::Kql => kql::render(technique),
    }
}

/// Collapse all whitespace runs (including newlines) to single spaces.
pub(crate) fn collapse_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Truncate to at most `max` characters on a char boundary, appending an
/// ellipsis when anything was cut.
pub(crate) fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let cut: String = s.chars().take(max).collect();
    format!("{}...", cut.trim_end())
}

/// Escape for a double-quoted string literal (YARA strings, KQL literals):
/// backslash and double quote get a backslash prefix.
pub(crate) fn escape_double_quoted(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            _ => out.push(c),
        }
    }
    out
}

/// Reduce to a lowercase `[a-z0-9_]` identifier fragment (YARA tags,
/// identifier parts). Runs of other characters become single underscores.
pub(crate) fn sanitize_ident(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut last_underscore = false;
    for c in s.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
            last_underscore = false;
        } else if !last_underscore && !out.is_empty() {
            out.push('_');
            last_underscore = true;
        }
    }
    out.trim_end_matches('_').to_string()
}

/// A one-line, length-bounded rendition of a technique description for rule
/// metadata and comments.
pub(crate) fn summary_line(description: &str) -> String {
    truncate_chars(&collapse_ws(description), 300)
}

/// Words from the technique name usable as generic match keywords: longer
/// than three characters, lowercased.
pub(crate) fn name_keywords(name: &str) -> Vec<String> {
    name.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| w.len() > 3)
        .map(|w| w.to_ascii_lowercase())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn technique(id: &str) -> Technique {
        let mut t = Technique::new(id, "Process Injection");
        t.description = "Adversaries may inject code into processes.".into();
        t.tactics = vec!["defense-evasion".into()];
        t.platforms = vec!["Windows".into()];
        t
    }

    #[test]
    fn render_is_deterministic_per_format() {
        let t = technique("T1055");
        for format in Format::ALL {
            let first = render(&t, format).unwrap();
            let second = render(&t, format).unwrap();
            assert_eq!(first, second, "{format} output must be byte-identical");
        }
    }

    #[test]
    fn different_content_changes_output() {
        let a = technique("T1055");
        let mut b = technique("T1055");
        b.description = "Something else entirely.".into();
        for format in Format::ALL {
            assert_ne!(render(&a, format).unwrap(), render(&b, format).unwrap());
        }
    }

    #[test]
    fn empty_name_fails_every_dialect() {
        let mut t = technique("T1055");
        t.name = "  ".into();
        for format in Format::ALL {
            assert_eq!(
                render(&t, format),
                Err(RenderError::MissingName { id: "T1055".into() })
            );
        }
    }

    #[test]
    fn rendered_bodies_carry_the_stable_rule_name() {
        let t = technique("T1055.012");
        for format in Format::ALL {
            let body = render(&t, format).unwrap();
            assert!(
                body.contains(&format.rule_name("T1055.012")),
                "{format} body should contain its rule name"
            );
        }
    }

    #[test]
    fn escape_double_quoted_handles_paths() {
        assert_eq!(
            escape_double_quoted(r#"C:\Users\"x""#),
            r#"C:\\Users\\\"x\""#
        );
    }

    #[test]
    fn sanitize_ident_flattens_punctuation() {
        assert_eq!(sanitize_ident("defense-evasion"), "defense_evasion");
        assert_eq!(sanitize_ident("Mac OS"), "mac_os");
        assert_eq!(sanitize_ident("--x--"), "x");
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        let s = "ααααα";
        assert_eq!(truncate_chars(s, 3), "ααα...");
        assert_eq!(truncate_chars("short", 10), "short");
    }

    #[test]
    fn name_keywords_drop_short_words() {
        assert_eq!(
            name_keywords("Use of Alternate Authentication"),
            ["alternate", "authentication"]
        );
    }
}
