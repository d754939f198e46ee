//! YARA rule rendering.
//!
//! Field-to-syntax table:
//!
//! | technique field | YARA syntax |
//! |---|---|
//! | id + format | rule identifier (`Format::rule_name`) |
//! | tactics | rule tags (sanitized identifiers) |
//! | name, description | `meta:` entries (escaped, description truncated) |
//! | platforms | `meta: platforms` |
//! | evidence hints | `strings:` text strings (`nocase`) for processes, files and registry keys; regex strings for network/behavior patterns |
//! | (condition) | `any of` per populated string group, OR-joined; `filesize < 5MB` fallback when no hints exist |
//!
//! Text strings are escaped per YARA double-quoted literal rules (`\` and
//! `"`). Tactics are not required: a tagless rule is valid YARA.

use sigsmith_catalog::Technique;

use super::{escape_double_quoted, sanitize_ident, summary_line};
use crate::error::Result;
use crate::format::Format;
use crate::hints;

pub(super) fn render(t: &Technique) -> Result<String> {
    let mut out = String::new();

    out.push_str(&format!("rule {}", Format::Yara.rule_name(&t.id)));
    let tags: Vec<String> = t.tactics.iter().map(|s| sanitize_ident(s)).collect();
    if !tags.is_empty() {
        out.push_str(" : ");
        out.push_str(&tags.join(" "));
    }
    out.push_str("\n{\n");

    out.push_str("    meta:\n");
    meta(&mut out, "technique_id", &t.id);
    meta(&mut out, "technique_name", &t.name);
    if !t.description.is_empty() {
        meta(&mut out, "description", &summary_line(&t.description));
    }
    meta(&mut out, "tactics", &t.tactics.join(", "));
    if !t.platforms.is_empty() {
        meta(&mut out, "platforms", &t.platforms.join(", "));
    }
    meta(&mut out, "reference", &t.attack_url());
    meta(&mut out, "generator", "sigsmith");

    let groups = [
        ("proc", text_strings(hints::common_processes(t))),
        ("file", text_strings(hints::common_files(t))),
        ("reg", text_strings(hints::common_registry_keys(t))),
        ("net", regex_strings(hints::network_patterns(t))),
        ("behavior", regex_strings(hints::behavior_patterns(t))),
    ];

    let populated: Vec<&(&str, Vec<String>)> =
        groups.iter().filter(|(_, items)| !items.is_empty()).collect();

    if !populated.is_empty() {
        out.push_str("\n    strings:\n");
        for (prefix, items) in &populated {
            for (i, rendered) in items.iter().enumerate() {
                out.push_str(&format!("        ${prefix}_{i} = {rendered}\n"));
            }
        }
    }

    out.push_str("\n    condition:\n        ");
    if populated.is_empty() {
        // No evidence hints for this family: keep the rule loadable with a
        // size guard so it can be tuned by hand.
        out.push_str("filesize < 5MB\n");
    } else {
        let clauses: Vec<String> = populated
            .iter()
            .map(|(prefix, items)| {
                if items.len() > 1 {
                    format!("any of (${prefix}_*)")
                } else {
                    format!("${prefix}_0")
                }
            })
            .collect();
        out.push_str(&clauses.join(" or "));
        out.push('\n');
    }
    out.push_str("}\n");

    Ok(out)
}

fn meta(out: &mut String, key: &str, value: &str) {
    out.push_str(&format!(
        "        {key} = \"{}\"\n",
        escape_double_quoted(value)
    ));
}

fn text_strings(values: Vec<&'static str>) -> Vec<String> {
    values
        .into_iter()
        .map(|v| format!("\"{}\" nocase", escape_double_quoted(v)))
        .collect()
}

fn regex_strings(values: Vec<&'static str>) -> Vec<String> {
    values.into_iter().map(|v| format!("/{v}/ nocase")).collect()
}
