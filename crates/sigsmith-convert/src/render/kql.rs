//! KQL (Kusto) query rendering.
//!
//! Field-to-syntax table:
//!
//! | technique field | KQL syntax |
//! |---|---|
//! | id + format | leading `//` header (`Format::rule_name`) + `AttackTechnique` result column |
//! | name, description, tactics, platforms | `//` header comment lines |
//! | platforms + technique family | `union` table selection |
//! | evidence hints | `where` predicates (`contains`, OR-joined per artifact kind) |
//! | (fallback) | `search` keyword query when no hints exist |
//!
//! String literals are double-quoted with `\` and `"` escaped; comment lines
//! are collapsed to single lines so free text cannot terminate the query.

use sigsmith_catalog::Technique;

use super::{collapse_ws, escape_double_quoted, name_keywords, summary_line};
use crate::error::Result;
use crate::format::Format;
use crate::hints;

pub(super) fn render(t: &Technique) -> Result<String> {
    let mut out = String::new();

    out.push_str(&format!("// {}\n", Format::Kql.rule_name(&t.id)));
    out.push_str(&format!("// Technique: {} {}\n", t.id, collapse_ws(&t.name)));
    if !t.tactics.is_empty() {
        out.push_str(&format!("// Tactics: {}\n", t.tactics.join(", ")));
    }
    if !t.platforms.is_empty() {
        out.push_str(&format!("// Platforms: {}\n", t.platforms.join(", ")));
    }
    out.push_str(&format!("// Reference: {}\n", t.attack_url()));
    if !t.description.is_empty() {
        out.push_str(&format!("// {}\n", summary_line(&t.description)));
    }
    for pattern in t.detection_patterns().iter().take(3) {
        out.push_str(&format!("// Hint: {}\n", collapse_ws(pattern)));
    }

    out.push_str(&format!("union isfuzzy=true {}\n", tables(t).join(", ")));

    let predicates = predicates(t);
    if predicates.is_empty() {
        let keywords: Vec<String> = name_keywords(&t.name)
            .iter()
            .map(|k| format!("\"{}\"", escape_double_quoted(k)))
            .collect();
        if keywords.is_empty() {
            out.push_str("| where isnotempty(TimeGenerated)\n");
        } else {
            out.push_str(&format!("| search {}\n", keywords.join(" or ")));
        }
    } else {
        out.push_str(&format!("| where {}\n", predicates.join("\n    or ")));
    }

    out.push_str(&format!(
        "| extend AttackTechnique = \"{}\", AttackTactics = \"{}\"\n",
        escape_double_quoted(&t.id),
        escape_double_quoted(&t.tactics.join(", "))
    ));

    Ok(out)
}

/// Table selection per platform and technique family, with the
/// environment-agnostic alert tables always appended. Order is fixed so the
/// output is deterministic; duplicates are removed preserving first
/// occurrence.
fn tables(t: &Technique) -> Vec<&'static str> {
    let mut tables: Vec<&'static str> = Vec::new();
    let windows = t.platforms.iter().any(|p| p.eq_ignore_ascii_case("windows"));
    let unix = t.platforms.iter().any(|p| {
        p.eq_ignore_ascii_case("linux") || p.eq_ignore_ascii_case("macos")
    });

    if windows {
        tables.extend(match t.base_id() {
            "T1055" => &["SecurityEvent", "WindowsEvent"][..],
            "T1059" => &["SecurityEvent", "DeviceProcessEvents"][..],
            "T1547" | "T1112" => &["SecurityEvent", "DeviceRegistryEvents"][..],
            "T1078" => &["SecurityEvent", "SigninLogs", "AuditLogs"][..],
            "T1071" | "T1095" | "T1571" | "T1572" => {
                &["DeviceNetworkEvents", "DnsEvents", "CommonSecurityLog"][..]
            }
            _ => &["SecurityEvent"][..],
        });
    }
    if unix {
        tables.extend(match t.base_id() {
            "T1071" | "T1095" | "T1571" | "T1572" => &["DeviceNetworkEvents", "DnsEvents"][..],
            _ => &["Syslog"][..],
        });
    }

    tables.extend(["SecurityAlert", "SecurityIncident"]);

    let mut deduped = Vec::with_capacity(tables.len());
    for table in tables {
        if !deduped.contains(&table) {
            deduped.push(table);
        }
    }
    deduped
}

fn predicates(t: &Technique) -> Vec<String> {
    let mut predicates = Vec::new();

    let processes = hints::common_processes(t);
    if !processes.is_empty() {
        predicates.push(clause("Process", &processes));
    }
    let files = hints::common_files(t);
    if !files.is_empty() {
        predicates.push(clause("TargetFilename", &files));
    }
    let registry = hints::common_registry_keys(t);
    if !registry.is_empty() {
        predicates.push(clause("RegistryKey", &registry));
    }

    predicates
}

fn clause(column: &str, values: &[&str]) -> String {
    let parts: Vec<String> = values
        .iter()
        .map(|v| format!("{column} contains \"{}\"", escape_double_quoted(v)))
        .collect();
    format!("({})", parts.join(" or "))
}
