//! Sigma rule rendering.
//!
//! Field-to-syntax table:
//!
//! | technique field | Sigma syntax |
//! |---|---|
//! | id + format | `name:` (`Format::rule_name`) + `attack.tXXXX` tag |
//! | name | `title:` |
//! | description | `description:` (one line, truncated) |
//! | tactics | `tags: attack.<tactic>` (**required, at least one**) |
//! | platforms | `logsource.product` |
//! | evidence hints | `detection.selection` field clauses |
//! | technique family | `logsource.category`, `level`, `falsepositives` |
//!
//! The body is the serde_yaml serialization of an insertion-ordered
//! document struct, so quoting and escaping of embedded free text are the
//! YAML emitter's and the output is byte-deterministic.

use serde::Serialize;
use serde_yaml::{Mapping, Value};
use sigsmith_catalog::Technique;

use super::{name_keywords, summary_line};
use crate::error::{RenderError, Result};
use crate::format::Format;
use crate::hints;

#[derive(Serialize)]
struct SigmaDoc {
    title: String,
    name: String,
    status: &'static str,
    description: String,
    author: &'static str,
    references: Vec<String>,
    tags: Vec<String>,
    logsource: LogSource,
    detection: Mapping,
    falsepositives: Vec<&'static str>,
    level: &'static str,
}

#[derive(Serialize)]
struct LogSource {
    product: &'static str,
    category: &'static str,
}

pub(super) fn render(t: &Technique) -> Result<String> {
    if t.tactics.is_empty() {
        return Err(RenderError::MissingTactics {
            id: t.id.clone(),
            format: Format::Sigma,
        });
    }

    let mut tags = vec![format!("attack.{}", t.id.to_ascii_lowercase())];
    tags.extend(
        t.tactics
            .iter()
            .map(|tactic| format!("attack.{}", tactic.replace('-', "_"))),
    );

    let doc = SigmaDoc {
        title: format!("ATT&CK {}: {}", t.id, t.name),
        name: Format::Sigma.rule_name(&t.id),
        status: "experimental",
        description: summary_line(&t.description),
        author: "sigsmith",
        references: vec![t.attack_url()],
        tags,
        logsource: logsource(t),
        detection: detection(t),
        falsepositives: falsepositives(t),
        level: level(t),
    };

    // Serialization of a plain struct over owned data cannot fail.
    Ok(serde_yaml::to_string(&doc).expect("sigma document serializes"))
}

/// `logsource` derivation: product from the platform set, category from the
/// technique family; registry categories degrade to file events off Windows.
fn logsource(t: &Technique) -> LogSource {
    let windows = t.platforms.iter().any(|p| p.eq_ignore_ascii_case("windows"));
    let product = if windows {
        "windows"
    } else if t.platforms.iter().any(|p| p.eq_ignore_ascii_case("linux")) {
        "linux"
    } else if t.platforms.iter().any(|p| p.eq_ignore_ascii_case("macos")) {
        "macos"
    } else {
        "any"
    };

    let category = match t.base_id() {
        "T1547" | "T1112" if windows => "registry_event",
        "T1547" | "T1112" => "file_event",
        "T1078" => "authentication",
        "T1071" | "T1095" | "T1571" | "T1572" => "network_connection",
        _ => "process_creation",
    };

    LogSource { product, category }
}

fn detection(t: &Technique) -> Mapping {
    let mut selection = Mapping::new();

    let processes = hints::common_processes(t);
    if !processes.is_empty() {
        selection.insert(
            Value::from("Image|endswith"),
            str_list(processes.iter().map(|p| format!("\\{p}"))),
        );
    }
    let files = hints::common_files(t);
    if !files.is_empty() {
        selection.insert(
            Value::from("TargetFilename|contains"),
            str_list(files.iter().map(|f| f.to_string())),
        );
    }
    let registry = hints::common_registry_keys(t);
    if !registry.is_empty() {
        selection.insert(
            Value::from("TargetObject|contains"),
            str_list(registry.iter().map(|r| r.to_string())),
        );
    }

    let mut condition = "selection";
    let mut detection = Mapping::new();

    if t.base_id() == "T1078" {
        // Authentication family: Windows logon events plus a generic
        // selection for other products.
        selection.insert(
            Value::from("EventID"),
            Value::Sequence(
                [4624u64, 4625, 4648, 4768, 4769, 4776]
                    .iter()
                    .map(|n| Value::Number((*n).into()))
                    .collect(),
            ),
        );
        let mut alt = Mapping::new();
        alt.insert(
            Value::from("EventType"),
            str_list(["authentication", "login", "auth"].iter().map(|s| s.to_string())),
        );
        detection.insert(Value::from("selection"), Value::Mapping(selection));
        detection.insert(Value::from("selection_alt"), Value::Mapping(alt));
        condition = "selection or selection_alt";
    } else {
        if selection.is_empty() {
            // No artifact hints: fall back to name keywords so the rule is
            // still well-formed and tunable.
            selection.insert(
                Value::from("CommandLine|contains"),
                str_list(name_keywords(&t.name).into_iter()),
            );
        }
        detection.insert(Value::from("selection"), Value::Mapping(selection));
    }

    detection.insert(Value::from("condition"), Value::from(condition));
    detection
}

fn falsepositives(t: &Technique) -> Vec<&'static str> {
    let mut fps = vec!["Legitimate administrative activity"];
    match t.base_id() {
        "T1059" => fps.extend(["Legitimate scripting activity", "System administration scripts"]),
        "T1055" => fps.extend(["Software with legitimate DLL injection", "Antivirus software"]),
        "T1078" => fps.extend(["Legitimate user activity"]),
        "T1071" => fps.extend(["Regular application traffic"]),
        _ => {}
    }
    fps
}

fn level(t: &Technique) -> &'static str {
    match t.base_id() {
        "T1055" => "high",
        "T1071" => "low",
        _ => "medium",
    }
}

fn str_list(values: impl Iterator<Item = String>) -> Value {
    Value::Sequence(values.map(Value::from).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn technique() -> Technique {
        let mut t = Technique::new("T1055", "Process Injection");
        t.description = "Adversaries may inject code into processes.".into();
        t.tactics = vec!["defense-evasion".into()];
        t.platforms = vec!["Windows".into()];
        t
    }

    #[test]
    fn renders_valid_yaml_with_expected_fields() {
        let body = render(&technique()).unwrap();
        let parsed: serde_yaml::Value = serde_yaml::from_str(&body).unwrap();
        assert_eq!(parsed["name"], "mitre-t1055-sigma");
        assert_eq!(parsed["title"], "ATT&CK T1055: Process Injection");
        assert_eq!(parsed["logsource"]["product"], "windows");
        assert_eq!(parsed["logsource"]["category"], "process_creation");
        assert_eq!(parsed["level"], "high");
        assert_eq!(parsed["detection"]["condition"], "selection");
    }

    #[test]
    fn tags_carry_technique_and_tactics() {
        let body = render(&technique()).unwrap();
        let parsed: serde_yaml::Value = serde_yaml::from_str(&body).unwrap();
        let tags: Vec<&str> = parsed["tags"]
            .as_sequence()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap())
            .collect();
        assert_eq!(tags, ["attack.t1055", "attack.defense_evasion"]);
    }

    #[test]
    fn empty_tactics_is_a_render_error() {
        let mut t = technique();
        t.tactics.clear();
        assert_eq!(
            render(&t),
            Err(RenderError::MissingTactics {
                id: "T1055".into(),
                format: Format::Sigma,
            })
        );
    }

    #[test]
    fn auth_family_gets_dual_selection() {
        let mut t = Technique::new("T1078", "Valid Accounts");
        t.tactics = vec!["initial-access".into()];
        t.platforms = vec!["Windows".into()];
        let body = render(&t).unwrap();
        let parsed: serde_yaml::Value = serde_yaml::from_str(&body).unwrap();
        assert_eq!(
            parsed["detection"]["condition"],
            "selection or selection_alt"
        );
        assert_eq!(parsed["logsource"]["category"], "authentication");
    }

    #[test]
    fn hintless_technique_falls_back_to_name_keywords() {
        let mut t = Technique::new("T1600", "Weaken Encryption");
        t.tactics = vec!["defense-evasion".into()];
        let body = render(&t).unwrap();
        let parsed: serde_yaml::Value = serde_yaml::from_str(&body).unwrap();
        let keywords = parsed["detection"]["selection"]["CommandLine|contains"]
            .as_sequence()
            .unwrap();
        assert!(keywords.iter().any(|v| v == "weaken"));
    }

    #[test]
    fn description_with_yaml_metacharacters_survives_round_trip() {
        let mut t = technique();
        t.description = "tricky: [brackets] & \"quotes\"\nsecond line".into();
        let body = render(&t).unwrap();
        let parsed: serde_yaml::Value = serde_yaml::from_str(&body).unwrap();
        assert_eq!(
            parsed["description"],
            "tricky: [brackets] & \"quotes\" second line"
        );
    }
}
