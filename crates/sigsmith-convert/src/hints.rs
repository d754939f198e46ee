//! Evidence hints: artifacts commonly associated with technique families.
//!
//! Each table is keyed by the base technique id (sub-techniques inherit
//! their family's hints) and gated on the technique's platform set. These
//! feed the renderers' strings/selection/predicate sections; a technique
//! outside every table still renders, just with broader fallback evidence.

use sigsmith_catalog::Technique;

const WINDOWS: &[&str] = &["windows"];
const UNIX: &[&str] = &["linux", "macos", "mac os"];

/// Process names that typically host or launch the technique family.
pub fn common_processes(t: &Technique) -> Vec<&'static str> {
    let mut out = Vec::new();
    if has_platform(t, WINDOWS) {
        out.extend(match t.base_id() {
            "T1055" => &["explorer.exe", "lsass.exe", "services.exe", "svchost.exe"][..],
            "T1059" => &["cmd.exe", "powershell.exe", "wscript.exe", "cscript.exe"][..],
            "T1053" => &["schtasks.exe", "at.exe"][..],
            "T1218" => &["regsvr32.exe", "rundll32.exe", "msiexec.exe"][..],
            _ => &[][..],
        });
    }
    if has_platform(t, UNIX) {
        out.extend(match t.base_id() {
            "T1059" => &["bash", "sh", "python", "perl", "ruby"][..],
            "T1053" => &["cron", "at"][..],
            "T1543" => &["systemctl", "launchctl", "service"][..],
            _ => &[][..],
        });
    }
    out
}

/// File paths and patterns the technique family commonly touches.
pub fn common_files(t: &Technique) -> Vec<&'static str> {
    let mut out = Vec::new();
    if has_platform(t, WINDOWS) {
        out.extend(match t.base_id() {
            "T1547" => &[
                "C:\\Windows\\System32\\Tasks\\",
                "C:\\ProgramData\\Microsoft\\Windows\\Start Menu\\Programs\\Startup\\",
            ][..],
            "T1059" => &[".ps1", ".bat", ".cmd", ".vbs", ".js"][..],
            _ => &[][..],
        });
    }
    if has_platform(t, UNIX) {
        out.extend(match t.base_id() {
            "T1547" => &[
                "/etc/init.d/",
                "/etc/crontab",
                "/Library/LaunchAgents/",
                "/Library/LaunchDaemons/",
                ".bash_profile",
                ".bashrc",
            ][..],
            _ => &[][..],
        });
    }
    out
}

/// Registry keys (Windows only) the technique family commonly writes.
pub fn common_registry_keys(t: &Technique) -> Vec<&'static str> {
    if !has_platform(t, WINDOWS) {
        return Vec::new();
    }
    match t.base_id() {
        "T1547" => vec![
            "HKLM\\SOFTWARE\\Microsoft\\Windows\\CurrentVersion\\Run",
            "HKCU\\SOFTWARE\\Microsoft\\Windows\\CurrentVersion\\Run",
            "HKLM\\SOFTWARE\\Microsoft\\Windows\\CurrentVersion\\RunOnce",
            "HKCU\\SOFTWARE\\Microsoft\\Windows\\CurrentVersion\\RunOnce",
        ],
        "T1112" => vec![
            "HKLM\\SYSTEM\\CurrentControlSet\\Services",
            "HKLM\\SOFTWARE\\Microsoft\\Windows NT\\CurrentVersion\\Image File Execution Options",
            "HKLM\\SOFTWARE\\Microsoft\\Windows NT\\CurrentVersion\\Winlogon\\Notify",
            "HKLM\\SOFTWARE\\Microsoft\\Windows NT\\CurrentVersion\\Winlogon\\Shell",
        ],
        _ => Vec::new(),
    }
}

/// Regex fragments for network-centric technique families, usable as YARA
/// regex strings or keyword predicates.
pub fn network_patterns(t: &Technique) -> Vec<&'static str> {
    match t.base_id() {
        "T1071" => vec!["(dns|domain|nslookup)", "(http|https|user-agent)"],
        "T1095" => vec!["(icmp|raw socket)"],
        "T1571" => vec!["(port|connect|socket)"],
        "T1572" => vec!["(tunnel|encapsulat)"],
        _ => Vec::new(),
    }
}

/// Platform-agnostic behavior keywords for families whose evidence is not
/// tied to a specific artifact kind.
pub fn behavior_patterns(t: &Technique) -> Vec<&'static str> {
    match t.base_id() {
        "T1055" => vec!["(VirtualAlloc|WriteProcessMemory|CreateRemoteThread|mmap)"],
        "T1059" => vec!["(powershell|cmd\\.exe|bash|python|perl)"],
        "T1569" | "T1543" => vec!["(service|daemon|systemctl|systemd)"],
        "T1078" => vec!["(login|account|credential)"],
        _ => Vec::new(),
    }
}

fn has_platform(t: &Technique, names: &[&str]) -> bool {
    t.platforms
        .iter()
        .any(|p| names.contains(&p.to_ascii_lowercase().as_str()))
}
