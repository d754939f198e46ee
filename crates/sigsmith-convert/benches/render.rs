use criterion::{black_box, criterion_group, criterion_main, Criterion};
use sigsmith_catalog::Technique;
use sigsmith_convert::{render, Format};

/// A handful of techniques across the hint families so the bench exercises
/// both the table-driven and the fallback rendering paths.
fn fixtures() -> Vec<Technique> {
    let specs: &[(&str, &str, &[&str], &[&str])] = &[
        (
            "T1055",
            "Process Injection",
            &["defense-evasion", "privilege-escalation"],
            &["Windows", "Linux"],
        ),
        (
            "T1059.001",
            "PowerShell",
            &["execution"],
            &["Windows"],
        ),
        (
            "T1547.001",
            "Registry Run Keys / Startup Folder",
            &["persistence", "privilege-escalation"],
            &["Windows"],
        ),
        ("T1078", "Valid Accounts", &["initial-access"], &["Windows"]),
        ("T1071", "Application Layer Protocol", &["command-and-control"], &[]),
        ("T1600", "Weaken Encryption", &["defense-evasion"], &["Network Devices"]),
    ];

    specs
        .iter()
        .map(|(id, name, tactics, platforms)| {
            let mut t = Technique::new(*id, *name);
            t.description =
                "Adversaries may abuse this mechanism to evade defenses and persist.".repeat(4);
            t.tactics = tactics.iter().map(|s| s.to_string()).collect();
            t.platforms = platforms.iter().map(|s| s.to_string()).collect();
            t.revision = 1;
            t
        })
        .collect()
}

fn bench_render(c: &mut Criterion) {
    let techniques = fixtures();
    for format in Format::ALL {
        c.bench_function(&format!("render_{format}"), |b| {
            b.iter(|| {
                for t in &techniques {
                    black_box(render(t, format).ok());
                }
            })
        });
    }
}

criterion_group!(benches, bench_render);
criterion_main!(benches);
