//! Line-oriented snapshot rendering for terminals without the dashboard

use std::io::Write;

use tokio::sync::mpsc;

use super::{Snapshot, SnapshotEntry};

pub fn render_entry(entry: &SnapshotEntry) -> String {
    let mut line = format!("{}={}{}", entry.metric_id, entry.value, entry.unit);
    if let Some(delta) = entry.delta_per_sec.filter(|d| d.abs() >= 0.05) {
        line.push_str(&format!(" ({delta:+.1}/s)"));
    }
    line
}

/// One line per snapshot
pub fn render_line(snapshot: &Snapshot) -> String {
    let scanners: Vec<String> = snapshot
        .scanners
        .iter()
        .map(|s| match &s.error {
            Some(error) => format!("{} {}: {}", s.scanner, s.severity, error.kind),
            None => {
                let entries: Vec<String> = s.entries.iter().map(render_entry).collect();
                format!("{} {}: {}", s.scanner, s.severity, entries.join(", "))
            }
        })
        .collect();

    format!(
        "#{:<4} {} [{}] {}",
        snapshot.tick,
        snapshot.taken_at.format("%H:%M:%S"),
        snapshot.overall_severity(),
        scanners.join(" | ")
    )
}

/// Print snapshots to stdout until the sender side closes
pub async fn print_snapshots(mut rx: mpsc::Receiver<Snapshot>) -> std::io::Result<()> {
    let mut stdout = std::io::stdout();
    while let Some(snapshot) = rx.recv().await {
        writeln!(stdout, "{}", render_line(&snapshot))?;
        stdout.flush()?;
    }
    Ok(())
}
