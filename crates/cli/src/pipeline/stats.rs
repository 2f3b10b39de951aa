//! Run statistics and end-of-run reports.

use std::fmt::Write as _;
use std::time::Duration;

use contracts::{InstanceStats, RemainingMessages, RunResult};
use observability::RunMetricsAggregator;
use output::MetricsSnapshot;

/// Statistics from one run
#[derive(Debug)]
pub struct PipelineStats {
    /// What the router produced
    pub result: RunResult,

    /// Wall-clock time from the first launch to the last flushed byte
    pub duration: Duration,

    /// Bytes read from our stdin and replayed to every instance
    pub input_bytes: u64,

    /// Traffic through our own stdout
    pub stdout: MetricsSnapshot,

    /// Traffic through our own stderr (tagged lines and trace records)
    pub stderr: MetricsSnapshot,
}

impl PipelineStats {
    /// `Duration: <t> (longest running instance: <i>)`
    pub fn duration_line(&self) -> Option<String> {
        self.result.longest_running().map(|stats| {
            format!(
                "Duration: {:?} (longest running instance: {})",
                stats.total_time(),
                stats.id
            )
        })
    }

    /// Print the after-run report to stderr
    pub fn print_summary(&self, with_table: bool) {
        if let Some(line) = self.duration_line() {
            eprintln!("{line}");
        }
        if !with_table {
            return;
        }

        eprint!("{}", render_table(&self.result.instances));

        let aggregator = RunMetricsAggregator::from_stats(&self.result.instances);
        eprintln!();
        eprint!("{}", aggregator.summary());
        eprintln!(
            "Input: {} bytes; stdout: {} bytes in {} writes; stderr: {} bytes in {} writes",
            self.input_bytes,
            self.stdout.bytes,
            self.stdout.writes,
            self.stderr.bytes,
            self.stderr.writes
        );
    }
}

const HEADERS: [&str; 6] = [
    "Instance",
    "Total time",
    "Running time",
    "Blocked time",
    "Messages sent",
    "Bytes sent",
];

/// Per-instance table with left-aligned, space-padded columns
pub fn render_table(instances: &[InstanceStats]) -> String {
    let rows: Vec<[String; 6]> = instances
        .iter()
        .map(|stats| {
            [
                stats.id.to_string(),
                format!("{:?}", stats.total_time()),
                format!("{:?}", stats.time_running),
                format!("{:?}", stats.time_blocked),
                stats.messages_sent.to_string(),
                stats.bytes_sent.to_string(),
            ]
        })
        .collect();

    let mut widths = HEADERS.map(str::len);
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.len());
        }
    }

    let mut table = String::new();
    let header = HEADERS.map(String::from);
    for row in std::iter::once(&header).chain(&rows) {
        let mut line = String::new();
        for (i, (cell, width)) in row.iter().zip(widths).enumerate() {
            if i + 1 == row.len() {
                line.push_str(cell);
            } else {
                let _ = write!(line, "{cell:<width$} ");
            }
        }
        table.push_str(line.trim_end());
        table.push('\n');
    }
    table
}

/// Warning text for messages nobody received, grouped by destination
pub fn orphan_warning(remaining: &RemainingMessages) -> Option<String> {
    if remaining.is_empty() {
        return None;
    }

    let mut text =
        String::from("Warning: following instances had some messages left after they've terminated:\n");
    for (to, sources) in remaining.by_destination() {
        let _ = write!(text, "Instance {to} did not receive message from instances:");
        for from in sources {
            let _ = write!(text, " {from}");
        }
        text.push('\n');
    }
    Some(text)
}
