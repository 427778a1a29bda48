//! Read-only status projections.
//!
//! All four views format one `StatusSummary`, built from the status record
//! and the checkpoint state, so they cannot disagree about the facts. Output
//! is plain text with no wall-clock-relative values, so rendering the same
//! inputs twice gives identical output.

use std::fmt::Write as _;

use super::status::{StageState, StatusRecord};
use crate::checkpoint::CheckpointState;
use crate::stage::all_stages;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusView {
    Tree,
    Timeline,
    Compact,
    Detailed,
}

impl std::str::FromStr for StatusView {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "tree" => Ok(StatusView::Tree),
            "timeline" => Ok(StatusView::Timeline),
            "compact" => Ok(StatusView::Compact),
            "detailed" => Ok(StatusView::Detailed),
            _ => anyhow::bail!(
                "Invalid status format '{}'. Valid values: tree, timeline, compact, detailed",
                s
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct StageRow {
    number: u8,
    name: String,
    status: StageState,
    duration_secs: Option<f64>,
    sla_compliant: bool,
    start: Option<String>,
    checkpoints: Vec<(String, bool)>,
    metrics: Vec<(String, String)>,
}

/// Facts shared by every view.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusSummary {
    change_id: String,
    lane: String,
    sla_target_secs: u64,
    rows: Vec<StageRow>,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub running: Option<u8>,
    pub checkpoint_count: usize,
    pub successful_checkpoints: usize,
    pub last_checkpoint: Option<String>,
}

impl StatusSummary {
    pub fn build(record: &StatusRecord, checkpoints: &CheckpointState) -> Self {
        let rows: Vec<StageRow> = all_stages()
            .iter()
            .map(|stage| {
                let entry = record.stages.get(&stage.number);
                StageRow {
                    number: stage.number,
                    name: stage.name.to_string(),
                    status: entry.map(|e| e.status).unwrap_or_default(),
                    duration_secs: entry.and_then(|e| e.duration_secs),
                    sla_compliant: entry.map(|e| e.sla_compliant).unwrap_or(false),
                    start: entry
                        .and_then(|e| e.start_time)
                        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string()),
                    checkpoints: checkpoints
                        .checkpoints
                        .iter()
                        .filter(|c| c.stage_number == stage.number && c.rollback_of.is_none())
                        .map(|c| (c.id.clone(), c.success))
                        .collect(),
                    metrics: entry
                        .map(|e| {
                            e.metrics
                                .iter()
                                .map(|(k, v)| (k.clone(), v.to_string()))
                                .collect()
                        })
                        .unwrap_or_default(),
                }
            })
            .collect();

        let count = |state: StageState| rows.iter().filter(|r| r.status == state).count();
        Self {
            change_id: record.change_id.clone(),
            lane: record
                .lane
                .map(|l| l.to_string())
                .unwrap_or_else(|| "unassigned".to_string()),
            sla_target_secs: record.sla_target_secs,
            succeeded: count(StageState::Success),
            failed: count(StageState::Failed),
            skipped: count(StageState::Skipped),
            running: record.running_stage(),
            checkpoint_count: checkpoints.len(),
            successful_checkpoints: checkpoints.success_count(),
            last_checkpoint: checkpoints.latest().map(|c| c.id.clone()),
            rows,
        }
    }

    /// One-line totals, identical in every view.
    pub fn footer(&self) -> String {
        format!(
            "{} succeeded, {} failed, {} skipped of {} stages | {} checkpoints ({} successful)",
            self.succeeded,
            self.failed,
            self.skipped,
            self.rows.len(),
            self.checkpoint_count,
            self.successful_checkpoints
        )
    }

    fn header(&self) -> String {
        format!(
            "Change {} [lane: {}, SLA target: {}s]",
            self.change_id, self.lane, self.sla_target_secs
        )
    }
}

fn symbol(status: StageState) -> &'static str {
    match status {
        StageState::Pending => "·",
        StageState::Running => "▶",
        StageState::Success => "✓",
        StageState::Failed => "✗",
        StageState::Skipped => "-",
    }
}

fn duration(secs: Option<f64>) -> String {
    match secs {
        Some(s) if s.round() >= 60.0 => {
            let total = s.round() as u64;
            format!("{}m {}s", total / 60, total % 60)
        }
        Some(s) => format!("{:.1}s", s),
        None => String::new(),
    }
}

/// Render `summary` in the requested view.
pub fn render(summary: &StatusSummary, view: StatusView) -> String {
    match view {
        StatusView::Tree => render_tree(summary),
        StatusView::Timeline => render_timeline(summary),
        StatusView::Compact => render_compact(summary),
        StatusView::Detailed => render_detailed(summary),
    }
}

fn render_tree(s: &StatusSummary) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", s.header());
    let last = s.rows.len().saturating_sub(1);
    for (i, row) in s.rows.iter().enumerate() {
        let branch = if i == last { "└──" } else { "├──" };
        let _ = writeln!(
            out,
            "{} {:02} {:<16} {} {:<8} {}",
            branch,
            row.number,
            row.name,
            symbol(row.status),
            row.status,
            duration(row.duration_secs)
        );
    }
    if let Some(last) = &s.last_checkpoint {
        let _ = writeln!(out, "Last checkpoint: {}", last);
    }
    let _ = writeln!(out, "{}", s.footer());
    out
}

fn render_timeline(s: &StatusSummary) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", s.header());
    let mut started: Vec<&StageRow> = s.rows.iter().filter(|r| r.start.is_some()).collect();
    started.sort_by(|a, b| a.start.cmp(&b.start).then(a.number.cmp(&b.number)));
    if started.is_empty() {
        let _ = writeln!(out, "  (no stages have run)");
    }
    for row in started {
        let sla = match row.status {
            StageState::Success if row.sla_compliant => "SLA ok",
            StageState::Success => "SLA breached",
            _ => "",
        };
        let _ = writeln!(
            out,
            "  {}  {:02} {:<16} {:<8} {:>8} {}",
            row.start.as_deref().unwrap_or_default(),
            row.number,
            row.name,
            row.status,
            duration(row.duration_secs),
            sla
        );
    }
    let _ = writeln!(out, "{}", s.footer());
    out
}

fn render_compact(s: &StatusSummary) -> String {
    let position = match s.running {
        Some(n) => format!("running {:02}", n),
        None => match s.rows.iter().rev().find(|r| r.status == StageState::Success) {
            Some(r) => format!("last success {:02} {}", r.number, r.name),
            None => "not started".to_string(),
        },
    };
    format!("{} [{}] {} | {}\n", s.change_id, s.lane, position, s.footer())
}

fn render_detailed(s: &StatusSummary) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", s.header());
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "{:<6} {:<16} {:<8} {:<20} {:>9} {:<4} Checkpoints",
        "Stage", "Name", "Status", "Started", "Duration", "SLA"
    );
    for row in &s.rows {
        let cps = row
            .checkpoints
            .iter()
            .map(|(id, ok)| format!("{}{}", id, if *ok { " (ok)" } else { "" }))
            .collect::<Vec<_>>()
            .join(", ");
        let sla = if row.status == StageState::Success {
            if row.sla_compliant { "yes" } else { "no" }
        } else {
            ""
        };
        let _ = writeln!(
            out,
            "{:<6} {:<16} {:<8} {:<20} {:>9} {:<4} {}",
            format!("{:02}", row.number),
            row.name,
            row.status,
            row.start.as_deref().unwrap_or("-"),
            duration(row.duration_secs),
            sla,
            cps
        );
        for (k, v) in &row.metrics {
            let _ = writeln!(out, "       {} = {}", k, v);
        }
    }
    let _ = writeln!(out);
    if let Some(last) = &s.last_checkpoint {
        let _ = writeln!(out, "Last checkpoint: {}", last);
    }
    let _ = writeln!(out, "{}", s.footer());
    out
}
