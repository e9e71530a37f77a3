//! Run report: what the planner produced, for display or export.

use serde::Serialize;
use tipflow_core::{Action, Position};

use crate::balancer::ReactionBatch;

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub name: String,
    pub batch: ReactionBatch,
    pub reservoirs: Vec<ReservoirReport>,
    /// Destination → source identifiers, in service order.
    pub layout: Vec<LayoutEntry>,
    pub tips_used: usize,
    pub actions: Vec<Action>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReservoirReport {
    pub position: Position,
    pub loaded_volume: f64,
    pub reactions: u32,
    pub residual_volume: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayoutEntry {
    pub destination: Position,
    pub sources: Vec<String>,
}

/// Format a run report as human-readable text.
pub fn format_report(report: &RunReport) -> String {
    let mut out = String::new();

    out.push_str(&format!("Run: {}\n", report.name));
    out.push_str(&format!(
        "Reservoirs: {} ({} reactions)\n",
        report.batch.tube_count,
        report.batch.reactions_per_tube.iter().sum::<u32>()
    ));
    for r in &report.reservoirs {
        out.push_str(&format!(
            "  {}: load {:.1} µL, {} reactions, residual {:.1} µL\n",
            r.position, r.loaded_volume, r.reactions, r.residual_volume
        ));
    }
    out.push_str(&format!("Tips used: {}\n", report.tips_used));

    out.push_str(&format!("\nSteps ({}):\n", report.actions.len()));
    for (i, action) in report.actions.iter().enumerate() {
        out.push_str(&format!("  {:>4}. {action}\n", i + 1));
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tipflow_core::{Mount, SlotId};

    #[test]
    fn text_report_lists_steps() {
        let report = RunReport {
            name: "demo".to_string(),
            batch: ReactionBatch {
                tube_count: 1,
                reactions_per_tube: vec![2],
                volume_per_tube: vec![40.0],
            },
            reservoirs: vec![ReservoirReport {
                position: Position::new(SlotId(1), "mix", "A1"),
                loaded_volume: 40.0,
                reactions: 2,
                residual_volume: 0.0,
            }],
            layout: Vec::new(),
            tips_used: 1,
            actions: vec![Action::DropTip { mount: Mount::Left }],
        };
        let text = format_report(&report);
        assert!(text.contains("Run: demo"));
        assert!(text.contains("Reservoirs: 1 (2 reactions)"));
        assert!(text.contains("   1. [left] drop tip"));
    }
}
