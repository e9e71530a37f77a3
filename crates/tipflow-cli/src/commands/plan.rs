use std::io::BufRead;
use std::path::Path;

use tipflow_core::RunConfig;
use tipflow_deck::{AutoAcknowledge, DeckError, DeckResult, Operator, ReplacementRequest};
use tipflow_planner::{Protocol, RunReport, format_report};
use tracing::{info, warn};

pub fn plan(config: &str, format: &str, layout_out: Option<&str>, auto_ack: bool) -> anyhow::Result<()> {
    let path = Path::new(config);
    let report = if auto_ack {
        plan_file(path, &mut AutoAcknowledge::default())?
    } else {
        plan_file(path, &mut StdinOperator::new(std::io::stdin().lock()))?
    };

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        _ => {
            println!("{}", format_report(&report));
        }
    }

    if let Some(path) = layout_out {
        std::fs::write(path, serde_json::to_string_pretty(&report.layout)?)?;
        info!(path, entries = report.layout.len(), "layout written");
    }

    Ok(())
}

fn plan_file(path: &Path, operator: &mut dyn Operator) -> anyhow::Result<RunReport> {
    let config = RunConfig::from_file(path)?;
    let mut protocol = Protocol::from_config(config)?;
    Ok(protocol.run(operator)?)
}

/// Blocks on `input` until the operator confirms the racks were swapped.
///
/// A line (even an empty one) acknowledges. End of input or a read error
/// aborts the run.
struct StdinOperator<R> {
    input: R,
}

impl<R: BufRead> StdinOperator<R> {
    fn new(input: R) -> Self {
        Self { input }
    }
}

impl<R: BufRead> Operator for StdinOperator<R> {
    fn await_tip_replacement(&mut self, request: &ReplacementRequest) -> DeckResult<()> {
        eprint!("{} Press Enter to continue. ", request.message());
        let mut line = String::new();
        let reason = match self.input.read_line(&mut line) {
            Ok(0) => "input closed".to_string(),
            Ok(_) => return Ok(()),
            Err(e) => e.to_string(),
        };
        warn!(mount = %request.mount, %reason, "tip rack replacement not acknowledged");
        Err(DeckError::ReplacementNotAcknowledged {
            mount: request.mount,
            reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tipflow_core::{Mount, ReplacePolicy, SlotId, TipChangePolicy};
    use tipflow_planner::PlanError;

    fn write_config(dir: &Path, config: &RunConfig) -> std::path::PathBuf {
        let path = dir.join("run.toml");
        std::fs::write(&path, config.to_toml_string().unwrap()).unwrap();
        path
    }

    fn request() -> ReplacementRequest {
        ReplacementRequest {
            mount: Mount::Right,
            rack_kind: "opentrons_96_filtertiprack_20ul".to_string(),
            slots: vec![SlotId(4)],
        }
    }

    #[test]
    fn plans_scaffold_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(dir.path(), &RunConfig::scaffold("cli"));

        let report = plan_file(&path, &mut AutoAcknowledge::default()).unwrap();
        assert_eq!(report.name, "cli");
        assert_eq!(report.layout.len(), 96);
    }

    #[test]
    fn missing_config_is_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(plan_file(&dir.path().join("absent.toml"), &mut AutoAcknowledge::default()).is_err());
    }

    #[test]
    fn enter_acknowledges_replacement() {
        let mut op = StdinOperator::new(&b"\n"[..]);
        assert_eq!(op.await_tip_replacement(&request()), Ok(()));
    }

    #[test]
    fn closed_input_refuses_replacement() {
        let mut op = StdinOperator::new(std::io::empty());
        assert!(matches!(
            op.await_tip_replacement(&request()),
            Err(DeckError::ReplacementNotAcknowledged { mount: Mount::Right, .. })
        ));
    }

    #[test]
    fn run_aborts_when_nobody_replaces_tips() {
        let mut config = RunConfig::scaffold("unattended");
        config.tips.replace = ReplacePolicy::ReplaceInPlace;
        config.pipettes[0].starting_tip = Some("H12".to_string());
        config.reagent.tip_policy = TipChangePolicy::PerWell;
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(dir.path(), &config);

        let err = plan_file(&path, &mut StdinOperator::new(std::io::empty())).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PlanError>(),
            Some(PlanError::Deck(DeckError::ReplacementNotAcknowledged { .. }))
        ));
    }
}
