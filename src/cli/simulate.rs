use std::time::Duration;

use anyhow::{bail, Result};
use callwarden_config_store::{ExitMode, MeetingConfig};
use clap::{Args, ValueEnum};
use serde_json::{json, Map, Value};

use super::context::CliContext;
use super::output::print_json;
use crate::simulate::simulate_counts;

#[derive(Args, Clone, Debug)]
pub struct SimulateArgs {
    /// Participant counts read one after another, e.g. 10,8,5,3,2
    #[arg(long, value_delimiter = ',', required = true, num_args = 1..)]
    pub counts: Vec<u32>,

    /// Exit condition to test
    #[arg(long, value_enum, default_value_t = SimulatedMode::Participants)]
    pub mode: SimulatedMode,

    /// Participant threshold (participants mode)
    #[arg(long)]
    pub min: Option<u32>,

    /// Percent of the peak (peak mode)
    #[arg(long)]
    pub peak: Option<u32>,

    /// Milliseconds between readings
    #[arg(long, default_value_t = 250)]
    pub step_ms: u64,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum SimulatedMode {
    Participants,
    Peak,
}

impl From<SimulatedMode> for ExitMode {
    fn from(mode: SimulatedMode) -> Self {
        match mode {
            SimulatedMode::Participants => ExitMode::Participants,
            SimulatedMode::Peak => ExitMode::Peak,
        }
    }
}

pub async fn cmd_simulate(args: SimulateArgs, _ctx: &CliContext) -> Result<()> {
    let config = simulated_config(&args);
    if args.step_ms == 0 {
        bail!("--step-ms must be positive");
    }
    let report = simulate_counts(&config, &args.counts, Duration::from_millis(args.step_ms)).await?;

    if args.json {
        return print_json(&report);
    }
    let rule = match config.exit_mode {
        ExitMode::Peak => format!("peak mode, {}% of peak", config.peak_percentage),
        _ => format!("participants mode, minimum {}", config.min_participants),
    };
    println!("Counts: {:?} ({rule})", args.counts);
    match (report.exit_index, report.exit_count) {
        (Some(index), Some(count)) => println!(
            "Exit at reading #{} (count {count}): {}",
            index + 1,
            report.reason.as_deref().unwrap_or("unknown")
        ),
        _ => println!("No exit: the condition was never met"),
    }
    println!(
        "Peak {}, completions recorded {}, left cleanly: {}",
        report.peak, report.completions, report.left
    );
    Ok(())
}

fn simulated_config(args: &SimulateArgs) -> MeetingConfig {
    let mut patch = Map::new();
    patch.insert(
        "exitMode".into(),
        json!(ExitMode::from(args.mode).as_str()),
    );
    patch.insert("autoExitEnabled".into(), Value::Bool(true));
    if let Some(min) = args.min {
        patch.insert("minParticipants".into(), json!(min));
    }
    if let Some(peak) = args.peak {
        patch.insert("peakPercentage".into(), json!(peak));
    }
    MeetingConfig::default().merged(&patch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        args: SimulateArgs,
    }

    #[test]
    fn flags_become_a_sanitized_config() {
        let harness =
            Harness::try_parse_from(["simulate", "--counts", "10,8,5", "--mode", "peak", "--peak", "250"])
                .unwrap();
        assert_eq!(harness.args.counts, vec![10, 8, 5]);
        let config = simulated_config(&harness.args);
        assert_eq!(config.exit_mode, ExitMode::Peak);
        assert_eq!(config.peak_percentage, 100);
        assert!(config.auto_exit_enabled);
    }

    #[test]
    fn minimum_is_clamped_to_one() {
        let harness =
            Harness::try_parse_from(["simulate", "--counts", "3,1", "--min", "0"]).unwrap();
        let config = simulated_config(&harness.args);
        assert_eq!(config.exit_mode, ExitMode::Participants);
        assert_eq!(config.min_participants, 1);
    }
}
