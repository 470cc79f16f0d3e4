use std::time::Duration;

use anyhow::{bail, Context, Result};
use callwarden_config_store::ScheduledMeeting;
use callwarden_core_types::now_ms;
use callwarden_event_bus::Request;
use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use clap::{Args, Subcommand};

use super::context::CliContext;
use super::output::into_data;
use crate::host::LocalHost;

#[derive(Args, Clone, Debug)]
pub struct ScheduleArgs {
    #[command(subcommand)]
    pub action: ScheduleAction,
}

#[derive(Subcommand, Clone, Debug)]
pub enum ScheduleAction {
    /// Schedule a meeting
    Add {
        /// Meeting URL on the configured platform host
        url: String,

        /// Start time: RFC 3339, "YYYY-MM-DD HH:MM" (local) or epoch milliseconds
        #[arg(long, conflicts_with = "within", required_unless_present = "within")]
        at: Option<String>,

        /// Start after this long, e.g. "15m" or "1h 30m"
        #[arg(long = "in", value_name = "DURATION")]
        within: Option<String>,
    },

    /// List scheduled meetings
    List {
        /// Include completed meetings
        #[arg(long)]
        all: bool,
    },

    /// Remove a scheduled meeting and its alarm
    Remove {
        url: String,

        /// Start time, in any format accepted by `add --at`
        time: String,
    },
}

pub async fn cmd_schedule(args: ScheduleArgs, ctx: &CliContext) -> Result<()> {
    let (host, _fired) = ctx.local_host(None).await?;
    let outcome = run_action(args.action, &host).await;
    host.shutdown().await;
    outcome
}

async fn run_action(action: ScheduleAction, host: &LocalHost) -> Result<()> {
    match action {
        ScheduleAction::Add { url, at, within } => {
            let time = match (at.as_deref(), within.as_deref()) {
                (Some(at), _) => parse_meeting_time(at)?,
                (None, Some(within)) => now_ms() + parse_delay(within)?.as_millis() as i64,
                (None, None) => bail!("either --at or --in is required"),
            };
            let data = into_data(
                host.request(Request::ScheduleMeeting {
                    url: url.clone(),
                    time,
                })
                .await,
            )?;
            let added = data.get("added").and_then(|v| v.as_bool()).unwrap_or(false);
            let verb = if added { "Scheduled" } else { "Already scheduled" };
            println!("{verb} {url} at {}", format_time(time));
            if let Some(evicted) = data.get("evicted").and_then(|v| v.as_u64()) {
                if evicted > 0 {
                    println!("Dropped {evicted} oldest meeting(s) to stay within the list limit");
                }
            }
        }
        ScheduleAction::List { all } => {
            let data = into_data(
                host.request(Request::GetMeetings {
                    include_completed: all,
                })
                .await,
            )?;
            let meetings: Vec<ScheduledMeeting> =
                serde_json::from_value(data).context("decoding meeting list")?;
            if meetings.is_empty() {
                println!("No meetings scheduled");
            }
            for meeting in meetings {
                let status = match (meeting.completed, meeting.exit_reason.as_deref()) {
                    (true, Some(reason)) => format!("done: {reason}"),
                    (true, None) => "done".to_string(),
                    (false, _) => "pending".to_string(),
                };
                println!(
                    "{}  {:<14}  {}  ({})",
                    format_time(meeting.time),
                    status,
                    meeting.url,
                    meeting.time
                );
            }
        }
        ScheduleAction::Remove { url, time } => {
            let time = parse_meeting_time(&time)?;
            let data = into_data(
                host.request(Request::RemoveMeetingAlarm {
                    url: url.clone(),
                    time,
                })
                .await,
            )?;
            if data.get("removed").and_then(|v| v.as_bool()).unwrap_or(false) {
                println!("Removed {url} at {}", format_time(time));
            } else {
                bail!("no meeting {url} at {}", format_time(time));
            }
        }
    }
    Ok(())
}

/// Parses an absolute start time into epoch milliseconds.
pub fn parse_meeting_time(raw: &str) -> Result<i64> {
    let raw = raw.trim();
    if let Ok(ms) = raw.parse::<i64>() {
        return Ok(ms);
    }
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Ok(at.timestamp_millis());
    }
    for format in ["%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            let local = Local
                .from_local_datetime(&naive)
                .earliest()
                .with_context(|| format!("{raw} does not exist in the local time zone"))?;
            return Ok(local.timestamp_millis());
        }
    }
    bail!("unrecognized time {raw:?}; use RFC 3339, \"YYYY-MM-DD HH:MM\" or epoch milliseconds")
}

fn parse_delay(raw: &str) -> Result<Duration> {
    humantime::parse_duration(raw).with_context(|| format!("invalid duration {raw:?}"))
}

fn format_time(ms: i64) -> String {
    match Local.timestamp_millis_opt(ms).single() {
        Some(at) => at.format("%Y-%m-%d %H:%M").to_string(),
        None => ms.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epoch_and_rfc3339_times() {
        assert_eq!(parse_meeting_time("1700000000000").unwrap(), 1_700_000_000_000);
        assert_eq!(
            parse_meeting_time("2023-11-14T22:13:20Z").unwrap(),
            1_700_000_000_000
        );
        assert_eq!(
            parse_meeting_time("2023-11-14T23:13:20+01:00").unwrap(),
            1_700_000_000_000
        );
    }

    #[test]
    fn local_times_round_trip_through_the_display_format() {
        let ms = parse_meeting_time("2031-03-04 09:30").unwrap();
        assert_eq!(format_time(ms), "2031-03-04 09:30");
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(parse_meeting_time("next tuesday").is_err());
        assert!(parse_delay("soon").is_err());
        assert_eq!(parse_delay("1h 30m").unwrap(), Duration::from_secs(5400));
    }
}
