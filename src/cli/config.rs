use anyhow::{bail, Result};
use callwarden_config_store::{MeetingConfig, CONFIG_KEYS};
use callwarden_event_bus::Request;
use clap::{Args, Subcommand};
use serde_json::{Map, Value as JsonValue};
use tracing::info;

use super::output::{into_data, print_yaml};
use crate::cli::context::CliContext;
use crate::host::LocalHost;

#[derive(Args, Clone, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Clone, Debug)]
pub enum ConfigAction {
    /// Show the stored meeting configuration
    Show,

    /// Set one configuration value
    Set {
        /// Configuration key, e.g. exitMode or minParticipants
        key: String,

        /// New value; parsed as JSON when possible, otherwise taken as text
        value: String,
    },

    /// Get one configuration value
    Get {
        /// Configuration key
        key: String,
    },

    /// Reset the configuration to defaults
    Reset,
}

pub async fn cmd_config(args: ConfigArgs, ctx: &CliContext) -> Result<()> {
    let (host, _fired) = ctx.local_host(None).await?;
    let outcome = run_action(args.action, &host).await;
    host.shutdown().await;
    outcome
}

async fn run_action(action: ConfigAction, host: &LocalHost) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = into_data(host.request(Request::GetConfig).await)?;
            print_yaml(&config)?;
        }
        ConfigAction::Get { key } => {
            check_key(&key)?;
            let config = into_data(host.request(Request::GetConfig).await)?;
            match config.get(&key) {
                Some(value) => print_yaml(value)?,
                None => bail!("{} not found in configuration", key),
            }
        }
        ConfigAction::Set { key, value } => {
            check_key(&key)?;
            let mut patch = Map::new();
            patch.insert(key.clone(), parse_cli_value(&value));
            let config = into_data(host.request(Request::UpdateConfig(patch)).await)?;
            info!("Updated configuration key {}", key);
            // Invalid values fall back to defaults; show what was stored.
            if let Some(stored) = config.get(&key) {
                println!("{key} = {stored}");
            }
        }
        ConfigAction::Reset => {
            let defaults = serde_json::to_value(MeetingConfig::default())?;
            let JsonValue::Object(patch) = defaults else {
                bail!("default configuration is not an object");
            };
            let config = into_data(host.request(Request::UpdateConfig(patch)).await)?;
            println!("Configuration reset to defaults:");
            print_yaml(&config)?;
        }
    }
    Ok(())
}

fn check_key(key: &str) -> Result<()> {
    if CONFIG_KEYS.contains(&key) {
        Ok(())
    } else {
        bail!(
            "unknown configuration key {key}; expected one of {}",
            CONFIG_KEYS.join(", ")
        )
    }
}

pub fn parse_cli_value(raw: &str) -> JsonValue {
    serde_json::from_str(raw).unwrap_or_else(|_| JsonValue::String(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn cli_values_prefer_json() {
        assert_eq!(parse_cli_value("5"), json!(5));
        assert_eq!(parse_cli_value("false"), json!(false));
        assert_eq!(parse_cli_value("peak"), json!("peak"));
        assert_eq!(parse_cli_value("\"10\""), json!("10"));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(check_key("minParticipants").is_ok());
        assert!(check_key("minimum").is_err());
    }
}
