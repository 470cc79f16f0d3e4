use anyhow::Result;
use callwarden_event_bus::{Request, ToggleFlag};
use clap::{Args, ValueEnum};

use super::context::CliContext;
use super::output::into_data;

#[derive(Args, Clone, Debug)]
pub struct ToggleArgs {
    /// Flag to change
    #[arg(value_enum)]
    pub flag: FlagArg,

    /// New state; flips the current one when omitted
    #[arg(value_enum)]
    pub state: Option<Switch>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum FlagArg {
    /// The on-page debug log
    Debug,
    /// The on-page exit information overlay
    ExitInfo,
    /// Leaving automatically when the exit condition is met
    AutoExit,
}

impl From<FlagArg> for ToggleFlag {
    fn from(flag: FlagArg) -> Self {
        match flag {
            FlagArg::Debug => ToggleFlag::Debug,
            FlagArg::ExitInfo => ToggleFlag::ExitInfo,
            FlagArg::AutoExit => ToggleFlag::AutoExit,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Switch {
    On,
    Off,
}

pub async fn cmd_toggle(args: ToggleArgs, ctx: &CliContext) -> Result<()> {
    let flag = ToggleFlag::from(args.flag);
    let request = Request::Toggle {
        flag,
        enabled: args.state.map(|state| state == Switch::On),
    };
    let (host, _fired) = ctx.local_host(None).await?;
    let response = host.request(request).await;
    host.shutdown().await;

    let config = into_data(response)?;
    let key = flag.config_key();
    let state = match config.get(key).and_then(|v| v.as_bool()) {
        Some(true) => "on",
        Some(false) => "off",
        None => "unknown",
    };
    println!("{key}: {state}");
    Ok(())
}
