use anyhow::Result;
use callwarden_event_bus::Response;
use clap::ValueEnum;
use serde::Serialize;
use serde_json::Value;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Human,
    Json,
}

/// Data of a successful response, or the background's error.
pub fn into_data(response: Response) -> Result<Value> {
    if response.success {
        Ok(response.data.unwrap_or(Value::Null))
    } else {
        anyhow::bail!(
            "{}",
            response
                .error
                .unwrap_or_else(|| "request refused".to_string())
        )
    }
}

pub fn print_yaml<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    print!("{}", serde_yaml::to_string(value)?);
    Ok(())
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
