//! `get_system_time`: current date and time in a chosen timezone.

use crate::builtins::utils::parse_args;
use crate::{Tool, ToolContext};
use async_trait::async_trait;
use chrono::{DateTime, Datelike, Local, TimeZone, Utc, Weekday};
use chrono_tz::Tz;
use serde::Deserialize;
use serde_json::{Value, json};
use sidekick_rs_protocol::ToolError;

/// Tool reporting the current time.
#[derive(Debug, Default)]
pub struct SystemTimeTool;

#[derive(Debug, Deserialize)]
struct TimeArgs {
    #[serde(default)]
    timezone: Option<String>,
    #[serde(default)]
    format: Option<String>,
}

#[async_trait]
impl Tool for SystemTimeTool {
    fn name(&self) -> &str {
        "get_system_time"
    }

    fn description(&self) -> &str {
        "Get the current date, time, weekday, and timezone. Use before answering \
         questions about today, dates, or relative times."
    }

    fn args_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "timezone": {
                    "type": "string",
                    "description": "IANA timezone such as Asia/Shanghai, UTC, or America/New_York. Defaults to the local timezone."
                },
                "format": {
                    "type": "string",
                    "enum": ["iso", "timestamp", "readable"],
                    "description": "Shape of the `formatted` field. Defaults to readable."
                }
            }
        })
    }

    async fn call(&self, _ctx: &ToolContext, args: Value) -> Result<Value, ToolError> {
        let input: TimeArgs = parse_args(args)?;
        let format = input.format.as_deref().unwrap_or("readable");
        let now = Utc::now();
        match input.timezone.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => {
                let tz: Tz = name.parse().map_err(|err| {
                    ToolError::InvalidArguments(format!("unknown timezone {name}: {err}"))
                })?;
                describe(&now.with_timezone(&tz), tz.name(), format)
            }
            _ => describe(&now.with_timezone(&Local), "local", format),
        }
    }
}

/// Render a timestamp into the tool's result record.
fn describe<Z: TimeZone>(at: &DateTime<Z>, zone: &str, format: &str) -> Result<Value, ToolError>
where
    Z::Offset: std::fmt::Display,
{
    let iso = at.to_rfc3339();
    let timestamp = at.timestamp();
    let readable = at.format("%Y-%m-%d %H:%M:%S").to_string();
    let formatted = match format {
        "iso" => json!(iso),
        "timestamp" => json!(timestamp),
        "readable" => json!(format!("{readable} {} ({zone})", weekday_name(at.weekday()))),
        other => {
            return Err(ToolError::InvalidArguments(format!(
                "unsupported format: {other}"
            )));
        }
    };
    Ok(json!({
        "date": at.format("%Y-%m-%d").to_string(),
        "time": at.format("%H:%M:%S").to_string(),
        "datetime": readable,
        "weekday": weekday_name(at.weekday()),
        "timezone": zone,
        "utc_offset": at.offset().to_string(),
        "timestamp": timestamp,
        "iso_format": iso,
        "formatted": formatted,
    }))
}

fn weekday_name(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}
