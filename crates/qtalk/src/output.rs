use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use serde_json::Value;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

/// One value received from a call. `index` 0 is the response value, later
/// indexes are streamed values.
#[derive(Serialize)]
struct ValueOutput<'a> {
    selector: &'a str,
    index: usize,
    continues: bool,
    value: &'a Value,
    timestamp: String,
}

pub fn print_value(selector: &str, index: usize, continues: bool, value: &Value, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = ValueOutput {
                selector,
                index,
                continues,
                value,
                timestamp: now_unix_seconds(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["SELECTOR", "INDEX", "CONTINUES", "VALUE"])
                .add_row(vec![
                    selector.to_string(),
                    index.to_string(),
                    continues.to_string(),
                    value_preview(value),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            let body = serde_json::to_string_pretty(value).unwrap_or_else(|_| value_preview(value));
            println!("{selector}[{index}] continues={continues}\n{body}");
        }
        OutputFormat::Raw => {
            let mut line = value_preview(value).into_bytes();
            line.push(b'\n');
            print_raw(&line);
        }
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

/// Strings print bare; everything else prints as compact JSON.
fn value_preview(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
