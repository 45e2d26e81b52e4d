use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use scipline_frame::Response;
use serde::Serialize;

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

#[derive(Serialize)]
struct ResponseOutput<'a> {
    command: Option<&'a str>,
    transaction_id: Option<String>,
    status: Option<&'a str>,
    streaming: bool,
    payload: Vec<String>,
    bytes: usize,
    timestamp: String,
}

pub fn print_response(response: &Response, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = ResponseOutput {
                command: response.command(),
                transaction_id: response.transaction_id().map(|xid| format!("{xid:08x}")),
                status: response.status(),
                streaming: response.is_streaming(),
                payload: response.payload_lines().map(lossy).collect(),
                bytes: response.byte_len(),
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
                .set_header(vec!["COMMAND", "STATUS", "LINES", "PAYLOAD"])
                .add_row(vec![
                    response.command().unwrap_or("").to_string(),
                    response.status().unwrap_or("").to_string(),
                    response.len().to_string(),
                    response
                        .payload_lines()
                        .map(lossy)
                        .collect::<Vec<_>>()
                        .join("\n"),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "command={} status={} lines={}",
                response.command().unwrap_or("?"),
                response.status().unwrap_or("?"),
                response.len()
            );
            for line in response.payload_lines() {
                println!("  {}", lossy(line));
            }
        }
        OutputFormat::Raw => {
            for line in response.lines() {
                print_raw(line.as_bytes());
            }
        }
    }
}

/// One `KEY:value` entry from a `VV`, `PP` or `II` reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Property {
    pub source: String,
    pub key: String,
    pub value: String,
}

/// Split the `KEY:value;` payload lines of a property reply.
///
/// Lines without a `:` are skipped.
pub fn parse_properties(source: &str, response: &Response) -> Vec<Property> {
    response
        .payload_lines()
        .filter_map(|line| {
            let text = lossy(line);
            let text = text.strip_suffix(';').unwrap_or(&text);
            let (key, value) = text.split_once(':')?;
            Some(Property {
                source: source.to_string(),
                key: key.to_string(),
                value: value.to_string(),
            })
        })
        .collect()
}

pub fn print_properties(properties: &[Property], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(properties).unwrap_or_else(|_| "[]".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["SOURCE", "KEY", "VALUE"]);
            for p in properties {
                table.add_row(vec![p.source.as_str(), p.key.as_str(), p.value.as_str()]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for p in properties {
                println!("{:<2} {:<5} {}", p.source, p.key, p.value);
            }
        }
        OutputFormat::Raw => {
            for p in properties {
                println!("{}:{}", p.key, p.value);
            }
        }
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}

#[cfg(test)]
mod tests {
    use scipline_frame::Line;

    use super::*;

    #[test]
    fn parses_property_lines() {
        let response = Response::from_lines(vec![
            Line::new(&b"VV;00000001\n"[..]),
            Line::new(&b"00P\n"[..]),
            Line::new(&b"VEND:Hokuyo Automatic Co.,Ltd.;[\n"[..]),
            Line::new(&b"SERI:H0906078;X\n"[..]),
            Line::new(&b"garbage\n"[..]),
            Line::new(&b"\n"[..]),
        ]);

        let props = parse_properties("VV", &response);
        assert_eq!(props.len(), 2);
        assert_eq!(props[0].key, "VEND");
        assert_eq!(props[0].value, "Hokuyo Automatic Co.,Ltd.");
        assert_eq!(props[1].key, "SERI");
        assert_eq!(props[1].value, "H0906078");
        assert!(props.iter().all(|p| p.source == "VV"));
    }
}
