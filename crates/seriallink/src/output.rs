use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use seriallink::frame::Frame;
use seriallink::router::{RoutablePacket, Route};
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
pub struct RouteOutput {
    pub destination: u8,
    pub function: &'static str,
    pub function_code: u8,
}

impl From<Route> for RouteOutput {
    fn from(route: Route) -> Self {
        Self {
            destination: route.destination,
            function: route.function.name(),
            function_code: route.function.code(),
        }
    }
}

#[derive(Serialize)]
struct PacketOutput<'a> {
    endpoint: &'a str,
    #[serde(flatten)]
    route: RouteOutput,
    payload_size: usize,
    payload: String,
    timestamp: String,
}

/// Print one routed packet received by `endpoint`.
pub fn print_packet(packet: &RoutablePacket, endpoint: &str, format: OutputFormat) {
    let route = RouteOutput::from(packet.route);
    match format {
        OutputFormat::Json => {
            let out = PacketOutput {
                endpoint,
                route,
                payload_size: packet.payload.len(),
                payload: payload_preview(packet.payload.as_ref()),
                timestamp: now_unix_seconds(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = new_table();
            table
                .set_header(vec!["ENDPOINT", "FUNCTION", "DEST", "SIZE", "PAYLOAD"])
                .add_row(vec![
                    endpoint.to_string(),
                    packet.route.function.to_string(),
                    format!("0x{:02X}", route.destination),
                    packet.payload.len().to_string(),
                    payload_preview(packet.payload.as_ref()),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "endpoint={} function={} dest=0x{:02X} size={} payload={}",
                endpoint,
                packet.route.function,
                route.destination,
                packet.payload.len(),
                payload_preview(packet.payload.as_ref())
            );
        }
        OutputFormat::Raw => {
            print_raw(packet.payload.as_ref());
        }
    }
}

/// A frame recovered from a byte stream.
#[derive(Serialize)]
pub struct FrameOutput {
    pub index: usize,
    pub kind: &'static str,
    pub length: usize,
    pub payload: String,
    pub payload_hex: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub route: Option<RouteOutput>,
}

impl FrameOutput {
    pub fn new(index: usize, frame: &Frame, with_route: bool) -> Self {
        match frame.payload() {
            None => Self {
                index,
                kind: "sentinel",
                length: 0,
                payload: String::new(),
                payload_hex: String::new(),
                route: None,
            },
            Some(payload) => Self {
                index,
                kind: "data",
                length: payload.len(),
                payload: payload_preview(payload.as_ref()),
                payload_hex: to_hex(payload.as_ref()),
                route: with_route
                    .then(|| RoutablePacket::from_bytes(payload.clone()).ok())
                    .flatten()
                    .map(|packet| RouteOutput::from(packet.route)),
            },
        }
    }
}

#[derive(Serialize)]
pub struct DecodeReport {
    pub frames: Vec<FrameOutput>,
    /// Bytes skipped while hunting for a start marker.
    pub discarded: usize,
    /// Bytes of a trailing incomplete frame.
    pub incomplete: usize,
}

pub fn print_decode_report(report: &DecodeReport, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(report).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = new_table();
            table.set_header(vec!["#", "KIND", "LEN", "ROUTE", "PAYLOAD"]);
            for frame in &report.frames {
                table.add_row(vec![
                    frame.index.to_string(),
                    frame.kind.to_string(),
                    frame.length.to_string(),
                    frame
                        .route
                        .as_ref()
                        .map(|route| format!("{} -> 0x{:02X}", route.function, route.destination))
                        .unwrap_or_default(),
                    frame.payload.clone(),
                ]);
            }
            println!("{table}");
            println!(
                "discarded={} incomplete={}",
                report.discarded, report.incomplete
            );
        }
        OutputFormat::Pretty => {
            for frame in &report.frames {
                match &frame.route {
                    Some(route) => println!(
                        "#{} {} len={} function={} dest=0x{:02X} payload={}",
                        frame.index,
                        frame.kind,
                        frame.length,
                        route.function,
                        route.destination,
                        frame.payload
                    ),
                    None => println!(
                        "#{} {} len={} payload={}",
                        frame.index, frame.kind, frame.length, frame.payload
                    ),
                }
            }
            println!(
                "discarded={} incomplete={}",
                report.discarded, report.incomplete
            );
        }
        OutputFormat::Raw => {
            for frame in &report.frames {
                println!("{}", frame.payload_hex);
            }
        }
    }
}

#[derive(Serialize)]
pub struct EncodeOutput {
    pub kind: &'static str,
    pub length: usize,
    pub wire_size: usize,
    pub hex: String,
}

pub fn print_encoded(out: &EncodeOutput, wire: &[u8], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = new_table();
            table
                .set_header(vec!["KIND", "LEN", "WIRE", "HEX"])
                .add_row(vec![
                    out.kind.to_string(),
                    out.length.to_string(),
                    out.wire_size.to_string(),
                    out.hex.clone(),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => println!("{}", out.hex),
        OutputFormat::Raw => print_raw(wire),
    }
}

/// Print any serializable stats record as JSON, or as a two-column table.
pub fn print_stats<T: Serialize>(title: &str, stats: &T, format: OutputFormat) {
    let value = match serde_json::to_value(stats) {
        Ok(value) => value,
        Err(_) => return,
    };
    match format {
        OutputFormat::Json | OutputFormat::Raw => {
            let mut wrapped = serde_json::Map::new();
            wrapped.insert(title.to_string(), value);
            println!("{}", serde_json::Value::Object(wrapped));
        }
        OutputFormat::Table | OutputFormat::Pretty => {
            let mut table = new_table();
            table.set_header(vec![title.to_uppercase(), String::new()]);
            if let serde_json::Value::Object(fields) = value {
                for (key, field) in fields {
                    table.add_row(vec![key, field.to_string()]);
                }
            }
            println!("{table}");
        }
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

/// Lowercase hex, space separated: `ff 02 68 69`.
pub fn to_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Parse hex text. Whitespace, `:` and `,` separators and `0x` prefixes are
/// ignored.
pub fn parse_hex(input: &str) -> Result<Vec<u8>, String> {
    let digits: String = input
        .split(|c: char| c.is_whitespace() || c == ':' || c == ',')
        .map(|token| token.trim_start_matches("0x").trim_start_matches("0X"))
        .collect();

    if !digits.is_ascii() {
        return Err("hex input must be ASCII".to_string());
    }
    if digits.len() % 2 != 0 {
        return Err(format!("odd number of hex digits ({})", digits.len()));
    }

    (0..digits.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&digits[i..i + 2], 16)
                .map_err(|_| format!("invalid hex byte: {}", &digits[i..i + 2]))
        })
        .collect()
}

fn new_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

fn payload_preview(payload: &[u8]) -> String {
    match std::str::from_utf8(payload) {
        Ok(text) => text.to_string(),
        Err(_) => format!("<binary {} bytes>", payload.len()),
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
