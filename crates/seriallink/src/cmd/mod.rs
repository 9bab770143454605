use clap::{Args, Subcommand, ValueEnum};
use std::path::PathBuf;

use seriallink::frame::DEFAULT_MTU;
use seriallink::router::{Function, Mailbox};
use seriallink::transport::DEFAULT_BAUD_RATE;

use crate::exit::CliResult;
use crate::output::OutputFormat;

pub mod attach;
pub mod decode;
pub mod encode;
pub mod loopback;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run two endpoints over a simulated line and route packets between them.
    Loopback(LoopbackArgs),
    /// Print the wire bytes of a frame.
    Encode(EncodeArgs),
    /// Decode frames from hex-encoded line bytes.
    Decode(DecodeArgs),
    /// Open a serial device and print routed inbound packets.
    Attach(AttachArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Loopback(args) => loopback::run(args, format),
        Command::Encode(args) => encode::run(args, format),
        Command::Decode(args) => decode::run(args, format),
        Command::Attach(args) => attach::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

/// Mailbox selection for commands that consume routed packets.
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum MailboxArg {
    Test,
    WirelessCtrl,
    All,
}

impl MailboxArg {
    pub fn mailboxes(self) -> Vec<Mailbox> {
        match self {
            MailboxArg::Test => vec![Mailbox::Test],
            MailboxArg::WirelessCtrl => vec![Mailbox::WirelessCtrl],
            MailboxArg::All => Mailbox::ALL.to_vec(),
        }
    }
}

#[derive(Args, Debug)]
pub struct LoopbackArgs {
    /// Number of packets to send.
    #[arg(long, short = 'n', default_value = "4")]
    pub count: usize,
    /// Packet payload (a sequence number is appended).
    #[arg(long, default_value = "ping")]
    pub data: String,
    /// Route function: test, wireless-ctrl, power-management, app, or a code.
    #[arg(long, default_value = "test", value_parser = parse_function)]
    pub function: Function,
    /// Route destination code.
    #[arg(long, default_value = "1", value_parser = parse_code)]
    pub destination: u8,
    /// Link MTU.
    #[arg(long, default_value_t = DEFAULT_MTU)]
    pub mtu: usize,
    /// Print link, router and bridge statistics at the end.
    #[arg(long)]
    pub stats: bool,
}

#[derive(Args, Debug)]
pub struct EncodeArgs {
    /// String payload for a data frame.
    #[arg(long, conflicts_with_all = ["hex", "sentinel"])]
    pub data: Option<String>,
    /// Hex payload for a data frame.
    #[arg(long, conflicts_with_all = ["data", "sentinel"])]
    pub hex: Option<String>,
    /// Encode a credit sentinel.
    #[arg(long, conflicts_with_all = ["data", "hex"])]
    pub sentinel: bool,
    /// Prefix the payload with a route header.
    #[arg(long, value_parser = parse_function)]
    pub function: Option<Function>,
    /// Route destination code (with --function).
    #[arg(long, default_value = "0", value_parser = parse_code)]
    pub destination: u8,
    /// Link MTU.
    #[arg(long, default_value_t = DEFAULT_MTU)]
    pub mtu: usize,
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// Line bytes as hex (e.g. "ff 02 68 69").
    #[arg(conflicts_with = "file")]
    pub hex: Option<String>,
    /// Read raw line bytes from a file.
    #[arg(long)]
    pub file: Option<PathBuf>,
    /// Parse data frames as routed packets.
    #[arg(long)]
    pub route: bool,
    /// Link MTU.
    #[arg(long, default_value_t = DEFAULT_MTU)]
    pub mtu: usize,
}

#[derive(Args, Debug)]
pub struct AttachArgs {
    /// Serial device path.
    pub path: PathBuf,
    /// Line speed.
    #[arg(long, default_value_t = DEFAULT_BAUD_RATE)]
    pub baud: u32,
    /// Mailboxes to print.
    #[arg(long, value_enum, default_value = "all")]
    pub mailbox: MailboxArg,
    /// Exit after receiving N packets.
    #[arg(long)]
    pub count: Option<usize>,
    /// Link MTU.
    #[arg(long, default_value_t = DEFAULT_MTU)]
    pub mtu: usize,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Parse a function name or numeric code.
pub fn parse_function(input: &str) -> Result<Function, String> {
    match input.to_ascii_lowercase().replace('_', "-").as_str() {
        "test" => Ok(Function::Test),
        "wireless-ctrl" => Ok(Function::WirelessCtrl),
        "power-management" => Ok(Function::PowerManagement),
        "app" => Ok(Function::App),
        other => parse_code(other).map(Function::from_code),
    }
}

/// Parse a byte code given in decimal or `0x` hex.
pub fn parse_code(input: &str) -> Result<u8, String> {
    let parsed = match input
        .strip_prefix("0x")
        .or_else(|| input.strip_prefix("0X"))
    {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => input.parse::<u8>(),
    };
    parsed.map_err(|_| format!("invalid code {input:?}: expected 0-255 or 0x00-0xFF"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn function_names_and_codes() {
        assert_eq!(parse_function("test").unwrap(), Function::Test);
        assert_eq!(parse_function("WIRELESS_CTRL").unwrap(), Function::WirelessCtrl);
        assert_eq!(parse_function("0x06").unwrap(), Function::PowerManagement);
        assert_eq!(parse_function("200").unwrap(), Function::Unrouted(200));
        assert!(parse_function("radio").is_err());
    }

    #[test]
    fn code_range() {
        assert_eq!(parse_code("0xff").unwrap(), 255);
        assert_eq!(parse_code("7").unwrap(), 7);
        assert!(parse_code("256").is_err());
    }

    #[test]
    fn mailbox_selection() {
        assert_eq!(MailboxArg::All.mailboxes(), Mailbox::ALL.to_vec());
        assert_eq!(MailboxArg::Test.mailboxes(), vec![Mailbox::Test]);
    }
}
