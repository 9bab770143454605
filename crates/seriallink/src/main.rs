mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "seriallink", version, about = "Serial link diagnostics CLI")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(long, value_name = "LEVEL", default_value = "warn", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result = cmd::run(cli.command, format);

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use seriallink::router::Function;

    #[test]
    fn parses_loopback_subcommand() {
        let cli = Cli::try_parse_from([
            "seriallink",
            "loopback",
            "--count",
            "3",
            "--function",
            "wireless-ctrl",
        ])
        .expect("loopback args should parse");

        match cli.command {
            Command::Loopback(args) => {
                assert_eq!(args.count, 3);
                assert_eq!(args.function, Function::WirelessCtrl);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn rejects_conflicting_payload_args() {
        let err = Cli::try_parse_from([
            "seriallink",
            "encode",
            "--data",
            "hello",
            "--sentinel",
        ])
        .expect_err("conflicting args should fail");

        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn parses_attach_subcommand() {
        let cli = Cli::try_parse_from([
            "seriallink",
            "attach",
            "/dev/ttyUSB1",
            "--baud",
            "57600",
            "--mailbox",
            "test",
        ])
        .expect("attach args should parse");
        match cli.command {
            Command::Attach(args) => {
                assert_eq!(args.baud, 57600);
                assert_eq!(args.mailbox, cmd::MailboxArg::Test);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn rejects_out_of_range_destination() {
        let err = Cli::try_parse_from(["seriallink", "loopback", "--destination", "300"])
            .expect_err("destination must fit a byte");
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }
}
