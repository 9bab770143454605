use std::fs;

use bytes::BytesMut;
use seriallink::frame::{clamp_mtu, decode_frame};

use crate::cmd::DecodeArgs;
use crate::exit::{io_error, CliError, CliResult, SUCCESS};
use crate::output::{parse_hex, print_decode_report, DecodeReport, FrameOutput, OutputFormat};

pub fn run(args: DecodeArgs, format: OutputFormat) -> CliResult<i32> {
    let input = read_input(&args)?;
    let report = decode_all(&input, clamp_mtu(args.mtu), args.route);
    print_decode_report(&report, format);
    Ok(SUCCESS)
}

fn read_input(args: &DecodeArgs) -> CliResult<Vec<u8>> {
    if let Some(path) = &args.file {
        return fs::read(path)
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), err));
    }
    match &args.hex {
        Some(hex) => parse_hex(hex).map_err(|err| CliError::usage(format!("hex input: {err}"))),
        None => Err(CliError::usage("provide hex bytes or --file")),
    }
}

/// Decode every complete frame in `input`, accounting for skipped bytes.
pub fn decode_all(input: &[u8], mtu: usize, with_route: bool) -> DecodeReport {
    let mut buf = BytesMut::from(input);
    let mut frames = Vec::new();
    let mut consumed = 0usize;

    while let Some(frame) = decode_frame(&mut buf, mtu) {
        consumed += frame.wire_size();
        frames.push(FrameOutput::new(frames.len(), &frame, with_route));
    }

    DecodeReport {
        frames,
        discarded: input.len() - consumed - buf.len(),
        incomplete: buf.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn garbage_and_trailing_bytes_are_accounted() {
        let input = [0x11, 0x22, 0xFF, 0x02, b'h', b'i', 0xFF, 0x00, 0xFF, 0x05, b'x'];
        let report = decode_all(&input, 100, false);

        assert_eq!(report.frames.len(), 2);
        assert_eq!(report.frames[0].kind, "data");
        assert_eq!(report.frames[0].payload, "hi");
        assert_eq!(report.frames[1].kind, "sentinel");
        assert_eq!(report.discarded, 2);
        assert_eq!(report.incomplete, 3);
    }

    #[test]
    fn oversized_length_counts_as_discarded() {
        let input = [0xFF, 0x10, 0xFF, 0x01, b'a'];
        let report = decode_all(&input, 8, false);

        assert_eq!(report.frames.len(), 1);
        assert_eq!(report.frames[0].payload, "a");
        assert_eq!(report.discarded, 2);
        assert_eq!(report.incomplete, 0);
    }
}
