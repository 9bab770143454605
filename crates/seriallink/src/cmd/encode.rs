use bytes::{Bytes, BytesMut};
use seriallink::frame::{clamp_mtu, encode_frame, Frame};
use seriallink::router::{RoutablePacket, Route};

use crate::cmd::EncodeArgs;
use crate::exit::{frame_error, router_error, CliError, CliResult, SUCCESS};
use crate::output::{parse_hex, print_encoded, to_hex, EncodeOutput, OutputFormat};

pub fn run(args: EncodeArgs, format: OutputFormat) -> CliResult<i32> {
    let mtu = clamp_mtu(args.mtu);
    let frame = build_frame(&args, mtu)?;

    let mut wire = BytesMut::new();
    encode_frame(&frame, mtu, &mut wire).map_err(|err| frame_error("encode failed", err))?;

    let out = EncodeOutput {
        kind: if frame.is_sentinel() { "sentinel" } else { "data" },
        length: frame.payload().map_or(0, Bytes::len),
        wire_size: wire.len(),
        hex: to_hex(&wire),
    };
    print_encoded(&out, &wire, format);
    Ok(SUCCESS)
}

fn build_frame(args: &EncodeArgs, mtu: usize) -> CliResult<Frame> {
    if args.sentinel {
        return Ok(Frame::Sentinel);
    }

    let payload = if let Some(data) = &args.data {
        Bytes::from(data.clone().into_bytes())
    } else if let Some(hex) = &args.hex {
        Bytes::from(parse_hex(hex).map_err(|err| CliError::usage(format!("--hex: {err}")))?)
    } else {
        return Err(CliError::usage(
            "one of --data, --hex or --sentinel is required",
        ));
    };

    match args.function {
        Some(function) => {
            let packet = RoutablePacket::new(Route::new(args.destination, function), payload);
            packet
                .validate(mtu)
                .map_err(|err| router_error("encode failed", err))?;
            Ok(Frame::Data(packet.to_bytes()))
        }
        None => Ok(Frame::Data(payload)),
    }
}
