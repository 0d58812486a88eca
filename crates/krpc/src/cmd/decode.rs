use krpc_frame::RpcFrame;

use crate::cmd::{parse_hex, DecodeArgs};
use crate::exit::{frame_error, CliResult, SUCCESS};
use crate::output::{print_frame, OutputFormat};

pub fn run(args: DecodeArgs, format: OutputFormat) -> CliResult<i32> {
    let raw = parse_hex(&args.hex)?;
    let order = args.remote_order.resolve();

    let frame = RpcFrame::decode(&raw, order, args.max_payload)
        .map_err(|err| frame_error("decode failed", err))?;
    let trailing = raw.len() - frame.wire_size();

    print_frame(&frame, order.as_str(), trailing, format);
    Ok(SUCCESS)
}
