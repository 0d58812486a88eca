use krpc_frame::{RpcFrame, RpcHeader};

use crate::cmd::EncodeArgs;
use crate::exit::{frame_error, CliResult, SUCCESS};
use crate::output::{print_wire, OutputFormat};

pub fn run(args: EncodeArgs, format: OutputFormat) -> CliResult<i32> {
    let order = args.remote_order.resolve();
    let frame = build_frame(&args);

    let wire = frame
        .to_wire(order)
        .map_err(|err| frame_error("encode failed", err))?;

    print_wire(&wire, order.as_str(), format);
    Ok(SUCCESS)
}

fn build_frame(args: &EncodeArgs) -> RpcFrame {
    let request = RpcFrame::request(args.task, args.procedure, &args.params);
    if !args.reply {
        return request;
    }
    let header = RpcHeader {
        task_id: args.task,
        procedure_id: args.procedure,
        ..RpcHeader::default()
    };
    RpcFrame::reply_to(&header, &args.params)
}

#[cfg(test)]
mod tests {
    use krpc_frame::{KERNEL_ID, REPLY_ID};

    use super::*;
    use crate::cmd::OrderArg;

    fn args(reply: bool) -> EncodeArgs {
        EncodeArgs {
            task: 1024,
            procedure: 3,
            params: vec![0x10, 0x1000_0000],
            reply,
            remote_order: OrderArg::Big,
        }
    }

    #[test]
    fn request_carries_kernel_program() {
        let frame = build_frame(&args(false));
        assert_eq!(frame.header.program_id, KERNEL_ID);
        assert_eq!(frame.header.parameter_size, 8);
        assert_eq!(frame.payload_words(), vec![0x10, 0x1000_0000]);
    }

    #[test]
    fn reply_flag_switches_program() {
        let frame = build_frame(&args(true));
        assert_eq!(frame.header.program_id, REPLY_ID);
        assert_eq!(frame.header.task_id, 1024);
        assert_eq!(frame.reply_value(), Some(0x1000_0000));
    }
}
