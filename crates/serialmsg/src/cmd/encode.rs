use std::fs;

use bytes::BytesMut;
use serialmsg_frame::{encode_frame, Frame, Integrity};

use crate::cmd::{EncodeArgs, PayloadArgs};
use crate::exit::{frame_error, io_error, CliResult, SUCCESS};
use crate::hex;
use crate::output::{print_encoded, EncodedFrame, OutputFormat};

pub fn run(args: EncodeArgs, format: OutputFormat) -> CliResult<i32> {
    let payload = resolve_payload(&args.payload)?;
    let integrity = if args.crc {
        Integrity::Crc16
    } else {
        Integrity::None
    };

    let encoded = encode(args.msg_type, args.msg_id, payload, integrity)?;
    print_encoded(&encoded, format);
    Ok(SUCCESS)
}

fn encode(
    msg_type: u8,
    msg_id: u8,
    payload: Vec<u8>,
    integrity: Integrity,
) -> CliResult<EncodedFrame> {
    let frame =
        Frame::new(msg_type, msg_id, payload).map_err(|err| frame_error("encode failed", err))?;
    let mut buf = BytesMut::with_capacity(frame.wire_size());
    encode_frame(
        frame.msg_type(),
        frame.msg_id(),
        &frame.payload,
        integrity,
        &mut buf,
    )
    .map_err(|err| frame_error("encode failed", err))?;

    Ok(EncodedFrame {
        msg_type: frame.msg_type(),
        msg_id: frame.msg_id(),
        len: frame.payload.len(),
        hex: hex::encode(&buf, " "),
        bytes: buf.to_vec(),
    })
}

fn resolve_payload(args: &PayloadArgs) -> CliResult<Vec<u8>> {
    if let Some(data) = &args.data {
        return Ok(data.as_bytes().to_vec());
    }
    if let Some(text) = &args.hex {
        return hex::decode(text);
    }
    if let Some(path) = &args.file {
        return fs::read(path)
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), err));
    }
    Ok(Vec::new())
}
