use std::cell::RefCell;
use std::fs;
use std::io::Read;
use std::rc::Rc;

use serialmsg_service::Service;
use serialmsg_transport::{ManualClock, MemoryTransport};

use crate::cmd::DecodeArgs;
use crate::exit::{io_error, service_error, CliError, CliResult, DATA_INVALID, SUCCESS};
use crate::hex;
use crate::output::{print_frames, print_stats, FrameRecord, OutputFormat};

pub fn run(args: DecodeArgs, format: OutputFormat) -> CliResult<i32> {
    let input = read_input(&args)?;
    let config = args.service.to_config()?;

    // Captured bytes carry no timing, so nothing may count as stalled.
    let transport = MemoryTransport::new();
    let mut service = Service::with_clock(transport.clone(), ManualClock::default(), config)
        .map_err(|err| service_error("service setup failed", err))?;

    let frames = Rc::new(RefCell::new(Vec::new()));
    for msg_type in u8::MIN..=u8::MAX {
        let sink = Rc::clone(&frames);
        service
            .add_handler(msg_type, move |svc, header| {
                sink.borrow_mut()
                    .push(FrameRecord::new(header, svc.rx().payload()));
                Ok(())
            })
            .map_err(|err| service_error("handler registration failed", err))?;
    }

    transport.feed(&input);
    service
        .poll()
        .map_err(|err| service_error("decode failed", err))?;

    if service.buffered() > 0 {
        tracing::warn!(
            buffered = service.buffered(),
            "input ends inside an incomplete frame"
        );
    }

    let frames = frames.borrow();
    print_frames(&frames, format);
    if !args.no_stats {
        print_stats(service.stats(), format);
    }

    if frames.is_empty() && !input.is_empty() {
        return Err(CliError::new(
            DATA_INVALID,
            format!("no complete frames in {} input bytes", input.len()),
        ));
    }
    Ok(SUCCESS)
}

fn read_input(args: &DecodeArgs) -> CliResult<Vec<u8>> {
    let bytes = match &args.input {
        Some(path) => fs::read(path)
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), err))?,
        None => {
            let mut buf = Vec::new();
            std::io::stdin()
                .read_to_end(&mut buf)
                .map_err(|err| io_error("failed reading stdin", err))?;
            buf
        }
    };

    if !args.hex {
        return Ok(bytes);
    }
    let text = String::from_utf8(bytes)
        .map_err(|err| CliError::new(DATA_INVALID, format!("hex input is not text: {err}")))?;
    hex::decode(&text)
}
