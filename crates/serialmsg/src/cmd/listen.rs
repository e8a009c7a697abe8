use std::cell::RefCell;
use std::fs::{File, OpenOptions};
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serialmsg_service::{LinkEvent, Service, ServiceError};
use serialmsg_transport::{StreamTransport, TransportError};

use crate::cmd::ListenArgs;
use crate::exit::{io_error, service_error, CliError, CliResult, SUCCESS};
use crate::output::{print_frames, print_stats, FrameRecord, OutputFormat};

pub fn run(args: ListenArgs, format: OutputFormat) -> CliResult<i32> {
    let config = args.service.to_config()?;
    let device = open_device(&args.device)?;
    let mut service = Service::new(StreamTransport::new(device), config)
        .map_err(|err| service_error("service setup failed", err))?;
    tracing::info!(
        device = %args.device.display(),
        conn_id = service.conn_id(),
        max_payload = service.max_payload(),
        "listening"
    );

    let pending = Rc::new(RefCell::new(Vec::new()));
    for msg_type in u8::MIN..=u8::MAX {
        if let Some(filter) = &args.msg_types {
            if !filter.contains(&msg_type) {
                continue;
            }
        }
        let sink = Rc::clone(&pending);
        service
            .add_handler(msg_type, move |svc, header| {
                sink.borrow_mut()
                    .push(FrameRecord::new(header, svc.rx().payload()));
                Ok(())
            })
            .map_err(|err| service_error("handler registration failed", err))?;
    }
    service
        .add_reset_handler(|| tracing::info!("device announced a new connection"))
        .map_err(|err| service_error("reset handler registration failed", err))?;

    service
        .add_link_handler(|event: LinkEvent| match event {
            LinkEvent::Connected { conn_id, conn_type } => {
                tracing::info!(conn_id, conn_type, "device connected")
            }
            LinkEvent::Disconnected { conn_id } => {
                tracing::info!(conn_id, "device disconnected")
            }
        })
        .map_err(|err| service_error("link handler registration failed", err))?;

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let idle = Duration::from_millis(args.idle_ms);
    let mut printed = 0usize;
    while running.load(Ordering::SeqCst) {
        if args.connect {
            service
                .check_connection()
                .map_err(|err| service_error("connect request failed", err))?;
        }
        let dispatched = match service.poll() {
            Ok(count) => count,
            Err(ServiceError::Transport(TransportError::Closed)) => {
                tracing::info!("device closed");
                break;
            }
            Err(err) => return Err(service_error("receive failed", err)),
        };

        let frames: Vec<FrameRecord> = pending.borrow_mut().drain(..).collect();
        if !frames.is_empty() {
            let take = args
                .count
                .map_or(frames.len(), |count| count.saturating_sub(printed))
                .min(frames.len());
            print_frames(&frames[..take], format);
            printed = printed.saturating_add(take);
            if args.count.is_some_and(|count| printed >= count) {
                break;
            }
        }

        if dispatched == 0 {
            std::thread::sleep(idle);
        }
    }

    tracing::debug!(stats = ?service.stats(), "listen finished");
    if format != OutputFormat::Raw {
        print_stats(service.stats(), format);
    }
    Ok(SUCCESS)
}

/// Open without blocking and without making the device our controlling
/// terminal. Line settings (baud rate, raw mode) are left as configured.
fn open_device(path: &Path) -> CliResult<File> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .custom_flags(libc::O_NONBLOCK | libc::O_NOCTTY)
        .open(path)
        .map_err(|err| io_error(&format!("failed opening {}", path.display()), err))
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| {
        CliError::new(
            crate::exit::INTERNAL,
            format!("signal handler setup failed: {err}"),
        )
    })
}
