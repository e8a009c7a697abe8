use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("serialmsg {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: serialmsg");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!(
        "target: {}",
        option_env!("SERIALMSG_BUILD_TARGET").unwrap_or("unknown")
    );
    println!(
        "profile: {}",
        option_env!("SERIALMSG_BUILD_PROFILE").unwrap_or("unknown")
    );
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!(
        "features: service={}, cli=true",
        cfg!(feature = "service")
    );
    println!(
        "defaults: buf_size={} stall_timeout_ms={}",
        serialmsg_service::DEFAULT_BUF_SIZE,
        serialmsg_service::DEFAULT_STALL_TIMEOUT_MS
    );

    Ok(SUCCESS)
}
