use std::fs;

use otcom_mpipe::parse_hex;

use crate::cmd::control::connect;
use crate::cmd::SendArgs;
use crate::exit::{io_error, mpipe_error, peer_error, CliError, CliResult, SUCCESS, USAGE};

pub fn run(args: SendArgs) -> CliResult<i32> {
    let payload = resolve_payload(&args)?;
    if payload.is_empty() {
        return Err(CliError::new(USAGE, "nothing to send (use --hex, --data or --file)"));
    }
    connect(&args.connect)?
        .send_as_is(&payload)
        .map_err(|err| peer_error("send failed", err))?;
    Ok(SUCCESS)
}

fn resolve_payload(args: &SendArgs) -> CliResult<Vec<u8>> {
    if let Some(hex) = &args.hex {
        return parse_hex(hex).map_err(|err| mpipe_error("--hex", err));
    }
    if let Some(data) = &args.data {
        return Ok(data.as_bytes().to_vec());
    }
    if let Some(path) = &args.file {
        return fs::read(path)
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), err));
    }
    Ok(Vec::new())
}
