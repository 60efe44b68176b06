use otcom_mpipe::{parse_hex, Builder, Directive};

use crate::cmd::BuildArgs;
use crate::exit::{mpipe_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{print_wire, OutputFormat};

pub fn run(args: BuildArgs, format: OutputFormat) -> CliResult<i32> {
    let payload = match (&args.hex, &args.data) {
        (Some(hex), _) => parse_hex(hex).map_err(|err| mpipe_error("--hex", err))?,
        (None, Some(data)) => data.as_bytes().to_vec(),
        (None, None) => Vec::new(),
    };

    let builder = Builder::new(args.protocol);
    let wire = match args.chunk {
        Some(0) => return Err(CliError::new(USAGE, "--chunk must be greater than zero")),
        Some(max_chunk) => builder.build_chunked(
            &Directive::new(args.id, args.cmd, payload),
            args.seq,
            max_chunk,
        ),
        None => builder.build(args.id, args.cmd, args.seq, &payload),
    }
    .map_err(|err| mpipe_error("build failed", err))?;

    print_wire(args.protocol, &wire, format);
    Ok(SUCCESS)
}
