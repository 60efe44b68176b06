use std::io::Read;

use otcom_mpipe::{parse_hex, Collector, Parser};

use crate::cmd::DecodeArgs;
use crate::exit::{io_error, mpipe_error, CliResult, DATA_INVALID, SUCCESS};
use crate::output::{print_decoded, OutputFormat};

/// Exits with DATA_INVALID when the input held no valid message.
pub fn run(args: DecodeArgs, format: OutputFormat) -> CliResult<i32> {
    let text = match args.hex {
        Some(text) => text,
        None => {
            let mut text = String::new();
            std::io::stdin()
                .read_to_string(&mut text)
                .map_err(|err| io_error("failed reading stdin", err))?;
            text
        }
    };
    let bytes = parse_hex(&text).map_err(|err| mpipe_error("bad input", err))?;

    let mut parser = Parser::new(args.protocol);
    let mut collected = Collector::default();
    parser.parse(&bytes, &mut collected);
    if !parser.superstate().completes() {
        tracing::warn!(state = ?parser.superstate(), "input ends inside a chunked directive");
    }

    print_decoded(args.protocol, &collected.messages, &collected.errors, format);
    Ok(if collected.messages.is_empty() {
        DATA_INVALID
    } else {
        SUCCESS
    })
}
