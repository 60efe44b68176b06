use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use otcom_frame::{DECODED_TEXT, RAW_DATA};
use otcom_peer::PeerError;

use crate::cmd::control::connect;
use crate::cmd::ListenArgs;
use crate::exit::{peer_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::{print_packet, OutputFormat};

pub fn run(args: ListenArgs, format: OutputFormat) -> CliResult<i32> {
    let mut client = connect(&args.connect)?;
    let wanted = if args.decoded { DECODED_TEXT } else { RAW_DATA };

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let mut printed = 0usize;
    while running.load(Ordering::SeqCst) {
        let packet = match client.recv_packet() {
            Ok(Some(packet)) => packet,
            Ok(None) => continue,
            Err(PeerError::Disconnected(reason)) => {
                tracing::info!(%reason, "bridge went away");
                break;
            }
            Err(err) => return Err(peer_error("receive failed", err)),
        };
        if packet.command != wanted {
            continue;
        }

        print_packet(&packet, format);
        printed = printed.saturating_add(1);
        if args.count.is_some_and(|count| printed >= count) {
            break;
        }
    }

    Ok(SUCCESS)
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
