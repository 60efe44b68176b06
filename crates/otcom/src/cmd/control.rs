use otcom_peer::BridgeClient;

use crate::cmd::{parse_duration, BaudArgs, ConnectArgs, FlowArgs, StatusArgs};
use crate::exit::{peer_error, CliResult, FAILURE, SUCCESS};
use crate::output::{print_status, OutputFormat};

pub fn connect(args: &ConnectArgs) -> CliResult<BridgeClient> {
    let timeout = parse_duration(&args.timeout)?;
    BridgeClient::connect_with_timeout(&args.addr, timeout)
        .map_err(|err| peer_error("connect failed", err))
}

/// Exits with FAILURE when the bridge is up but its device is not.
pub fn status(args: StatusArgs, format: OutputFormat) -> CliResult<i32> {
    let mut client = connect(&args.connect)?;
    let connected = if args.verbose {
        client.status_verbose()
    } else {
        client.status()
    }
    .map_err(|err| peer_error("status failed", err))?;

    print_status(&args.connect.addr, connected, format);
    Ok(if connected { SUCCESS } else { FAILURE })
}

pub fn baud(args: BaudArgs) -> CliResult<i32> {
    connect(&args.connect)?
        .set_baud_rate(args.rate)
        .map_err(|err| peer_error("baud rate request failed", err))?;
    Ok(SUCCESS)
}

pub fn flow(args: FlowArgs) -> CliResult<i32> {
    connect(&args.connect)?
        .set_flow_mode(args.mode)
        .map_err(|err| peer_error("flow mode request failed", err))?;
    Ok(SUCCESS)
}

pub fn reconnect(args: ConnectArgs) -> CliResult<i32> {
    connect(&args)?
        .reconnect()
        .map_err(|err| peer_error("reconnect request failed", err))?;
    Ok(SUCCESS)
}

pub fn kill(args: ConnectArgs) -> CliResult<i32> {
    connect(&args)?
        .kill()
        .map_err(|err| peer_error("kill request failed", err))?;
    Ok(SUCCESS)
}
