use otcom_bridge::{Bridge, BridgeConfig, BridgeEvent};
use tracing::info;

use crate::cmd::ServeArgs;
use crate::exit::{bridge_error, config_error, CliError, CliResult, INTERNAL, SUCCESS};

pub fn run(args: ServeArgs) -> CliResult<i32> {
    let config = resolve_config(&args)?;

    if let Some(path) = &args.write_config {
        config
            .save(path)
            .map_err(|err| config_error("failed writing config", err))?;
        println!("wrote {}", path.display());
        return Ok(SUCCESS);
    }

    let mut bridge = Bridge::with_serial(config).map_err(|err| bridge_error("bind failed", err))?;
    let handle = bridge.handle();
    ctrlc::set_handler(move || {
        handle.shutdown();
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))?;

    match bridge.run().map_err(|err| bridge_error("bridge failed", err))? {
        BridgeEvent::Kill => info!("bridge killed by peer"),
        _ => info!("bridge shut down"),
    }
    Ok(SUCCESS)
}

/// Config file (or defaults) with command-line overrides applied.
pub fn resolve_config(args: &ServeArgs) -> CliResult<BridgeConfig> {
    let mut config = match &args.config {
        Some(path) => {
            BridgeConfig::load(path).map_err(|err| config_error("failed loading config", err))?
        }
        None => BridgeConfig::default(),
    };

    if let Some(port) = &args.port {
        config.port.clone_from(port);
    }
    if let Some(baud) = args.baud {
        config.baud_rate = baud;
    }
    if let Some(flow) = args.flow {
        config.flow_mode = flow;
    }
    if let Some(protocol) = args.protocol {
        config.protocol = protocol;
    }
    if let Some(host) = &args.host {
        config.tcp_host.clone_from(host);
    }
    if let Some(tcp_port) = args.tcp_port {
        config.tcp_port = tcp_port;
    }
    if let Some(print) = args.print {
        config.print_mode = print;
    }
    if let Some(capture) = &args.capture {
        config.capture_path = Some(capture.clone());
    }
    if args.broadcast_decoded {
        config.broadcast_decoded = true;
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use otcom_bridge::PrintMode;
    use otcom_transport::FlowMode;

    use super::*;

    fn args() -> ServeArgs {
        ServeArgs {
            config: None,
            port: None,
            baud: None,
            flow: None,
            protocol: None,
            host: None,
            tcp_port: None,
            print: None,
            capture: None,
            broadcast_decoded: false,
            write_config: None,
        }
    }

    fn temp_path(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "otcom-serve-{tag}-{}-{}.toml",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("time should be after epoch")
                .as_nanos()
        ))
    }

    #[test]
    fn no_file_means_defaults() {
        assert_eq!(resolve_config(&args()).expect("config"), BridgeConfig::default());
    }

    #[test]
    fn flags_override_file_values() {
        let path = temp_path("override");
        std::fs::write(
            &path,
            "port = \"/dev/ttyUSB0\"\nbaud_rate = 9600\ntcp_port = 7800\nprint_mode = \"raw\"\n",
        )
        .expect("write config");

        let config = resolve_config(&ServeArgs {
            config: Some(path.clone()),
            baud: Some(57_600),
            flow: Some(FlowMode::XonXoff),
            ..args()
        })
        .expect("config");
        let _ = std::fs::remove_file(&path);

        assert_eq!(config.port, "/dev/ttyUSB0");
        assert_eq!(config.baud_rate, 57_600);
        assert_eq!(config.flow_mode, FlowMode::XonXoff);
        assert_eq!(config.tcp_port, 7800);
        assert_eq!(config.print_mode, PrintMode::Raw);
    }

    #[test]
    fn missing_file_is_a_usage_error() {
        let err = resolve_config(&ServeArgs {
            config: Some(temp_path("missing")),
            ..args()
        })
        .expect_err("missing config should fail");
        assert_eq!(err.code, crate::exit::USAGE);
    }
}
