use log::{error, info};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::mpsc::channel;
use std::thread;
use structopt::StructOpt;

use ipfix_biflow::config::Config;
use ipfix_biflow::logger;

mod threads;

/// Wires the pairing engine to a live UDP listener and exporter, so the
/// crate is directly runnable end to end: CLI -> listener thread (parse +
/// pair) -> channel -> exporter thread, mirroring the shape this codebase
/// has always used for its collector binary.
#[derive(Debug, StructOpt)]
#[structopt(name = "ipfix-biflow")]
struct Opts {
    /// Log level to use (error, warn, info, debug, trace)
    #[structopt(long = "log-level", default_value = "info")]
    log_level: String,

    /// IP:port to listen for inbound IPFIX datagrams on
    #[structopt(short = "l", long = "listener", default_value = "0.0.0.0:9999")]
    listener: SocketAddr,

    /// IP:port to forward merged biflow messages to; logged only if absent
    #[structopt(short = "e", long = "export")]
    export: Option<SocketAddr>,

    /// Path to a config file providing the fields in `ipfix_biflow::config::Config`
    #[structopt(short = "c", long = "config")]
    config: Option<PathBuf>,
}

fn main() {
    let opts = Opts::from_args();
    logger::init(&opts.log_level);
    info!("starting ipfix-biflow");

    let config = match Config::load(opts.config) {
        Ok(config) => config,
        Err(e) => {
            error!("failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let (sender, receiver) = channel();

    let listener_addr = opts.listener;
    let listener_thread = thread::Builder::new()
        .name("listener".to_string())
        .spawn(move || threads::listener::listen(listener_addr, config, sender))
        .expect("failed to spawn the listener thread");

    let exporter_thread = thread::Builder::new()
        .name("exporter".to_string())
        .spawn(move || threads::exporter::export(receiver, opts.export))
        .expect("failed to spawn the exporter thread");

    listener_thread.join().expect("listener thread panicked");
    exporter_thread.join().expect("exporter thread panicked");

    info!("closing ipfix-biflow");
}
