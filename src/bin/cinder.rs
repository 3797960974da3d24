/*!
 * cinder Server Main Entry Point
 *
 * Parses the command line, loads the snapshot into the store, binds the
 * listener and runs the accept loop. The load finishes before any
 * connection is accepted.
 */

use anyhow::Result;
use cinder::config::{
    Config, DEFAULT_DBFILENAME, DEFAULT_DIR, DEFAULT_MAX_REQUEST_BYTES, DEFAULT_PORT,
};
use cinder::{net, rdb, replica, Dispatcher};
use clap::Parser;
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// Redis-compatible key-value server seeded from a snapshot
#[derive(Parser, Debug)]
#[command(name = "cinder")]
#[command(version)]
struct Args {
    /// Directory containing the snapshot file
    #[arg(long, default_value = DEFAULT_DIR)]
    dir: PathBuf,

    /// Snapshot file name inside --dir
    #[arg(long, default_value = DEFAULT_DBFILENAME)]
    dbfilename: String,

    /// TCP port to listen on
    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Address to bind to
    #[arg(long, default_value = "0.0.0.0")]
    bind: IpAddr,

    /// Reactor threads (defaults to the number of CPUs)
    #[arg(long)]
    workers: Option<usize>,

    /// Send REPLCONF ACKs to this master (host:port)
    #[arg(long)]
    replicaof: Option<String>,

    /// Close a connection whose undecoded input exceeds this many bytes
    #[arg(long, default_value_t = DEFAULT_MAX_REQUEST_BYTES)]
    max_request_bytes: usize,
}

fn main() -> Result<()> {
    // Respects RUST_LOG, e.g. RUST_LOG=cinder=trace
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let defaults = Config::default();
    let config = Arc::new(Config {
        dir: args.dir,
        dbfilename: args.dbfilename,
        bind: args.bind,
        port: args.port,
        workers: args.workers.unwrap_or(defaults.workers),
        replicaof: args.replicaof,
        max_request_bytes: args.max_request_bytes,
    });

    let store = Arc::new(rdb::load(&config.snapshot_path()));

    let addr = config.listen_addr();
    let listener = match net::bind_listener(addr) {
        Ok(l) => l,
        Err(e) => {
            log::error!("{:#}", e);
            std::process::exit(1);
        }
    };
    log::info!("cinder {} listening on {}", env!("CARGO_PKG_VERSION"), addr);

    if let Some(master) = config.replicaof.clone() {
        replica::spawn_ack_client(master)?;
    }

    let dispatcher = Arc::new(Dispatcher::new(store, config.clone()));
    net::serve(listener, dispatcher, config.workers)
}
