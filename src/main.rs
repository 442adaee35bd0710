mod aggregate;
mod config;
mod errors;
mod handlers;
mod locations;
mod log;
mod mutator;
mod pipeline;
mod previews;
mod project;
mod render;
mod routes;
mod server;
mod session;
mod storage;
mod transpile;
mod vtree;

use clap::Parser;
use config::{Config, Opts};
// Allow the server to return its version with a --version flag
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() {
    let opts: Opts = Opts::parse();
    if opts.version {
        println!("{}", VERSION);
        return;
    }
    let config = match Config::from_opts(opts) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };
    let guard = match log::init_logging(&config.storage_dir, config.debug) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to start logging: {}", e);
            std::process::exit(1);
        }
    };
    let result = match server::get_server(&config) {
        Ok(srv) => srv.start().await,
        Err(e) => Err(e),
    };
    if let Err(e) = result {
        tracing::error!("{}", e);
        eprintln!("{}", e);
        drop(guard);
        std::process::exit(1);
    }
}
