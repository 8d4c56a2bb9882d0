use env_logger::{Builder, Env};
use log::warn;
use signal_hook::consts::{SIGINT, SIGTERM};
use std::convert::TryFrom;
use std::process::exit;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use structopt::StructOpt;

mod config;
mod error;
mod queue;
mod report;
mod shape;


use config::{Config, Opt};
use error::EXIT_INVALID;

// qshape runs in our process group and receives SIGINT as well
fn trap_signals() -> Arc<AtomicBool> {
    let flag = Arc::new(AtomicBool::new(false));
    for &sig in &[SIGINT, SIGTERM] {
        if let Err(e) = signal_hook::flag::register(sig, Arc::clone(&flag)) {
            warn!("cannot trap signal {}: {}", sig, e);
        }
    }
    flag
}

fn config() -> Config {
    let opt = match Opt::from_iter_safe(std::env::args_os()) {
        Ok(opt) => opt,
        Err(e) => match e.kind {
            clap::ErrorKind::HelpDisplayed | clap::ErrorKind::VersionDisplayed => e.exit(),
            _ => {
                println!("{}", e.message);
                exit(EXIT_INVALID)
            }
        },
    };
    match Config::try_from(opt) {
        Ok(cfg) => cfg,
        Err(e) => {
            let (msg, code) = report::invalid(format!("{:#}", e));
            println!("{}", msg);
            exit(code)
        }
    }
}

fn main() {
    Builder::from_env(Env::default().default_filter_or("warn"))
        .format_timestamp(None)
        .init();
    let cfg = config();
    let interrupted = trap_signals();
    match report::aggregate(&cfg, &interrupted) {
        Ok(report) => {
            println!("{}", report);
            exit(report.exit_code());
        }
        Err(err) => {
            let (msg, code) = report::failure(err);
            println!("{}", msg);
            exit(code)
        }
    }
}
