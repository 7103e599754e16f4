use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use env_logger::{Builder, Env};
use log::{debug, warn, LevelFilter};

use linebench::report::{render_results, RunHeader, Summary};
use linebench::util::harness_utils::HostInfo;
use linebench::util::signals::install_interrupt_flag;
use linebench::{GlobalConfig, Session};

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let mut builder = Builder::from_env(Env::default().default_filter_or(default));
    // sysinfo is chatty at debug
    builder.filter_module("sysinfo", LevelFilter::Warn);
    builder.init();
}

// Ok(true) when every trial completed.
fn run(config: &GlobalConfig) -> Result<bool> {
    let interrupt = install_interrupt_flag().context("installing signal handlers")?;

    let host = HostInfo::collect();
    for warning in host.warnings(config.workers, config.readers, config.stride) {
        warn!("{warning}");
    }
    debug!("{host:?}");

    let header = RunHeader::new(host, config.clone());
    print!("{}", header.render());

    let records = Session::new(config.clone(), interrupt).run();
    let summary = Summary::from_records(&records, config.tolerance);
    print!("{}", render_results(&records, &summary));

    Ok(summary.all_succeeded())
}

fn main() -> ExitCode {
    let config = GlobalConfig::parse();
    init_logging(config.verbose);

    if let Err(err) = config.validate() {
        eprintln!("linebench: invalid configuration: {err}");
        return ExitCode::from(2);
    }

    match run(&config) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(err) => {
            eprintln!("linebench: {err:#}");
            ExitCode::from(1)
        }
    }
}
