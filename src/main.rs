use std::env;
use std::time::SystemTime;

use log::{debug, error, info, LevelFilter};
use svsmoother::cli::{get_args, Arguments, Command};
use svsmoother::errors::FilterResult;
use svsmoother::evidence_window::run_evidence_window;
use svsmoother::two_pass::run_filter;

fn set_up() -> Arguments {
    let args = get_args();
    let filter_level: LevelFilter = match args.verbose {
        false => LevelFilter::Info,
        true => LevelFilter::Debug,
    };
    env_logger::builder()
        .format_timestamp_millis()
        .filter_level(filter_level)
        .init();

    let version = env!("CARGO_PKG_VERSION");
    info!("Running svsmoother v{version}");

    let cmd: Vec<String> = env::args().collect();
    let cmd_str = cmd.join(" ");
    debug!("Run command: {cmd_str}");
    args
}

fn log_time(start_time: SystemTime) {
    let elapsed_time = start_time.elapsed().map(|d| d.as_secs()).unwrap_or(0);
    let hours = elapsed_time / 3600;
    let minutes = (elapsed_time % 3600) / 60;
    let seconds = elapsed_time % 60;
    debug!("Running time: {hours}h:{minutes}m:{seconds}s");
}

fn run(args: Arguments) -> FilterResult<()> {
    match args.command {
        Command::Filter(filter_args) => {
            let (jobs, config) = filter_args.to_config()?;
            run_filter(&jobs, &config)?;
        }
        Command::Window(window_args) => {
            let config = window_args.to_config()?;
            let (outputs, _) = run_evidence_window(&config)?;
            for output in outputs {
                info!("Wrote {}", output.display());
            }
        }
    }
    Ok(())
}

fn main() {
    let args = set_up();
    let start_time = SystemTime::now();
    if let Err(e) = run(args) {
        error!("{}", e);
        std::process::exit(e.exit_code());
    }
    log_time(start_time);
}
