use std::sync::atomic::{AtomicBool, Ordering};

use clap::Parser;
use tracing_subscriber::EnvFilter;

use specdex::cli::{self, Args};
use specdex::signals;
use specdex::status::ExitStatus;

/// Entry point - catches Ctrl+C and runs the selected command.
///
/// Returns ExitStatus directly, which implements std::process::Termination.
fn main() -> ExitStatus {
    // Set up Ctrl+C handler that sets a flag instead of calling exit()
    // This allows destructors to run and resources to be cleaned up properly
    ctrlc::set_handler(move || {
        signals::set_interrupted();
        eprintln!("\nInterrupted");

        // On second Ctrl+C, force exit (user really wants out)
        static SECOND_CTRL_C: AtomicBool = AtomicBool::new(false);
        if SECOND_CTRL_C.swap(true, Ordering::SeqCst) {
            std::process::exit(ExitStatus::Interrupted as i32);
        }
    })
    .ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("specdex: failed to start runtime: {}", err);
            return ExitStatus::Error;
        }
    };

    let status = match runtime.block_on(cli::run(args)) {
        Ok(status) => status,
        Err(err) => {
            eprintln!("specdex: error: {}", err);
            ExitStatus::Error
        }
    };

    if signals::was_interrupted() {
        return ExitStatus::Interrupted;
    }

    status
}
