//! Runs the shared memory composition demonstration once.
//!
//! Exits 0 after teardown, or 1 with the failing step and OS error.

use shm_compose::config::DemoConfig;
use shm_compose::{demo, observability};
use std::process::ExitCode;

fn main() -> ExitCode {
    observability::init_tracing();

    let config = DemoConfig::default();
    match demo::run(&config) {
        Ok(report) => {
            println!("{report}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(step = e.step, error = %e.source, "demonstration aborted");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
