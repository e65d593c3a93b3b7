use std::process::ExitCode;

use camrec_lib::cli::AppArgs;
use clap::Parser;

#[tokio::main]
async fn main() -> ExitCode {
    let args = AppArgs::parse();

    match camrec_lib::run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("camrec: {}", e);
            ExitCode::FAILURE
        }
    }
}
