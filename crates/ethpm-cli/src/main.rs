use std::process::ExitCode;

use clap::Parser;
use ethpm::Config;
use ethpm_cli::{Cli, exit_code, init_tracing, run};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match Config::load().await {
        Ok(config) => run(cli.command, config).await,
        Err(e) => Err(e.into()),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(report) => {
            let code = exit_code(&report);
            eprintln!("{report:?}");
            ExitCode::from(code)
        }
    }
}
