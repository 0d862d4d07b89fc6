use std::process::ExitCode;

use clap::Parser;

#[derive(Parser)]
#[command(version, about = "Translate sequence queries into SQL")]
struct Options {
    #[command(subcommand)]
    command: seqsql_cli::Command,
}

#[tokio::main]
pub async fn main() -> ExitCode {
    env_logger::init();
    let options = Options::parse();
    let mut stdout = std::io::stdout();
    match seqsql_cli::run(options.command, &mut stdout).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("{error:#}");
            ExitCode::FAILURE
        }
    }
}
