/// AIM command-line runner
///
/// Executes compiled AIM documents and streams their output to stdout.
use aim_core::cli;

#[tokio::main]
async fn main() {
    if let Err(e) = cli::run_cli().await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
