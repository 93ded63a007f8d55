use clap::Parser;

use renamebot::cli::{self, Cli};

#[tokio::main]
async fn main() {
    cli::init_tracing();
    let cli = Cli::parse();
    if let Err(err) = cli::run(cli).await {
        eprintln!("renamebot: {err}");
        std::process::exit(err.exit_code().code() as i32);
    }
}
