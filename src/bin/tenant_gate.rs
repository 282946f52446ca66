//! tenant-gate server binary

use tenant_gate::cli::{commands, Cli};

#[tokio::main]
async fn main() {
    let cli = Cli::parse_args();

    if let Err(e) = commands::run(cli.command).await {
        eprintln!("Error [{}]: {}", e.code(), e);
        std::process::exit(e.exit_code());
    }
}
