//! fedauth CLI binary entry point.

use clap::Parser;
use fedauth::cli::{auth, Cli, Commands};
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("fedauth=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();

    let result = match auth::service(cli.data_dir) {
        Ok(service) => match cli.command {
            Commands::Login(args) => {
                auth::handle_login(&service, &args.instance, &args.handle, args.no_wait).await
            }
            Commands::Callback(args) => {
                auth::handle_callback(&service, &args.redirect_url, &args.session).await
            }
            Commands::Status => auth::handle_status(&service).await,
            Commands::Whoami => auth::handle_whoami(&service),
            Commands::Logout => auth::handle_logout(&service),
        },
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
