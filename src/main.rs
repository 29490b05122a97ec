use clap::Parser;
use todo_sync::cli::commands::Cli;
use todo_sync::cli::handlers;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match cli.command {
        None => {
            // No subcommand → launch TUI
            if let Err(e) = todo_sync::tui::run(cli.data_dir.as_deref(), cli.offline).await {
                eprintln!("error: {}", e);
                std::process::exit(1);
            }
        }
        Some(_) => {
            todo_sync::logging::init_cli(cli.verbose);
            if let Err(e) = handlers::dispatch(cli).await {
                eprintln!("error: {}", e);
                std::process::exit(1);
            }
        }
    }
}
