//! Main entry point for the dualfork inspection tool

use dualfork::cli::{self, Commands};

fn main() -> std::process::ExitCode {
    if let Err(e) = run_app() {
        if e.downcast_ref::<clap::Error>().is_none() {
            eprintln!("Error: {}", e);
        }
        return std::process::ExitCode::FAILURE;
    }
    std::process::ExitCode::SUCCESS
}

fn run_app() -> Result<(), Box<dyn std::error::Error>> {
    let command = cli::run()?;
    let stdout = std::io::stdout();

    match &command {
        Commands::List { file, json } => {
            let rows = cli::list_resources(file)?;
            cli::print_listing(&rows, *json, &mut stdout.lock())?;
        }
        Commands::Get { file, kind, id, output } => {
            let n = cli::extract_resource(file, *kind, *id, output)?;
            println!("wrote {} bytes of '{}' #{} to {}", n, kind, id, output.display());
        }
        Commands::Resolve { relative, search_path } => {
            let spec = cli::resolve(relative, search_path)?;
            println!("{}", spec);
        }
        Commands::Kind { file } => match cli::kind_of(file) {
            Some(kind) => println!("{:?}", kind),
            None => println!("unknown"),
        },
    }

    Ok(())
}
