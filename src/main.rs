// src/main.rs — prompt-doctor entry point

use clap::Parser;

use prompt_doctor::cli::review::{self, ReviewArgs};
use prompt_doctor::cli::{read_context, versions, Cli, Commands};
use prompt_doctor::infra::logger;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize logging (respects RUST_LOG)
    logger::init_logging(logger::level_for_verbosity(cli.verbose));

    if let Err(e) = run(cli).await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = cli.load_config()?;

    match cli.command {
        Commands::Review {
            id,
            context,
            model,
            port,
            no_browser,
            timeout,
        } => {
            let args = ReviewArgs {
                id,
                context: read_context(context.as_deref())?,
                model,
                port,
                no_browser,
                timeout,
            };
            review::run_review(config, args).await
        }
        Commands::Versions { id } => versions::run_versions(&config, &id),
        Commands::Show { id, version } => versions::run_show(&config, &id, version),
        Commands::Render {
            id,
            version,
            context,
        } => {
            let context = read_context(context.as_deref())?;
            versions::run_render(&config, &id, version, &context)
        }
    }
}
