use admin_insights_etl::cli;
use clap::{Parser, Subcommand, builder::styling};
use eyre::Result;
use owo_colors::OwoColorize;

// CLI Styling
const STYLES: styling::Styles = styling::Styles::styled()
    .header(styling::AnsiColor::BrightWhite.on_default())
    .usage(styling::AnsiColor::BrightWhite.on_default())
    .literal(styling::AnsiColor::Green.on_default())
    .placeholder(styling::AnsiColor::Cyan.on_default());

/// Admin Insights ETL: full refresh of Tableau Cloud Admin Insights extracts into Snowflake
#[derive(Parser)]
#[command(name = "insights-etl", version, styles = STYLES)]
struct Cli {
    /// The dotenv file to source credentials from
    #[arg(short, long, global = true, default_value = ".env")]
    env: String,

    /// The YAML file with run options
    #[arg(short, long, global = true, default_value = "config.yml")]
    config: String,

    /// More verbose logging and retention of intermediate files
    #[arg(long, global = true)]
    debug: bool,

    /// Command to execute
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download, convert and load every extract of the project
    Run,

    /// Test authorization to Tableau Cloud and Snowflake
    Auth,

    /// List the project's data sources and their target tables
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    if let Err(e) = dotenvy::from_filename(&cli.env)
        && !e.not_found()
    {
        return Err(e.into());
    }

    let log_level = match cli.debug {
        true => "debug",
        false => "info",
    };
    let env = env_logger::Env::default().filter_or("LOG_LEVEL", log_level);
    env_logger::Builder::from_env(env)
        .format_timestamp_millis()
        .init();

    let config = cli::load_config(&cli.config)?;

    match cli.command {
        Commands::Run => {
            log::info!(
                "Loading project {} into schema {}",
                config.project_name.cyan(),
                config.target_schema.cyan()
            );
            let report = cli::run_etl(&config, cli.debug).await?;
            println!("{}", report);
            if !report.is_success() {
                eyre::bail!(
                    "{} of {} extract(s) failed",
                    report.failed(),
                    report.len()
                );
            }
        }
        Commands::Auth => {
            log::info!("Testing authorization");
            cli::test_auth(&config).await?;
        }
        Commands::List => {
            let extracts = cli::list_extracts(&config).await?;
            for (extract, table) in &extracts {
                match table {
                    Ok(table) => println!("{} → {}", extract, table.green()),
                    Err(e) => println!("{} → {}", extract, e.to_string().red()),
                }
            }
            log::info!(
                "{} data source(s) in project {}",
                extracts.len(),
                config.project_name.cyan()
            );
        }
    }

    Ok(())
}
