use anyhow::Result;
use chain_activity_tracker::config::Config;
use chain_activity_tracker::query::commands::{
    ActivityQuery, cmd_activity, cmd_add, cmd_remove, cmd_watch_list,
};
use chain_activity_tracker::query::formatters::OutputFormat;
use chain_activity_tracker::repository::{Database, WatchTable};
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "query")]
#[command(about = "Inspect recorded wallet activity and manage watch lists", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "table")]
    format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    Activity {
        #[arg(long)]
        user: Option<String>,

        #[arg(long)]
        token: Option<String>,

        /// buy or sell
        #[arg(long)]
        side: Option<String>,

        #[arg(long, default_value = "18")]
        decimals: u8,

        #[arg(long, default_value = "100")]
        limit: usize,

        #[arg(long, default_value = "0")]
        offset: usize,
    },
    Tokens,
    Watched,
    TrackToken {
        address: String,
        #[arg(long)]
        symbol: Option<String>,
    },
    UntrackToken {
        address: String,
    },
    WatchAddress {
        address: String,
        #[arg(long)]
        label: Option<String>,
    },
    UnwatchAddress {
        address: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let format = OutputFormat::from(cli.format.as_str());

    let db = Database::new(&Config::database_url_from_env())?;
    let conn = db.lock()?;

    let output = match cli.command {
        Commands::Activity {
            user,
            token,
            side,
            decimals,
            limit,
            offset,
        } => {
            let query = ActivityQuery {
                user,
                token,
                side,
                limit,
                offset,
            };
            cmd_activity(&conn, query, decimals, &format)?
        }
        Commands::Tokens => cmd_watch_list(&conn, WatchTable::TrackedTokens, &format)?,
        Commands::Watched => cmd_watch_list(&conn, WatchTable::WatchedAddresses, &format)?,
        Commands::TrackToken { address, symbol } => {
            cmd_add(&conn, WatchTable::TrackedTokens, &address, symbol.as_deref())?
        }
        Commands::UntrackToken { address } => {
            cmd_remove(&conn, WatchTable::TrackedTokens, &address)?
        }
        Commands::WatchAddress { address, label } => {
            cmd_add(&conn, WatchTable::WatchedAddresses, &address, label.as_deref())?
        }
        Commands::UnwatchAddress { address } => {
            cmd_remove(&conn, WatchTable::WatchedAddresses, &address)?
        }
    };
    println!("{output}");

    Ok(())
}
