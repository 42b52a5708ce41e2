use anyhow::Result;
use chain_activity_tracker::config::Config;
use chain_activity_tracker::repository::Database;

fn main() -> Result<()> {
    tracing_subscriber::fmt().init();

    let database_url = Config::database_url_from_env();

    println!("Running migrations on database: {database_url}");

    let _db = Database::new(&database_url)?;

    println!("Migrations completed successfully!");

    Ok(())
}
