use std::error::Error;

use diesel::{connection::SimpleConnection, SqliteConnection};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

pub fn run_migrations(
    connection: &mut SqliteConnection,
) -> std::result::Result<(), Box<dyn Error + Send + Sync>> {
    // WAL is persistent on the database file, readers stop blocking on the writer
    connection.batch_execute("PRAGMA journal_mode = WAL;")?;

    let applied = connection.run_pending_migrations(MIGRATIONS)?;
    tracing::info!("applied {} pending migrations", applied.len());

    Ok(())
}
