use deadpool_diesel::{
    sqlite::{Manager, Pool, PoolError},
    InteractError, Runtime,
};
use diesel::{connection::SimpleConnection, SqliteConnection};

use crate::migrations::run_migrations;

/// Applied on every checkout: sqlite keeps both settings per connection.
const CONNECTION_PRAGMAS: &str = "PRAGMA foreign_keys = ON; PRAGMA busy_timeout = 5000;";

#[derive(thiserror::Error, Debug)]
pub enum DatabaseError {
    #[error("failed to build connection pool: {0}")]
    Build(String),

    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error(transparent)]
    Task(#[from] TaskError),

    #[error(transparent)]
    Diesel(#[from] diesel::result::Error),

    #[error("migrations failed: {0}")]
    Migrations(String),
}

/// A blocking connection task that never produced a result.
#[derive(thiserror::Error, Debug)]
#[error("database task {0}")]
pub struct TaskError(&'static str);

impl From<InteractError> for TaskError {
    fn from(err: InteractError) -> Self {
        match err {
            InteractError::Panic(_) => TaskError("panicked"),
            InteractError::Aborted => TaskError("aborted"),
        }
    }
}

pub fn connect(database_url: &str, max_size: usize) -> Result<Pool, DatabaseError> {
    let manager = Manager::new(database_url, Runtime::Tokio1);

    Pool::builder(manager)
        .max_size(max_size)
        .build()
        .map_err(|e| DatabaseError::Build(e.to_string()))
}

pub async fn migrate(pool: &Pool) -> Result<(), DatabaseError> {
    let db = pool.get().await?;

    db.interact(|conn| run_migrations(conn).map_err(|e| e.to_string()))
        .await
        .map_err(TaskError::from)?
        .map_err(DatabaseError::Migrations)
}

/// Runs `task` on a pooled connection, off the async runtime.
pub async fn run<T, E, F>(pool: &Pool, task: F) -> Result<T, E>
where
    F: FnOnce(&mut SqliteConnection) -> Result<T, E> + Send + 'static,
    T: Send + 'static,
    E: From<PoolError> + From<TaskError> + From<diesel::result::Error> + Send + 'static,
{
    let db = pool.get().await?;

    db.interact(move |conn| {
        conn.batch_execute(CONNECTION_PRAGMAS)?;
        task(conn)
    })
    .await
    .map_err(TaskError::from)?
}

#[cfg(test)]
pub(crate) async fn test_pool() -> (Pool, tempfile::TempDir) {
    let dir = tempfile::tempdir().expect("temp dir");
    let url = dir.path().join("gallery.db");

    let pool = connect(url.to_str().expect("utf8 path"), 4).expect("pool");
    migrate(&pool).await.expect("migrations");

    (pool, dir)
}
