use std::{path::PathBuf, time::Duration};

use anyhow::Result;
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Statement};
use tokio::fs;

/// Open the SeaORM connection pool.
pub async fn create_orm_conn(
    database_url: &str,
    max_connections: u32,
) -> Result<DatabaseConnection> {
    let mut options = ConnectOptions::new(database_url);
    options
        .max_connections(max_connections)
        .connect_timeout(Duration::from_secs(10))
        .sqlx_logging(false);
    let conn = Database::connect(options).await?;
    Ok(conn)
}

/// Applies the SQL files under `migrations/` in filename order. Each applied
/// file is recorded in `schema_migrations`, so reruns only pick up new files.
pub async fn run_migrations(conn: &DatabaseConnection) -> Result<()> {
    let backend = conn.get_database_backend();
    conn.execute(Statement::from_string(
        backend,
        "CREATE TABLE IF NOT EXISTS schema_migrations ( \
            filename VARCHAR(255) PRIMARY KEY, \
            applied_at TIMESTAMPTZ NOT NULL DEFAULT now() \
        )"
        .to_string(),
    ))
    .await?;

    let mut entries = fs::read_dir("migrations").await?;
    let mut files: Vec<PathBuf> = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "sql") {
            files.push(path);
        }
    }
    files.sort();

    for file in files {
        let Some(name) = file.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
            continue;
        };

        let applied = conn
            .query_one(Statement::from_sql_and_values(
                backend,
                "SELECT filename FROM schema_migrations WHERE filename = $1",
                [name.clone().into()],
            ))
            .await?;
        if applied.is_some() {
            continue;
        }

        let sql = fs::read_to_string(&file).await?;
        // Postgres prepared statements cannot contain multiple commands,
        // so split the migration file and run each statement individually.
        for stmt in sql.split(';') {
            let stmt = stmt.trim();
            if stmt.is_empty() {
                continue;
            }
            conn.execute(Statement::from_string(backend, format!("{stmt};")))
                .await?;
        }

        conn.execute(Statement::from_sql_and_values(
            backend,
            "INSERT INTO schema_migrations (filename) VALUES ($1)",
            [name.clone().into()],
        ))
        .await?;
        tracing::info!(migration = %name, "applied");
    }

    Ok(())
}
