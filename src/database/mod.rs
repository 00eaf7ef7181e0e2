// Copyright 2023 Remi Bernotavicius

use crate::config::DatabaseConfig;
use diesel::connection::SimpleConnection as _;
use diesel::prelude::Connection as _;
use diesel::r2d2::{ConnectionManager, CustomizeConnection, Pool, PooledConnection};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use std::error::Error;
use std::path::Path;
use std::time::Duration;

pub mod models;
pub mod schema;

pub type Connection = diesel::sqlite::SqliteConnection;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!();

diesel::define_sql_function! {
    /// Unicode lower-casing. SQLite's own `lower` only folds ASCII letters.
    fn fold(text: diesel::sql_types::Text) -> diesel::sql_types::Text;
}

const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Per-connection settings and functions SQLite does not persist in the database file.
#[derive(Debug, Clone, Copy)]
struct ConnectionOptions {
    busy_timeout: Duration,
}

impl ConnectionOptions {
    fn apply(&self, conn: &mut Connection) -> diesel::QueryResult<()> {
        conn.batch_execute(&format!(
            "PRAGMA busy_timeout = {}; PRAGMA foreign_keys = ON;",
            self.busy_timeout.as_millis()
        ))?;
        fold_utils::register_impl(conn, |text: String| text.to_lowercase())
    }
}

impl CustomizeConnection<Connection, diesel::r2d2::Error> for ConnectionOptions {
    fn on_acquire(&self, conn: &mut Connection) -> Result<(), diesel::r2d2::Error> {
        self.apply(conn).map_err(diesel::r2d2::Error::QueryError)
    }
}

fn database_url(path: &Path) -> Result<&str, Box<dyn Error + Send + Sync + 'static>> {
    path.to_str()
        .ok_or_else(|| format!("database path {} is not valid UTF-8", path.display()).into())
}

/// Opens a single connection with migrations applied. `":memory:"` gives a private database.
pub fn establish_connection(
    path: impl AsRef<Path>,
) -> Result<Connection, Box<dyn Error + Send + Sync + 'static>> {
    let mut connection = Connection::establish(database_url(path.as_ref())?)?;
    ConnectionOptions {
        busy_timeout: DEFAULT_BUSY_TIMEOUT,
    }
    .apply(&mut connection)?;
    let applied = connection.run_pending_migrations(MIGRATIONS)?;
    for migration in applied {
        log::info!("applied migration {migration}");
    }
    Ok(connection)
}

/// Handle to the dish database. Cloning is cheap; every clone shares one connection pool.
#[derive(Clone)]
pub struct Store {
    pool: Pool<ConnectionManager<Connection>>,
}

impl Store {
    pub fn open(
        path: impl AsRef<Path>,
        config: &DatabaseConfig,
    ) -> Result<Self, Box<dyn Error + Send + Sync + 'static>> {
        let path = path.as_ref();

        // Migrate and switch to WAL before the pool hands out any connection.
        let mut connection = establish_connection(path)?;
        connection.batch_execute("PRAGMA journal_mode = WAL;")?;
        drop(connection);

        let options = ConnectionOptions {
            busy_timeout: Duration::from_millis(config.busy_timeout_ms),
        };
        let pool = Pool::builder()
            .max_size(config.pool_size)
            .connection_customizer(Box::new(options))
            .build(ConnectionManager::new(database_url(path)?))?;
        log::info!(
            "opened {} with up to {} connections",
            path.display(),
            config.pool_size
        );
        Ok(Self { pool })
    }

    pub fn conn(&self) -> crate::error::Result<PooledConnection<ConnectionManager<Connection>>> {
        Ok(self.pool.get()?)
    }
}

#[cfg(test)]
pub fn test_connection() -> Connection {
    establish_connection(":memory:").unwrap()
}

#[cfg(test)]
pub fn test_store(dir: &tempfile::TempDir) -> Store {
    let config = DatabaseConfig {
        path: None,
        pool_size: 4,
        busy_timeout_ms: 5_000,
    };
    Store::open(dir.path().join("data.sqlite"), &config).unwrap()
}

#[test]
fn migrations() {
    let mut conn = Connection::establish(":memory:").unwrap();
    conn.run_pending_migrations(MIGRATIONS).unwrap();
    conn.revert_all_migrations(MIGRATIONS).unwrap();
    assert!(conn.has_pending_migration(MIGRATIONS).unwrap());
    conn.run_pending_migrations(MIGRATIONS).unwrap();
    assert!(!conn.has_pending_migration(MIGRATIONS).unwrap());
}

#[test]
fn pooled_connections_enforce_foreign_keys() {
    use diesel::RunQueryDsl as _;
    use models::{DishId, IngredientId, NewDishIngredientLink};

    let dir = tempfile::tempdir().unwrap();
    let store = test_store(&dir);
    let mut conn = store.conn().unwrap();

    let err = diesel::insert_into(schema::dish_ingredients::table)
        .values(NewDishIngredientLink {
            dish_id: DishId::from(42),
            ingredient_id: IngredientId::from(7),
            position: 0,
            usage: "200g",
        })
        .execute(&mut *conn)
        .unwrap_err();
    assert!(matches!(
        err,
        diesel::result::Error::DatabaseError(
            diesel::result::DatabaseErrorKind::ForeignKeyViolation,
            _
        )
    ));
}
