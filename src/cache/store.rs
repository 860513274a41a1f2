use crate::error::{ServiceError, ServiceResult};
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// Where the embedded store lives
#[derive(Debug, Clone)]
enum StoreTarget {
    File(PathBuf),
    Memory,
}

/// Embedded SQLite store shared by the local food, nutrition and profile caches.
///
/// Exactly one writer (this process) owns the connection. Every operation fails with
/// `NotInitialized` until `initialize()` has run; repeat `initialize()` calls are no-ops.
/// Queries run on tokio's blocking pool so a slow scan never stalls the async workers.
pub struct LocalStore {
    target: StoreTarget,
    conn: Arc<Mutex<Option<Connection>>>,
}

type SharedConnection = Arc<Mutex<Option<Connection>>>;

fn with_connection<F, T>(conn: &SharedConnection, f: F) -> ServiceResult<T>
where
    F: FnOnce(&mut Connection) -> ServiceResult<T>,
{
    let mut guard = conn
        .lock()
        .map_err(|_| ServiceError::CacheError("Local store lock poisoned".to_string()))?;

    match guard.as_mut() {
        Some(conn) => f(conn),
        None => Err(ServiceError::NotInitialized(
            "local store used before initialize()".to_string(),
        )),
    }
}

const SCHEMA_SQL: &str = "
    CREATE TABLE IF NOT EXISTS food_items (
        barcode TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        search_name TEXT NOT NULL,
        brand TEXT,
        calories REAL,
        protein REAL,
        carbs REAL,
        fat REAL,
        fiber REAL,
        sugar REAL,
        sodium REAL,
        serving_size TEXT,
        nutriscore_grade TEXT,
        nova_group INTEGER,
        usage_count INTEGER NOT NULL DEFAULT 1,
        last_used_at TEXT NOT NULL,
        cached_at TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_food_items_usage ON food_items(usage_count DESC);
    CREATE INDEX IF NOT EXISTS idx_food_items_last_used ON food_items(last_used_at DESC);

    CREATE TABLE IF NOT EXISTS daily_nutrition (
        date TEXT PRIMARY KEY,
        calories REAL NOT NULL DEFAULT 0,
        protein REAL NOT NULL DEFAULT 0,
        carbs REAL NOT NULL DEFAULT 0,
        fat REAL NOT NULL DEFAULT 0,
        fiber REAL NOT NULL DEFAULT 0,
        water_ml REAL NOT NULL DEFAULT 0,
        meal_count INTEGER NOT NULL DEFAULT 0,
        updated_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS profiles (
        id TEXT PRIMARY KEY,
        data TEXT NOT NULL,
        cached_at TEXT NOT NULL
    );
";

impl LocalStore {
    /// Create an uninitialized store backed by a file
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            target: StoreTarget::File(path.as_ref().to_path_buf()),
            conn: Arc::new(Mutex::new(None)),
        }
    }

    /// Create an uninitialized in-memory store
    pub fn in_memory() -> Self {
        Self {
            target: StoreTarget::Memory,
            conn: Arc::new(Mutex::new(None)),
        }
    }

    /// Create and initialize a file-backed store
    pub fn open(path: impl AsRef<Path>) -> ServiceResult<Self> {
        let store = Self::new(path);
        store.initialize()?;
        Ok(store)
    }

    /// Create and initialize an in-memory store (for testing)
    pub fn open_in_memory() -> ServiceResult<Self> {
        let store = Self::in_memory();
        store.initialize()?;
        Ok(store)
    }

    /// Open the connection, apply pragmas and create tables. Idempotent.
    pub fn initialize(&self) -> ServiceResult<()> {
        let mut guard = self
            .conn
            .lock()
            .map_err(|_| ServiceError::CacheError("Local store lock poisoned".to_string()))?;

        if guard.is_some() {
            debug!("Local store already initialized");
            return Ok(());
        }

        let conn = match &self.target {
            StoreTarget::File(path) => {
                if let Some(parent) = path.parent() {
                    if !parent.as_os_str().is_empty() {
                        std::fs::create_dir_all(parent)?;
                    }
                }
                info!("Opening local store at {}", path.display());
                Connection::open(path)
                    .map_err(|e| ServiceError::CacheError(format!("Failed to open local store: {}", e)))?
            }
            StoreTarget::Memory => Connection::open_in_memory()
                .map_err(|e| ServiceError::CacheError(format!("Failed to open in-memory store: {}", e)))?,
        };

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA busy_timeout = 5000;
            ",
        )
        .map_err(|e| ServiceError::CacheError(format!("Failed to apply pragmas: {}", e)))?;

        conn.execute_batch(SCHEMA_SQL)
            .map_err(|e| ServiceError::CacheError(format!("Failed to create local schema: {}", e)))?;

        *guard = Some(conn);
        info!("Local store initialized");
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.conn.lock().map(|guard| guard.is_some()).unwrap_or(false)
    }

    /// Drop the connection; the store must be initialized again before use
    pub fn close(&self) {
        if let Ok(mut guard) = self.conn.lock() {
            guard.take();
        }
    }

    /// Run `f` against the open connection on the blocking pool
    pub(crate) async fn run<F, T>(&self, f: F) -> ServiceResult<T>
    where
        F: FnOnce(&mut Connection) -> ServiceResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || with_connection(&conn, f))
            .await
            .map_err(|e| ServiceError::Internal(format!("Local store task failed: {}", e)))?
    }
}
