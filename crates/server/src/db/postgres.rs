//! PostgreSQL engine over a deadpool connection pool

use async_trait::async_trait;
use deadpool_postgres::{Config, Object, Pool, Runtime};
use serde_json::Value as JsonValue;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Instant;
use tokio::sync::Mutex;
use tokio_postgres::types::ToSql;
use tokio_postgres::{NoTls, Row};
use txscope_core::{DbError, LogValue, SqlLogger, TracingLogger};
use uuid::Uuid;

use super::{Engine, Session};

type Params<'a> = &'a [&'a (dyn ToSql + Sync)];

/// Create a connection pool from a database URL
pub async fn create_pool(database_url: &str) -> Result<Pool, deadpool_postgres::CreatePoolError> {
    let mut cfg = Config::new();
    cfg.url = Some(database_url.to_string());
    cfg.create_pool(Some(Runtime::Tokio1), NoTls)
}

struct Logging {
    logger: RwLock<Arc<dyn SqlLogger>>,
    show_exec_time: AtomicBool,
}

impl Logging {
    fn logger(&self) -> Arc<dyn SqlLogger> {
        match self.logger.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn statement(&self, sql: &str, params: Params<'_>, started: Instant) {
        let logger = self.logger();
        if !logger.is_show_sql() {
            return;
        }
        let args: Vec<JsonValue> = params
            .iter()
            .map(|p| JsonValue::String(format!("{:?}", p)))
            .collect();
        let elapsed = self
            .show_exec_time
            .load(Ordering::Relaxed)
            .then(|| started.elapsed());
        logger.log_sql(&LogValue::statement(sql, args, elapsed));
    }

    fn info(&self, msg: &str) {
        let logger = self.logger();
        if logger.is_show_sql() {
            logger.info(msg);
        }
    }
}

/// Database engine handing out plain (auto-commit) access and sessions
#[derive(Clone)]
pub struct PgEngine {
    pool: Pool,
    logging: Arc<Logging>,
}

impl PgEngine {
    pub fn new(pool: Pool) -> Self {
        Self {
            pool,
            logging: Arc::new(Logging {
                logger: RwLock::new(Arc::new(TracingLogger::new())),
                show_exec_time: AtomicBool::new(false),
            }),
        }
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    async fn conn(&self) -> Result<Object, DbError> {
        self.pool
            .get()
            .await
            .map_err(|e| DbError::Pool(e.to_string()))
    }

    pub async fn execute(&self, sql: &str, params: Params<'_>) -> Result<u64, DbError> {
        let client = self.conn().await?;
        let started = Instant::now();
        let result = client.execute(sql, params).await;
        self.logging.statement(sql, params, started);
        result.map_err(query_error)
    }

    pub async fn query(&self, sql: &str, params: Params<'_>) -> Result<Vec<Row>, DbError> {
        let client = self.conn().await?;
        let started = Instant::now();
        let result = client.query(sql, params).await;
        self.logging.statement(sql, params, started);
        result.map_err(query_error)
    }

    pub async fn query_one(&self, sql: &str, params: Params<'_>) -> Result<Row, DbError> {
        let client = self.conn().await?;
        let started = Instant::now();
        let result = client.query_one(sql, params).await;
        self.logging.statement(sql, params, started);
        result.map_err(query_error)
    }

    pub async fn query_opt(&self, sql: &str, params: Params<'_>) -> Result<Option<Row>, DbError> {
        let client = self.conn().await?;
        let started = Instant::now();
        let result = client.query_opt(sql, params).await;
        self.logging.statement(sql, params, started);
        result.map_err(query_error)
    }

    pub async fn batch_execute(&self, sql: &str) -> Result<(), DbError> {
        let client = self.conn().await?;
        let started = Instant::now();
        let result = client.batch_execute(sql).await;
        self.logging.statement(sql, &[], started);
        result.map_err(query_error)
    }
}

#[async_trait]
impl Engine for PgEngine {
    type Session = PgSession;

    async fn new_session(&self) -> Result<PgSession, DbError> {
        let conn = self.conn().await?;
        Ok(PgSession {
            id: Uuid::new_v4(),
            logging: self.logging.clone(),
            inner: Arc::new(Mutex::new(SessionInner {
                conn: Some(conn),
                in_tx: false,
            })),
        })
    }

    async fn ping(&self) -> Result<(), DbError> {
        self.query_one("SELECT 1", &[]).await.map(|_| ())
    }

    fn show_exec_time(&self, show: bool) {
        self.logging.show_exec_time.store(show, Ordering::Relaxed);
    }

    fn show_sql(&self, show: bool) {
        self.logging.logger().show_sql(show);
    }

    fn set_logger(&self, logger: Arc<dyn SqlLogger>) {
        match self.logging.logger.write() {
            Ok(mut guard) => *guard = logger,
            Err(poisoned) => *poisoned.into_inner() = logger,
        }
    }
}

struct SessionInner {
    conn: Option<Object>,
    in_tx: bool,
}

/// One pooled connection driven with explicit BEGIN / COMMIT / ROLLBACK
#[derive(Clone)]
pub struct PgSession {
    id: Uuid,
    logging: Arc<Logging>,
    inner: Arc<Mutex<SessionInner>>,
}

impl PgSession {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub async fn execute(&self, sql: &str, params: Params<'_>) -> Result<u64, DbError> {
        let inner = self.inner.lock().await;
        let client = inner.conn.as_ref().ok_or(DbError::SessionClosed)?;
        let started = Instant::now();
        let result = client.execute(sql, params).await;
        self.logging.statement(sql, params, started);
        result.map_err(query_error)
    }

    pub async fn query(&self, sql: &str, params: Params<'_>) -> Result<Vec<Row>, DbError> {
        let inner = self.inner.lock().await;
        let client = inner.conn.as_ref().ok_or(DbError::SessionClosed)?;
        let started = Instant::now();
        let result = client.query(sql, params).await;
        self.logging.statement(sql, params, started);
        result.map_err(query_error)
    }

    pub async fn query_one(&self, sql: &str, params: Params<'_>) -> Result<Row, DbError> {
        let inner = self.inner.lock().await;
        let client = inner.conn.as_ref().ok_or(DbError::SessionClosed)?;
        let started = Instant::now();
        let result = client.query_one(sql, params).await;
        self.logging.statement(sql, params, started);
        result.map_err(query_error)
    }

    pub async fn query_opt(&self, sql: &str, params: Params<'_>) -> Result<Option<Row>, DbError> {
        let inner = self.inner.lock().await;
        let client = inner.conn.as_ref().ok_or(DbError::SessionClosed)?;
        let started = Instant::now();
        let result = client.query_opt(sql, params).await;
        self.logging.statement(sql, params, started);
        result.map_err(query_error)
    }

    pub async fn batch_execute(&self, sql: &str) -> Result<(), DbError> {
        let inner = self.inner.lock().await;
        let client = inner.conn.as_ref().ok_or(DbError::SessionClosed)?;
        let started = Instant::now();
        let result = client.batch_execute(sql).await;
        self.logging.statement(sql, &[], started);
        result.map_err(query_error)
    }

    /// Run a transaction control statement, logged at info like the engine does.
    async fn control(&self, inner: &SessionInner, sql: &str) -> Result<(), tokio_postgres::Error> {
        let Some(client) = inner.conn.as_ref() else {
            return Ok(());
        };
        self.logging.info(&format!("[SQL] {}", sql));
        client.batch_execute(sql).await
    }
}

#[async_trait]
impl Session for PgSession {
    async fn begin(&self) -> Result<(), DbError> {
        let mut inner = self.inner.lock().await;
        if inner.conn.is_none() {
            return Err(DbError::SessionClosed);
        }
        self.control(&inner, "BEGIN")
            .await
            .map_err(|e| DbError::Begin(e.to_string()))?;
        inner.in_tx = true;
        Ok(())
    }

    async fn commit(&self) -> Result<(), DbError> {
        let mut inner = self.inner.lock().await;
        if inner.conn.is_none() {
            return Err(DbError::SessionClosed);
        }
        let result = self.control(&inner, "COMMIT").await;
        inner.in_tx = false;
        result.map_err(|e| DbError::Commit(e.to_string()))
    }

    async fn rollback(&self) -> Result<(), DbError> {
        let mut inner = self.inner.lock().await;
        if inner.conn.is_none() {
            return Err(DbError::SessionClosed);
        }
        let result = self.control(&inner, "ROLLBACK").await;
        inner.in_tx = false;
        result.map_err(|e| DbError::Rollback(e.to_string()))
    }

    async fn ping(&self) -> Result<(), DbError> {
        self.query_one("SELECT 1", &[]).await.map(|_| ())
    }

    async fn close(&self) {
        let mut inner = self.inner.lock().await;
        if inner.in_tx {
            // Never hand a connection back to the pool mid-transaction.
            if let Err(e) = self.control(&inner, "ROLLBACK").await {
                tracing::warn!(session = %self.id, error = %e, "Rollback on close failed");
            }
            inner.in_tx = false;
        }
        inner.conn.take();
    }
}

fn query_error(err: tokio_postgres::Error) -> DbError {
    DbError::Query(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    struct RecordingLogger {
        show: bool,
        lines: StdMutex<Vec<Vec<LogValue>>>,
        infos: StdMutex<Vec<String>>,
    }

    impl RecordingLogger {
        fn new(show: bool) -> Arc<Self> {
            Arc::new(Self {
                show,
                lines: StdMutex::new(Vec::new()),
                infos: StdMutex::new(Vec::new()),
            })
        }
    }

    impl SqlLogger for RecordingLogger {
        fn log_sql(&self, values: &[LogValue]) {
            self.lines.lock().unwrap().push(values.to_vec());
        }

        fn info(&self, msg: &str) {
            self.infos.lock().unwrap().push(msg.to_string());
        }

        fn is_show_sql(&self) -> bool {
            self.show
        }
    }

    fn logging(logger: Arc<RecordingLogger>, exec_time: bool) -> Logging {
        let logger: Arc<dyn SqlLogger> = logger;
        Logging {
            logger: RwLock::new(logger),
            show_exec_time: AtomicBool::new(exec_time),
        }
    }

    fn started() -> Instant {
        Instant::now() - Duration::from_millis(2)
    }

    #[test]
    fn bound_params_report_three_values() {
        let logger = RecordingLogger::new(true);
        let logging = logging(logger.clone(), true);

        logging.statement("UPDATE t SET a = $1", &[&7i32], started());

        let lines = logger.lines.lock().unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].len(), 3);
        assert_eq!(lines[0][0], LogValue::Text("UPDATE t SET a = $1".into()));
        assert_eq!(lines[0][1], LogValue::Args(vec![JsonValue::String("7".into())]));
        assert!(matches!(lines[0][2], LogValue::Elapsed(d) if d >= Duration::from_millis(2)));
    }

    #[test]
    fn no_params_report_sql_and_elapsed() {
        let logger = RecordingLogger::new(true);
        let logging = logging(logger.clone(), true);

        logging.statement("SELECT 1", &[], started());

        let lines = logger.lines.lock().unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].len(), 2);
        assert!(matches!(lines[0][1], LogValue::Elapsed(_)));
    }

    #[test]
    fn exec_time_off_omits_elapsed() {
        let logger = RecordingLogger::new(true);
        let logging = logging(logger.clone(), false);

        logging.statement("SELECT 1", &[], started());

        assert_eq!(
            *logger.lines.lock().unwrap(),
            vec![vec![LogValue::Text("SELECT 1".into())]]
        );
    }

    #[test]
    fn hidden_sql_reports_nothing() {
        let logger = RecordingLogger::new(false);
        let logging = logging(logger.clone(), true);

        logging.statement("SELECT 1", &[], started());
        logging.info("[SQL] BEGIN");

        assert!(logger.lines.lock().unwrap().is_empty());
        assert!(logger.infos.lock().unwrap().is_empty());
    }

    #[test]
    fn control_statements_go_to_info() {
        let logger = RecordingLogger::new(true);
        let logging = logging(logger.clone(), true);

        logging.info("[SQL] BEGIN");

        assert!(logger.lines.lock().unwrap().is_empty());
        assert_eq!(*logger.infos.lock().unwrap(), vec!["[SQL] BEGIN".to_string()]);
    }
}
