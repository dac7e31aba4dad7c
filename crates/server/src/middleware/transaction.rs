//! Request-scoped transaction middleware
//!
//! POST, PUT and DELETE run inside a session transaction that is committed
//! when the handler succeeds with a status below 500 and rolled back
//! otherwise. Every other method gets the plain auto-commit engine.

use axum::{
    extract::{Request, State},
    http::Method,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use crate::audit::{AuditProducer, AuditSink, Compression, RequiredAcks};
use crate::config::KafkaConfig;
use crate::db::{DbHandle, Engine, Session};
use crate::error::{AppError, HandlerFailure};

/// What to do when BEGIN fails on a mutating request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BeginFailurePolicy {
    /// Answer 500 without running the handler
    #[default]
    Abort,
    /// Log and run the handler outside a transaction
    Continue,
}

/// Middleware state shared by all requests
#[derive(Clone)]
pub struct TxState<E: Engine> {
    engine: E,
    on_begin_failure: BeginFailurePolicy,
}

impl<E: Engine> TxState<E> {
    pub fn new(engine: E) -> Self {
        Self {
            engine,
            on_begin_failure: BeginFailurePolicy::default(),
        }
    }

    pub fn with_begin_failure(mut self, policy: BeginFailurePolicy) -> Self {
        self.on_begin_failure = policy;
        self
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }
}

/// Prepare the engine and build the middleware state.
///
/// Turns on execution timing and, when brokers are configured, mirrors every
/// statement to Kafka. A producer that cannot be built leaves auditing off.
pub async fn context_db<E: Engine>(service: &str, engine: E, kafka: &KafkaConfig) -> TxState<E> {
    engine.show_exec_time(true);

    if !kafka.brokers.is_empty() {
        let connected = AuditProducer::connect(&kafka.brokers, &kafka.topic, |c| {
            c.required_acks = RequiredAcks::Leader;
            c.compression = Compression::Gzip;
            c.flush_frequency = std::time::Duration::from_millis(500);
        })
        .await;

        match connected {
            Ok(producer) => install_audit_sink(&engine, service, producer),
            Err(e) => tracing::warn!(error = %e, "SQL auditing disabled"),
        }
    }

    TxState::new(engine)
}

/// Install an [`AuditSink`] as the engine's statement logger.
///
/// Execution timing is switched on as well; the sink reads the last value of
/// every statement as its elapsed time.
pub fn install_audit_sink<E: Engine>(engine: &E, service: &str, producer: AuditProducer) {
    engine.show_exec_time(true);
    engine.set_logger(Arc::new(AuditSink::new(service, producer)));
    engine.show_sql(true);
}

/// Closes the session exactly once, even if the request future is dropped.
struct SessionGuard<S: Session> {
    session: Option<S>,
}

impl<S: Session> SessionGuard<S> {
    fn new(session: S) -> Self {
        Self {
            session: Some(session),
        }
    }

    async fn close(mut self) {
        if let Some(session) = self.session.take() {
            session.close().await;
        }
    }
}

impl<S: Session> Drop for SessionGuard<S> {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                handle.spawn(async move { session.close().await });
            }
        }
    }
}

/// Bind a database handle to the request and drive the transaction lifecycle.
pub async fn transaction_middleware<E: Engine>(
    State(state): State<TxState<E>>,
    mut request: Request,
    next: Next,
) -> Response {
    if !matches!(*request.method(), Method::POST | Method::PUT | Method::DELETE) {
        request
            .extensions_mut()
            .insert(DbHandle::Plain(state.engine.clone()));
        return next.run(request).await;
    }

    let session = match state.engine.new_session().await {
        Ok(session) => session,
        Err(e) => {
            tracing::error!(error = %e, "Failed to open database session");
            return AppError::from(e).into_response();
        }
    };
    let guard = SessionGuard::new(session.clone());

    let response = run_in_transaction(&state, session, request, next).await;
    guard.close().await;
    response
}

async fn run_in_transaction<E: Engine>(
    state: &TxState<E>,
    session: E::Session,
    mut request: Request,
    next: Next,
) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    request
        .extensions_mut()
        .insert(DbHandle::<E>::Session(session.clone()));

    if let Err(e) = session.begin().await {
        tracing::error!(method = %method, path = %path, error = %e, "Failed to begin transaction");
        if state.on_begin_failure == BeginFailurePolicy::Abort {
            return AppError::from(e).into_response();
        }
    }

    let response = next.run(request).await;

    let failure = response
        .extensions()
        .get::<HandlerFailure>()
        .map(|f| f.message.clone());
    if let Some(message) = failure {
        tracing::debug!(method = %method, path = %path, error = %message, "Handler failed, rolling back");
        rollback(&session, &method, &path).await;
        return response;
    }

    let status = response.status();
    if status.as_u16() >= 500 {
        tracing::debug!(method = %method, path = %path, status = %status, "Server error, rolling back");
        rollback(&session, &method, &path).await;
        return response;
    }

    match session.commit().await {
        Ok(()) => response,
        Err(e) => {
            tracing::error!(method = %method, path = %path, error = %e, "Commit failed");
            AppError::Internal(e.to_string()).into_response()
        }
    }
}

async fn rollback<S: Session>(session: &S, method: &Method, path: &str) {
    if let Err(e) = session.rollback().await {
        tracing::error!(method = %method, path = %path, error = %e, "Rollback failed");
    }
}
