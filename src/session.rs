//! Lazy, single-instance session management.
//!
//! [`SessionManager`] owns the only handle to the automation session. The
//! handle sits behind an async mutex: [`SessionManager::ensure_live`] starts the
//! session on first use and returns a [`SessionLease`] that keeps the lock for
//! the duration of one engine operation, so startup is single-flight and page
//! operations never interleave. [`SessionManager::teardown`] closes the session
//! and always leaves the manager empty, even when closing fails.

use std::ops::Deref;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde_json::json;
use thiserror::Error;
use tokio::sync::{MappedMutexGuard, Mutex, MutexGuard};

use crate::config::GatewayConfig;
use crate::engine::{AutomationEngine, AutomationSession, EngineError};
use crate::logging::GatewayLogger;

const CATEGORY: &str = "session";

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to initialise automation session: {0}")]
    Init(#[source] EngineError),
    #[error("automation page not available")]
    Unavailable,
    #[error("failed to close automation session: {0}")]
    Teardown(#[source] EngineError),
}

/// Either no session, or exactly one live session.
#[derive(Debug)]
pub enum SessionState<S> {
    Absent,
    Live(S),
}

impl<S> SessionState<S> {
    pub fn is_live(&self) -> bool {
        matches!(self, SessionState::Live(_))
    }

    fn live_mut(&mut self) -> Option<&mut S> {
        match self {
            SessionState::Live(session) => Some(session),
            SessionState::Absent => None,
        }
    }
}

/// Exclusive access to the live session for one operation.
pub struct SessionLease<'a, S> {
    guard: MappedMutexGuard<'a, S>,
}

impl<S: AutomationSession> SessionLease<'_, S> {
    /// The session's page, or [`SessionError::Unavailable`] if it has none.
    pub fn page(&self) -> Result<&S::Page, SessionError> {
        self.guard.page().ok_or(SessionError::Unavailable)
    }
}

impl<S> Deref for SessionLease<'_, S> {
    type Target = S;

    fn deref(&self) -> &S {
        &self.guard
    }
}

pub struct SessionManager<E: AutomationEngine> {
    engine: E,
    config: Arc<GatewayConfig>,
    logger: GatewayLogger,
    state: Mutex<SessionState<E::Session>>,
    starts: AtomicUsize,
}

impl<E: AutomationEngine> SessionManager<E> {
    pub fn new(engine: E, config: Arc<GatewayConfig>, logger: GatewayLogger) -> Self {
        Self {
            engine,
            config,
            logger,
            state: Mutex::new(SessionState::Absent),
            starts: AtomicUsize::new(0),
        }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Number of sessions successfully started over the manager's lifetime.
    pub fn sessions_started(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub async fn is_live(&self) -> bool {
        self.state.lock().await.is_live()
    }

    /// Start the session if needed and lease it for one operation.
    ///
    /// A failed start leaves the manager empty, so the next call retries from
    /// scratch.
    pub async fn ensure_live(&self) -> Result<SessionLease<'_, E::Session>, SessionError> {
        let mut state = self.state.lock().await;

        if !state.is_live() {
            self.logger.info(
                "Starting automation session",
                Some(CATEGORY),
                Some(json!({
                    "model": self.config.model_name,
                    "headless": self.config.headless,
                    "cdp": self.config.cdp_url.is_some(),
                })),
            );
            let session = self.engine.start(&self.config).await.map_err(|err| {
                self.logger.error(
                    format!("Automation session failed to start: {err}"),
                    Some(CATEGORY),
                    None,
                );
                SessionError::Init(err)
            })?;
            *state = SessionState::Live(session);
            self.starts.fetch_add(1, Ordering::SeqCst);
            self.logger
                .info("Automation session started", Some(CATEGORY), None);
        }

        MutexGuard::try_map(state, SessionState::live_mut)
            .map(|guard| SessionLease { guard })
            .map_err(|_| SessionError::Unavailable)
    }

    /// Close the live session, if any. Close errors are logged, never returned.
    pub async fn teardown(&self) {
        let mut state = self.state.lock().await;
        let SessionState::Live(session) = std::mem::replace(&mut *state, SessionState::Absent)
        else {
            return;
        };

        // The lock stays held across close: at most one browser is alive.
        let closed = session.close().await;
        drop(state);

        match closed {
            Ok(()) => self
                .logger
                .info("Automation session closed", Some(CATEGORY), None),
            Err(err) => {
                let err = SessionError::Teardown(err);
                self.logger.error(err.to_string(), Some(CATEGORY), None);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{
        ActOptions, ActResult, AutomationPage, ExtractOptions, ObserveOptions, ObserveResult,
        ScreenshotOptions,
    };
    use crate::logging::LogLevel;
    use crate::logging::tests::capturing_logger;
    use async_trait::async_trait;
    use futures_util::future::join_all;
    use serde_json::Value as JsonValue;
    use std::time::Duration;

    #[derive(Default)]
    struct Counters {
        starts: AtomicUsize,
        closes: AtomicUsize,
        alive: AtomicUsize,
        peak_alive: AtomicUsize,
    }

    struct StubEngine {
        counters: Arc<Counters>,
        fail_first_starts: usize,
        fail_close: bool,
        with_page: bool,
        close_delay: Duration,
    }

    impl StubEngine {
        fn new(counters: Arc<Counters>) -> Self {
            Self {
                counters,
                fail_first_starts: 0,
                fail_close: false,
                with_page: true,
                close_delay: Duration::ZERO,
            }
        }
    }

    struct StubSession {
        counters: Arc<Counters>,
        fail_close: bool,
        close_delay: Duration,
        page: Option<StubPage>,
    }

    struct StubPage;

    #[async_trait]
    impl AutomationEngine for StubEngine {
        type Session = StubSession;

        async fn start(&self, _config: &GatewayConfig) -> Result<StubSession, EngineError> {
            tokio::time::sleep(Duration::from_millis(10)).await;
            let attempt = self.counters.starts.fetch_add(1, Ordering::SeqCst);
            if attempt < self.fail_first_starts {
                return Err(EngineError::Startup("chrome not found".into()));
            }
            let alive = self.counters.alive.fetch_add(1, Ordering::SeqCst) + 1;
            self.counters.peak_alive.fetch_max(alive, Ordering::SeqCst);
            Ok(StubSession {
                counters: Arc::clone(&self.counters),
                fail_close: self.fail_close,
                close_delay: self.close_delay,
                page: self.with_page.then_some(StubPage),
            })
        }
    }

    #[async_trait]
    impl AutomationSession for StubSession {
        type Page = StubPage;

        fn page(&self) -> Option<&StubPage> {
            self.page.as_ref()
        }

        async fn close(self) -> Result<(), EngineError> {
            tokio::time::sleep(self.close_delay).await;
            self.counters.alive.fetch_sub(1, Ordering::SeqCst);
            self.counters.closes.fetch_add(1, Ordering::SeqCst);
            if self.fail_close {
                Err(EngineError::operation("browser already gone"))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl AutomationPage for StubPage {
        async fn goto(&self, _url: &str) -> Result<(), EngineError> {
            Ok(())
        }

        async fn act(&self, options: ActOptions) -> Result<ActResult, EngineError> {
            Ok(ActResult {
                success: true,
                message: String::new(),
                action: options.action,
            })
        }

        async fn extract(&self, _options: ExtractOptions) -> Result<JsonValue, EngineError> {
            Ok(JsonValue::Null)
        }

        async fn observe(
            &self,
            _options: ObserveOptions,
        ) -> Result<Vec<ObserveResult>, EngineError> {
            Ok(Vec::new())
        }

        async fn screenshot(&self, _options: ScreenshotOptions) -> Result<Vec<u8>, EngineError> {
            Ok(vec![0x89])
        }
    }

    fn manager(engine: StubEngine) -> SessionManager<StubEngine> {
        SessionManager::new(
            engine,
            Arc::new(GatewayConfig::default()),
            GatewayLogger::default(),
        )
    }

    #[tokio::test]
    async fn sequential_ensures_start_one_session() {
        let counters = Arc::new(Counters::default());
        let manager = manager(StubEngine::new(Arc::clone(&counters)));

        for _ in 0..5 {
            let lease = manager.ensure_live().await.expect("session");
            assert!(lease.page().is_ok());
        }

        assert_eq!(counters.starts.load(Ordering::SeqCst), 1);
        assert_eq!(manager.sessions_started(), 1);
        assert!(manager.is_live().await);
    }

    #[tokio::test]
    async fn concurrent_ensures_start_one_session() {
        let counters = Arc::new(Counters::default());
        let manager = manager(StubEngine::new(Arc::clone(&counters)));

        let results = join_all((0..8).map(|_| async {
            let lease = manager.ensure_live().await?;
            let page = lease.page().map(|_| ());
            page
        }))
        .await;

        assert!(results.iter().all(Result::is_ok));
        assert_eq!(counters.starts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_start_stays_absent_and_retries() {
        let counters = Arc::new(Counters::default());
        let engine = StubEngine {
            fail_first_starts: 1,
            ..StubEngine::new(Arc::clone(&counters))
        };
        let manager = manager(engine);

        let err = manager.ensure_live().await.err().expect("first start fails");
        assert!(matches!(err, SessionError::Init(EngineError::Startup(_))));
        assert!(!manager.is_live().await);

        assert!(manager.ensure_live().await.is_ok());
        assert_eq!(counters.starts.load(Ordering::SeqCst), 2);
        assert_eq!(manager.sessions_started(), 1);
    }

    #[tokio::test]
    async fn missing_page_is_reported_as_unavailable() {
        let counters = Arc::new(Counters::default());
        let engine = StubEngine {
            with_page: false,
            ..StubEngine::new(Arc::clone(&counters))
        };
        let manager = manager(engine);

        let lease = manager.ensure_live().await.expect("session starts");
        assert!(matches!(lease.page(), Err(SessionError::Unavailable)));
    }

    #[tokio::test]
    async fn teardown_is_idempotent() {
        let counters = Arc::new(Counters::default());
        let manager = manager(StubEngine::new(Arc::clone(&counters)));

        manager.teardown().await;
        assert_eq!(counters.closes.load(Ordering::SeqCst), 0);

        drop(manager.ensure_live().await.expect("session"));
        manager.teardown().await;
        manager.teardown().await;

        assert_eq!(counters.closes.load(Ordering::SeqCst), 1);
        assert!(!manager.is_live().await);
    }

    #[tokio::test]
    async fn ensure_during_teardown_waits_for_close() {
        let counters = Arc::new(Counters::default());
        let engine = StubEngine {
            close_delay: Duration::from_millis(50),
            ..StubEngine::new(Arc::clone(&counters))
        };
        let manager = manager(engine);
        drop(manager.ensure_live().await.expect("session"));

        let restart = async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            drop(manager.ensure_live().await.expect("restarted session"));
        };
        tokio::join!(manager.teardown(), restart);

        assert_eq!(counters.starts.load(Ordering::SeqCst), 2);
        assert_eq!(counters.closes.load(Ordering::SeqCst), 1);
        assert_eq!(counters.peak_alive.load(Ordering::SeqCst), 1);
        assert!(manager.is_live().await);
    }

    #[tokio::test]
    async fn close_failure_is_logged_and_state_cleared() {
        let counters = Arc::new(Counters::default());
        let engine = StubEngine {
            fail_close: true,
            ..StubEngine::new(Arc::clone(&counters))
        };
        let (logger, records) = capturing_logger();
        let manager = SessionManager::new(engine, Arc::new(GatewayConfig::default()), logger);

        drop(manager.ensure_live().await.expect("session"));
        manager.teardown().await;

        assert!(!manager.is_live().await);
        let records = records.lock().unwrap();
        let error = records
            .iter()
            .find(|record| record.level == LogLevel::Error)
            .expect("teardown error logged");
        assert!(error.message.contains("browser already gone"));

        drop(records);
        drop(manager.ensure_live().await.expect("fresh session"));
        assert_eq!(counters.starts.load(Ordering::SeqCst), 2);
    }
}
