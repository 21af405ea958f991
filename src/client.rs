// Client session owner
// Holds the resolved session state, keeps it alive with a background
// rotation task, and hands out retry wrappers for operations.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;

use crate::auth::{probe_credentials, rotate_session_token, AuthResult, CookieJar, TokenCache};
use crate::config::ClientConfig;
use crate::constants::{SECURE_1PSID, SECURE_1PSIDTS};
use crate::error::{GeminiError, Result};
use crate::http_client::GeminiHttpClient;
use crate::retry::Retry;

#[derive(Default)]
struct BackgroundTasks {
    refresh: Option<JoinHandle<()>>,
    close: Option<JoinHandle<()>>,
}

struct ClientInner {
    config: ClientConfig,
    http: GeminiHttpClient,
    cache: TokenCache,

    /// Caller-supplied cookies; candidates for every (re)initialization.
    base_cookies: CookieJar,

    /// Liveness flag checked by the retry orchestrator.
    running: AtomicBool,

    /// Session state resolved by the last successful probe.
    auth: RwLock<Option<AuthResult>>,

    /// When the background rotation last completed.
    last_refreshed: RwLock<Option<DateTime<Utc>>>,

    tasks: Mutex<BackgroundTasks>,
}

/// Client for the Gemini web app.
///
/// Cheap to clone; clones share one session. Construct, call
/// [`init`](Self::init) (or let a [`with_retry`](Self::with_retry) wrapper
/// do it lazily), then run operations through the retry wrapper so an
/// invalidated session is transparently re-established.
#[derive(Clone)]
pub struct GeminiClient {
    inner: Arc<ClientInner>,
}

impl GeminiClient {
    /// Create a client from the two session cookie values. An empty
    /// rotating token is accepted - initialization can still succeed
    /// through the token cache.
    pub fn new(
        secure_1psid: &str,
        secure_1psidts: &str,
        config: ClientConfig,
    ) -> anyhow::Result<Self> {
        let domain = config.endpoints.cookie_domain.clone();
        let mut jar = CookieJar::new();
        jar.set(SECURE_1PSID, secure_1psid, &domain, "/");
        if !secure_1psidts.is_empty() {
            jar.set(SECURE_1PSIDTS, secure_1psidts, &domain, "/");
        }
        Self::with_cookies(jar, config)
    }

    /// Create a client from a full cookie jar, e.g. one loaded from a
    /// browser-exported cookie file.
    pub fn with_cookies(cookies: CookieJar, config: ClientConfig) -> anyhow::Result<Self> {
        let http = GeminiHttpClient::new(&config)?;
        let cache = TokenCache::new(config.cache_dir.clone());

        Ok(Self {
            inner: Arc::new(ClientInner {
                config,
                http,
                cache,
                base_cookies: cookies,
                running: AtomicBool::new(false),
                auth: RwLock::new(None),
                last_refreshed: RwLock::new(None),
                tasks: Mutex::new(BackgroundTasks::default()),
            }),
        })
    }

    /// Establish a session: race the available credential sets, adopt the
    /// winner, and start the configured background tasks.
    pub async fn init(&self) -> Result<()> {
        let inner = &self.inner;
        let auth = probe_credentials(
            &inner.http,
            &inner.config.endpoints,
            &inner.cache,
            &inner.base_cookies,
            inner.config.account_index,
            inner.config.verbose,
        )
        .await?;

        tracing::info!(
            account_index = inner.config.account_index,
            build_label = auth.build_label.as_deref().unwrap_or("unknown"),
            "Client initialized"
        );

        *inner.auth.write().await = Some(auth);
        inner.running.store(true, Ordering::SeqCst);

        if inner.config.auto_refresh {
            self.spawn_refresh_task().await;
        }
        if inner.config.auto_close {
            self.reset_close_task().await;
        }

        Ok(())
    }

    /// Whether the client currently holds a live session.
    pub fn running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Stop background tasks and drop the live session. The client can be
    /// re-initialized afterwards; cached tokens survive.
    pub async fn close(&self) {
        // State first, task aborts last: the idle timer calls close() from
        // inside the task being aborted.
        self.inner.running.store(false, Ordering::SeqCst);
        *self.inner.auth.write().await = None;

        let mut tasks = self.inner.tasks.lock().await;
        let refresh = tasks.refresh.take();
        let close = tasks.close.take();
        drop(tasks);

        if let Some(handle) = refresh {
            handle.abort();
        }
        if let Some(handle) = close {
            handle.abort();
        }
        tracing::debug!("Client closed");
    }

    /// Access token from the live session, when one is held.
    pub async fn access_token(&self) -> Option<String> {
        self.inner
            .auth
            .read()
            .await
            .as_ref()
            .map(|auth| auth.access_token.clone())
    }

    /// Frontend build label from the live session.
    pub async fn build_label(&self) -> Option<String> {
        self.inner
            .auth
            .read()
            .await
            .as_ref()
            .and_then(|auth| auth.build_label.clone())
    }

    /// Server session id from the live session.
    pub async fn session_id(&self) -> Option<String> {
        self.inner
            .auth
            .read()
            .await
            .as_ref()
            .and_then(|auth| auth.session_id.clone())
    }

    /// Cookie jar of the live session.
    pub async fn cookies(&self) -> Option<CookieJar> {
        self.inner
            .auth
            .read()
            .await
            .as_ref()
            .map(|auth| auth.cookies.clone())
    }

    /// When the background rotation last completed.
    pub async fn last_refreshed(&self) -> Option<DateTime<Utc>> {
        *self.inner.last_refreshed.read().await
    }

    /// The token cache backing this client.
    pub fn token_cache(&self) -> &TokenCache {
        &self.inner.cache
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Wrap operations with liveness checks and up to `budget` retries of
    /// recoverable failures.
    pub fn with_retry(&self, budget: u32) -> Retry {
        Retry::new(self.clone(), budget)
    }

    /// Rotate the session token now and fold any new cookies into the
    /// live session jar. Returns the new token, or `None` when the
    /// current one is still valid.
    pub async fn refresh_session(&self) -> Result<Option<String>> {
        let inner = &self.inner;

        let jar = inner
            .auth
            .read()
            .await
            .as_ref()
            .map(|auth| auth.cookies.clone())
            .unwrap_or_else(|| inner.base_cookies.clone());

        let (token, response_jar) =
            rotate_session_token(&inner.http, &inner.config.endpoints, &inner.cache, &jar).await?;

        if let Some(auth) = inner.auth.write().await.as_mut() {
            if let Some(ref response_jar) = response_jar {
                auth.cookies = auth.cookies.merged(response_jar);
            }
            if let Some(ref token) = token {
                auth.cookies.set(
                    SECURE_1PSIDTS,
                    token,
                    &inner.config.endpoints.cookie_domain,
                    "/",
                );
            }
        }

        *inner.last_refreshed.write().await = Some(Utc::now());
        Ok(token)
    }

    /// Liveness gate used by the retry orchestrator: initialize when not
    /// running, fail with the recoverable kind when initialization leaves
    /// the client dead, and re-arm the idle timer otherwise.
    pub(crate) async fn ensure_running(&self, operation: &str) -> Result<()> {
        if !self.running() {
            self.init().await?;

            if !self.running() {
                return Err(GeminiError::Api(format!(
                    "Invalid call to {}: client initialization failed",
                    operation
                )));
            }
        }

        self.reset_close_task().await;
        Ok(())
    }

    async fn spawn_refresh_task(&self) {
        let mut tasks = self.inner.tasks.lock().await;
        if let Some(handle) = tasks.refresh.take() {
            handle.abort();
        }

        let client = self.clone();
        tasks.refresh = Some(tokio::spawn(async move {
            let interval = client.inner.config.refresh_interval;
            loop {
                tokio::time::sleep(interval).await;
                match client.refresh_session().await {
                    Ok(Some(_)) => tracing::debug!("Background rotation refreshed the token"),
                    Ok(None) => tracing::debug!("Background rotation: token still valid"),
                    Err(e @ GeminiError::Auth(_)) => {
                        // New credentials are needed; re-running rotation
                        // cannot mint them.
                        tracing::warn!(error = %e, "Stopping background rotation");
                        break;
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Background rotation failed, will retry");
                    }
                }
            }
        }));
    }

    /// Re-arm the idle auto-close timer, when enabled.
    async fn reset_close_task(&self) {
        if !self.inner.config.auto_close {
            return;
        }

        let mut tasks = self.inner.tasks.lock().await;
        if let Some(handle) = tasks.close.take() {
            handle.abort();
        }

        let client = self.clone();
        tasks.close = Some(tokio::spawn(async move {
            tokio::time::sleep(client.inner.config.close_delay).await;
            tracing::debug!("Idle timeout reached, closing client");
            client.close().await;
        }));
    }
}

#[cfg(any(test, feature = "test-utils"))]
impl GeminiClient {
    /// A live client with a seeded session and an isolated cache
    /// directory; no network involved.
    pub fn new_for_testing(cache_dir: &std::path::Path) -> Self {
        let config = ClientConfig {
            cache_dir: cache_dir.to_path_buf(),
            auto_refresh: false,
            verbose: false,
            ..ClientConfig::default()
        };

        let client = Self::with_cookies(
            CookieJar::from_session_cookies("test-psid", "test-psidts"),
            config,
        )
        .expect("test client construction");

        let auth = crate::auth::AuthResult {
            access_token: "test-access-token".to_string(),
            build_label: Some("test-build".to_string()),
            session_id: Some("test-session".to_string()),
            cookies: CookieJar::from_session_cookies("test-psid", "test-psidts"),
        };
        *client
            .inner
            .auth
            .try_write()
            .expect("fresh client lock is uncontended") = Some(auth);
        client.inner.running.store(true, Ordering::SeqCst);

        client
    }

    /// A dead client with no credentials and an empty cache; any
    /// initialization attempt fails without touching the network.
    pub fn new_for_testing_not_running(cache_dir: &std::path::Path) -> Self {
        let config = ClientConfig {
            cache_dir: cache_dir.to_path_buf(),
            auto_refresh: false,
            verbose: false,
            ..ClientConfig::default()
        };

        Self::with_cookies(CookieJar::new(), config).expect("test client construction")
    }
}
