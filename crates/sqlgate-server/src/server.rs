// crates/sqlgate-server/src/server.rs
// ============================================================================
// Module: Gateway Server
// Description: Assembles sources, policy, and routes into a running gateway.
// Purpose: Build the gateway from configuration and own its background tasks.
// Dependencies: axum, sqlgate-config, sqlgate-core, sqlgate-store-sqlite,
//               tokio, tracing
// ============================================================================

//! ## Overview
//! [`GatewayServer::from_config`] opens every configured source through the
//! [`DriverRegistry`], appends the read-only local query log source when one is
//! named, and spawns one rotation task per secret-backed source. Rotation tasks
//! open the replacement connection on the blocking pool and install it with
//! [`SourceHandle::swap`]; a failed open keeps the current connection.
//!
//! [`GatewayServer::builder`] assembles a gateway from parts for embedding and
//! tests.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;

use axum::Router;
use sqlgate_config::LinkConfig;
use sqlgate_config::SourceConfig;
use sqlgate_config::SourceConnection;
use sqlgate_config::SqlGateConfig;
use sqlgate_config::expand_env;
use sqlgate_config::read_key_file;
use sqlgate_core::NamedQueries;
use sqlgate_core::QueryError;
use sqlgate_core::Queryable;
use sqlgate_core::SourceHandle;
use sqlgate_core::SourceOptions;
use sqlgate_core::SourceRegistry;
use sqlgate_core::SwapOutcome;
use sqlgate_store_sqlite::DriverRegistry;
use sqlgate_store_sqlite::LocalQueryLog;
use sqlgate_store_sqlite::SCHEMA_QUERY_NAME;
use sqlgate_store_sqlite::SCHEMA_QUERY_SQL;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;
use tracing::warn;

use crate::auth::DefaultAuthorizer;
use crate::auth::IdentityProvider;
use crate::auth::SourceAuthorizer;
use crate::auth::authorizer_from_config;
use crate::auth::identity_from_config;
use crate::error::GatewayError;
use crate::http::GatewayState;
use crate::http::build_router;
use crate::metrics::GatewayMetrics;
use crate::metrics::NoopMetrics;
use crate::query::DefaultQueryCheck;
use crate::query::QueryCheck;
use crate::query::QueryRouter;
use crate::render::RewriteRule;
use crate::rules::presets;
use crate::secrets::DirectorySecretStore;
use crate::secrets::SecretStore;
use crate::secrets::connection_string;

// ============================================================================
// SECTION: Builder
// ============================================================================

/// Builder for [`GatewayServer`].
pub struct GatewayServerBuilder {
    /// Query router.
    router: QueryRouter,
    /// Query check; defaults to the length guard.
    check: Arc<dyn QueryCheck>,
    /// Identity provider.
    identity: Option<Arc<dyn IdentityProvider>>,
    /// Source authorizer.
    authorizer: Arc<dyn SourceAuthorizer>,
    /// Metrics sink.
    metrics: Arc<dyn GatewayMetrics>,
    /// Rewrite rules.
    rules: Vec<RewriteRule>,
    /// UI links.
    links: Vec<LinkConfig>,
    /// NULL placeholder.
    null_placeholder: String,
    /// Rows shown on the HTML page.
    max_display_rows: usize,
    /// Route prefix.
    route_prefix: String,
    /// Enables response compression.
    compression: bool,
}

impl GatewayServerBuilder {
    /// Sets the query check.
    #[must_use]
    pub fn query_check(mut self, check: Arc<dyn QueryCheck>) -> Self {
        self.check = check;
        self
    }

    /// Sets the identity provider.
    #[must_use]
    pub fn identity(mut self, identity: Arc<dyn IdentityProvider>) -> Self {
        self.identity = Some(identity);
        self
    }

    /// Sets the source authorizer.
    #[must_use]
    pub fn authorizer(mut self, authorizer: Arc<dyn SourceAuthorizer>) -> Self {
        self.authorizer = authorizer;
        self
    }

    /// Sets the metrics sink.
    #[must_use]
    pub fn metrics(mut self, metrics: Arc<dyn GatewayMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Sets the rewrite rules in priority order.
    #[must_use]
    pub fn rules(mut self, rules: Vec<RewriteRule>) -> Self {
        self.rules = rules;
        self
    }

    /// Sets the UI links.
    #[must_use]
    pub fn links(mut self, links: Vec<LinkConfig>) -> Self {
        self.links = links;
        self
    }

    /// Sets the NULL placeholder.
    #[must_use]
    pub fn null_placeholder(mut self, placeholder: impl Into<String>) -> Self {
        self.null_placeholder = placeholder.into();
        self
    }

    /// Sets how many rows the HTML page shows.
    #[must_use]
    pub const fn max_display_rows(mut self, rows: usize) -> Self {
        self.max_display_rows = rows;
        self
    }

    /// Mounts routes under `prefix` (empty, or starting with `/`).
    #[must_use]
    pub fn route_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.route_prefix = prefix.into();
        self
    }

    /// Enables or disables response compression.
    #[must_use]
    pub const fn compression(mut self, enabled: bool) -> Self {
        self.compression = enabled;
        self
    }

    /// Builds the server.
    #[must_use]
    pub fn build(self) -> GatewayServer {
        let state = GatewayState {
            router: self.router,
            check: self.check,
            identity: self.identity,
            authorizer: self.authorizer,
            metrics: self.metrics,
            rules: self.rules,
            links: self.links,
            null_placeholder: self.null_placeholder,
            max_display_rows: self.max_display_rows,
            route_prefix: self.route_prefix,
        };
        GatewayServer {
            state: Arc::new(state),
            compression: self.compression,
            tasks: Mutex::new(Vec::new()),
            secrets: None,
        }
    }
}

// ============================================================================
// SECTION: Server
// ============================================================================

/// SQL gateway instance.
///
/// # Invariants
/// - Background tasks are aborted when the server is closed or dropped.
pub struct GatewayServer {
    /// Handler state.
    state: Arc<GatewayState>,
    /// Enables response compression.
    compression: bool,
    /// Rotation and polling tasks.
    tasks: Mutex<Vec<JoinHandle<()>>>,
    /// Secret store feeding rotation tasks.
    secrets: Option<Arc<dyn SecretStore>>,
}

impl GatewayServer {
    /// Starts a builder around `router` with default policy: no identity
    /// provider, the default authorizer, no rewrite rules, and no metrics.
    #[must_use]
    pub fn builder(router: QueryRouter) -> GatewayServerBuilder {
        GatewayServerBuilder {
            router,
            check: Arc::new(DefaultQueryCheck::new(sqlgate_core::DEFAULT_MAX_QUERY_BYTES)),
            identity: None,
            authorizer: Arc::new(DefaultAuthorizer),
            metrics: Arc::new(NoopMetrics),
            rules: Vec::new(),
            links: Vec::new(),
            null_placeholder: sqlgate_config::DEFAULT_NULL_PLACEHOLDER.to_string(),
            max_display_rows: sqlgate_config::DEFAULT_MAX_DISPLAY_ROWS,
            route_prefix: String::new(),
            compression: false,
        }
    }

    /// Builds a gateway from configuration, using the directory secret store
    /// when `[secrets]` is configured.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError`] when validation fails or a source cannot be
    /// opened.
    pub fn from_config(
        config: SqlGateConfig,
        drivers: &DriverRegistry,
    ) -> Result<Self, GatewayError> {
        let directory = config.secrets.as_ref().map(|secrets| {
            Arc::new(DirectorySecretStore::new(expand_env(&secrets.dir), secrets.poll_interval()))
        });
        let store = directory.clone().map(|store| store as Arc<dyn SecretStore>);
        let server = Self::from_config_with_secrets(config, drivers, store)?;
        if let Some(directory) = directory {
            require_runtime()?;
            server.track(directory.spawn_poller());
        }
        Ok(server)
    }

    /// Builds a gateway from configuration with an explicit secret store.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError`] when validation fails, a source cannot be
    /// opened, or a secret-backed source is configured outside a tokio runtime.
    pub fn from_config_with_secrets(
        mut config: SqlGateConfig,
        drivers: &DriverRegistry,
        secrets: Option<Arc<dyn SecretStore>>,
    ) -> Result<Self, GatewayError> {
        config.validate().map_err(|err| GatewayError::Config(err.to_string()))?;
        let registry = Arc::new(SourceRegistry::new());
        let drivers = Arc::new(drivers.clone());
        let mut rotations = Vec::new();
        for source in &config.sources {
            let (db, secret) = open_source(&drivers, source, secrets.as_ref())?;
            let options = source_options(&source.label, &source.named);
            registry.register(&source.source, db, options.clone())?;
            if let Some((name, receiver)) = secret {
                let handle = registry.lookup(&source.source).ok_or_else(|| {
                    GatewayError::Init(format!("source \"{}\" missing after register", source.source))
                })?;
                rotations.push(Rotation {
                    handle,
                    drivers: Arc::clone(&drivers),
                    driver: source.driver.clone(),
                    secret: name,
                    options,
                    receiver,
                });
            }
        }

        let mut router = QueryRouter::new(Arc::clone(&registry))
            .with_max_rows(config.server.max_rows)
            .with_query_timeout(config.server.query_timeout());
        if let Some(local) = &config.local_state {
            let log = LocalQueryLog::open(local.query_log_config())
                .map_err(|err| GatewayError::Init(format!("local state: {err}")))?;
            if let Some(name) = &local.source {
                let reader = log
                    .open_reader()
                    .map_err(|err| GatewayError::Init(format!("local state reader: {err}")))?;
                let mut named = NamedQueries::new();
                named.insert(SCHEMA_QUERY_NAME.to_string(), SCHEMA_QUERY_SQL.to_string());
                registry.register(name, Box::new(reader), source_options(&local.label, &named))?;
            }
            router = router.with_query_log(Arc::new(log), local.source.clone());
        }

        let mut builder = Self::builder(router)
            .query_check(Arc::new(DefaultQueryCheck::new(config.server.max_query_bytes)))
            .authorizer(authorizer_from_config(&config.auth))
            .rules(presets(&config.ui.rewrite_rules)?)
            .links(config.links.clone())
            .null_placeholder(config.ui.null_placeholder.clone())
            .max_display_rows(config.server.max_display_rows)
            .route_prefix(config.server.route_prefix.clone())
            .compression(config.server.compression);
        if let Some(identity) = identity_from_config(&config.auth)? {
            builder = builder.identity(identity);
        }
        let mut server = builder.build();
        server.secrets = secrets;
        if !rotations.is_empty() {
            require_runtime()?;
        }
        for rotation in rotations {
            server.track(rotation.spawn());
        }
        info!(sources = registry.len(), "gateway initialized");
        Ok(server)
    }

    /// Returns the axum router serving this gateway.
    #[must_use]
    pub fn app(&self) -> Router {
        build_router(Arc::clone(&self.state), self.compression)
    }

    /// Returns the query router.
    #[must_use]
    pub fn query_router(&self) -> &QueryRouter {
        &self.state.router
    }

    /// Returns the source registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<SourceRegistry> {
        self.state.router.registry()
    }

    /// Returns the secret store feeding rotation tasks.
    #[must_use]
    pub fn secret_store(&self) -> Option<&Arc<dyn SecretStore>> {
        self.secrets.as_ref()
    }

    /// Serves requests on `listener` until `shutdown` resolves.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Init`] when the listener fails.
    pub async fn serve(
        &self,
        listener: TcpListener,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<(), GatewayError> {
        if let Ok(addr) = listener.local_addr() {
            info!(%addr, "gateway listening");
        }
        axum::serve(listener, self.app().into_make_service_with_connect_info::<SocketAddr>())
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|err| GatewayError::Init(format!("http server failed: {err}")))
    }

    /// Stops background tasks and closes every source.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Execution`] with the first close failure.
    pub fn close(&self) -> Result<(), GatewayError> {
        self.abort_tasks();
        self.registry().close_all().map_err(GatewayError::from)
    }

    /// Keeps `task` until the server closes.
    fn track(&self, task: JoinHandle<()>) {
        self.lock_tasks().push(task);
    }

    /// Aborts every background task.
    fn abort_tasks(&self) {
        for task in self.lock_tasks().drain(..) {
            task.abort();
        }
    }

    /// Locks the task list, recovering from poisoning.
    fn lock_tasks(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for GatewayServer {
    fn drop(&mut self) {
        self.abort_tasks();
    }
}

// ============================================================================
// SECTION: Sources
// ============================================================================

/// A subscribed secret: its name and receiver.
type SecretSubscription = (String, watch::Receiver<Vec<u8>>);

/// Builds handle options from a label and named queries.
fn source_options(label: &str, named: &NamedQueries) -> SourceOptions {
    SourceOptions {
        label: label.to_string(),
        named: named.clone(),
    }
}

/// Opens one configured source, subscribing to its secret when it has one.
fn open_source(
    drivers: &DriverRegistry,
    source: &SourceConfig,
    secrets: Option<&Arc<dyn SecretStore>>,
) -> Result<(Box<dyn Queryable>, Option<SecretSubscription>), GatewayError> {
    if !drivers.contains(&source.driver) {
        return Err(GatewayError::Config(format!(
            "source \"{}\": unknown driver \"{}\"",
            source.source, source.driver
        )));
    }
    let connection = source.connection().map_err(|err| GatewayError::Config(err.to_string()))?;
    let (connection, subscription) = match connection {
        SourceConnection::Url(url) => (url, None),
        SourceConnection::KeyFile(path) => {
            let url = read_key_file(&path).map_err(|err| GatewayError::Config(err.to_string()))?;
            (url, None)
        }
        SourceConnection::Secret(name) => {
            let store = secrets.ok_or_else(|| {
                GatewayError::Config(format!("source \"{}\": no secret store", source.source))
            })?;
            let mut receiver = store.subscribe(&name)?;
            let url = connection_string(&name, &receiver.borrow_and_update())?;
            (url, Some((name, receiver)))
        }
    };
    let db = drivers
        .open(&source.driver, &connection)
        .map_err(|err| GatewayError::Init(format!("source \"{}\": {err}", source.source)))?;
    Ok((db, subscription))
}

/// Fails unless called inside a tokio runtime.
fn require_runtime() -> Result<(), GatewayError> {
    tokio::runtime::Handle::try_current()
        .map(|_| ())
        .map_err(|_| GatewayError::Init("secret rotation requires a tokio runtime".to_string()))
}

// ============================================================================
// SECTION: Rotation
// ============================================================================

/// Rotation task inputs for one secret-backed source.
struct Rotation {
    /// Handle to swap.
    handle: Arc<SourceHandle>,
    /// Drivers used to open replacements.
    drivers: Arc<DriverRegistry>,
    /// Driver name.
    driver: String,
    /// Secret name.
    secret: String,
    /// Options reinstalled with each replacement.
    options: SourceOptions,
    /// Secret change stream.
    receiver: watch::Receiver<Vec<u8>>,
}

impl Rotation {
    /// Spawns the task. It ends when the secret store drops the secret or the
    /// handle closes.
    fn spawn(mut self) -> JoinHandle<()> {
        tokio::spawn(async move {
            while self.receiver.changed().await.is_ok() {
                let value = self.receiver.borrow_and_update().clone();
                match self.install(&value).await {
                    Ok(()) => {}
                    Err(QueryError::Closed) => return,
                    Err(err) => warn!(
                        source = self.handle.source(),
                        error = %err,
                        "connection rotation failed; keeping current connection"
                    ),
                }
            }
        })
    }

    /// Opens a connection for `value` and swaps it in.
    async fn install(&self, value: &[u8]) -> Result<(), QueryError> {
        let connection = connection_string(&self.secret, value)
            .map_err(|err| QueryError::Driver(err.to_string()))?;
        let drivers = Arc::clone(&self.drivers);
        let driver = self.driver.clone();
        let db = tokio::task::spawn_blocking(move || drivers.open(&driver, &connection))
            .await
            .map_err(|err| QueryError::Driver(format!("open task failed: {err}")))??;
        match self.handle.swap(db, self.options.clone())? {
            SwapOutcome::Applied => info!(source = self.handle.source(), "rotated connection applied"),
            SwapOutcome::Staged => info!(source = self.handle.source(), "rotated connection staged"),
        }
        Ok(())
    }
}
