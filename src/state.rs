//! Application State
//!
//! Shared state for the HTTP layer: in-memory carts, the availability
//! reconcilers mounted for them, per-session category views and the remote
//! collaborators everything talks to.

use dashmap::DashMap;
use std::{sync::Arc, time::Duration};
use tokio::time::Instant;

use crate::{
    backend::HttpBackend,
    cart::{
        models::CartLine,
        reconciler::{AvailabilityReconciler, MerchantType, ReconcilerHandle},
        stock::StockApi,
        store::CartHandle,
    },
    catalog::{api::CatalogApi, models::Category, sync::FilterSynchronizer},
    config::AppConfig,
    error::AppError,
    retry::RetryPolicy,
};

/// Shared application state that can be safely passed between threads
pub type SharedState = Arc<AppState>;

/// Idle time after which a browsing session's category view is dropped.
pub const BROWSING_SESSION_TTL: Duration = Duration::from_secs(30 * 60);

/// Most browsing sessions tracked at once.
pub const MAX_BROWSING_SESSIONS: usize = 10_000;

/// Category view of one browsing session.
struct BrowsingSession {
    sync: Arc<FilterSynchronizer>,
    last_seen: Instant,
}

/// Core application state
pub struct AppState {
    /// In-memory storage for carts, keyed by cart_id.
    /// DashMap allows concurrent access without external Mutexes.
    pub carts: Arc<DashMap<String, Vec<CartLine>>>,

    /// Availability reconcilers, one per cart while it is active.
    /// Removing an entry tears the reconciler down.
    pub reconcilers: DashMap<String, ReconcilerHandle>,

    /// Category view of each browsing session.
    browsing: DashMap<String, BrowsingSession>,
    pub browsing_ttl: Duration,
    pub browsing_capacity: usize,

    pub catalog: Arc<dyn CatalogApi>,
    pub stock: Arc<dyn StockApi>,
    pub merchant_type: MerchantType,
    pub stock_refresh: Duration,
}

impl AppState {
    /// Builds state backed by the HTTP catalog and stock services in `config`.
    pub fn from_config(config: &AppConfig) -> Self {
        let backend = Arc::new(HttpBackend::new(config.api_url.clone()));
        Self::new(
            backend.clone(),
            backend,
            config.merchant_type,
            config.stock_refresh,
        )
    }

    pub fn new(
        catalog: Arc<dyn CatalogApi>,
        stock: Arc<dyn StockApi>,
        merchant_type: MerchantType,
        stock_refresh: Duration,
    ) -> Self {
        tracing::info!(?merchant_type, "Application state initialized");

        Self {
            carts: Arc::new(DashMap::new()),
            reconcilers: DashMap::new(),
            browsing: DashMap::new(),
            browsing_ttl: BROWSING_SESSION_TTL,
            browsing_capacity: MAX_BROWSING_SESSIONS,
            catalog,
            stock,
            merchant_type,
            stock_refresh,
        }
    }

    /// Store view of a single cart.
    pub fn cart_handle(&self, cart_id: &str) -> CartHandle {
        CartHandle::new(Arc::clone(&self.carts), cart_id)
    }

    /// Mounts an availability reconciler for `cart_id` unless one is already
    /// running or the merchant does not track stock.
    pub fn mount_reconciler(&self, cart_id: &str) {
        if !self.merchant_type.checks_availability() || self.reconcilers.contains_key(cart_id) {
            return;
        }

        let reconciler = Arc::new(AvailabilityReconciler::new(
            Arc::clone(&self.stock),
            Arc::new(self.cart_handle(cart_id)),
            self.merchant_type,
            RetryPolicy::stock_lookup(),
        ));

        self.reconcilers
            .entry(cart_id.to_string())
            .or_insert_with(|| reconciler.mount(self.stock_refresh));
        tracing::debug!(cart_id, "Availability reconciler mounted");
    }

    /// Keeps availability in step with a cart whose contents just changed.
    ///
    /// Mounts a reconciler on the first change; later changes clamp against
    /// the known stock at once and trigger a fresh lookup.
    pub fn cart_changed(&self, cart_id: &str) {
        if !self.merchant_type.checks_availability() || !self.carts.contains_key(cart_id) {
            return;
        }
        match self.reconciler(cart_id) {
            Some(reconciler) => reconciler.cart_changed(),
            None => self.mount_reconciler(cart_id),
        }
    }

    /// Tears down the reconciler of `cart_id`, if any.
    pub fn unmount_reconciler(&self, cart_id: &str) {
        if self.reconcilers.remove(cart_id).is_some() {
            tracing::debug!(cart_id, "Availability reconciler unmounted");
        }
    }

    /// Reconciler currently mounted for `cart_id`.
    pub fn reconciler(&self, cart_id: &str) -> Option<Arc<AvailabilityReconciler>> {
        self.reconcilers
            .get(cart_id)
            .map(|handle| Arc::clone(handle.reconciler()))
    }

    /// Number of browsing sessions with a live category view.
    pub fn browsing_sessions(&self) -> usize {
        self.browsing.len()
    }

    /// Category view for `session_id` on `slug`.
    ///
    /// A session browses one category at a time: moving to another category
    /// tears down the previous view and starts from a fresh one. Sessions idle
    /// for longer than `browsing_ttl` are dropped, and the least recently seen
    /// one makes room once `browsing_capacity` is reached.
    pub async fn synchronizer(
        &self,
        session_id: &str,
        slug: &str,
    ) -> Result<Arc<FilterSynchronizer>, AppError> {
        let existing = self.browsing.get_mut(session_id).and_then(|mut session| {
            (session.sync.category().slug == slug).then(|| {
                session.last_seen = Instant::now();
                Arc::clone(&session.sync)
            })
        });
        if let Some(sync) = existing {
            return Ok(sync);
        }

        let category = self.fetch_category(slug).await?;
        let sync = Arc::new(FilterSynchronizer::new(Arc::clone(&self.catalog), category));

        self.evict_browsing_sessions(session_id);
        let session = BrowsingSession {
            sync: Arc::clone(&sync),
            last_seen: Instant::now(),
        };
        if let Some(previous) = self.browsing.insert(session_id.to_string(), session) {
            previous.sync.teardown();
        }

        Ok(sync)
    }

    /// Category `slug`, taken from the session's view when it shows that
    /// category and fetched otherwise. Never creates or replaces a view.
    pub async fn category(
        &self,
        session_id: Option<&str>,
        slug: &str,
    ) -> Result<Category, AppError> {
        let known = session_id
            .and_then(|id| self.browsing.get(id))
            .filter(|session| session.sync.category().slug == slug)
            .map(|session| session.sync.category().clone());

        match known {
            Some(category) => Ok(category),
            None => self.fetch_category(slug).await,
        }
    }

    async fn fetch_category(&self, slug: &str) -> Result<Category, AppError> {
        self.catalog
            .category(slug)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("category {slug}")))
    }

    /// Drops idle sessions, then the least recently seen ones until a new
    /// session `incoming` fits.
    fn evict_browsing_sessions(&self, incoming: &str) {
        let ttl = self.browsing_ttl;
        self.browsing.retain(|_, session| {
            let live = session.last_seen.elapsed() < ttl;
            if !live {
                session.sync.teardown();
            }
            live
        });

        if self.browsing.contains_key(incoming) {
            return;
        }
        while self.browsing.len() >= self.browsing_capacity {
            let oldest = self
                .browsing
                .iter()
                .min_by_key(|entry| entry.value().last_seen)
                .map(|entry| entry.key().clone());
            let Some(oldest) = oldest else {
                break;
            };
            if let Some((_, session)) = self.browsing.remove(&oldest) {
                tracing::debug!(session_id = %oldest, "Evicting browsing session");
                session.sync.teardown();
            }
        }
    }
}
