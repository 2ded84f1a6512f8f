//! Cart availability reconciliation.
//!
//! Periodically looks up live stock for every product in a cart and clamps
//! cart quantities down to what is available. Stock that cannot be
//! determined is treated as unavailable: a failed lookup empties the map,
//! and a product missing from a successful response counts as zero.
//!
//! One refresh cycle:
//!
//! ```text
//! Idle -> Fetching(1) -> Success        -> Idle
//!                     -> TransientError -> Backoff -> Fetching(n + 1)
//!                     -> TerminalError  -> Idle (empty map)
//! ```

use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    str::FromStr,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};
use tokio::{task::JoinHandle, time::MissedTickBehavior};

use super::{
    helpers::distinct_product_ids,
    models::CartLine,
    stock::{StockApi, StockLevel},
    store::CartStore,
};
use crate::{retry::RetryPolicy, token::RequestToken};

/// Default interval between availability refreshes.
pub const STOCK_REFRESH_INTERVAL: Duration = Duration::from_secs(30);

// =============================================================================
// Merchant Type
// =============================================================================

/// Tenant mode. Only inventory-managing merchants expose live stock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MerchantType {
    #[default]
    Catalog,
    Inventory,
}

impl MerchantType {
    pub const fn checks_availability(self) -> bool {
        matches!(self, Self::Inventory)
    }
}

impl FromStr for MerchantType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "catalog" => Ok(Self::Catalog),
            "inventory" => Ok(Self::Inventory),
            other => Err(format!("unknown merchant type: {other}")),
        }
    }
}

// =============================================================================
// Availability Map
// =============================================================================

/// Product id to available quantity.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(transparent)]
pub struct AvailabilityMap(BTreeMap<String, u32>);

impl AvailabilityMap {
    /// Builds the map for a lookup of `requested` ids.
    ///
    /// Every requested id starts at zero and is overwritten by the reported
    /// level; negative levels count as zero.
    pub fn from_levels(requested: &[String], levels: Vec<StockLevel>) -> Self {
        let mut map: BTreeMap<String, u32> =
            requested.iter().map(|id| (id.clone(), 0)).collect();
        for level in levels {
            let available = u32::try_from(level.total_rest.max(0)).unwrap_or(u32::MAX);
            map.insert(level.id, available);
        }
        Self(map)
    }

    /// Known availability of `id`.
    pub fn get(&self, id: &str) -> Option<u32> {
        self.0.get(id).copied()
    }

    /// Availability of `id`, with unknown products treated as unavailable.
    pub fn available(&self, id: &str) -> u32 {
        self.get(id).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

/// Quantity correction for one cart line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClampUpdate {
    pub id: String,
    pub variant_key: Option<String>,
    pub quantity: u32,
}

/// Lines whose quantity exceeds the mapped availability, with the clamped
/// quantity each should get. Lines of unmapped products are left alone.
pub fn clamp_updates(lines: &[CartLine], availability: &AvailabilityMap) -> Vec<ClampUpdate> {
    lines
        .iter()
        .filter_map(|line| {
            let available = availability.get(&line.id)?;
            (line.quantity > available).then(|| ClampUpdate {
                id: line.id.clone(),
                variant_key: line.variant_key.clone(),
                quantity: available,
            })
        })
        .collect()
}

// =============================================================================
// Reconciler
// =============================================================================

/// Result of one [`AvailabilityReconciler::refresh`] cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Merchant does not track stock; map forced empty, nothing fetched.
    Disabled,
    /// New map applied; `clamped` lines were reduced.
    Applied { clamped: usize },
    /// A newer cycle started or the reconciler was torn down first.
    Superseded,
}

#[derive(Debug, Default)]
struct ReconcileInner {
    availability: AvailabilityMap,
    token: Option<RequestToken>,
    torn_down: bool,
}

/// Keeps the quantities of one cart within live stock.
pub struct AvailabilityReconciler {
    stock: Arc<dyn StockApi>,
    store: Arc<dyn CartStore>,
    merchant_type: MerchantType,
    policy: RetryPolicy,
    inner: Mutex<ReconcileInner>,
}

impl AvailabilityReconciler {
    pub fn new(
        stock: Arc<dyn StockApi>,
        store: Arc<dyn CartStore>,
        merchant_type: MerchantType,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            stock,
            store,
            merchant_type,
            policy,
            inner: Mutex::new(ReconcileInner::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ReconcileInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Latest applied availability.
    pub fn availability(&self) -> AvailabilityMap {
        self.lock().availability.clone()
    }

    /// Runs one fetch-and-reconcile cycle.
    pub async fn refresh(&self) -> CycleOutcome {
        if !self.merchant_type.checks_availability() {
            self.lock().availability = AvailabilityMap::default();
            return CycleOutcome::Disabled;
        }

        let Some(token) = self.begin_cycle() else {
            return CycleOutcome::Superseded;
        };

        let ids = distinct_product_ids(&self.store.lines());
        let availability = if ids.is_empty() {
            AvailabilityMap::default()
        } else {
            self.fetch_availability(&ids).await
        };

        self.finish_cycle(&token, availability)
    }

    fn begin_cycle(&self) -> Option<RequestToken> {
        let mut inner = self.lock();
        if inner.torn_down {
            return None;
        }
        if let Some(previous) = inner.token.take() {
            previous.cancel();
        }
        let token = RequestToken::new();
        inner.token = Some(token.clone());
        Some(token)
    }

    async fn fetch_availability(&self, ids: &[String]) -> AvailabilityMap {
        let stock: &dyn StockApi = self.stock.as_ref();
        let result = self
            .policy
            .run(move |attempt| {
                tracing::debug!(attempt, products = ids.len(), "Looking up stock");
                stock.lookup(ids)
            })
            .await;

        match result {
            Ok(levels) => AvailabilityMap::from_levels(ids, levels),
            Err(e) => {
                tracing::warn!(error = %e, "Stock lookup failed, treating cart as unavailable");
                AvailabilityMap::default()
            }
        }
    }

    fn finish_cycle(&self, token: &RequestToken, availability: AvailabilityMap) -> CycleOutcome {
        {
            let mut inner = self.lock();
            if !token.is_current(inner.token.as_ref()) {
                tracing::debug!("Discarding superseded stock lookup");
                return CycleOutcome::Superseded;
            }
            inner.token = None;
            if inner.availability != availability {
                tracing::debug!(products = availability.len(), "Availability changed");
            }
            inner.availability = availability.clone();
        }

        CycleOutcome::Applied {
            clamped: self.clamp_to(&availability),
        }
    }

    /// Clamps the cart against `availability`; returns how many lines were
    /// actually reduced.
    fn clamp_to(&self, availability: &AvailabilityMap) -> usize {
        let mut clamped = 0;
        for update in clamp_updates(&self.store.lines(), availability) {
            let reduced = self.store.clamp_cart_item(
                &update.id,
                update.quantity,
                update.variant_key.as_deref(),
            );
            if reduced {
                tracing::info!(
                    product_id = %update.id,
                    variant_key = ?update.variant_key,
                    quantity = update.quantity,
                    "Clamping cart quantity to available stock"
                );
                clamped += 1;
            }
        }
        clamped
    }

    /// Clamps the cart as it is now against the last applied availability.
    pub fn reconcile(&self) -> usize {
        let availability = {
            let inner = self.lock();
            if inner.torn_down {
                return 0;
            }
            inner.availability.clone()
        };
        self.clamp_to(&availability)
    }

    /// Cart contents changed: clamp against what is already known, then start
    /// a new cycle for the new contents, superseding any lookup in flight.
    pub fn cart_changed(self: &Arc<Self>) {
        self.reconcile();
        let reconciler = Arc::clone(self);
        tokio::spawn(async move {
            let outcome = reconciler.refresh().await;
            tracing::debug!(?outcome, "Availability refreshed after cart change");
        });
    }

    /// Stops applying results: cancels the in-flight cycle and refuses new ones.
    pub fn teardown(&self) {
        let mut inner = self.lock();
        inner.torn_down = true;
        if let Some(token) = inner.token.take() {
            token.cancel();
        }
    }

    /// Starts refreshing immediately and then every `every`, until the
    /// returned handle is dropped.
    pub fn mount(self: Arc<Self>, every: Duration) -> ReconcilerHandle {
        let reconciler = Arc::clone(&self);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                reconciler.refresh().await;
            }
        });

        ReconcilerHandle {
            reconciler: self,
            task,
        }
    }
}

/// Mounted reconciler. Dropping it stops the interval, aborts any in-flight
/// lookup and discards its result.
pub struct ReconcilerHandle {
    reconciler: Arc<AvailabilityReconciler>,
    task: JoinHandle<()>,
}

impl ReconcilerHandle {
    pub fn reconciler(&self) -> &Arc<AvailabilityReconciler> {
        &self.reconciler
    }

    pub fn unmount(self) {
        drop(self);
    }
}

impl Drop for ReconcilerHandle {
    fn drop(&mut self) {
        self.task.abort();
        self.reconciler.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cart::{stock::StockError, store::CartHandle};
    use async_trait::async_trait;
    use dashmap::DashMap;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Clone, Copy)]
    enum Failure {
        Unavailable,
        Offline,
    }

    /// Stock service returning fixed levels, optionally failing every call.
    #[derive(Default)]
    struct FakeStock {
        levels: Vec<StockLevel>,
        error: Option<Failure>,
        delay: Option<Duration>,
        calls: AtomicU32,
    }

    #[async_trait]
    impl StockApi for FakeStock {
        async fn lookup(&self, _ids: &[String]) -> Result<Vec<StockLevel>, StockError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            match self.error {
                Some(Failure::Unavailable) => Err(StockError::Status(503)),
                Some(Failure::Offline) => Err(StockError::Offline),
                None => Ok(self.levels.clone()),
            }
        }
    }

    /// Cart store recording every quantity update it receives.
    struct RecordingStore {
        inner: CartHandle,
        updates: Mutex<Vec<(String, u32, Option<String>)>>,
    }

    impl CartStore for RecordingStore {
        fn lines(&self) -> Vec<CartLine> {
            self.inner.lines()
        }

        fn update_cart_item(&self, id: &str, quantity: u32, variant_key: Option<&str>) {
            self.inner.update_cart_item(id, quantity, variant_key);
        }

        fn clamp_cart_item(&self, id: &str, max: u32, variant_key: Option<&str>) -> bool {
            self.updates
                .lock()
                .unwrap()
                .push((id.to_string(), max, variant_key.map(Into::into)));
            self.inner.clamp_cart_item(id, max, variant_key)
        }

        fn remove_from_cart(&self, id: &str, variant_key: Option<&str>) {
            self.inner.remove_from_cart(id, variant_key);
        }
    }

    /// Store whose reads return a snapshot taken before a user edit.
    struct StaleReadStore {
        inner: CartHandle,
        snapshot: Vec<CartLine>,
    }

    impl CartStore for StaleReadStore {
        fn lines(&self) -> Vec<CartLine> {
            self.snapshot.clone()
        }

        fn update_cart_item(&self, id: &str, quantity: u32, variant_key: Option<&str>) {
            self.inner.update_cart_item(id, quantity, variant_key);
        }

        fn clamp_cart_item(&self, id: &str, max: u32, variant_key: Option<&str>) -> bool {
            self.inner.clamp_cart_item(id, max, variant_key)
        }

        fn remove_from_cart(&self, id: &str, variant_key: Option<&str>) {
            self.inner.remove_from_cart(id, variant_key);
        }
    }

    fn line(id: &str, variant: Option<&str>, quantity: u32) -> CartLine {
        CartLine {
            id: id.into(),
            variant_key: variant.map(Into::into),
            name: id.into(),
            unit_price: 10.0,
            original_price: None,
            quantity,
            image: None,
        }
    }

    fn level(id: &str, total_rest: i64) -> StockLevel {
        StockLevel {
            id: id.into(),
            total_rest,
        }
    }

    fn store(lines: Vec<CartLine>) -> Arc<RecordingStore> {
        let carts = Arc::new(DashMap::new());
        carts.insert("c1".to_string(), lines);
        Arc::new(RecordingStore {
            inner: CartHandle::new(carts, "c1"),
            updates: Mutex::new(Vec::new()),
        })
    }

    fn reconciler(
        stock: Arc<FakeStock>,
        store: Arc<RecordingStore>,
        merchant_type: MerchantType,
    ) -> AvailabilityReconciler {
        AvailabilityReconciler::new(stock, store, merchant_type, RetryPolicy::stock_lookup())
    }

    #[test]
    fn test_missing_ids_default_to_zero() {
        let requested = vec!["p1".to_string(), "p2".to_string()];
        let map = AvailabilityMap::from_levels(&requested, vec![level("p1", 4)]);

        assert_eq!(map.get("p1"), Some(4));
        assert_eq!(map.get("p2"), Some(0));
        assert_eq!(map.available("p3"), 0);
    }

    #[test]
    fn test_negative_levels_count_as_zero() {
        let map = AvailabilityMap::from_levels(&["p1".to_string()], vec![level("p1", -3)]);
        assert_eq!(map.get("p1"), Some(0));
    }

    #[test]
    fn test_clamp_updates_only_reduce() {
        let lines = vec![
            line("p1", Some("red"), 5),
            line("p2", None, 1),
            line("p3", None, 9),
        ];
        let map = AvailabilityMap::from_levels(
            &["p1".to_string(), "p2".to_string()],
            vec![level("p1", 2), level("p2", 10)],
        );

        let updates = clamp_updates(&lines, &map);
        assert_eq!(
            updates,
            vec![ClampUpdate {
                id: "p1".into(),
                variant_key: Some("red".into()),
                quantity: 2,
            }]
        );
    }

    #[test]
    fn test_merchant_type_parsing() {
        assert_eq!("Inventory".parse(), Ok(MerchantType::Inventory));
        assert_eq!("catalog".parse(), Ok(MerchantType::Catalog));
        assert!("wholesale".parse::<MerchantType>().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_clamps_exactly_once() {
        let stock = Arc::new(FakeStock {
            levels: vec![level("p1", 2)],
            ..Default::default()
        });
        let store = store(vec![line("p1", Some("red"), 5), line("p2", None, 1)]);
        let reconciler = reconciler(stock.clone(), store.clone(), MerchantType::Inventory);

        assert_eq!(reconciler.refresh().await, CycleOutcome::Applied { clamped: 2 });
        assert_eq!(reconciler.refresh().await, CycleOutcome::Applied { clamped: 0 });

        let updates = store.updates.lock().unwrap().clone();
        assert_eq!(
            updates,
            vec![
                ("p1".to_string(), 2, Some("red".to_string())),
                // Missing from the response: zero, but the line stays.
                ("p2".to_string(), 0, None),
            ]
        );
        assert_eq!(store.lines().len(), 2);
        assert_eq!(stock.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clamp_does_not_undo_concurrent_decrease() {
        let stock = Arc::new(FakeStock {
            levels: vec![level("p1", 2)],
            ..Default::default()
        });
        let carts = Arc::new(DashMap::new());
        // The user already lowered the line to 1; the read still sees 5.
        carts.insert("c1".to_string(), vec![line("p1", None, 1)]);
        let handle = CartHandle::new(carts, "c1");
        let store = Arc::new(StaleReadStore {
            inner: handle.clone(),
            snapshot: vec![line("p1", None, 5)],
        });
        let reconciler = AvailabilityReconciler::new(
            stock,
            store,
            MerchantType::Inventory,
            RetryPolicy::stock_lookup(),
        );

        assert_eq!(reconciler.refresh().await, CycleOutcome::Applied { clamped: 0 });
        assert_eq!(handle.lines()[0].quantity, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cart_change_clamps_now_and_looks_up_again() {
        let stock = Arc::new(FakeStock {
            levels: vec![level("p1", 2)],
            ..Default::default()
        });
        let carts = Arc::new(DashMap::new());
        carts.insert("c1".to_string(), vec![line("p1", None, 1)]);
        let store = Arc::new(RecordingStore {
            inner: CartHandle::new(Arc::clone(&carts), "c1"),
            updates: Mutex::new(Vec::new()),
        });
        let reconciler = Arc::new(reconciler(stock.clone(), store.clone(), MerchantType::Inventory));
        reconciler.refresh().await;

        carts.insert(
            "c1".to_string(),
            vec![line("p1", None, 9), line("p2", None, 3)],
        );
        reconciler.cart_changed();

        // Known product is clamped before any new lookup completes.
        assert_eq!(store.lines()[0].quantity, 2);
        assert_eq!(store.lines()[1].quantity, 3);

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(stock.calls.load(Ordering::SeqCst), 2);
        assert_eq!(reconciler.availability().get("p2"), Some(0));
        assert_eq!(store.lines()[1].quantity, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_merchant_makes_no_calls() {
        let stock = Arc::new(FakeStock::default());
        let store = store(vec![line("p1", None, 5)]);
        let reconciler = reconciler(stock.clone(), store.clone(), MerchantType::Catalog);

        assert_eq!(reconciler.refresh().await, CycleOutcome::Disabled);
        assert!(reconciler.availability().is_empty());
        assert_eq!(stock.calls.load(Ordering::SeqCst), 0);
        assert!(store.updates.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminal_failure_empties_map_without_clamping() {
        let stock = Arc::new(FakeStock {
            levels: vec![level("p1", 3)],
            ..Default::default()
        });
        let store = store(vec![line("p1", None, 2)]);
        let reconciler = reconciler(stock, store.clone(), MerchantType::Inventory);
        reconciler.refresh().await;
        assert_eq!(reconciler.availability().get("p1"), Some(3));

        let failing = Arc::new(FakeStock {
            error: Some(Failure::Unavailable),
            ..Default::default()
        });
        let reconciler = AvailabilityReconciler {
            stock: failing.clone(),
            ..reconciler
        };

        assert_eq!(reconciler.refresh().await, CycleOutcome::Applied { clamped: 0 });
        assert!(reconciler.availability().is_empty());
        assert_eq!(failing.calls.load(Ordering::SeqCst), 3);
        assert_eq!(store.lines()[0].quantity, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_offline_gives_up_after_first_attempt() {
        let stock = Arc::new(FakeStock {
            error: Some(Failure::Offline),
            ..Default::default()
        });
        let store = store(vec![line("p1", None, 2)]);
        let reconciler = reconciler(stock.clone(), store, MerchantType::Inventory);

        reconciler.refresh().await;
        assert_eq!(stock.calls.load(Ordering::SeqCst), 1);
        assert!(reconciler.availability().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_teardown_discards_in_flight_lookup() {
        let stock = Arc::new(FakeStock {
            levels: vec![level("p1", 0)],
            delay: Some(Duration::from_secs(1)),
            ..Default::default()
        });
        let store = store(vec![line("p1", None, 2)]);
        let reconciler = reconciler(stock, store.clone(), MerchantType::Inventory);

        let (outcome, ()) = tokio::join!(reconciler.refresh(), async {
            tokio::task::yield_now().await;
            reconciler.teardown();
        });

        assert_eq!(outcome, CycleOutcome::Superseded);
        assert_eq!(store.lines()[0].quantity, 2);
        assert_eq!(reconciler.refresh().await, CycleOutcome::Superseded);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mount_refreshes_periodically_until_dropped() {
        let stock = Arc::new(FakeStock {
            levels: vec![level("p1", 1)],
            ..Default::default()
        });
        let store = store(vec![line("p1", None, 1)]);
        let reconciler = Arc::new(reconciler(stock.clone(), store, MerchantType::Inventory));

        let handle = Arc::clone(&reconciler).mount(STOCK_REFRESH_INTERVAL);
        // Ticks at 0s, 30s and 60s.
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(stock.calls.load(Ordering::SeqCst), 3);
        assert_eq!(handle.reconciler().availability().get("p1"), Some(1));

        handle.unmount();
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(stock.calls.load(Ordering::SeqCst), 3);
    }
}
