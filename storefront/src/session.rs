use std::{
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use storefront_core::{
    proto::{OrderId, PaymentDetails},
    Cart, CartError, CartService, CartStore, Checkout, CheckoutError, DispatchStats, Dispatcher, OrderService, OrderStore, PaymentService,
    SnapshotReport,
};
use storefront_http_client::HttpClient;
use storefront_websocket_client::{ChannelError, ChannelSubscription, ConnectionState, Endpoint, SyncChannel};
use tokio::{
    select,
    sync::watch,
    task::JoinHandle,
    time::{interval, Interval, MissedTickBehavior},
};
use tracing::{debug, info, warn};

use crate::config::SessionConfig;

/// One client session: the shared stores plus the channels and tasks that keep them current
pub struct Session {
    config: SessionConfig,
    orders: OrderStore,
    cart: CartStore,
    checkout: Checkout,
    order_service: Arc<dyn OrderService>,
    dispatcher: Dispatcher,
    subscription: Mutex<Option<ChannelSubscription>>,
    channel: Arc<SyncChannel>,
    stop: watch::Sender<bool>,
    resync_task: Mutex<Option<JoinHandle<()>>>,
}

impl Session {
    /// Start a session against the REST services described by `config`
    pub async fn connect(config: SessionConfig) -> anyhow::Result<Self> {
        let api = Arc::new(HttpClient::new(&config.api)?);
        Self::start(config, api).await
    }

    /// Start a session with any implementation of the service boundaries
    pub async fn start<A>(config: SessionConfig, api: Arc<A>) -> anyhow::Result<Self>
    where A: CartService + OrderService + PaymentService + 'static {
        info!("Starting storefront session (api: {}, push: {})", config.api.base_url, config.ws_base);
        let orders = OrderStore::new();
        let cart_service: Arc<dyn CartService> = api.clone();
        let order_service: Arc<dyn OrderService> = api.clone();
        let payments: Arc<dyn PaymentService> = api;
        let cart = CartStore::new(cart_service);
        let checkout = Checkout::new(cart.clone(), orders.clone(), payments, order_service.clone());

        let channel = Arc::new(SyncChannel::open(Endpoint::all_orders(&config.ws_base)?, config.channel.clone())?);
        let dispatcher = Dispatcher::new(orders.clone());
        let subscription = channel.subscribe(Arc::new(dispatcher.clone()))?;

        let (stop, stop_rx) = watch::channel(false);
        let resync_task = tokio::spawn(run_resync(orders.clone(), order_service.clone(), channel.clone(), config.resync_interval, stop_rx));

        Ok(Self {
            config,
            orders,
            cart,
            checkout,
            order_service,
            dispatcher,
            subscription: Mutex::new(Some(subscription)),
            channel,
            stop,
            resync_task: Mutex::new(Some(resync_task)),
        })
    }

    pub fn orders(&self) -> &OrderStore { &self.orders }

    pub fn cart(&self) -> &CartStore { &self.cart }

    pub fn channel_state(&self) -> watch::Receiver<ConnectionState> { self.channel.state() }

    pub async fn wait_open(&self) -> Result<(), ChannelError> { self.channel.wait_open().await }

    pub fn dispatch_stats(&self) -> DispatchStats { self.dispatcher.stats() }

    /// Fetch and merge a fresh order snapshot now
    pub async fn refresh_orders(&self) -> Option<SnapshotReport> { resync(&self.orders, self.order_service.as_ref(), "requested").await }

    /// Load the cart from the cart service
    pub async fn load_cart(&self) -> Result<Arc<Cart>, CartError> { self.cart.refresh().await }

    pub async fn checkout(&self, details: &PaymentDetails) -> Result<OrderId, CheckoutError> { self.checkout.run(details).await }

    /// Follow a single order on its own channel. Dropping the watch (or closing it) ends it.
    pub fn watch_order(&self, id: &OrderId) -> Result<OrderWatch, ChannelError> {
        let channel = SyncChannel::open(Endpoint::order(&self.config.ws_base, id)?, self.config.channel.clone())?;
        let dispatcher = Dispatcher::scoped(self.orders.clone(), id.clone());
        let subscription = channel.subscribe(Arc::new(dispatcher.clone()))?;
        info!("Watching order {} on {}", id, channel.url());
        Ok(OrderWatch { subscription: Some(subscription), dispatcher, channel })
    }

    /// Stop background work. In-flight snapshot requests are discarded when they land.
    pub async fn shutdown(self) {
        info!("Shutting down storefront session");
        self.orders.cancel_fetches();
        self.stop.send_replace(true);

        let task = self.resync_task.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!("Resync task join error during shutdown: {}", e);
            }
        }
        self.subscription.lock().unwrap_or_else(PoisonError::into_inner).take();
        self.channel.close().await;
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(task) = self.resync_task.lock().unwrap_or_else(PoisonError::into_inner).take() {
            debug!("Session dropped, stopping resync task");
            self.orders.cancel_fetches();
            task.abort();
        }
    }
}

/// A per-order channel and its scoped dispatcher
pub struct OrderWatch {
    // released before the channel shuts down
    subscription: Option<ChannelSubscription>,
    dispatcher: Dispatcher,
    channel: SyncChannel,
}

impl OrderWatch {
    pub fn channel(&self) -> &SyncChannel { &self.channel }

    pub fn dispatch_stats(&self) -> DispatchStats { self.dispatcher.stats() }

    pub async fn close(mut self) {
        self.subscription.take();
        self.channel.close().await;
    }
}

async fn run_resync(
    orders: OrderStore,
    service: Arc<dyn OrderService>,
    channel: Arc<SyncChannel>,
    every: Option<Duration>,
    mut stop: watch::Receiver<bool>,
) {
    let mut state = channel.state();
    let mut ticker = every.map(|period| {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    });
    if let Some(ticker) = ticker.as_mut() {
        ticker.tick().await;
    }
    let mut seen_opens = 0;

    select! {
        _ = stopped(&mut stop) => return,
        _ = resync(&orders, service.as_ref(), "initial load") => {}
    }

    loop {
        let reason = select! {
            _ = stopped(&mut stop) => break,
            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
                let open = matches!(*state.borrow_and_update(), ConnectionState::Open { .. });
                let opens = channel.opened_count();
                if !open || opens == seen_opens {
                    continue;
                }
                seen_opens = opens;
                // anything pushed before this connection was established may have been missed
                if opens > 1 { "reconnect" } else { "connect" }
            }
            _ = tick(&mut ticker) => "interval",
        };

        select! {
            _ = stopped(&mut stop) => break,
            _ = resync(&orders, service.as_ref(), reason) => {}
        }
    }
    debug!("Resync task stopped");
}

async fn resync(orders: &OrderStore, service: &dyn OrderService, reason: &str) -> Option<SnapshotReport> {
    let fetch = orders.begin_fetch();
    debug!("Fetching order snapshot ({})", reason);
    match service.fetch_orders().await {
        Ok(records) => fetch.complete(records),
        Err(e) => {
            warn!("Order snapshot fetch ({}) failed: {}", reason, e);
            None
        }
    }
}

async fn tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn stopped(stop: &mut watch::Receiver<bool>) { let _ = stop.wait_for(|stop| *stop).await; }
