//! `StreamSubscriber` — owns the logs feed connection and its lifecycle.
//!
//! # State machine
//! ```text
//! Disconnected ──connect──▶ Connecting ──open──▶ Open ──close──▶ Disconnected
//!      ▲                        │                  │                 │
//!      │                   connect error      shutdown signal        │
//!      │                        │                  ▼                 │
//!      │                        │               Closing ──▶ Disconnected (exit 0)
//!      └──── wait backoff ◀─────┴────────────────────────────────────┘
//!                 │
//!          budget exhausted ──▶ Err(ReconnectBudgetExhausted) (exit 1)
//! ```
//!
//! Entering `Open` resets the reconnect budget, sends `logsSubscribe` and
//! starts the heartbeat. Any close drops the subscription handle and stops
//! the heartbeat. Connection, subscription and budget live only in this
//! struct; fetch tasks get nothing but a signature.

use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::watch;
use tokio::time::{self, Instant};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use chainwatch_core::config::{ReconnectConfig, SubscriptionConfig};
use chainwatch_core::error::SubscriberError;
use chainwatch_core::handler::{TransactionAnalyzer, TransactionFetcher};
use chainwatch_core::policy::Backoff;
use chainwatch_core::request::JsonRpcRequest;

use crate::filter::RelevanceFilter;
use crate::protocol::{classify, Inbound, LogsNotification};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Open,
    Closing,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Open => write!(f, "open"),
            Self::Closing => write!(f, "closing"),
        }
    }
}

/// The live `logsSubscribe` subscription on the current connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    /// Handle assigned by the node in its ack.
    pub handle: u64,
    /// The `mentions` filter it was opened with.
    pub address: String,
}

/// How one connection ended.
enum Exit {
    Closed,
    Shutdown,
}

pub struct StreamSubscriber {
    url: String,
    watch_address: String,
    heartbeat_interval: Duration,
    filter: RelevanceFilter,
    fetcher: Arc<dyn TransactionFetcher>,
    analyzer: Arc<dyn TransactionAnalyzer>,
    reconnect: Backoff,
    subscription: Option<Subscription>,
    state: watch::Sender<ConnectionState>,
}

impl StreamSubscriber {
    pub fn new(
        url: impl Into<String>,
        subscription: &SubscriptionConfig,
        reconnect: &ReconnectConfig,
        fetcher: Arc<dyn TransactionFetcher>,
        analyzer: Arc<dyn TransactionAnalyzer>,
    ) -> Result<Self, SubscriberError> {
        let url = url.into();
        if !(url.starts_with("ws://") || url.starts_with("wss://")) {
            return Err(SubscriberError::InvalidUrl {
                reason: "expected a ws:// or wss:// scheme".into(),
                url: redact(&url).to_string(),
            });
        }
        let (state, _) = watch::channel(ConnectionState::Disconnected);

        Ok(Self {
            url,
            watch_address: subscription.watch_address.clone(),
            heartbeat_interval: subscription.heartbeat_interval,
            filter: RelevanceFilter::from_config(subscription),
            fetcher,
            analyzer,
            reconnect: Backoff::new(reconnect.retry.clone()),
            subscription: None,
            state,
        })
    }

    /// Observe lifecycle transitions.
    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn subscription(&self) -> Option<&Subscription> {
        self.subscription.as_ref()
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect.attempts()
    }

    /// Connect, subscribe and process notifications until `shutdown` turns
    /// `true` (returns `Ok`) or the reconnect budget runs out (returns
    /// `Err`). Transport failures never escape; they feed the reconnect
    /// policy.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<(), SubscriberError> {
        tracing::info!(
            address = %self.watch_address,
            relevance = ?self.filter.policy(),
            "starting log subscription"
        );

        loop {
            if *shutdown.borrow() {
                self.set_state(ConnectionState::Disconnected);
                return Ok(());
            }

            self.set_state(ConnectionState::Connecting);
            tracing::info!(url = %redact(&self.url), attempt = self.reconnect.attempts(), "connecting via WebSocket");

            let conn = tokio::select! {
                conn = connect_async(self.url.as_str()) => conn,
                _ = shutdown_requested(&mut shutdown) => {
                    self.set_state(ConnectionState::Disconnected);
                    return Ok(());
                }
            };

            match conn {
                Ok((ws, _)) => {
                    let (sink, stream) = ws.split();
                    if let Exit::Shutdown = self.drive(sink, stream, &mut shutdown).await {
                        return Ok(());
                    }
                }
                Err(e) => tracing::warn!(error = %e, "WS connect failed"),
            }

            let delay = self.on_close()?;
            tokio::select! {
                _ = time::sleep(delay) => {}
                _ = shutdown_requested(&mut shutdown) => return Ok(()),
            }
        }
    }

    /// Serve one open connection until it closes or shutdown is requested.
    /// The heartbeat lives only as long as this call.
    async fn drive<Si, St, E>(
        &mut self,
        mut sink: Si,
        mut stream: St,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Exit
    where
        Si: Sink<Message> + Unpin,
        Si::Error: Display,
        St: Stream<Item = Result<Message, E>> + Unpin,
        E: Display,
    {
        self.on_open();

        let subscribe = JsonRpcRequest::logs_subscribe(&self.watch_address);
        if let Err(e) = send_request(&mut sink, &subscribe).await {
            tracing::warn!(error = %e, "failed to send logsSubscribe");
            return Exit::Closed;
        }

        let period = self.heartbeat_interval;
        let mut heartbeat = time::interval_at(Instant::now() + period, period);

        loop {
            tokio::select! {
                msg = stream.next() => match msg {
                    None => {
                        tracing::warn!("WS stream ended");
                        return Exit::Closed;
                    }
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "WS receive error");
                        return Exit::Closed;
                    }
                    Some(Ok(Message::Text(text))) => self.handle_text(text.as_str()),
                    Some(Ok(Message::Ping(data))) => {
                        if let Err(e) = sink.send(Message::Pong(data)).await {
                            tracing::debug!(error = %e, "failed to answer ping");
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        tracing::info!(?frame, "WS closed by server");
                        return Exit::Closed;
                    }
                    Some(Ok(_)) => {}
                },
                _ = heartbeat.tick() => {
                    tracing::info!(
                        subscription = ?self.subscription.as_ref().map(|s| s.handle),
                        "heartbeat: log stream alive"
                    );
                }
                _ = shutdown_requested(shutdown) => {
                    self.shutdown(&mut sink).await;
                    return Exit::Shutdown;
                }
            }
        }
    }

    /// Transport open: fresh budget, then subscribe.
    fn on_open(&mut self) {
        self.reconnect.reset();
        self.set_state(ConnectionState::Open);
        tracing::info!(url = %redact(&self.url), "WebSocket connected");
    }

    /// Transport closed for any reason. Returns the delay before the next
    /// connect, or the terminal error once the budget is spent.
    fn on_close(&mut self) -> Result<Duration, SubscriberError> {
        self.subscription = None;
        self.set_state(ConnectionState::Disconnected);

        match self.reconnect.next_delay() {
            Some(delay) => {
                tracing::warn!(
                    attempt = self.reconnect.attempts(),
                    delay_ms = delay.as_millis() as u64,
                    "WS disconnected, reconnecting in {delay:?}"
                );
                Ok(delay)
            }
            None => {
                let attempts = self.reconnect.attempts();
                tracing::error!(attempts, "reconnect budget exhausted, giving up");
                Err(SubscriberError::ReconnectBudgetExhausted { attempts })
            }
        }
    }

    /// Unsubscribe if subscribed, then close. Never schedules a reconnect.
    async fn shutdown<S>(&mut self, sink: &mut S)
    where
        S: Sink<Message> + Unpin,
        S::Error: Display,
    {
        self.set_state(ConnectionState::Closing);

        if let Some(sub) = self.subscription.take() {
            let req = JsonRpcRequest::logs_unsubscribe(sub.handle);
            match send_request(sink, &req).await {
                Ok(()) => tracing::info!(handle = sub.handle, "sent logsUnsubscribe"),
                Err(e) => tracing::warn!(handle = sub.handle, error = %e, "failed to send logsUnsubscribe"),
            }
        }
        if let Err(e) = sink.close().await {
            tracing::debug!(error = %e, "WS close failed");
        }

        self.set_state(ConnectionState::Disconnected);
    }

    fn handle_text(&mut self, text: &str) {
        match classify(text) {
            Err(e) => tracing::warn!(error = %e, "dropping malformed WS message"),
            Ok(Inbound::SubscribeAck { handle }) => {
                if let Some(existing) = &self.subscription {
                    tracing::warn!(existing = existing.handle, handle, "duplicate subscribe ack ignored");
                    return;
                }
                tracing::info!(handle, address = %self.watch_address, "subscribed to logs");
                self.subscription = Some(Subscription {
                    handle,
                    address: self.watch_address.clone(),
                });
            }
            Ok(Inbound::Notification(notification)) => self.dispatch(notification),
            Ok(Inbound::Error { id, error }) => {
                tracing::warn!(?id, code = error.code, message = %error.message, "node returned an error");
            }
            Ok(Inbound::Other) => tracing::trace!("ignoring WS message"),
        }
    }

    /// Spawn enrichment for a relevant notification. Tasks are independent:
    /// no ordering between completions, no cancellation.
    fn dispatch(&self, notification: LogsNotification) {
        if !self.filter.is_relevant(&notification) {
            tracing::trace!(signature = %notification.signature(), "notification not relevant");
            return;
        }

        let signature = notification.signature().to_string();
        tracing::info!(%signature, slot = ?notification.slot(), "relevant activity, fetching details");

        let fetcher = Arc::clone(&self.fetcher);
        let analyzer = Arc::clone(&self.analyzer);
        tokio::spawn(async move {
            if let Some(record) = fetcher.fetch(&signature).await {
                analyzer.analyze(record);
            }
        });
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            tracing::debug!(from = %previous, to = %state, "connection state");
        }
    }
}

async fn send_request<S>(sink: &mut S, req: &JsonRpcRequest) -> Result<(), String>
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    let msg = serde_json::to_string(req).map_err(|e| e.to_string())?;
    sink.send(Message::Text(msg.into())).await.map_err(|e| e.to_string())
}

/// Resolves once the flag is `true`. A dropped sender never resolves.
async fn shutdown_requested(rx: &mut watch::Receiver<bool>) {
    while !*rx.borrow_and_update() {
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// The URL without its query string, which carries the API key.
fn redact(url: &str) -> &str {
    url.split_once('?').map_or(url, |(base, _)| base)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chainwatch_core::policy::RetryConfig;
    use chainwatch_core::record::TransactionRecord;
    use tokio::sync::mpsc;

    const WATCHED: &str = "Watched1111111111111111111111111111111111111";

    struct Echo {
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl TransactionFetcher for Echo {
        async fn fetch(&self, signature: &str) -> Option<TransactionRecord> {
            self.seen.lock().unwrap().push(signature.to_string());
            Some(TransactionRecord::new(signature, 1))
        }
    }

    fn subscriber(max_retries: u32) -> (StreamSubscriber, Arc<Echo>, mpsc::UnboundedReceiver<TransactionRecord>) {
        let echo = Arc::new(Echo { seen: Mutex::new(Vec::new()) });
        let (tx, rx) = mpsc::unbounded_channel();
        let analyzer = move |record: TransactionRecord| {
            let _ = tx.send(record);
        };
        let subscription = SubscriptionConfig {
            watch_address: WATCHED.into(),
            ..SubscriptionConfig::default()
        };
        let reconnect = ReconnectConfig {
            retry: RetryConfig {
                max_retries,
                ..RetryConfig::default()
            },
        };
        let sub = StreamSubscriber::new(
            "ws://127.0.0.1:1",
            &subscription,
            &reconnect,
            echo.clone(),
            Arc::new(analyzer),
        )
        .unwrap();
        (sub, echo, rx)
    }

    fn notification(signature: &str, line: &str) -> String {
        serde_json::json!({
            "jsonrpc": "2.0",
            "method": "logsNotification",
            "params": {
                "result": {"context": {"slot": 1}, "value": {"signature": signature, "err": null, "logs": [line]}},
                "subscription": 7
            }
        })
        .to_string()
    }

    #[test]
    fn rejects_non_ws_url() {
        let echo = Arc::new(Echo { seen: Mutex::new(Vec::new()) });
        let err = StreamSubscriber::new(
            "https://mainnet.helius-rpc.com/?api-key=secret",
            &SubscriptionConfig::default(),
            &ReconnectConfig::default(),
            echo,
            Arc::new(|_: TransactionRecord| {}),
        )
        .err()
        .unwrap();
        let SubscriberError::InvalidUrl { url, .. } = err else {
            panic!("expected InvalidUrl");
        };
        assert!(!url.contains("secret"));
    }

    #[test]
    fn close_schedules_growing_delays_until_budget_is_spent() {
        let (mut sub, _, _) = subscriber(3);
        let delays: Vec<u128> = (0..3).map(|_| sub.on_close().unwrap().as_millis()).collect();
        assert_eq!(delays, vec![1_000, 1_500, 2_250]);
        assert!(matches!(
            sub.on_close(),
            Err(SubscriberError::ReconnectBudgetExhausted { attempts: 3 })
        ));
    }

    #[test]
    fn open_resets_reconnect_budget() {
        let (mut sub, _, _) = subscriber(10);
        sub.on_close().unwrap();
        sub.on_close().unwrap();
        sub.on_close().unwrap();
        assert_eq!(sub.reconnect_attempts(), 3);

        sub.on_open();
        assert_eq!(sub.reconnect_attempts(), 0);
        assert_eq!(sub.connection_state(), ConnectionState::Open);
        assert_eq!(sub.on_close().unwrap(), Duration::from_millis(1_000));
    }

    #[test]
    fn ack_stores_handle_and_close_clears_it() {
        let (mut sub, _, _) = subscriber(10);
        sub.handle_text(r#"{"jsonrpc":"2.0","result":42,"id":1}"#);
        assert_eq!(
            sub.subscription(),
            Some(&Subscription { handle: 42, address: WATCHED.into() })
        );

        sub.handle_text(r#"{"jsonrpc":"2.0","result":43,"id":1}"#);
        assert_eq!(sub.subscription().map(|s| s.handle), Some(42));

        sub.on_close().unwrap();
        assert!(sub.subscription().is_none());
        assert_eq!(sub.connection_state(), ConnectionState::Disconnected);
    }

    #[test]
    fn malformed_and_error_messages_are_survivable() {
        let (mut sub, _, _) = subscriber(10);
        sub.handle_text("not json at all");
        sub.handle_text(r#"{"jsonrpc":"2.0","error":{"code":-32600,"message":"Invalid request"},"id":1}"#);
        assert!(sub.subscription().is_none());
    }

    #[tokio::test]
    async fn relevant_notification_is_enriched_and_analyzed() {
        let (mut sub, echo, mut analyzed) = subscriber(10);
        sub.handle_text(&notification("irrelevant", "Program log: Instruction: Transfer"));
        sub.handle_text(&notification("relevant", &format!("Program {WATCHED} invoke [1]")));

        let record = time::timeout(Duration::from_secs(1), analyzed.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.signature, "relevant");
        tokio::task::yield_now().await;
        assert_eq!(*echo.seen.lock().unwrap(), vec!["relevant".to_string()]);
    }

    #[tokio::test]
    async fn shutdown_sends_one_unsubscribe_then_closes() {
        let (mut sub, _, _) = subscriber(10);
        sub.handle_text(r#"{"jsonrpc":"2.0","result":42,"id":1}"#);

        let (mut sink, mut sent) = futures::channel::mpsc::unbounded::<Message>();
        sub.shutdown(&mut sink).await;

        let Some(Message::Text(text)) = sent.next().await else {
            panic!("expected unsubscribe");
        };
        let v: serde_json::Value = serde_json::from_str(text.as_str()).unwrap();
        assert_eq!(v["method"], "logsUnsubscribe");
        assert_eq!(v["id"], 999);
        assert_eq!(v["params"], serde_json::json!([42]));
        assert!(sent.next().await.is_none(), "sink closed after unsubscribe");

        assert!(sub.subscription().is_none());
        assert_eq!(sub.reconnect_attempts(), 0);
        assert_eq!(sub.connection_state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn shutdown_without_subscription_just_closes() {
        let (mut sub, _, _) = subscriber(10);
        let (mut sink, mut sent) = futures::channel::mpsc::unbounded::<Message>();
        sub.shutdown(&mut sink).await;
        assert!(sent.next().await.is_none());
    }

    /// Counts heartbeat events emitted under the installed subscriber.
    #[derive(Clone, Default)]
    struct HeartbeatCounter(Arc<std::sync::atomic::AtomicUsize>);

    impl HeartbeatCounter {
        fn count(&self) -> usize {
            self.0.load(std::sync::atomic::Ordering::SeqCst)
        }
    }

    impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for HeartbeatCounter {
        fn on_event(&self, event: &tracing::Event<'_>, _: tracing_subscriber::layer::Context<'_, S>) {
            struct IsHeartbeat(bool);
            impl tracing::field::Visit for IsHeartbeat {
                fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
                    if field.name() == "message" && format!("{value:?}").starts_with("heartbeat") {
                        self.0 = true;
                    }
                }
            }

            let mut visitor = IsHeartbeat(false);
            event.record(&mut visitor);
            if visitor.0 {
                self.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn heartbeat_ticks_only_while_open() {
        use tracing_subscriber::layer::SubscriberExt;

        let counter = HeartbeatCounter::default();
        let _guard = tracing::subscriber::set_default(tracing_subscriber::registry().with(counter.clone()));

        let (mut sub, _, _) = subscriber(10);
        let (_stop_tx, mut stop_rx) = watch::channel(false);
        let (out_tx, _out_rx) = futures::channel::mpsc::unbounded::<Message>();
        let (in_tx, in_rx) = futures::channel::mpsc::unbounded::<Result<Message, String>>();

        time::sleep(Duration::from_secs(120)).await;
        assert_eq!(counter.count(), 0, "no heartbeat before the stream opens");

        // Default interval is 30s; the server drops the stream at 95s.
        let drop_stream = async move {
            time::sleep(Duration::from_secs(95)).await;
            drop(in_tx);
        };
        let (exit, ()) = tokio::join!(sub.drive(out_tx, in_rx, &mut stop_rx), drop_stream);
        assert!(matches!(exit, Exit::Closed));
        assert_eq!(counter.count(), 3);

        sub.on_close().unwrap();
        time::sleep(Duration::from_secs(300)).await;
        assert_eq!(counter.count(), 3, "heartbeat stopped with the connection");
    }

    #[tokio::test(start_paused = true)]
    async fn ping_is_answered_with_pong() {
        let (mut sub, _, _) = subscriber(10);
        let (_stop_tx, mut stop_rx) = watch::channel(false);
        let (out_tx, mut out_rx) = futures::channel::mpsc::unbounded::<Message>();
        let (in_tx, in_rx) = futures::channel::mpsc::unbounded::<Result<Message, String>>();

        in_tx.unbounded_send(Ok(Message::Ping(vec![7, 7]))).unwrap();
        drop(in_tx);
        let exit = sub.drive(out_tx, in_rx, &mut stop_rx).await;
        assert!(matches!(exit, Exit::Closed));

        let Some(Message::Text(subscribe)) = out_rx.next().await else {
            panic!("expected logsSubscribe first");
        };
        assert!(subscribe.as_str().contains("logsSubscribe"));
        assert_eq!(out_rx.next().await, Some(Message::Pong(vec![7, 7])));
    }

    #[test]
    fn redact_strips_query() {
        assert_eq!(redact("wss://host/?api-key=abc"), "wss://host/");
        assert_eq!(redact("ws://127.0.0.1:8900"), "ws://127.0.0.1:8900");
    }
}
