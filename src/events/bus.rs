//! # Topic-routed event bus.
//!
//! [`Bus`] is the only channel between components. Every subscription owns a
//! bounded FIFO queue; `publish` assigns the next sequence number and enqueues
//! the event to each matching subscription **under one lock**, then returns.
//! Handlers run on their own worker tasks, never in the publisher context.
//!
//! ## Architecture
//! ```text
//! Publishers (many):                    Subscriptions (in subscription order):
//!   Supervisor ──┐                       ┌──► [queue 1] ──► worker 1 ──► handler1.on_event()
//!   Dispatcher ──┼──► Bus::publish ──────┼──► [queue 2] ──► worker 2 ──► handler2.on_event()
//!   ModeMachine ─┤   (seq + enqueue      ├──► [queue 3] ──► Listener (component loop)
//!   Services ────┘    under one lock)    └──► ...
//! ```
//!
//! ## Rules
//! - **Non-blocking publish**: enqueueing uses `try_send`; handlers never run inline.
//! - **Per-subscription FIFO**: a subscription sees events in `seq` order.
//! - **Isolation**: a slow subscription only fills its own queue; overflow drops the
//!   event for that subscription and publishes `bus.overflow`.
//! - **Failure isolation**: handler errors and panics become `bus.handler_failed`.
//! - **No replay**: events published before a subscription exists are not delivered to it.
//!
//! Workers hold only a weak reference to the bus, so dropping every [`Bus`]
//! handle (or calling [`Bus::close`]) lets all workers drain and exit.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::event::{Event, Payload};
use super::topic::TopicPattern;
use crate::subscribers::{self, Subscribe};

/// Identifier of one subscription, used to unsubscribe.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Route {
    id: SubscriptionId,
    name: Arc<str>,
    pattern: TopicPattern,
    sender: mpsc::Sender<Arc<Event>>,
}

struct Routes {
    next_seq: u64,
    next_id: u64,
    entries: Vec<Route>,
}

struct Inner {
    routes: Mutex<Routes>,
}

/// Cloneable handle to the process event bus.
#[derive(Clone)]
pub struct Bus {
    inner: Arc<Inner>,
}

/// Weak bus handle held by subscription workers.
#[derive(Clone)]
pub(crate) struct WeakBus {
    inner: Weak<Inner>,
}

impl WeakBus {
    pub(crate) fn upgrade(&self) -> Option<Bus> {
        self.inner.upgrade().map(|inner| Bus { inner })
    }
}

/// Receiving side of a [`Bus::listen`] subscription.
///
/// Used by components that consume events in their own `select!` loop.
/// Dropping the listener ends the subscription.
pub struct Listener {
    id: SubscriptionId,
    rx: mpsc::Receiver<Arc<Event>>,
}

impl Listener {
    /// Returns the subscription id.
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Receives the next event; `None` once the bus is closed.
    pub async fn recv(&mut self) -> Option<Arc<Event>> {
        self.rx.recv().await
    }

    /// Returns the next queued event without waiting.
    pub fn try_recv(&mut self) -> Option<Arc<Event>> {
        self.rx.try_recv().ok()
    }
}

impl Default for Bus {
    fn default() -> Self {
        Self::new()
    }
}

impl Bus {
    /// Creates an empty bus.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                routes: Mutex::new(Routes {
                    next_seq: 1,
                    next_id: 1,
                    entries: Vec::new(),
                }),
            }),
        }
    }

    pub(crate) fn downgrade(&self) -> WeakBus {
        WeakBus {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Publishes a payload on its canonical topic and returns the assigned sequence number.
    ///
    /// Never waits for handlers. If a subscription's queue is full the event
    /// is dropped for that subscription only and `bus.overflow` is published
    /// (overflow of bus diagnostics themselves is not re-reported).
    pub fn publish(&self, origin: &str, payload: Payload) -> u64 {
        let (seq, overflowed) = {
            let mut routes = self.inner.routes.lock();
            let seq = routes.next_seq;
            routes.next_seq += 1;

            let event = Arc::new(Event::new(seq, Arc::from(origin), payload));
            let topic = event.topic();
            let mut overflowed: Vec<Arc<str>> = Vec::new();

            routes.entries.retain(|route| {
                if !route.pattern.matches(topic) {
                    return !route.sender.is_closed();
                }
                match route.sender.try_send(Arc::clone(&event)) {
                    Ok(()) => true,
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        if !event.payload.is_bus_diagnostic() {
                            overflowed.push(Arc::clone(&route.name));
                        }
                        true
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => false,
                }
            });
            (seq, overflowed.into_iter().map(|n| (n, topic.to_string())).collect::<Vec<_>>())
        };

        for (subscriber, topic) in overflowed {
            tracing::warn!(subscriber = %subscriber, topic = %topic, "subscriber queue full; event dropped");
            self.publish(
                "bus",
                Payload::SubscriberOverflow {
                    subscriber: subscriber.to_string(),
                    topic,
                },
            );
        }
        seq
    }

    /// Publishes free-form data on a collaborator-defined topic.
    pub fn publish_custom(
        &self,
        origin: &str,
        topic: impl Into<String>,
        data: serde_json::Value,
    ) -> u64 {
        self.publish(
            origin,
            Payload::Custom {
                topic: topic.into(),
                data,
            },
        )
    }

    /// Registers `handler` for every topic matched by `pattern`.
    ///
    /// Spawns a dedicated worker; must be called inside a Tokio runtime.
    /// Handlers registered on the same topic are enqueued in subscription order.
    pub fn subscribe(
        &self,
        pattern: impl Into<TopicPattern>,
        handler: Arc<dyn Subscribe>,
    ) -> SubscriptionId {
        let capacity = handler.queue_capacity().max(1);
        let (tx, rx) = mpsc::channel::<Arc<Event>>(capacity);
        let id = self.add_route(pattern.into(), Arc::from(handler.name()), tx);
        subscribers::spawn_worker(handler, rx, self.downgrade());
        id
    }

    /// Opens a bounded receiver for every topic matched by `pattern`.
    pub fn listen(
        &self,
        pattern: impl Into<TopicPattern>,
        name: &str,
        capacity: usize,
    ) -> Listener {
        let (tx, rx) = mpsc::channel::<Arc<Event>>(capacity.max(1));
        let id = self.add_route(pattern.into(), Arc::from(name), tx);
        Listener { id, rx }
    }

    /// Removes a subscription. Its worker drains already-queued events and exits.
    ///
    /// Returns `false` if the id is unknown.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut routes = self.inner.routes.lock();
        let before = routes.entries.len();
        routes.entries.retain(|route| route.id != id);
        routes.entries.len() != before
    }

    /// Removes every subscription; workers and listeners observe end-of-stream.
    pub fn close(&self) {
        self.inner.routes.lock().entries.clear();
    }

    /// Returns the number of live subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.inner
            .routes
            .lock()
            .entries
            .iter()
            .filter(|route| !route.sender.is_closed())
            .count()
    }

    fn add_route(
        &self,
        pattern: TopicPattern,
        name: Arc<str>,
        sender: mpsc::Sender<Arc<Event>>,
    ) -> SubscriptionId {
        let mut routes = self.inner.routes.lock();
        let id = SubscriptionId(routes.next_id);
        routes.next_id += 1;
        tracing::debug!(subscriber = %name, pattern = %pattern, "subscription added");
        routes.entries.push(Route {
            id,
            name,
            pattern,
            sender,
        });
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HandlerError;
    use crate::subscribers::HandlerFn;
    use parking_lot::Mutex as PlMutex;
    use std::time::Duration;

    fn liveness(service: &str) -> Payload {
        Payload::ServiceLiveness {
            service: service.into(),
        }
    }

    async fn drain(listener: &mut Listener, n: usize) -> Vec<Arc<Event>> {
        let mut out = Vec::with_capacity(n);
        for _ in 0..n {
            let ev = tokio::time::timeout(Duration::from_secs(1), listener.recv())
                .await
                .expect("event in time")
                .expect("bus open");
            out.push(ev);
        }
        out
    }

    #[tokio::test]
    async fn sequence_numbers_strictly_increase() {
        let bus = Bus::new();
        let a = bus.publish("t", liveness("a"));
        let b = bus.publish("t", liveness("b"));
        let c = bus.publish_custom("t", "x.y", serde_json::json!(1));
        assert!(a < b && b < c);
    }

    #[tokio::test]
    async fn two_handlers_observe_same_relative_order() {
        let bus = Bus::new();
        let seen_a = Arc::new(PlMutex::new(Vec::new()));
        let seen_b = Arc::new(PlMutex::new(Vec::new()));

        for seen in [seen_a.clone(), seen_b.clone()] {
            bus.subscribe(
                "service.liveness",
                HandlerFn::arc("recorder", move |ev: Arc<Event>| {
                    let seen = seen.clone();
                    async move {
                        seen.lock().push(ev.seq);
                        Ok(())
                    }
                }),
            );
        }

        let mut published = Vec::new();
        for i in 0..50 {
            published.push(bus.publish("t", liveness(&format!("svc{i}"))));
        }

        tokio::time::timeout(Duration::from_secs(2), async {
            while seen_a.lock().len() < 50 || seen_b.lock().len() < 50 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("both handlers drained");

        assert_eq!(*seen_a.lock(), published);
        assert_eq!(*seen_b.lock(), published);
    }

    #[tokio::test]
    async fn wildcard_listener_sees_only_its_prefix() {
        let bus = Bus::new();
        let mut services = bus.listen("service.*", "svc-observer", 16);

        bus.publish("t", Payload::ModeChanged {
            from: crate::Mode::Idle,
            to: crate::Mode::Ambient,
        });
        bus.publish("t", liveness("audio"));

        let got = drain(&mut services, 1).await;
        assert_eq!(got[0].topic(), "service.liveness");
        assert!(services.try_recv().is_none());
    }

    #[tokio::test]
    async fn no_replay_for_late_subscribers() {
        let bus = Bus::new();
        bus.publish("t", liveness("early"));
        let mut late = bus.listen("*", "late", 4);
        bus.publish("t", liveness("late"));

        let got = drain(&mut late, 1).await;
        assert_eq!(
            got[0].payload,
            liveness("late"),
            "only events after subscription are delivered"
        );
        assert!(late.try_recv().is_none());
    }

    #[tokio::test]
    async fn failing_handler_is_reported_and_isolated() {
        let bus = Bus::new();
        let mut failures = bus.listen("bus.handler_failed", "failures", 16);
        let healthy_count = Arc::new(PlMutex::new(0usize));

        bus.subscribe(
            "service.liveness",
            HandlerFn::arc("broken", |_ev: Arc<Event>| async move {
                Err(HandlerError::new("cannot handle"))
            }),
        );
        bus.subscribe(
            "service.liveness",
            HandlerFn::arc("panicky", |_ev: Arc<Event>| async move {
                if true {
                    panic!("handler exploded");
                }
                Ok(())
            }),
        );
        let counter = healthy_count.clone();
        bus.subscribe(
            "service.liveness",
            HandlerFn::arc("healthy", move |_ev: Arc<Event>| {
                let counter = counter.clone();
                async move {
                    *counter.lock() += 1;
                    Ok(())
                }
            }),
        );

        bus.publish("t", liveness("a"));
        bus.publish("t", liveness("b"));

        let reports = drain(&mut failures, 4).await;
        let mut names: Vec<String> = reports
            .iter()
            .map(|ev| match &ev.payload {
                Payload::HandlerFailed { subscriber, .. } => subscriber.clone(),
                other => panic!("unexpected payload {other:?}"),
            })
            .collect();
        names.sort();
        assert_eq!(names, vec!["broken", "broken", "panicky", "panicky"]);

        tokio::time::timeout(Duration::from_secs(1), async {
            while *healthy_count.lock() < 2 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("healthy handler kept receiving");
    }

    #[tokio::test]
    async fn overflow_drops_for_one_subscriber_only() {
        let bus = Bus::new();
        let mut overflow = bus.listen("bus.overflow", "overflow-watch", 64);
        let mut tiny = bus.listen("service.liveness", "tiny", 1);
        let mut roomy = bus.listen("service.liveness", "roomy", 8);

        for i in 0..3 {
            bus.publish("t", liveness(&format!("s{i}")));
        }

        assert_eq!(drain(&mut roomy, 3).await.len(), 3);
        assert_eq!(drain(&mut tiny, 1).await.len(), 1);
        assert!(tiny.try_recv().is_none());

        let reports = drain(&mut overflow, 2).await;
        for ev in reports {
            match &ev.payload {
                Payload::SubscriberOverflow { subscriber, topic } => {
                    assert_eq!(subscriber, "tiny");
                    assert_eq!(topic, "service.liveness");
                }
                other => panic!("unexpected payload {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn unsubscribe_and_dropped_listeners_are_removed() {
        let bus = Bus::new();
        let keep = bus.listen("*", "keep", 4);
        let dropped = bus.listen("*", "dropped", 4);
        assert_eq!(bus.subscription_count(), 2);

        drop(dropped);
        bus.publish("t", liveness("a"));
        assert_eq!(bus.subscription_count(), 1);

        assert!(bus.unsubscribe(keep.id()));
        assert!(!bus.unsubscribe(keep.id()));
        assert_eq!(bus.subscription_count(), 0);
    }
}
