//! In-process publish/subscribe topic for status notifications.
//!
//! Delivery is synchronous on the publishing thread, in subscription order.
//! A publish copies the subscriber list under a short shared lock and
//! delivers outside it, so subscribing and unsubscribing never wait behind a
//! slow listener. Each publish reaches the subscribers present when it
//! started. Listeners may publish, subscribe or unsubscribe from inside their
//! own callback.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// A single message fanned out to subscribers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub topic: String,
    /// 1-based position in the topic's publish history.
    pub sequence: u64,
    pub text: String,
    pub prime: Option<i64>,
    pub published_at: DateTime<Utc>,
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.prime {
            Some(prime) => write!(f, "{} (prime: {})", self.text, prime),
            None => f.write_str(&self.text),
        }
    }
}

pub type ListenerError = Box<dyn std::error::Error + Send + Sync>;
pub type ListenerResult = std::result::Result<(), ListenerError>;

/// Receives notifications from a [`NotificationBus`].
pub trait MessageListener: Send + Sync {
    fn on_message(&self, notification: &Notification) -> ListenerResult;
}

impl<F> MessageListener for F
where
    F: Fn(&Notification) -> ListenerResult + Send + Sync,
{
    fn on_message(&self, notification: &Notification) -> ListenerResult {
        self(notification)
    }
}

pub type ListenerHandle = Arc<dyn MessageListener>;

/// Wraps a closure as a subscribable handle. Subscription identity is the
/// returned `Arc`, so keep it around to unsubscribe later.
pub fn listener<F>(f: F) -> ListenerHandle
where
    F: Fn(&Notification) -> ListenerResult + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Listener that forwards every notification to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingListener;

impl MessageListener for TracingListener {
    fn on_message(&self, notification: &Notification) -> ListenerResult {
        info!(
            target: "primevote::notify",
            topic = %notification.topic,
            sequence = notification.sequence,
            prime = ?notification.prime,
            "{}",
            notification.text
        );
        Ok(())
    }
}

/// Result of one [`NotificationBus::publish`] call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PublishReport {
    pub sequence: u64,
    pub delivered: usize,
    pub failed: usize,
}

/// Named topic with an ordered, duplicate-free subscriber list.
pub struct NotificationBus {
    topic: String,
    subscribers: RwLock<Vec<ListenerHandle>>,
    published: AtomicU64,
}

impl fmt::Debug for NotificationBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let subscriber_count = self.subscribers.try_read().map(|guard| guard.len());
        f.debug_struct("NotificationBus")
            .field("topic", &self.topic)
            .field("subscriber_count", &subscriber_count)
            .field("published", &self.published.load(Ordering::Relaxed))
            .finish()
    }
}

impl NotificationBus {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            subscribers: RwLock::new(Vec::new()),
            published: AtomicU64::new(0),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Registers `listener` unless that exact handle is already subscribed.
    pub fn subscribe(&self, listener: ListenerHandle) -> bool {
        let mut guard = self.subscribers.write();
        if guard.iter().any(|existing| Arc::ptr_eq(existing, &listener)) {
            return false;
        }
        guard.push(listener);
        debug!(target: "primevote::bus", topic = %self.topic, subscribers = guard.len(), "subscriber added");
        true
    }

    pub fn unsubscribe(&self, listener: &ListenerHandle) -> bool {
        let mut guard = self.subscribers.write();
        let before = guard.len();
        guard.retain(|existing| !Arc::ptr_eq(existing, listener));
        let removed = guard.len() != before;
        if removed {
            debug!(target: "primevote::bus", topic = %self.topic, subscribers = guard.len(), "subscriber removed");
        }
        removed
    }

    /// Delivers `text` (and an optional prime) to every current subscriber.
    /// Listener failures and panics are logged and never reach the caller.
    pub fn publish(&self, text: impl Into<String>, prime: Option<i64>) -> PublishReport {
        let subscribers: Vec<ListenerHandle> = self.subscribers.read().clone();
        let sequence = self.published.fetch_add(1, Ordering::AcqRel) + 1;
        let notification = Notification {
            topic: self.topic.clone(),
            sequence,
            text: text.into(),
            prime,
            published_at: Utc::now(),
        };
        debug!(
            target: "primevote::bus",
            topic = %self.topic,
            sequence,
            subscribers = subscribers.len(),
            "publishing: {}",
            notification.text
        );

        let mut delivered = 0;
        let mut failed = 0;
        for (index, subscriber) in subscribers.iter().enumerate() {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| subscriber.on_message(&notification)));
            match outcome {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(err)) => {
                    failed += 1;
                    warn!(target: "primevote::bus", topic = %self.topic, sequence, subscriber = index, error = %err, "subscriber failed");
                }
                Err(payload) => {
                    failed += 1;
                    warn!(
                        target: "primevote::bus",
                        topic = %self.topic,
                        sequence,
                        subscriber = index,
                        panic = %panic_message(payload.as_ref()),
                        "subscriber panicked"
                    );
                }
            }
        }

        PublishReport {
            sequence,
            delivered,
            failed,
        }
    }

    pub fn publish_text(&self, text: impl Into<String>) -> PublishReport {
        self.publish(text, None)
    }

    pub fn subscribers_count(&self) -> usize {
        self.subscribers.read().len()
    }

    pub fn message_count(&self) -> u64 {
        self.published.load(Ordering::Acquire)
    }

    /// Restarts the publish sequence at zero. Subscribers are untouched.
    pub fn reset_count(&self) {
        self.published.store(0, Ordering::Release);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::thread;

    fn recorder(log: &Arc<Mutex<Vec<String>>>, name: &'static str) -> ListenerHandle {
        let log = Arc::clone(log);
        listener(move |n: &Notification| {
            log.lock().push(format!("{name}:{}", n.text));
            Ok(())
        })
    }

    #[test]
    fn delivers_in_subscription_order() {
        let bus = NotificationBus::new("test");
        let log = Arc::new(Mutex::new(Vec::new()));
        assert!(bus.subscribe(recorder(&log, "a")));
        assert!(bus.subscribe(recorder(&log, "b")));
        assert!(bus.subscribe(recorder(&log, "c")));

        let report = bus.publish("hello", Some(7));
        assert_eq!(report.delivered, 3);
        assert_eq!(report.failed, 0);
        assert_eq!(report.sequence, 1);
        assert_eq!(*log.lock(), vec!["a:hello", "b:hello", "c:hello"]);
    }

    #[test]
    fn duplicate_subscription_is_rejected() {
        let bus = NotificationBus::new("test");
        let handle: ListenerHandle = Arc::new(TracingListener);
        assert!(bus.subscribe(Arc::clone(&handle)));
        assert!(!bus.subscribe(Arc::clone(&handle)));
        assert_eq!(bus.subscribers_count(), 1);

        assert!(bus.unsubscribe(&handle));
        assert!(!bus.unsubscribe(&handle));
        assert_eq!(bus.subscribers_count(), 0);
    }

    #[test]
    fn failing_and_panicking_subscribers_do_not_block_others() {
        let bus = NotificationBus::new("test");
        let log = Arc::new(Mutex::new(Vec::new()));
        bus.subscribe(listener(|_: &Notification| Err("listener refused".into())));
        bus.subscribe(listener(|_: &Notification| panic!("listener exploded")));
        bus.subscribe(recorder(&log, "tail"));

        let report = bus.publish_text("still delivered");
        assert_eq!(report.delivered, 1);
        assert_eq!(report.failed, 2);
        assert_eq!(*log.lock(), vec!["tail:still delivered"]);
        assert_eq!(bus.message_count(), 1);
    }

    #[test]
    fn carries_optional_prime() {
        let bus = NotificationBus::new("primes");
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        bus.subscribe(listener(move |n: &Notification| {
            sink.lock().push((n.topic.clone(), n.prime, n.to_string()));
            Ok(())
        }));

        bus.publish("found", Some(13));
        bus.publish_text("done");

        let seen = seen.lock();
        assert_eq!(seen[0], ("primes".to_string(), Some(13), "found (prime: 13)".to_string()));
        assert_eq!(seen[1], ("primes".to_string(), None, "done".to_string()));
    }

    #[test]
    fn listener_may_publish_reentrantly() {
        let bus = Arc::new(NotificationBus::new("echo"));
        let inner = Arc::clone(&bus);
        bus.subscribe(listener(move |n: &Notification| {
            if n.text == "ping" {
                inner.publish_text("pong");
            }
            Ok(())
        }));

        bus.publish_text("ping");
        assert_eq!(bus.message_count(), 2);
    }

    #[test]
    fn subscribe_is_not_starved_by_busy_publishers() {
        let bus = Arc::new(NotificationBus::new("busy"));
        bus.subscribe(listener(|_: &Notification| {
            thread::sleep(std::time::Duration::from_millis(2));
            Ok(())
        }));

        let stop = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let publishers: Vec<_> = (0..4)
            .map(|_| {
                let bus = Arc::clone(&bus);
                let stop = Arc::clone(&stop);
                thread::spawn(move || {
                    while !stop.load(Ordering::Relaxed) {
                        bus.publish_text("tick");
                    }
                })
            })
            .collect();

        thread::sleep(std::time::Duration::from_millis(20));
        let started = std::time::Instant::now();
        assert!(bus.subscribe(Arc::new(TracingListener)));
        let waited = started.elapsed();

        stop.store(true, Ordering::Relaxed);
        for handle in publishers {
            handle.join().expect("publisher panicked");
        }
        assert!(waited < std::time::Duration::from_millis(500), "subscribe waited {waited:?}");
        assert_eq!(bus.subscribers_count(), 2);
    }

    #[test]
    fn listener_may_unsubscribe_itself() {
        let bus = Arc::new(NotificationBus::new("once"));
        let calls = Arc::new(AtomicU64::new(0));
        let slot: Arc<Mutex<Option<ListenerHandle>>> = Arc::new(Mutex::new(None));

        let handle = {
            let bus = Arc::clone(&bus);
            let calls = Arc::clone(&calls);
            let slot = Arc::clone(&slot);
            listener(move |_: &Notification| {
                calls.fetch_add(1, Ordering::Relaxed);
                if let Some(me) = slot.lock().take() {
                    bus.unsubscribe(&me);
                }
                Ok(())
            })
        };
        *slot.lock() = Some(Arc::clone(&handle));
        bus.subscribe(handle);

        bus.publish_text("first");
        bus.publish_text("second");
        assert_eq!(calls.load(Ordering::Relaxed), 1);
        assert_eq!(bus.subscribers_count(), 0);
    }

    #[test]
    fn concurrent_publishers_are_all_counted() {
        let bus = Arc::new(NotificationBus::new("load"));
        let counter = Arc::new(AtomicU64::new(0));
        let sink = Arc::clone(&counter);
        bus.subscribe(listener(move |_: &Notification| {
            sink.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let bus = Arc::clone(&bus);
                thread::spawn(move || {
                    for i in 0..250 {
                        bus.publish(format!("msg {i}"), None);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("publisher panicked");
        }

        assert_eq!(bus.message_count(), 1_000);
        assert_eq!(counter.load(Ordering::Relaxed), 1_000);
    }
}
