//! Join barrier and deferred values used while the settings page loads.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Counts completions and opens once `required` have arrived.
///
/// Arrivals are not tied to a particular participant, so completion
/// order does not matter. Extra arrivals past `required` are harmless.
#[derive(Clone, Debug)]
pub struct ReadinessGate {
    tx: Arc<watch::Sender<usize>>,
    required: usize,
}

impl ReadinessGate {
    pub fn new(required: usize) -> Self {
        let (tx, _) = watch::channel(0);
        Self {
            tx: Arc::new(tx),
            required,
        }
    }

    /// Records one completion. Returns true if this arrival opened the gate.
    pub fn arrive(&self) -> bool {
        let mut opened = false;
        let required = self.required;
        self.tx.send_modify(|count| {
            *count += 1;
            opened = *count == required;
        });
        debug!(completed = self.completed(), required, "readiness arrival");
        opened
    }

    pub fn completed(&self) -> usize {
        *self.tx.borrow()
    }

    pub fn is_ready(&self) -> bool {
        self.completed() >= self.required
    }

    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        let required = self.required;
        // The sender lives in self, so the channel cannot close here.
        let _ = rx.wait_for(|count| *count >= required).await;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Deferred<T> {
    Ready(T),
    TimedOut,
    Cancelled,
}

/// Waits for the first published value on `rx`.
///
/// Resolves immediately if a value is already present. Gives up after
/// `timeout`, when `cancel` fires, or when the publisher goes away.
pub async fn resolve_deferred<T: Clone>(
    mut rx: watch::Receiver<Option<T>>,
    timeout: Duration,
    cancel: CancellationToken,
) -> Deferred<T> {
    let wait = async {
        match rx.wait_for(Option::is_some).await {
            Ok(value) => value.clone(),
            Err(_) => None,
        }
    };

    tokio::select! {
        _ = cancel.cancelled() => Deferred::Cancelled,
        result = tokio::time::timeout(timeout, wait) => match result {
            Ok(Some(value)) => Deferred::Ready(value),
            Ok(None) => Deferred::Cancelled,
            Err(_) => Deferred::TimedOut,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn gate_opens_after_required_arrivals() {
        let gate = ReadinessGate::new(2);
        assert!(!gate.is_ready());
        assert!(!gate.arrive());
        assert!(!gate.is_ready());
        assert!(gate.arrive());
        assert!(gate.is_ready());
        assert!(!gate.arrive());
        gate.wait().await;
    }

    #[tokio::test]
    async fn wait_wakes_on_last_arrival() {
        let gate = ReadinessGate::new(2);
        let waiter = {
            let gate = gate.clone();
            tokio::spawn(async move { gate.wait().await })
        };
        gate.arrive();
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());
        gate.arrive();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn deferred_resolves_when_published() {
        let (tx, rx) = watch::channel(None);
        let task = tokio::spawn(resolve_deferred(
            rx,
            Duration::from_secs(5),
            CancellationToken::new(),
        ));
        tx.send_replace(Some(vec!["0".to_string()]));
        assert_eq!(task.await.unwrap(), Deferred::Ready(vec!["0".to_string()]));
    }

    #[tokio::test]
    async fn deferred_uses_value_already_present() {
        let (_tx, rx) = watch::channel(Some(7));
        let outcome = resolve_deferred(rx, Duration::from_millis(10), CancellationToken::new()).await;
        assert_eq!(outcome, Deferred::Ready(7));
    }

    #[tokio::test(start_paused = true)]
    async fn deferred_times_out() {
        let (_tx, rx) = watch::channel::<Option<u32>>(None);
        let outcome = resolve_deferred(rx, Duration::from_secs(5), CancellationToken::new()).await;
        assert_eq!(outcome, Deferred::TimedOut);
    }

    #[tokio::test]
    async fn deferred_honours_cancellation() {
        let (_tx, rx) = watch::channel::<Option<u32>>(None);
        let token = CancellationToken::new();
        token.cancel();
        let outcome = resolve_deferred(rx, Duration::from_secs(5), token).await;
        assert_eq!(outcome, Deferred::Cancelled);
    }
}
