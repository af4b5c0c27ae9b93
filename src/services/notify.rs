//! Per-account notification fan-out: every state-changing operation — a
//! fill, a cancel, an amend — fires a lightweight event that any
//! connected listener for that account can pick up. No payload is carried
//! beyond the account id; listeners re-fetch state rather than trust a
//! payload that could race the database.

use dashmap::DashMap;
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy)]
pub struct AccountEvent {
    pub account_id: i64,
}

/// Lazily creates one `broadcast::Sender` per account on first use.
#[derive(Default)]
pub struct AccountNotifier {
    channels: DashMap<i64, broadcast::Sender<AccountEvent>>,
}

impl AccountNotifier {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    pub fn subscribe(&self, account_id: i64) -> broadcast::Receiver<AccountEvent> {
        self.channels
            .entry(account_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Fire-and-forget: if nobody is listening for `account_id` this is a
    /// no-op, same as a `broadcast::Sender::send` with zero receivers.
    pub fn notify(&self, account_id: i64) {
        if let Some(tx) = self.channels.get(&account_id) {
            let _ = tx.send(AccountEvent { account_id });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_notification_for_its_account() {
        let notifier = AccountNotifier::new();
        let mut rx = notifier.subscribe(42);
        notifier.notify(42);
        let event = rx.recv().await.unwrap();
        assert_eq!(event.account_id, 42);
    }

    #[test]
    fn notify_with_no_subscribers_does_not_panic() {
        let notifier = AccountNotifier::new();
        notifier.notify(7);
    }
}
