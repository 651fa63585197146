use crate::{Conversation, MessageList, Result, Session};
use crossbeam_channel::{Receiver, Sender};
use std::thread::JoinHandle;

/// What the sync loop reports on its update channel.
#[derive(Debug, Clone)]
pub enum SyncUpdate {
    /// The list changed: a previously-unseen message was appended. At most
    /// one snapshot is emitted per incoming message.
    Snapshot(Vec<crate::Message>),
    /// The underlying stream dropped without being cancelled. The loop has
    /// released its subscription; the caller decides whether to start over.
    Interrupted,
}

/// Handle to a running sync loop. Cancelling (or dropping) the handle
/// releases the underlying network subscription deterministically, so
/// repeated bootstrap/bind/run cycles never leak subscriptions.
pub struct SyncHandle {
    updates: Receiver<SyncUpdate>,
    cancel_tx: Sender<()>,
    join: Option<JoinHandle<MessageList>>,
}

impl SyncHandle {
    /// Live feed of updates. The receiver can be cloned and consumed from
    /// another thread; it disconnects when the loop ends.
    pub fn updates(&self) -> Receiver<SyncUpdate> {
        self.updates.clone()
    }

    /// Stop the loop and return the final merged list.
    pub fn cancel(mut self) -> MessageList {
        let _ = self.cancel_tx.send(());
        match self.join.take() {
            Some(join) => join.join().unwrap_or_default(),
            None => MessageList::new(),
        }
    }
}

impl Drop for SyncHandle {
    fn drop(&mut self) {
        if let Some(join) = self.join.take() {
            let _ = self.cancel_tx.send(());
            let _ = join.join();
        }
    }
}

/// Start merging live traffic into the list loaded by the conversation
/// bind.
///
/// The subscription spans every conversation the session can see (that is
/// the protocol's stream shape), so the loop filters to the bound
/// conversation before merging. One sequential consumer owns the list; each
/// incoming message is checked against the latest list state and appended
/// at most once, preserving arrival order.
///
/// Must only be started once the initial history list is available,
/// otherwise duplicate detection has no baseline.
pub fn start(
    session: &Session,
    conversation: &Conversation,
    initial: MessageList,
) -> Result<SyncHandle> {
    let subscription = session.gateway().subscribe_all()?;
    let conversation_id = conversation.id.clone();
    let (update_tx, update_rx) = crossbeam_channel::unbounded();
    let (cancel_tx, cancel_rx) = crossbeam_channel::bounded(1);

    let join = std::thread::spawn(move || {
        let receiver = subscription.receiver;
        let unsubscribe = subscription.unsubscribe;
        let mut list = initial;

        loop {
            crossbeam_channel::select! {
                recv(receiver) -> incoming => match incoming {
                    Ok(message) => {
                        if message.conversation_id == conversation_id && list.merge(message) {
                            let _ = update_tx.send(SyncUpdate::Snapshot(list.snapshot()));
                        }
                    }
                    Err(_) => {
                        let _ = update_tx.send(SyncUpdate::Interrupted);
                        break;
                    }
                },
                recv(cancel_rx) -> _ => break,
            }
        }

        unsubscribe();
        list
    });

    Ok(SyncHandle {
        updates: update_rx,
        cancel_tx,
        join: Some(join),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::IdentitySession;
    use crate::signer::WalletSigner;
    use crate::{
        conversation, Environment, Identity, InMemoryGateway, InMemoryStorage, KeyStore,
    };
    use std::sync::Arc;
    use std::time::Duration;

    struct TestSigner(Identity);

    impl WalletSigner for TestSigner {
        fn address(&self) -> Identity {
            self.0.clone()
        }

        fn sign_message(&self, message: &str) -> Result<Vec<u8>> {
            Ok(message.as_bytes().to_vec())
        }
    }

    const RECV_TIMEOUT: Duration = Duration::from_secs(5);

    fn setup() -> (InMemoryGateway, Arc<Session>, Conversation, MessageList) {
        let gateway = InMemoryGateway::new();
        let identity_session = IdentitySession::new(
            KeyStore::new(Arc::new(InMemoryStorage::new())),
            Arc::new(gateway.clone()),
        );
        let session = identity_session
            .bootstrap(
                &TestSigner(Identity::new("0x01").unwrap()),
                Environment::Local,
                Vec::new(),
            )
            .unwrap();
        let peer = Identity::new("0x02").unwrap();
        gateway.publish_contact(&peer);
        let (bound, initial) = conversation::bind(&session, &peer).unwrap();
        (gateway, session, bound, initial)
    }

    fn ids(messages: &[crate::Message]) -> Vec<&str> {
        messages.iter().map(|m| m.id.as_str()).collect()
    }

    #[test]
    fn test_new_messages_are_appended_once() {
        let (gateway, session, bound, initial) = setup();
        let peer = bound.peer_address.clone();
        let handle = start(&session, &bound, initial).unwrap();
        let updates = handle.updates();

        let m1 = InMemoryGateway::text_message(&bound, &peer, "first");
        let m2 = InMemoryGateway::text_message(&bound, &peer, "second");
        gateway.deliver(m1.clone());
        gateway.deliver(m2.clone());
        // redelivery of an already-merged message
        gateway.deliver(m1.clone());

        let first = updates.recv_timeout(RECV_TIMEOUT).unwrap();
        let second = updates.recv_timeout(RECV_TIMEOUT).unwrap();
        match (&first, &second) {
            (SyncUpdate::Snapshot(a), SyncUpdate::Snapshot(b)) => {
                assert_eq!(ids(a), vec![m1.id.as_str()]);
                assert_eq!(ids(b), vec![m1.id.as_str(), m2.id.as_str()]);
            }
            other => panic!("expected two snapshots, got {other:?}"),
        }
        // the redelivered duplicate emits nothing
        assert!(updates.recv_timeout(Duration::from_millis(100)).is_err());

        let final_list = handle.cancel();
        assert_eq!(ids(&final_list.snapshot()), vec![m1.id.as_str(), m2.id.as_str()]);
    }

    #[test]
    fn test_duplicates_against_history_baseline_are_discarded() {
        let (gateway, session, bound, _) = setup();
        let peer = bound.peer_address.clone();

        let historical = InMemoryGateway::text_message(&bound, &peer, "old");
        gateway.deliver(historical.clone());
        let (_, initial) = conversation::bind(&session, &bound.peer_address).unwrap();
        assert_eq!(initial.len(), 1);

        let handle = start(&session, &bound, initial).unwrap();
        let updates = handle.updates();

        // stream redelivers the historical message, then something new
        gateway.deliver(historical.clone());
        let fresh = InMemoryGateway::text_message(&bound, &peer, "new");
        gateway.deliver(fresh.clone());

        match updates.recv_timeout(RECV_TIMEOUT).unwrap() {
            SyncUpdate::Snapshot(snapshot) => {
                assert_eq!(ids(&snapshot), vec![historical.id.as_str(), fresh.id.as_str()]);
            }
            other => panic!("expected snapshot, got {other:?}"),
        }
        drop(handle);
    }

    #[test]
    fn test_other_conversations_do_not_surface() {
        let (gateway, session, bound, initial) = setup();
        let handle = start(&session, &bound, initial).unwrap();
        let updates = handle.updates();

        let stranger = Identity::new("0x03").unwrap();
        let other = Conversation::between(session.identity(), &stranger);
        gateway.deliver(InMemoryGateway::text_message(&other, &stranger, "psst"));

        assert!(updates.recv_timeout(Duration::from_millis(100)).is_err());
        let final_list = handle.cancel();
        assert!(final_list.is_empty());
    }

    #[test]
    fn test_cancel_releases_subscription_and_restart_is_clean() {
        let (gateway, session, bound, initial) = setup();
        let peer = bound.peer_address.clone();

        let handle = start(&session, &bound, initial).unwrap();
        assert_eq!(gateway.subscriber_count(), 1);

        let m1 = InMemoryGateway::text_message(&bound, &peer, "first");
        gateway.deliver(m1.clone());
        let updates = handle.updates();
        updates.recv_timeout(RECV_TIMEOUT).unwrap();

        let merged = handle.cancel();
        assert_eq!(gateway.subscriber_count(), 0);

        // restart with the merged list as the new baseline: the redelivered
        // message must not be appended again
        let handle = start(&session, &bound, merged).unwrap();
        assert_eq!(gateway.subscriber_count(), 1);
        let updates = handle.updates();
        gateway.deliver(m1);
        assert!(updates.recv_timeout(Duration::from_millis(100)).is_err());

        let final_list = handle.cancel();
        assert_eq!(final_list.len(), 1);
        assert_eq!(gateway.subscriber_count(), 0);
    }

    #[test]
    fn test_dropped_stream_surfaces_interruption() {
        let (gateway, session, bound, initial) = setup();
        let handle = start(&session, &bound, initial).unwrap();
        let updates = handle.updates();

        // the network side goes away without a cancel
        gateway.disconnect().unwrap();

        match updates.recv_timeout(RECV_TIMEOUT).unwrap() {
            SyncUpdate::Interrupted => {}
            other => panic!("expected interruption, got {other:?}"),
        }
    }

    #[test]
    fn test_drop_without_cancel_still_releases_subscription() {
        let (gateway, session, bound, initial) = setup();
        let handle = start(&session, &bound, initial).unwrap();
        assert_eq!(gateway.subscriber_count(), 1);
        drop(handle);
        assert_eq!(gateway.subscriber_count(), 0);
    }
}
