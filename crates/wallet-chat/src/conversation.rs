use crate::{Conversation, Error, Identity, MessageList, Result, Session};

/// Open the conversation with a fixed peer and load its history.
///
/// Reachability is checked first; an unreachable peer is terminal for that
/// peer and no conversation is created. The history load is all-or-nothing:
/// on failure no partial list escapes, the caller sees [`Error::HistoryLoad`].
pub fn bind(session: &Session, peer: &Identity) -> Result<(Conversation, MessageList)> {
    if !session.gateway().can_message(peer)? {
        return Err(Error::PeerUnreachable(peer.to_string()));
    }

    let conversation = session
        .gateway()
        .find_or_create_conversation(session.identity(), peer)?;

    let history = session
        .gateway()
        .load_history(&conversation)
        .map_err(|e| match e {
            Error::HistoryLoad(_) => e,
            other => Error::HistoryLoad(other.to_string()),
        })?;

    Ok((conversation, MessageList::from_history(history)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Environment, InMemoryGateway, InMemoryStorage, KeyStore};
    use crate::session::IdentitySession;
    use crate::signer::WalletSigner;
    use std::sync::Arc;

    struct TestSigner(Identity);

    impl WalletSigner for TestSigner {
        fn address(&self) -> Identity {
            self.0.clone()
        }

        fn sign_message(&self, message: &str) -> Result<Vec<u8>> {
            Ok(message.as_bytes().to_vec())
        }
    }

    fn ready_session(gateway: &InMemoryGateway, address: &str) -> Arc<Session> {
        let identity_session = IdentitySession::new(
            KeyStore::new(Arc::new(InMemoryStorage::new())),
            Arc::new(gateway.clone()),
        );
        identity_session
            .bootstrap(
                &TestSigner(Identity::new(address).unwrap()),
                Environment::Local,
                Vec::new(),
            )
            .unwrap()
    }

    #[test]
    fn test_unreachable_peer_yields_no_conversation() {
        let gateway = InMemoryGateway::new();
        let session = ready_session(&gateway, "0x01");
        let peer = Identity::new("0x02").unwrap();

        let err = bind(&session, &peer).unwrap_err();
        assert!(matches!(err, Error::PeerUnreachable(_)));
    }

    #[test]
    fn test_bind_loads_history_in_order() {
        let gateway = InMemoryGateway::new();
        let session = ready_session(&gateway, "0x01");
        let peer = Identity::new("0x02").unwrap();
        gateway.publish_contact(&peer);

        let conversation = Conversation::between(session.identity(), &peer);
        gateway.deliver(InMemoryGateway::text_message(&conversation, &peer, "one"));
        gateway.deliver(InMemoryGateway::text_message(&conversation, &peer, "two"));

        let (bound, history) = bind(&session, &peer).unwrap();
        assert_eq!(bound.id, conversation.id);
        assert_eq!(history.len(), 2);
        let texts: Vec<_> = history
            .messages()
            .iter()
            .map(|m| session.decode(m).unwrap())
            .collect();
        assert_eq!(texts, vec![serde_json::json!("one"), serde_json::json!("two")]);
    }

    #[test]
    fn test_bind_is_idempotent() {
        let gateway = InMemoryGateway::new();
        let session = ready_session(&gateway, "0x01");
        let peer = Identity::new("0x02").unwrap();
        gateway.publish_contact(&peer);

        let (first, _) = bind(&session, &peer).unwrap();
        let (second, _) = bind(&session, &peer).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_history_failure_yields_no_partial_list() {
        let gateway = InMemoryGateway::new();
        let session = ready_session(&gateway, "0x01");
        let peer = Identity::new("0x02").unwrap();
        gateway.publish_contact(&peer);

        gateway.fail_next_history_load();
        let err = bind(&session, &peer).unwrap_err();
        assert!(matches!(err, Error::HistoryLoad(_)));

        // the failure is not sticky; re-invocation succeeds
        assert!(bind(&session, &peer).is_ok());
    }
}
