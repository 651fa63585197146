use crate::codec::EncodedContent;
use crate::{Conversation, Environment, Identity, KeyBundle, Message, Result};
use crossbeam_channel::Receiver;

/// Release hook for a live subscription.
pub type Unsubscribe = Box<dyn FnOnce() + Send>;

/// A live stream of incoming messages for the connected identity, spanning
/// every conversation the session can see. Calling `unsubscribe` releases
/// the underlying network subscription; the receiver disconnects once the
/// producer side is gone.
pub struct Subscription {
    pub receiver: Receiver<Message>,
    pub unsubscribe: Unsubscribe,
}

/// Boundary to the external messaging network service. All calls are
/// single-attempt and fail fast; retry policy belongs to the caller.
pub trait MessagingGateway: Send + Sync {
    /// Open the network session for an identity and publish its contact
    /// bundle. The key bundle encodes authority; no separate signer is
    /// involved.
    fn connect(&self, identity: &Identity, keys: &KeyBundle, environment: Environment)
        -> Result<()>;

    fn disconnect(&self) -> Result<()>;

    /// Whether the peer has published enough key material to receive
    /// messages under the current environment.
    fn can_message(&self, peer: &Identity) -> Result<bool>;

    /// Lookup-or-create, idempotent per unordered identity pair: repeated
    /// calls yield the same logical conversation.
    fn find_or_create_conversation(&self, local: &Identity, peer: &Identity)
        -> Result<Conversation>;

    /// Full history of a conversation, chronological, oldest first.
    fn load_history(&self, conversation: &Conversation) -> Result<Vec<Message>>;

    fn subscribe_all(&self) -> Result<Subscription>;

    /// Publish a payload into a conversation; returns the message id.
    fn send(&self, conversation: &Conversation, content: EncodedContent) -> Result<String>;
}
