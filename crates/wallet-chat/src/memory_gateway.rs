use crate::codec::EncodedContent;
use crate::{
    now_ms, Conversation, Environment, Error, Identity, KeyBundle, Message, MessagingGateway,
    Result, Subscription, TextCodec,
};
use crossbeam_channel::Sender;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

/// In-process stand-in for the messaging network. One instance is one
/// network: peers become reachable when their contact bundle is published,
/// history accumulates per conversation, and every live subscriber of the
/// connected identity sees delivered messages.
#[derive(Clone, Default)]
pub struct InMemoryGateway {
    state: Arc<Mutex<NetworkState>>,
}

#[derive(Default)]
struct NetworkState {
    connected: Option<(Identity, Environment)>,
    contacts: HashSet<String>,
    conversations: HashMap<String, Conversation>,
    history: HashMap<String, Vec<Message>>,
    subscribers: HashMap<u64, Sender<Message>>,
    next_subscriber: u64,
    connect_failures: u32,
    history_failures: u32,
}

impl NetworkState {
    fn broadcast(&mut self, message: &Message) {
        self.subscribers
            .retain(|_, sender| sender.send(message.clone()).is_ok());
    }
}

impl InMemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark an address as reachable, as if it had published its contact
    /// bundle from another client.
    pub fn publish_contact(&self, address: &Identity) {
        self.state
            .lock()
            .unwrap()
            .contacts
            .insert(address.as_str().to_string());
    }

    /// Deliver a message from the network side: appended to conversation
    /// history and broadcast to live subscribers.
    pub fn deliver(&self, message: Message) {
        let mut state = self.state.lock().unwrap();
        state
            .history
            .entry(message.conversation_id.clone())
            .or_default()
            .push(message.clone());
        state.broadcast(&message);
    }

    /// Build a text message as the network would materialize one.
    pub fn text_message(conversation: &Conversation, sender: &Identity, text: &str) -> Message {
        let content = EncodedContent {
            type_id: TextCodec::content_type_id(),
            parameters: HashMap::new(),
            content: text.as_bytes().to_vec(),
        };
        Message {
            id: uuid::Uuid::new_v4().to_string(),
            conversation_id: conversation.id.clone(),
            sender: sender.clone(),
            sent_at: now_ms(),
            content,
        }
    }

    /// Make the next `connect` call fail, for exercising bootstrap failure
    /// paths.
    pub fn fail_next_connect(&self) {
        self.state.lock().unwrap().connect_failures += 1;
    }

    /// Make the next `load_history` call fail.
    pub fn fail_next_history_load(&self) {
        self.state.lock().unwrap().history_failures += 1;
    }

    /// Number of live subscriptions; lets callers assert release on cancel.
    pub fn subscriber_count(&self) -> usize {
        self.state.lock().unwrap().subscribers.len()
    }
}

impl MessagingGateway for InMemoryGateway {
    fn connect(
        &self,
        identity: &Identity,
        _keys: &KeyBundle,
        environment: Environment,
    ) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.connect_failures > 0 {
            state.connect_failures -= 1;
            return Err(Error::NetworkConnect("injected connect failure".to_string()));
        }
        state.connected = Some((identity.clone(), environment));
        // connecting publishes the contact bundle
        state.contacts.insert(identity.as_str().to_string());
        Ok(())
    }

    fn disconnect(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.connected = None;
        // dropping the senders disconnects every live receiver
        state.subscribers.clear();
        Ok(())
    }

    fn can_message(&self, peer: &Identity) -> Result<bool> {
        Ok(self.state.lock().unwrap().contacts.contains(peer.as_str()))
    }

    fn find_or_create_conversation(
        &self,
        local: &Identity,
        peer: &Identity,
    ) -> Result<Conversation> {
        let mut state = self.state.lock().unwrap();
        let id = Conversation::derive_id(local, peer);
        let conversation = state
            .conversations
            .entry(id)
            .or_insert_with(|| Conversation::between(local, peer));
        Ok(conversation.clone())
    }

    fn load_history(&self, conversation: &Conversation) -> Result<Vec<Message>> {
        let mut state = self.state.lock().unwrap();
        if state.history_failures > 0 {
            state.history_failures -= 1;
            return Err(Error::Storage("injected history failure".to_string()));
        }
        Ok(state
            .history
            .get(&conversation.id)
            .cloned()
            .unwrap_or_default())
    }

    fn subscribe_all(&self) -> Result<Subscription> {
        let (sender, receiver) = crossbeam_channel::unbounded();
        let mut state = self.state.lock().unwrap();
        let id = state.next_subscriber;
        state.next_subscriber += 1;
        state.subscribers.insert(id, sender);

        let release_state = self.state.clone();
        Ok(Subscription {
            receiver,
            unsubscribe: Box::new(move || {
                release_state.lock().unwrap().subscribers.remove(&id);
            }),
        })
    }

    fn send(&self, conversation: &Conversation, content: EncodedContent) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        let Some((sender_identity, _)) = state.connected.clone() else {
            return Err(Error::NetworkConnect("not connected".to_string()));
        };
        let message = Message {
            id: uuid::Uuid::new_v4().to_string(),
            conversation_id: conversation.id.clone(),
            sender: sender_identity,
            sent_at: now_ms(),
            content,
        };
        state
            .history
            .entry(message.conversation_id.clone())
            .or_default()
            .push(message.clone());
        state.broadcast(&message);
        Ok(message.id)
    }
}
