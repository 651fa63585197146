use crate::codec::{CodecRegistry, ContentCodec, EncodedContent};
use crate::signer::{derive_key_bundle, WalletSigner};
use crate::{
    Conversation, Environment, Error, Identity, KeyBundle, KeyStore, Message, MessagingGateway,
    Result,
};
use std::sync::{Arc, Mutex};

/// Where a bootstrap attempt currently stands. `Failed` is reachable from
/// any non-`Ready` state; recovery from it is re-invocation, never an
/// automatic retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    KeyResolving,
    NetworkConnecting,
    Ready,
    Failed,
}

/// Authenticated handle to the messaging network for one identity.
///
/// Holds the identity, its key bundle, the sealed codec set, and the
/// environment it connected against. Lifecycle is owned by the caller
/// through [`IdentitySession`]; there is no process-wide singleton.
pub struct Session {
    identity: Identity,
    environment: Environment,
    key_bundle: KeyBundle,
    codecs: CodecRegistry,
    gateway: Arc<dyn MessagingGateway>,
}

impl Session {
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn environment(&self) -> Environment {
        self.environment
    }

    pub fn key_bundle(&self) -> &KeyBundle {
        &self.key_bundle
    }

    pub fn codecs(&self) -> &CodecRegistry {
        &self.codecs
    }

    pub(crate) fn gateway(&self) -> &Arc<dyn MessagingGateway> {
        &self.gateway
    }

    /// Publish a text payload into a conversation; returns the message id.
    pub fn send_text(&self, conversation: &Conversation, text: &str) -> Result<String> {
        let content = self.codecs.encode_text(text)?;
        self.gateway.send(conversation, content)
    }

    /// Publish an already-encoded payload. The content type must be
    /// registered with this session.
    pub fn send(&self, conversation: &Conversation, content: EncodedContent) -> Result<String> {
        if !self.codecs.contains(&content.type_id) {
            return Err(Error::Codec(format!(
                "no codec registered for {}",
                content.type_id
            )));
        }
        self.gateway.send(conversation, content)
    }

    /// Decode a received payload with the session's codec set.
    pub fn decode(&self, message: &Message) -> Result<serde_json::Value> {
        self.codecs.decode(&message.content)
    }
}

/// Owns the bootstrap lifecycle of the network session for one wallet
/// identity: key resolution through the key store (or one interactive
/// wallet signature), network connect, codec registration, teardown.
pub struct IdentitySession {
    key_store: KeyStore,
    gateway: Arc<dyn MessagingGateway>,
    state: Mutex<BootstrapState>,
}

struct BootstrapState {
    phase: SessionPhase,
    session: Option<Arc<Session>>,
}

impl IdentitySession {
    pub fn new(key_store: KeyStore, gateway: Arc<dyn MessagingGateway>) -> Self {
        Self {
            key_store,
            gateway,
            state: Mutex::new(BootstrapState {
                phase: SessionPhase::Idle,
                session: None,
            }),
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.state.lock().unwrap().phase
    }

    pub fn is_ready(&self) -> bool {
        self.phase() == SessionPhase::Ready
    }

    pub fn session(&self) -> Option<Arc<Session>> {
        self.state.lock().unwrap().session.clone()
    }

    /// Bring up the session: resolve keys, connect, seal the codec set.
    ///
    /// Idempotent while ready: repeated invocations return the existing
    /// session without touching the signer or the network, so duplicate UI
    /// events cannot double-initialize. Any failure is terminal for this
    /// attempt and surfaced to the caller; a later call starts over.
    pub fn bootstrap(
        &self,
        signer: &dyn WalletSigner,
        environment: Environment,
        codecs: Vec<Arc<dyn ContentCodec>>,
    ) -> Result<Arc<Session>> {
        let mut state = self.state.lock().unwrap();
        if state.phase == SessionPhase::Ready {
            if let Some(session) = &state.session {
                return Ok(session.clone());
            }
        }

        state.phase = SessionPhase::KeyResolving;
        let identity = signer.address();
        let key_bundle = match self.resolve_keys(&identity, signer) {
            Ok(bundle) => bundle,
            Err(e) => {
                state.phase = SessionPhase::Failed;
                return Err(e);
            }
        };

        state.phase = SessionPhase::NetworkConnecting;
        if let Err(e) = self.gateway.connect(&identity, &key_bundle, environment) {
            state.phase = SessionPhase::Failed;
            return Err(e);
        }

        // codecs are sealed into the session before the handle is exposed
        let mut registry = CodecRegistry::new();
        for codec in codecs {
            registry.register(codec);
        }

        let session = Arc::new(Session {
            identity,
            environment,
            key_bundle,
            codecs: registry,
            gateway: self.gateway.clone(),
        });
        state.session = Some(session.clone());
        state.phase = SessionPhase::Ready;
        Ok(session)
    }

    /// Reuse the persisted bundle when one exists; otherwise derive a fresh
    /// one from a wallet signature. Storage trouble on either side degrades
    /// to an in-memory bundle rather than failing the bootstrap.
    fn resolve_keys(&self, identity: &Identity, signer: &dyn WalletSigner) -> Result<KeyBundle> {
        match self.key_store.load(identity) {
            Ok(Some(bundle)) => return Ok(bundle),
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(%identity, error = %e, "key store read failed, deriving in-memory bundle");
            }
        }

        let bundle = derive_key_bundle(signer)?;
        if let Err(e) = self.key_store.save(identity, &bundle) {
            tracing::warn!(%identity, error = %e, "key store write failed, continuing with in-memory bundle");
        }
        Ok(bundle)
    }

    /// Tear the session down: disconnect the gateway, drop the handle,
    /// return to `Idle`. Safe to call when nothing is live.
    pub fn dispose(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.session.take().is_some() {
            self.gateway.disconnect()?;
        }
        state.phase = SessionPhase::Idle;
        Ok(())
    }
}
