//! Core session and synchronization layer for a wallet-identity chat
//! client.
//!
//! The library bridges a wallet address to a decentralized messaging
//! network: it caches a per-identity key bundle, bootstraps an
//! authenticated session, binds the conversation with a fixed peer, and
//! merges live traffic into an append-only, duplicate-free message list.
//! The network itself sits behind the [`MessagingGateway`] trait; an
//! in-process implementation ships for tests and offline use.

pub mod codec;
pub mod conversation;
pub mod error;
pub mod file_storage;
pub mod gateway;
pub mod key_store;
pub mod memory_gateway;
pub mod message_list;
pub mod session;
pub mod signer;
pub mod storage;
pub mod sync;
pub mod types;

pub use codec::{CodecRegistry, ContentCodec, ContentTypeId, EncodedContent, TextCodec};
pub use error::{Error, Result};
pub use file_storage::FileStorageAdapter;
pub use gateway::{MessagingGateway, Subscription, Unsubscribe};
pub use key_store::KeyStore;
pub use memory_gateway::InMemoryGateway;
pub use message_list::MessageList;
pub use session::{IdentitySession, Session, SessionPhase};
pub use signer::{derivation_challenge, derive_key_bundle, WalletSigner};
pub use storage::{InMemoryStorage, StorageAdapter};
pub use sync::{SyncHandle, SyncUpdate};
pub use types::{now_ms, Conversation, Environment, Identity, KeyBundle, Message};
