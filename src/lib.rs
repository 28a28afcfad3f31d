//! A verifiable credential wallet engine.
//!
//! A [`Wallet`] holds a user's DID keys and verifiable credentials, and
//! mediates the operations performed with them: issuing, proving, verifying
//! and deriving credentials, querying them, and driving the DIDComm
//! protocols exchanging them with other agents.
//!
//! # Usage
//!
//! ```ignore
//! use std::sync::Arc;
//!
//! use vcwallet::{
//!     content::{AddOptions, ContentType},
//!     credential::ProofOptions,
//!     lock::UnlockOptions,
//!     profile::ProfileOptions,
//!     storage::MemoryStoreProvider,
//!     Provider, Wallet,
//! };
//!
//! // Setup the collaborators shared by every wallet.
//! let provider = Provider::builder()
//!     .with_storage_provider(Arc::new(MemoryStoreProvider::new()))
//!     .with_vdr(vdr)
//!     .build()
//!     .await?;
//!
//! // Create a profile once per user, then load and unlock the wallet.
//! Wallet::create_profile("alice", &provider, ProfileOptions::passphrase("secret")).await?;
//! let wallet = Wallet::new("alice", &provider).await?;
//! wallet.open(UnlockOptions::passphrase("secret")).await?;
//!
//! // Import a key and sign a credential with it.
//! wallet.add(ContentType::Key, key_jwk, AddOptions::default()).await?;
//! let signed = wallet.issue(credential, ProofOptions::new(did)).await?;
//!
//! wallet.close().await;
//! ```
//!
//! # Locking
//!
//! A wallet is unlocked with the secret matching its profile's key management
//! strategy: a passphrase, a caller supplied [`SecretLock`], or a bearer token
//! for a remote key server. Unlocking mints a [`WalletToken`] carrying the
//! unlocked key manager. While the wallet is locked every operation fails with
//! [`WalletError::WalletLocked`].
//!
//! [`SecretLock`]: crate::kms::SecretLock
//! [`WalletToken`]: crate::lock::WalletToken
//!
//! # Queries
//!
//! Stored credentials are queried with [`QuerySpec`]s of type
//! `PresentationExchange`, `QueryByExample`, `QueryByFrame` or `DIDAuth`,
//! each yielding an unsigned presentation of the matching credentials.
//!
//! [`QuerySpec`]: crate::query::QuerySpec
//!
//! # Protocols
//!
//! The wallet does not implement DIDComm. The protocol services provided to
//! the [`Provider`] are driven by the [`ProtocolOrchestrator`], which waits for
//! their state events to turn asynchronous exchanges into call results.
//!
//! [`ProtocolOrchestrator`]: crate::didcomm::ProtocolOrchestrator

pub mod config;
pub mod content;
pub mod core;
pub mod credential;
pub mod didcomm;
pub mod error;
pub mod kms;
pub mod lock;
pub mod manifest;
pub mod profile;
pub mod provider;
pub mod query;
pub mod storage;
pub mod utils;
pub mod wallet;

pub use error::{Result, WalletError};
pub use provider::{Provider, ProviderBuilder};
pub use serde_json_path::JsonPath;
pub use wallet::Wallet;
