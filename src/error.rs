/// Wallet error.
///
/// Every public wallet operation fails with one of these variants. Errors
/// raised by external collaborators (storage, key servers, protocol services)
/// are wrapped with the context of the failing operation and surface as
/// [`WalletError::Protocol`] or [`WalletError::Other`].
#[derive(Debug, thiserror::Error)]
pub enum WalletError {
    /// No profile exists for the requested user.
    #[error("profile does not exist")]
    ProfileNotFound,

    /// A profile already exists for the requested user.
    #[error("profile already exists")]
    ProfileAlreadyExists,

    /// Zero or conflicting key management strategies were selected.
    #[error("invalid create profile options: {0}")]
    InvalidProfileOptions(String),

    /// Zero or conflicting unlock methods were selected, or the method does
    /// not match the profile's key management strategy.
    #[error("invalid unlock options: {0}")]
    InvalidUnlockOptions(String),

    /// The wallet is already open.
    #[error("wallet already unlocked")]
    AlreadyUnlocked,

    /// The unlock secret could not open the profile's master key.
    #[error("failed to unlock wallet: {0}")]
    AuthenticationFailed(String),

    /// The wallet is closed, or the token has expired.
    #[error("wallet locked")]
    WalletLocked,

    /// Unknown content type name.
    #[error("invalid content type `{0}`")]
    InvalidContentType(String),

    /// Content could not be parsed or has no usable identifier.
    #[error("invalid content: {0}")]
    InvalidContent(String),

    /// The requested content does not exist.
    #[error("data not found: {content_type} `{id}`")]
    ContentNotFound { content_type: String, id: String },

    /// The referenced collection does not exist.
    #[error("collection `{0}` not found")]
    CollectionNotFound(String),

    /// Content of this type cannot be overwritten.
    #[error("content already exists: {content_type} `{id}`")]
    DuplicateContent { content_type: String, id: String },

    /// Query type is not one of the supported query types.
    #[error("unsupported query type `{0}`")]
    UnsupportedQueryType(String),

    /// Query was empty.
    #[error("no result found")]
    NoResultFound,

    /// A proof did not verify.
    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    /// Input is not a verifiable credential.
    #[error("credential type of unknown structure: {0}")]
    UnknownCredentialStructure(String),

    /// Credential has no proof supporting selective disclosure.
    #[error("no BbsBlsSignature2020 proof present")]
    NoDeriveProofPresent,

    /// Derive request did not identify a credential.
    #[error("invalid request to derive credential: {0}")]
    InvalidDeriveRequest(String),

    /// The keyset backing a key id could not be read.
    #[error("failed to read keyset: key `{0}` not found")]
    KeyNotFound(String),

    /// Key type is not supported by the key manager or signature suites.
    #[error("unsupported key type `{0}`")]
    UnsupportedKeyType(String),

    /// A collaborator required by the operation was not configured.
    #[error("{0} service is not configured")]
    ServiceUnavailable(&'static str),

    /// Waiting for a protocol to complete took longer than allowed.
    #[error("time out waiting for {0} to complete")]
    ProtocolTimeout(&'static str),

    /// Error relayed from a protocol service.
    #[error("{context}: {source}")]
    Protocol {
        context: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl WalletError {
    pub(crate) fn protocol(context: &'static str) -> impl FnOnce(anyhow::Error) -> Self {
        move |source| Self::Protocol { context, source }
    }

    pub(crate) fn content_not_found(content_type: impl ToString, id: impl ToString) -> Self {
        Self::ContentNotFound {
            content_type: content_type.to_string(),
            id: id.to_string(),
        }
    }
}

pub type Result<T, E = WalletError> = std::result::Result<T, E>;
