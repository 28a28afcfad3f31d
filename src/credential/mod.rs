//! Issue, prove, verify and derive verifiable credentials.

use std::sync::Arc;

use anyhow::{anyhow, Context};
use base64::prelude::*;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};
use tracing::debug;

use crate::{
    content::{ContentStore, ContentType},
    core::did::{did_from_url, ProofPurpose, WalletDidResolver},
    error::{Result, WalletError},
    kms::{key_id, KeyPair, KeyType},
    lock::WalletToken,
};

pub mod frame;
pub mod presentation;
pub mod proof;
pub mod suite;

use presentation::VerifiablePresentationBuilder;
use proof::*;
pub use suite::{JwsSuite, SelectiveDisclosure, SignatureSuite};

/// Options for the proof added by [CredentialOps::issue] and
/// [CredentialOps::prove].
#[derive(Debug, Clone, Default)]
pub struct ProofOptions {
    /// DID whose key signs.
    pub controller: String,
    /// Verification method of the controller's DID document. Defaults to the
    /// first method for the proof purpose.
    pub verification_method: Option<String>,
    /// Signature suite proof type. Defaults to the first suite supporting
    /// the controller's key type.
    pub proof_type: Option<String>,
    pub proof_purpose: Option<ProofPurpose>,
    pub created: Option<DateTime<Utc>>,
    pub domain: Option<String>,
    pub challenge: Option<String>,
}

impl ProofOptions {
    pub fn new(controller: impl Into<String>) -> Self {
        Self {
            controller: controller.into(),
            ..Default::default()
        }
    }

    pub fn with_verification_method(mut self, verification_method: impl Into<String>) -> Self {
        self.verification_method = Some(verification_method.into());
        self
    }

    pub fn with_proof_type(mut self, proof_type: impl Into<String>) -> Self {
        self.proof_type = Some(proof_type.into());
        self
    }

    pub fn with_challenge(mut self, challenge: impl Into<String>) -> Self {
        self.challenge = Some(challenge.into());
        self
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }
}

/// Material bundled by [CredentialOps::prove].
#[derive(Debug, Clone)]
pub enum ProveSource {
    /// Id of a credential stored in the wallet.
    StoredCredential(String),
    RawCredential(Vec<u8>),
    Credential(Value),
    /// A presentation to extend. At most one may be given.
    RawPresentation(Vec<u8>),
}

/// What [CredentialOps::verify] checks.
#[derive(Debug, Clone)]
pub enum VerifySource {
    StoredCredential(String),
    RawCredential(Vec<u8>),
    /// Checks the presentation proof and the proofs of every embedded
    /// credential.
    RawPresentation(Vec<u8>),
}

/// Credential to derive a selective disclosure from.
#[derive(Debug, Clone)]
pub enum DeriveSource {
    StoredCredential(String),
    RawCredential(Vec<u8>),
    Credential(Value),
}

#[derive(Debug, Clone, Default)]
pub struct DeriveOptions {
    pub nonce: String,
    pub frame: Value,
}

/// Credential operations backed by the wallet's content, DID resolution and
/// signature suites.
#[derive(Debug, Clone)]
pub struct CredentialOps {
    content: ContentStore,
    resolver: WalletDidResolver,
    suites: Vec<Arc<dyn SignatureSuite>>,
    selective_disclosure: Option<Arc<dyn SelectiveDisclosure>>,
}

impl CredentialOps {
    pub fn new(
        content: ContentStore,
        resolver: WalletDidResolver,
        suites: Vec<Arc<dyn SignatureSuite>>,
        selective_disclosure: Option<Arc<dyn SelectiveDisclosure>>,
    ) -> Self {
        Self {
            content,
            resolver,
            suites,
            selective_disclosure,
        }
    }

    /// Add a proof to a credential on behalf of `options.controller`.
    pub async fn issue(
        &self,
        token: &WalletToken,
        credential: &[u8],
        options: ProofOptions,
    ) -> Result<Value> {
        let mut credential = parse_credential(credential)?;
        self.add_linked_data_proof(token, &mut credential, options, ProofPurpose::AssertionMethod)
            .await?;
        Ok(credential)
    }

    /// Bundle credentials into a presentation held and signed by
    /// `options.controller`.
    pub async fn prove(
        &self,
        token: &WalletToken,
        options: ProofOptions,
        sources: Vec<ProveSource>,
    ) -> Result<Value> {
        let mut presentation = None;
        let mut credentials = Vec::new();

        for source in sources {
            match source {
                ProveSource::StoredCredential(id) => credentials.push(
                    self.content
                        .get_json(ContentType::Credential, &id)
                        .await?,
                ),
                ProveSource::RawCredential(raw) => credentials.push(parse_credential(&raw)?),
                ProveSource::Credential(credential) => {
                    check_credential(&credential)?;
                    credentials.push(credential);
                }
                ProveSource::RawPresentation(raw) => {
                    if presentation.is_some() {
                        return Err(WalletError::InvalidContent(
                            "only one presentation can be proved at a time".into(),
                        ));
                    }
                    presentation = Some(parse_presentation(&raw)?);
                }
            }
        }

        let builder = match presentation {
            Some(presentation) => VerifiablePresentationBuilder::from_presentation(presentation),
            None => VerifiablePresentationBuilder::new(),
        };
        let mut presentation = credentials
            .into_iter()
            .fold(builder, VerifiablePresentationBuilder::add_verifiable_credential)
            .set_holder(options.controller.clone())
            .build();

        self.add_linked_data_proof(token, &mut presentation, options, ProofPurpose::Authentication)
            .await?;
        Ok(presentation)
    }

    /// Verify every proof of a credential or presentation.
    ///
    /// Returns `Ok(true)` or fails, with [WalletError::InvalidSignature] if a
    /// proof is missing or does not match. Each proof must be made with a
    /// method controlled by the credential issuer or presentation holder, and
    /// listed in its DID document for the proof purpose.
    pub async fn verify(&self, source: VerifySource) -> Result<bool> {
        match source {
            VerifySource::StoredCredential(id) => {
                let credential = self.content.get_json(ContentType::Credential, &id).await?;
                check_credential(&credential)?;
                self.verify_proofs(&credential).await?;
            }
            VerifySource::RawCredential(raw) => {
                self.verify_proofs(&parse_credential(&raw)?).await?;
            }
            VerifySource::RawPresentation(raw) => {
                let presentation = parse_presentation(&raw)?;
                self.verify_proofs(&presentation).await?;
                for credential in embedded_credentials(&presentation) {
                    check_credential(credential)?;
                    self.verify_proofs(credential).await?;
                }
            }
        }
        Ok(true)
    }

    /// Derive a selectively disclosed credential from one signed with
    /// `BbsBlsSignature2020`.
    pub async fn derive(&self, source: DeriveSource, options: DeriveOptions) -> Result<Value> {
        let credential = match source {
            DeriveSource::StoredCredential(id) => {
                if id.is_empty() {
                    return Err(WalletError::InvalidDeriveRequest(
                        "stored credential id is empty".into(),
                    ));
                }
                let raw = self.content.get(ContentType::Credential, &id).await?;
                parse_credential(&raw)?
            }
            DeriveSource::RawCredential(raw) => parse_credential(&raw)?,
            DeriveSource::Credential(credential) => {
                check_credential(&credential)?;
                credential
            }
        };

        self.derive_credential(&credential, &options.frame, options.nonce.as_bytes())
            .await
    }

    pub(crate) async fn derive_credential(
        &self,
        credential: &Value,
        frame: &Value,
        nonce: &[u8],
    ) -> Result<Value> {
        let signature = proofs(credential)
            .into_iter()
            .find(|proof| proof_type(proof) == Some(BBS_SIGNATURE_2020))
            .ok_or(WalletError::NoDeriveProofPresent)?;
        let selective_disclosure = self.selective_disclosure()?;

        let mut revealed = frame::apply_frame(&without_proof(credential), frame);
        let proof_value = selective_disclosure
            .derive_proof_value(credential, &revealed, nonce)
            .await
            .context("failed to derive selective disclosure proof")?;

        let mut derived = Map::new();
        derived.insert("type".into(), BBS_SIGNATURE_PROOF_2020.into());
        for property in ["created", "verificationMethod", "proofPurpose"] {
            if let Some(value) = signature.get(property) {
                derived.insert(property.into(), value.clone());
            }
        }
        derived.insert("nonce".into(), BASE64_STANDARD.encode(nonce).into());
        derived.insert("proofValue".into(), proof_value.into());

        add_proof(&mut revealed, Value::Object(derived))?;
        Ok(revealed)
    }

    /// Create a key pair in the unlocked key manager.
    pub async fn create_key_pair(&self, token: &WalletToken, key_type: KeyType) -> Result<KeyPair> {
        let pair = token.key_manager().create(key_type).await?;
        debug!(key_id = %pair.key_id, %key_type, "key pair created");
        Ok(pair)
    }

    fn selective_disclosure(&self) -> Result<&Arc<dyn SelectiveDisclosure>> {
        self.selective_disclosure
            .as_ref()
            .ok_or(WalletError::ServiceUnavailable("selective disclosure"))
    }

    fn suite(&self, proof_type: &str) -> Option<&Arc<dyn SignatureSuite>> {
        self.suites
            .iter()
            .find(|suite| suite.proof_type() == proof_type)
    }

    async fn add_linked_data_proof(
        &self,
        token: &WalletToken,
        document: &mut Value,
        options: ProofOptions,
        default_purpose: ProofPurpose,
    ) -> Result<()> {
        if options.controller.is_empty() {
            return Err(anyhow!("proof controller is required").into());
        }

        let did_document = self
            .resolver
            .resolve(did_from_url(&options.controller))
            .await?;
        let purpose = options.proof_purpose.unwrap_or(default_purpose);
        let method = match &options.verification_method {
            Some(id) => did_document.verification_method(id).with_context(|| {
                format!("verification method `{id}` not found in `{}`", did_document.id)
            })?,
            None => did_document.method_for(purpose).with_context(|| {
                format!(
                    "`{}` has no verification method for {}",
                    did_document.id,
                    purpose.as_str()
                )
            })?,
        };
        let (key_type, public_key) = method.public_key()?;

        let suite = match &options.proof_type {
            Some(proof_type) => self
                .suite(proof_type)
                .with_context(|| format!("unsupported proof type {proof_type}"))?,
            None => self
                .suites
                .iter()
                .find(|suite| suite.supports(key_type))
                .ok_or_else(|| WalletError::UnsupportedKeyType(key_type.to_string()))?,
        };
        if !suite.supports(key_type) {
            return Err(WalletError::UnsupportedKeyType(format!(
                "{key_type} cannot sign {} proofs",
                suite.proof_type()
            )));
        }

        let created = options.created.unwrap_or_else(Utc::now);
        let mut proof = Map::new();
        proof.insert("type".into(), suite.proof_type().into());
        proof.insert(
            "created".into(),
            created.to_rfc3339_opts(SecondsFormat::Secs, true).into(),
        );
        proof.insert(
            "verificationMethod".into(),
            did_document.absolute_id(&method.id).into_owned().into(),
        );
        proof.insert("proofPurpose".into(), purpose.as_str().into());
        if let Some(domain) = options.domain {
            proof.insert("domain".into(), domain.into());
        }
        if let Some(challenge) = options.challenge {
            proof.insert("challenge".into(), challenge.into());
        }

        let jws = suite
            .sign(
                token.key_manager().as_ref(),
                &key_id(&public_key),
                key_type,
                &signing_input(document, &proof),
            )
            .await?;
        proof.insert("jws".into(), jws.into());

        debug!(
            controller = %options.controller,
            proof_type = suite.proof_type(),
            "linked data proof added"
        );
        add_proof(document, Value::Object(proof))
    }

    async fn verify_proofs(&self, document: &Value) -> Result<()> {
        let proofs = proofs(document);
        if proofs.is_empty() {
            return Err(WalletError::InvalidSignature("document has no proof".into()));
        }
        let signer = expected_signer(document);
        if signer.is_none() && !has_type(document, VERIFIABLE_PRESENTATION_TYPE) {
            return Err(WalletError::InvalidSignature("credential has no issuer".into()));
        }

        for proof in proofs {
            let Some(proof_object) = proof.as_object() else {
                return Err(WalletError::InvalidSignature("proof is not a JSON object".into()));
            };
            let proof_type = proof_type(proof)
                .ok_or_else(|| WalletError::InvalidSignature("proof has no type".into()))?;
            let method_id = proof
                .get("verificationMethod")
                .and_then(Value::as_str)
                .ok_or_else(|| {
                    WalletError::InvalidSignature("proof has no verification method".into())
                })?;

            let did_document = self.resolver.resolve(did_from_url(method_id)).await?;
            let method = did_document.verification_method(method_id).ok_or_else(|| {
                WalletError::InvalidSignature(format!(
                    "verification method `{method_id}` not found"
                ))
            })?;

            if let Some(signer) = signer {
                if method.controller != signer {
                    return Err(WalletError::InvalidSignature(format!(
                        "`{method_id}` is controlled by `{}`, not `{signer}`",
                        method.controller
                    )));
                }
            }
            let purpose = proof
                .get("proofPurpose")
                .and_then(Value::as_str)
                .ok_or_else(|| WalletError::InvalidSignature("proof has no purpose".into()))?
                .parse::<ProofPurpose>()
                .map_err(|e| WalletError::InvalidSignature(format!("{e}")))?;
            if !did_document.authorizes(method, purpose) {
                return Err(WalletError::InvalidSignature(format!(
                    "`{method_id}` is not listed for {}",
                    purpose.as_str()
                )));
            }

            let verified = if matches!(proof_type, BBS_SIGNATURE_2020 | BBS_SIGNATURE_PROOF_2020) {
                self.selective_disclosure()?
                    .verify_proof(&without_proof(document), proof, method)
                    .await
            } else {
                let suite = self.suite(proof_type).ok_or_else(|| {
                    WalletError::InvalidSignature(format!("unsupported proof type {proof_type}"))
                })?;
                let jws = proof
                    .get("jws")
                    .and_then(Value::as_str)
                    .ok_or_else(|| WalletError::InvalidSignature("proof has no jws".into()))?;
                method.public_key().and_then(|(key_type, public_key)| {
                    suite.verify(
                        key_type,
                        &public_key,
                        &signing_input(document, proof_object),
                        jws,
                    )
                })
            };

            match verified {
                Ok(true) => {}
                Ok(false) => {
                    return Err(WalletError::InvalidSignature(format!(
                        "{proof_type} proof by `{method_id}` does not match"
                    )))
                }
                Err(e) => return Err(WalletError::InvalidSignature(format!("{e:#}"))),
            }
        }
        Ok(())
    }
}
