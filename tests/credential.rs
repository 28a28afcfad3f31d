use std::sync::Arc;

use base64::prelude::*;
use serde_json::{json, Value};
use vcwallet::{
    content::{AddOptions, ContentType},
    credential::{DeriveOptions, DeriveSource, ProofOptions, ProveSource, VerifySource},
    storage::MemoryStoreProvider,
    WalletError,
};


use mocks::*;

const ISSUER_DID: &str = "did:example:issuer";

#[tokio::test]
async fn issue_and_verify() {
    let provider = provider(Arc::new(MemoryStoreProvider::new()), |b| b).await;
    let wallet = open_wallet(&provider).await;
    let issuer = create_did(&wallet, ISSUER_DID).await;

    let credential = issued_by(
        credential("urn:uuid:degree", &["UniversityDegreeCredential"]),
        &issuer,
    );
    let signed = wallet
        .issue(
            credential.to_string().as_bytes(),
            ProofOptions::new(&issuer),
        )
        .await
        .unwrap();

    let proof = &signed["proof"];
    assert_eq!(proof["type"], "Ed25519Signature2018");
    assert_eq!(proof["proofPurpose"], "assertionMethod");
    assert_eq!(proof["verificationMethod"], "did:example:issuer#key-1");
    assert!(proof["jws"].as_str().unwrap().contains(".."));

    let raw = signed.to_string().into_bytes();
    assert!(wallet
        .verify(VerifySource::RawCredential(raw.clone()))
        .await
        .unwrap());

    wallet
        .add(ContentType::Credential, &raw, AddOptions::default())
        .await
        .unwrap();
    assert!(wallet
        .verify(VerifySource::StoredCredential("urn:uuid:degree".into()))
        .await
        .unwrap());

    let mut tampered = signed.clone();
    tampered["credentialSubject"]["name"] = json!("Mallory");
    assert!(matches!(
        wallet
            .verify(VerifySource::RawCredential(tampered.to_string().into_bytes()))
            .await,
        Err(WalletError::InvalidSignature(_))
    ));

    assert!(matches!(
        wallet
            .verify(VerifySource::RawCredential(credential.to_string().into_bytes()))
            .await,
        Err(WalletError::InvalidSignature(_))
    ));
}

#[tokio::test]
async fn issue_with_options() {
    let provider = provider(Arc::new(MemoryStoreProvider::new()), |b| b).await;
    let wallet = open_wallet(&provider).await;
    let issuer = create_did(&wallet, ISSUER_DID).await;

    let signed = wallet
        .issue(
            issued_by(credential("urn:uuid:degree", &[]), &issuer)
                .to_string()
                .as_bytes(),
            ProofOptions::new(&issuer)
                .with_verification_method("did:example:issuer#key-1")
                .with_proof_type("JsonWebSignature2020")
                .with_challenge("challenge")
                .with_domain("example.com"),
        )
        .await
        .unwrap();
    assert_eq!(signed["proof"]["type"], "JsonWebSignature2020");
    assert_eq!(signed["proof"]["challenge"], "challenge");
    assert_eq!(signed["proof"]["domain"], "example.com");

    // A second proof turns `proof` into an array, and both verify.
    let twice = wallet
        .issue(signed.to_string().as_bytes(), ProofOptions::new(&issuer))
        .await
        .unwrap();
    assert_eq!(twice["proof"].as_array().map(Vec::len), Some(2));
    assert!(wallet
        .verify(VerifySource::RawCredential(twice.to_string().into_bytes()))
        .await
        .unwrap());

    assert!(matches!(
        wallet
            .issue(b"{\"id\": \"not a credential\"}", ProofOptions::new(&issuer))
            .await,
        Err(WalletError::UnknownCredentialStructure(_))
    ));
}

#[tokio::test]
async fn issue_without_imported_key() {
    let provider = provider(Arc::new(MemoryStoreProvider::new()), |b| b).await;
    let wallet = open_wallet(&provider).await;

    let response = json!({
        "didDocument": {
            "id": ISSUER_DID,
            "verificationMethod": [{
                "id": "#key-1",
                "type": "JsonWebKey2020",
                "controller": ISSUER_DID,
                "publicKeyJwk": {"kty": "OKP", "crv": "Ed25519", "x": "11qYAYKxCrfVS_7TyWQHOg7hcvPapiMlrwIaaPcHURo"}
            }],
            "assertionMethod": ["#key-1"]
        }
    });
    wallet
        .add(
            ContentType::DidResolutionResponse,
            response.to_string().as_bytes(),
            AddOptions::default(),
        )
        .await
        .unwrap();

    let err = wallet
        .issue(
            credential("urn:uuid:degree", &[]).to_string().as_bytes(),
            ProofOptions::new(ISSUER_DID),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, WalletError::KeyNotFound(_)), "{err}");
}

#[tokio::test]
async fn prove_and_verify() {
    let provider = provider(Arc::new(MemoryStoreProvider::new()), |b| b).await;
    let wallet = open_wallet(&provider).await;
    let issuer = create_did(&wallet, ISSUER_DID).await;
    let holder = create_did(&wallet, MY_DID).await;

    let mut signed = Vec::new();
    for id in ["urn:uuid:first", "urn:uuid:second"] {
        signed.push(
            wallet
                .issue(
                    issued_by(credential(id, &[]), &issuer).to_string().as_bytes(),
                    ProofOptions::new(&issuer),
                )
                .await
                .unwrap(),
        );
    }
    wallet
        .add(
            ContentType::Credential,
            signed[0].to_string().as_bytes(),
            AddOptions::default(),
        )
        .await
        .unwrap();

    let presentation = wallet
        .prove(
            ProofOptions::new(&holder).with_challenge("nonce"),
            vec![
                ProveSource::StoredCredential("urn:uuid:first".into()),
                ProveSource::Credential(signed[1].clone()),
            ],
        )
        .await
        .unwrap();
    assert_eq!(presentation["holder"], MY_DID);
    assert_eq!(presentation["proof"]["proofPurpose"], "authentication");
    assert_eq!(
        presentation["verifiableCredential"].as_array().map(Vec::len),
        Some(2)
    );

    let raw = presentation.to_string().into_bytes();
    assert!(wallet
        .verify(VerifySource::RawPresentation(raw.clone()))
        .await
        .unwrap());

    // Re-proving a presentation keeps its credentials.
    let extended = wallet
        .prove(
            ProofOptions::new(&holder),
            vec![ProveSource::RawPresentation(raw)],
        )
        .await
        .unwrap();
    assert_eq!(
        extended["verifiableCredential"].as_array().map(Vec::len),
        Some(2)
    );

    let mut tampered = presentation.clone();
    tampered["verifiableCredential"][1]["credentialSubject"]["name"] = json!("Mallory");
    assert!(matches!(
        wallet
            .verify(VerifySource::RawPresentation(tampered.to_string().into_bytes()))
            .await,
        Err(WalletError::InvalidSignature(_))
    ));

    let raw = presentation.to_string().into_bytes();
    assert!(matches!(
        wallet
            .prove(
                ProofOptions::new(&holder),
                vec![
                    ProveSource::RawPresentation(raw.clone()),
                    ProveSource::RawPresentation(raw),
                ],
            )
            .await,
        Err(WalletError::InvalidContent(_))
    ));
}

#[tokio::test]
async fn verify_rejects_foreign_signers() {
    let provider = provider(Arc::new(MemoryStoreProvider::new()), |b| b).await;
    let wallet = open_wallet(&provider).await;
    let issuer = create_did(&wallet, ISSUER_DID).await;
    let mallory = create_did(&wallet, "did:example:mallory").await;

    // Signed by a key of someone other than the issuer.
    let forged = wallet
        .issue(
            issued_by(credential("urn:uuid:forged", &[]), &issuer)
                .to_string()
                .as_bytes(),
            ProofOptions::new(&mallory),
        )
        .await
        .unwrap();
    let err = wallet
        .verify(VerifySource::RawCredential(forged.to_string().into_bytes()))
        .await
        .unwrap_err();
    assert!(matches!(err, WalletError::InvalidSignature(_)), "{err}");

    // Signed by the issuer, with a key it only uses for authentication.
    let auth_only = create_did_for(&wallet, "did:example:auth-only", &["authentication"]).await;
    let signed = wallet
        .issue(
            issued_by(credential("urn:uuid:auth-only", &[]), &auth_only)
                .to_string()
                .as_bytes(),
            ProofOptions::new(&auth_only).with_verification_method("#key-1"),
        )
        .await
        .unwrap();
    assert_eq!(signed["proof"]["proofPurpose"], "assertionMethod");
    let err = wallet
        .verify(VerifySource::RawCredential(signed.to_string().into_bytes()))
        .await
        .unwrap_err();
    assert!(matches!(err, WalletError::InvalidSignature(_)), "{err}");

    // Holders may present credentials of other issuers.
    let valid = wallet
        .issue(
            issued_by(credential("urn:uuid:valid", &[]), &issuer)
                .to_string()
                .as_bytes(),
            ProofOptions::new(&issuer),
        )
        .await
        .unwrap();
    let mut presentation = json!({
        "@context": ["https://www.w3.org/2018/credentials/v1"],
        "type": ["VerifiablePresentation"],
        "verifiableCredential": [valid]
    });
    presentation = wallet
        .prove(
            ProofOptions::new(&mallory),
            vec![ProveSource::RawPresentation(presentation.to_string().into_bytes())],
        )
        .await
        .unwrap();
    assert_eq!(presentation["holder"], "did:example:mallory");
    assert!(wallet
        .verify(VerifySource::RawPresentation(presentation.to_string().into_bytes()))
        .await
        .unwrap());
}

#[tokio::test]
async fn derive() {
    let provider = provider(Arc::new(MemoryStoreProvider::new()), |b| {
        b.with_selective_disclosure(Arc::new(BbsMock))
    })
    .await;
    let wallet = open_wallet(&provider).await;

    let signed = bbs_credential("urn:uuid:bbs");
    wallet
        .add(
            ContentType::Credential,
            signed.to_string().as_bytes(),
            AddOptions::default(),
        )
        .await
        .unwrap();

    let options = DeriveOptions {
        nonce: "lEixQKDQvRecCifKl789TQj+Ii6YWDLSwn3AxR0VpPJ1QV5htod/0VCchVf1zVM0y2E=".into(),
        frame: json!({
            "@context": ["https://www.w3.org/2018/credentials/v1"],
            "type": ["VerifiableCredential", "UniversityDegreeCredential"],
            "@explicit": true,
            "credentialSubject": {"@explicit": true, "degree": {}}
        }),
    };
    let derived = wallet
        .derive(
            DeriveSource::StoredCredential("urn:uuid:bbs".into()),
            options.clone(),
        )
        .await
        .unwrap();

    let Value::Object(proof) = &derived["proof"] else {
        panic!("expected exactly one derived proof, got {}", derived["proof"]);
    };
    assert_eq!(proof["type"], "BbsBlsSignatureProof2020");
    assert_eq!(
        proof["nonce"],
        BASE64_STANDARD.encode(options.nonce.as_bytes())
    );
    assert_eq!(proof["verificationMethod"], signed["proof"]["verificationMethod"]);
    assert_eq!(
        derived["credentialSubject"]["degree"],
        signed["credentialSubject"]["degree"]
    );
    assert!(derived["credentialSubject"].get("name").is_none());

    let unsigned = credential("urn:uuid:unsigned", &[]);
    assert!(matches!(
        wallet
            .derive(DeriveSource::Credential(unsigned), options.clone())
            .await,
        Err(WalletError::NoDeriveProofPresent)
    ));
    assert!(matches!(
        wallet
            .derive(DeriveSource::StoredCredential(String::new()), options)
            .await,
        Err(WalletError::InvalidDeriveRequest(_))
    ));
}

#[tokio::test]
async fn derive_needs_selective_disclosure_service() {
    let provider = provider(Arc::new(MemoryStoreProvider::new()), |b| b).await;
    let wallet = open_wallet(&provider).await;

    let err = wallet
        .derive(
            DeriveSource::Credential(bbs_credential("urn:uuid:bbs")),
            DeriveOptions::default(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, WalletError::ServiceUnavailable(_)));
}
