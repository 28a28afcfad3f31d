use std::{sync::Arc, time::Duration};

use serde_json::json;
use vcwallet::{
    content::{AddOptions, ContentType, GetAllOptions},
    credential::{DeriveOptions, DeriveSource, ProofOptions, ProveSource, VerifySource},
    didcomm::{ConcludeOptions, ConnectOptions, ProposeOptions},
    lock::UnlockOptions,
    manifest::ResolveManifestSource,
    profile::ProfileOptions,
    query::QuerySpec,
    storage::MemoryStoreProvider,
    Wallet, WalletError,
};


use mocks::*;

#[tokio::test]
async fn profile_lifecycle() {
    let provider = provider(Arc::new(MemoryStoreProvider::new()), |b| b).await;

    assert!(!Wallet::profile_exists(USER, &provider).await.unwrap());
    assert!(matches!(
        Wallet::new(USER, &provider).await,
        Err(WalletError::ProfileNotFound)
    ));

    Wallet::create_profile(USER, &provider, ProfileOptions::passphrase(PASSPHRASE))
        .await
        .unwrap();
    assert!(Wallet::profile_exists(USER, &provider).await.unwrap());
    assert!(matches!(
        Wallet::create_profile(USER, &provider, ProfileOptions::passphrase(PASSPHRASE)).await,
        Err(WalletError::ProfileAlreadyExists)
    ));

    assert!(matches!(
        Wallet::create_profile("bob", &provider, ProfileOptions::default()).await,
        Err(WalletError::InvalidProfileOptions(_))
    ));

    Wallet::update_profile(USER, &provider, ProfileOptions::passphrase("new passphrase"))
        .await
        .unwrap();
    let wallet = Wallet::new(USER, &provider).await.unwrap();
    assert!(matches!(
        wallet.open(UnlockOptions::passphrase(PASSPHRASE)).await,
        Err(WalletError::AuthenticationFailed(_))
    ));
    wallet
        .open(UnlockOptions::passphrase("new passphrase"))
        .await
        .unwrap();
}

#[tokio::test]
async fn open_and_close() {
    let provider = provider(Arc::new(MemoryStoreProvider::new()), |b| b).await;
    Wallet::create_profile(USER, &provider, ProfileOptions::passphrase(PASSPHRASE))
        .await
        .unwrap();
    let wallet = Wallet::new(USER, &provider).await.unwrap();

    let err = wallet
        .open(UnlockOptions::passphrase("fakepassphraseXX"))
        .await
        .unwrap_err();
    assert!(matches!(err, WalletError::AuthenticationFailed(_)));

    let token = wallet
        .open(UnlockOptions::passphrase(PASSPHRASE))
        .await
        .unwrap();
    assert!(!token.id().is_nil());

    assert!(matches!(
        wallet.open(UnlockOptions::passphrase(PASSPHRASE)).await,
        Err(WalletError::AlreadyUnlocked)
    ));
    assert!(wallet.is_current(&token).await);

    assert!(wallet.close().await);
    assert!(!wallet.close().await);
    assert!(!wallet.close().await);

    wallet
        .open(UnlockOptions::passphrase(PASSPHRASE))
        .await
        .unwrap();
    assert!(wallet.close().await);
}

#[tokio::test]
async fn unlock_on_load() {
    let provider = provider(Arc::new(MemoryStoreProvider::new()), |b| b).await;
    assert!(matches!(
        Wallet::new_unlocked(USER, &provider, UnlockOptions::passphrase(PASSPHRASE)).await,
        Err(WalletError::ProfileNotFound)
    ));

    Wallet::create_profile(USER, &provider, ProfileOptions::passphrase(PASSPHRASE))
        .await
        .unwrap();
    assert!(matches!(
        Wallet::new_unlocked(USER, &provider, UnlockOptions::passphrase("wrong")).await,
        Err(WalletError::AuthenticationFailed(_))
    ));

    let (wallet, token) =
        Wallet::new_unlocked(USER, &provider, UnlockOptions::passphrase(PASSPHRASE))
            .await
            .unwrap();
    assert!(wallet.is_current(&token).await);
    wallet.create_key_pair(None).await.unwrap();
}

#[tokio::test]
async fn users_do_not_share_stores() {
    let provider = provider(Arc::new(MemoryStoreProvider::new()), |b| b).await;
    let alice = open_wallet(&provider).await;

    // User names that look like store names get stores of their own.
    for user in ["vcwallet_profiles", "kms_alice", "vcwallet_content_alice"] {
        Wallet::create_profile(user, &provider, ProfileOptions::passphrase(PASSPHRASE))
            .await
            .unwrap();
        let (wallet, _) =
            Wallet::new_unlocked(user, &provider, UnlockOptions::passphrase(PASSPHRASE))
                .await
                .unwrap();
        wallet
            .add(
                ContentType::Metadata,
                json!({"id": "shared-id", "owner": user}).to_string().as_bytes(),
                AddOptions::default(),
            )
            .await
            .unwrap();
        wallet.create_key_pair(None).await.unwrap();
    }

    assert!(Wallet::profile_exists(USER, &provider).await.unwrap());
    assert!(matches!(
        alice.get(ContentType::Metadata, "shared-id").await,
        Err(WalletError::ContentNotFound { .. })
    ));
    assert!(alice
        .get_all(ContentType::Metadata, GetAllOptions::default())
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn token_expiry() {
    let provider = provider(Arc::new(MemoryStoreProvider::new()), |b| b).await;
    Wallet::create_profile(USER, &provider, ProfileOptions::passphrase(PASSPHRASE))
        .await
        .unwrap();
    let wallet = Wallet::new(USER, &provider).await.unwrap();

    wallet
        .open(UnlockOptions::passphrase(PASSPHRASE).with_expiry(Duration::from_millis(50)))
        .await
        .unwrap();
    wallet
        .get_all(ContentType::Credential, GetAllOptions::default())
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(matches!(
        wallet
            .get_all(ContentType::Credential, GetAllOptions::default())
            .await,
        Err(WalletError::WalletLocked)
    ));
    assert!(!wallet.close().await);

    // An expired token does not block unlocking again.
    wallet
        .open(UnlockOptions::passphrase(PASSPHRASE))
        .await
        .unwrap();
}

#[tokio::test]
async fn content_round_trip() {
    let provider = provider(Arc::new(MemoryStoreProvider::new()), |b| b).await;
    let wallet = open_wallet(&provider).await;

    let credential = credential("http://example.edu/credentials/1872", &[]);
    let raw = credential.to_string().into_bytes();
    let id = wallet
        .add(ContentType::Credential, &raw, AddOptions::default())
        .await
        .unwrap();
    assert_eq!(id, "http://example.edu/credentials/1872");
    assert_eq!(wallet.get(ContentType::Credential, &id).await.unwrap(), raw);

    wallet.remove(ContentType::Credential, &id).await.unwrap();
    assert!(matches!(
        wallet.get(ContentType::Credential, &id).await,
        Err(WalletError::ContentNotFound { .. })
    ));
    wallet.remove(ContentType::Credential, &id).await.unwrap();

    assert!(matches!(
        wallet
            .add(ContentType::Metadata, b"not json", AddOptions::default())
            .await,
        Err(WalletError::InvalidContent(_))
    ));
    assert!(matches!(
        "invalid".parse::<ContentType>(),
        Err(WalletError::InvalidContentType(_))
    ));
}

#[tokio::test]
async fn collections() {
    let provider = provider(Arc::new(MemoryStoreProvider::new()), |b| b).await;
    let wallet = open_wallet(&provider).await;

    let vaccination = json!({"id": "vaccination", "type": "Vault", "name": "Vaccination Records"});
    wallet
        .add(
            ContentType::Collection,
            vaccination.to_string().as_bytes(),
            AddOptions::default(),
        )
        .await
        .unwrap();

    for (i, collection) in [None, Some("vaccination"), Some("vaccination")]
        .into_iter()
        .enumerate()
    {
        let options = match collection {
            Some(collection) => AddOptions::in_collection(collection),
            None => AddOptions::default(),
        };
        let credential = credential(&format!("urn:uuid:credential-{i}"), &[]);
        wallet
            .add(
                ContentType::Credential,
                credential.to_string().as_bytes(),
                options,
            )
            .await
            .unwrap();
    }

    let all = wallet
        .get_all(ContentType::Credential, GetAllOptions::default())
        .await
        .unwrap();
    assert_eq!(all.len(), 3);

    let in_collection = wallet
        .get_all(
            ContentType::Credential,
            GetAllOptions::in_collection("vaccination"),
        )
        .await
        .unwrap();
    let ids: Vec<_> = in_collection.iter().map(|(id, _)| id.as_str()).collect();
    assert_eq!(ids, ["urn:uuid:credential-1", "urn:uuid:credential-2"]);

    wallet
        .remove(ContentType::Credential, "urn:uuid:credential-1")
        .await
        .unwrap();
    let all = wallet
        .get_all(ContentType::Credential, GetAllOptions::default())
        .await
        .unwrap();
    assert_eq!(all.len(), 2);

    let err = wallet
        .add(
            ContentType::Credential,
            credential("urn:uuid:orphan", &[]).to_string().as_bytes(),
            AddOptions::in_collection("missing"),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, WalletError::CollectionNotFound(id) if id == "missing"));
}

#[tokio::test]
async fn keys_cannot_be_replaced() {
    let provider = provider(Arc::new(MemoryStoreProvider::new()), |b| b).await;
    let wallet = open_wallet(&provider).await;

    let key = json!({
        "@context": ["https://w3id.org/wallet/v1"],
        "id": "did:example:123456789abcdefghi#key-1",
        "type": "Ed25519VerificationKey2018",
        "privateKeyJwk": {
            "kty": "OKP",
            "crv": "Ed25519",
            "d": "nWGxne_9WmC6hEr0kuwsxERJxWl7MmkZcDusAxyuf2A",
            "x": "11qYAYKxCrfVS_7TyWQHOg7hcvPapiMlrwIaaPcHURo"
        }
    });
    let raw = key.to_string().into_bytes();
    wallet
        .add(ContentType::Key, &raw, AddOptions::default())
        .await
        .unwrap();
    assert!(matches!(
        wallet.add(ContentType::Key, &raw, AddOptions::default()).await,
        Err(WalletError::DuplicateContent { .. })
    ));
}

#[tokio::test]
async fn locked_wallet_rejects_everything() {
    let storage = Arc::new(MemoryStoreProvider::new());
    let provider = provider(storage.clone(), |b| b).await;
    let wallet = open_wallet(&provider).await;

    let credential = credential("urn:uuid:stored", &["UniversityDegreeCredential"]);
    let raw = credential.to_string().into_bytes();
    wallet
        .add(ContentType::Credential, &raw, AddOptions::default())
        .await
        .unwrap();
    assert!(wallet.close().await);

    let before = snapshot(&storage).await;
    let locked = |result: Result<(), WalletError>| {
        assert!(
            matches!(result, Err(WalletError::WalletLocked)),
            "expected locked wallet, got {result:?}"
        )
    };

    locked(
        wallet
            .add(ContentType::Credential, &raw, AddOptions::default())
            .await
            .map(drop),
    );
    locked(wallet.get(ContentType::Credential, "urn:uuid:stored").await.map(drop));
    locked(
        wallet
            .get_all(ContentType::Credential, GetAllOptions::default())
            .await
            .map(drop),
    );
    locked(wallet.remove(ContentType::Credential, "urn:uuid:stored").await);
    locked(
        wallet
            .query(&[QuerySpec::new("DIDAuth", vec![])])
            .await
            .map(drop),
    );
    locked(wallet.issue(&raw, ProofOptions::new(MY_DID)).await.map(drop));
    locked(
        wallet
            .prove(
                ProofOptions::new(MY_DID),
                vec![ProveSource::StoredCredential("urn:uuid:stored".into())],
            )
            .await
            .map(drop),
    );
    locked(
        wallet
            .verify(VerifySource::StoredCredential("urn:uuid:stored".into()))
            .await
            .map(drop),
    );
    locked(
        wallet
            .derive(
                DeriveSource::StoredCredential("urn:uuid:stored".into()),
                DeriveOptions::default(),
            )
            .await
            .map(drop),
    );
    locked(wallet.create_key_pair(None).await.map(drop));
    locked(
        wallet
            .connect(&json!({}), ConnectOptions::default())
            .await
            .map(drop),
    );
    locked(
        wallet
            .propose_presentation(&json!({}), ProposeOptions::default())
            .await
            .map(drop),
    );
    locked(
        wallet
            .propose_credential(&json!({}), ProposeOptions::default())
            .await
            .map(drop),
    );
    locked(
        wallet
            .present_proof("thread", json!({}), ConcludeOptions::default())
            .await
            .map(drop),
    );
    locked(
        wallet
            .request_credential("thread", json!({}), ConcludeOptions::default())
            .await
            .map(drop),
    );
    locked(
        wallet
            .resolve_credential_manifest(
                b"{}",
                ResolveManifestSource::StoredCredential {
                    id: "urn:uuid:stored".into(),
                    descriptor_id: "d".into(),
                },
            )
            .await
            .map(drop),
    );

    assert_eq!(snapshot(&storage).await, before);
}

#[tokio::test]
async fn query_errors() {
    let provider = provider(Arc::new(MemoryStoreProvider::new()), |b| b).await;
    let wallet = open_wallet(&provider).await;

    assert!(matches!(
        wallet.query(&[]).await,
        Err(WalletError::NoResultFound)
    ));
    assert!(matches!(
        wallet
            .query(&[
                QuerySpec::new("DIDAuth", vec![]),
                QuerySpec::new("QueryByMagic", vec![]),
            ])
            .await,
        Err(WalletError::UnsupportedQueryType(t)) if t == "QueryByMagic"
    ));
}

#[tokio::test]
async fn query_stored_credentials() {
    let provider = provider(Arc::new(MemoryStoreProvider::new()), |b| {
        b.with_selective_disclosure(Arc::new(BbsMock))
    })
    .await;
    let wallet = open_wallet(&provider).await;

    for credential in [
        credential("urn:uuid:degree", &["UniversityDegreeCredential"]),
        credential("urn:uuid:residence", &["PermanentResidentCard"]),
        bbs_credential("urn:uuid:bbs-degree"),
    ] {
        wallet
            .add(
                ContentType::Credential,
                credential.to_string().as_bytes(),
                AddOptions::default(),
            )
            .await
            .unwrap();
    }

    let results = wallet
        .query(&[
            QuerySpec::new(
                "QueryByExample",
                vec![
                    json!({"example": {"type": "PermanentResidentCard"}}),
                    json!({"example": {"type": "PermanentResidentCard"}}),
                ],
            ),
            QuerySpec::new(
                "PresentationExchange",
                vec![json!({
                    "id": "22c77155-edf2-4ec5-8d44-b393b4e4fa38",
                    "input_descriptors": [{
                        "id": "degree",
                        "constraints": {
                            "limit_disclosure": "required",
                            "fields": [{
                                "path": ["$.type"],
                                "filter": {"type": "array", "contains": {"const": "UniversityDegreeCredential"}}
                            }]
                        }
                    }]
                })],
            ),
            QuerySpec::new(
                "QueryByExample",
                vec![json!({"example": {"type": "DriversLicense"}})],
            ),
            QuerySpec::new("DIDAuth", vec![]),
        ])
        .await
        .unwrap();

    // The unmatched query yields no presentation.
    assert_eq!(results.len(), 3);

    let by_example = results[0]["verifiableCredential"].as_array().unwrap();
    assert_eq!(by_example.len(), 1);
    assert_eq!(by_example[0]["id"], "urn:uuid:residence");

    let exchanged = &results[1];
    assert_eq!(
        exchanged["presentation_submission"]["definition_id"],
        "22c77155-edf2-4ec5-8d44-b393b4e4fa38"
    );
    let disclosed = exchanged["verifiableCredential"].as_array().unwrap();
    assert_eq!(disclosed.len(), 1);
    assert_eq!(disclosed[0]["id"], "urn:uuid:bbs-degree");
    assert_eq!(disclosed[0]["proof"]["type"], "BbsBlsSignatureProof2020");
    assert!(disclosed[0]["credentialSubject"].get("name").is_none());

    assert_eq!(
        results[2]["verifiableCredential"].as_array().map(Vec::len),
        Some(0)
    );
}

#[tokio::test]
async fn frame_query_skips_underivable_credentials() {
    // No selective disclosure service, so BBS credentials cannot be derived.
    let provider = provider(Arc::new(MemoryStoreProvider::new()), |b| b).await;
    let wallet = open_wallet(&provider).await;
    wallet
        .add(
            ContentType::Credential,
            bbs_credential("urn:uuid:bbs-degree").to_string().as_bytes(),
            AddOptions::default(),
        )
        .await
        .unwrap();

    let results = wallet
        .query(&[QuerySpec::new(
            "QueryByFrame",
            vec![json!({
                "frame": {
                    "@context": ["https://www.w3.org/2018/credentials/v1"],
                    "type": ["VerifiableCredential", "UniversityDegreeCredential"],
                    "@explicit": true,
                    "credentialSubject": {"@explicit": true, "degree": {}}
                }
            })],
        )])
        .await
        .unwrap();
    assert!(results.is_empty());
}

#[tokio::test]
async fn query_by_context_and_type_schema() {
    let provider = provider(Arc::new(MemoryStoreProvider::new()), |b| b).await;
    let wallet = open_wallet(&provider).await;

    let mut named = credential("urn:uuid:named", &[]);
    named["first_name"] = json!("Jesse");
    for credential in [named, credential("urn:uuid:unnamed", &[])] {
        wallet
            .add(
                ContentType::Credential,
                credential.to_string().as_bytes(),
                AddOptions::default(),
            )
            .await
            .unwrap();
    }

    let definition = |schema: &str| {
        json!({
            "id": "c1b88ce1-8460-4baf-8f16-4759a2f055fd",
            "input_descriptors": [{
                "id": "name",
                "schema": [{"uri": schema}],
                "constraints": {"fields": [{"path": ["$.first_name"]}]}
            }]
        })
    };

    let results = wallet
        .query(&[QuerySpec::new(
            "PresentationExchange",
            vec![definition(
                "https://www.w3.org/2018/credentials/v1#VerifiableCredential",
            )],
        )])
        .await
        .unwrap();
    assert_eq!(results.len(), 1);
    let matched = results[0]["verifiableCredential"].as_array().unwrap();
    assert_eq!(matched.len(), 1);
    assert_eq!(matched[0]["id"], "urn:uuid:named");

    let results = wallet
        .query(&[QuerySpec::new(
            "PresentationExchange",
            vec![definition(
                "https://www.w3.org/2018/credentials/v1#DriversLicense",
            )],
        )])
        .await
        .unwrap();
    assert!(results.is_empty());
}

#[tokio::test]
async fn resolve_credential_manifest() {
    let provider = provider(Arc::new(MemoryStoreProvider::new()), |b| b).await;
    let wallet = open_wallet(&provider).await;

    let manifest = json!({
        "id": "university-manifest",
        "output_descriptors": [{
            "id": "degree_output",
            "display": {
                "title": {"path": ["$.credentialSubject.degree.name"], "fallback": "Degree"},
                "properties": [{
                    "label": "Graduate",
                    "path": ["$.credentialSubject.name"],
                    "schema": {"type": "string"}
                }]
            }
        }]
    })
    .to_string()
    .into_bytes();

    let credential = credential("urn:uuid:degree", &["UniversityDegreeCredential"]);
    wallet
        .add(
            ContentType::Credential,
            credential.to_string().as_bytes(),
            AddOptions::default(),
        )
        .await
        .unwrap();

    let resolved = wallet
        .resolve_credential_manifest(
            &manifest,
            ResolveManifestSource::StoredCredential {
                id: "urn:uuid:degree".into(),
                descriptor_id: "degree_output".into(),
            },
        )
        .await
        .unwrap();
    assert_eq!(resolved.len(), 1);
    assert_eq!(
        resolved[0].title.as_deref(),
        Some("Bachelor of Science and Arts")
    );
    assert_eq!(resolved[0].properties[0].value, json!("Jayden Doe"));

    let response = json!({
        "credential_response": {
            "descriptor_map": [
                {"id": "degree_output", "format": "ldp_vc", "path": "$.verifiableCredential[0]"},
                {"id": "degree_output", "format": "ldp_vc", "path": "$.verifiableCredential[1]"}
            ]
        },
        "verifiableCredential": [credential.clone(), credential]
    });
    let resolved = wallet
        .resolve_credential_manifest(
            &manifest,
            ResolveManifestSource::RawResponse(response.to_string().into_bytes()),
        )
        .await
        .unwrap();
    assert_eq!(resolved.len(), 2);
}
