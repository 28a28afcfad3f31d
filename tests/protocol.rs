use std::{sync::Arc, time::Duration};

use serde_json::json;
use vcwallet::{
    didcomm::{
        ConcludeOptions, ConnectOptions, EventProperties, ProposeOptions, ACK_STATUS_FAIL,
        ACK_STATUS_OK, ACK_STATUS_PENDING,
    },
    storage::MemoryStoreProvider,
    Provider, Wallet, WalletError,
};


use mocks::*;

fn invitation() -> serde_json::Value {
    json!({
        "@id": "3ae3d2cb-83bf-429f-93ea-0802f92ecf42",
        "@type": "https://didcomm.org/out-of-band/1.0/invitation",
        "label": "verifier",
        "services": ["did:example:verifier"]
    })
}

async fn protocol_provider(
    present_proof: Arc<ProtocolMock>,
    issue_credential: Arc<ProtocolMock>,
) -> (Provider, Arc<EventHub>) {
    let did_exchange = Arc::new(EventHub::default());
    let provider = provider(Arc::new(MemoryStoreProvider::new()), |b| {
        b.with_out_of_band(Arc::new(OutOfBandMock {
            did_exchange: did_exchange.clone(),
        }))
        .with_did_exchange(did_exchange.clone())
        .with_present_proof(present_proof)
        .with_issue_credential(issue_credential)
        .with_connection_lookup(Arc::new(ConnectionsMock))
    })
    .await;
    (provider, did_exchange)
}

async fn unlocked_wallet(
    present_proof: Arc<ProtocolMock>,
    issue_credential: Arc<ProtocolMock>,
) -> (Wallet, Arc<EventHub>) {
    let (provider, did_exchange) = protocol_provider(present_proof, issue_credential).await;
    (open_wallet(&provider).await, did_exchange)
}

#[tokio::test]
async fn connect() {
    let (wallet, did_exchange) = unlocked_wallet(Default::default(), Default::default()).await;

    let connection_id = wallet
        .connect(&invitation(), ConnectOptions::default())
        .await
        .unwrap();
    assert_eq!(connection_id, CONNECTION_ID);
    assert_eq!(did_exchange.subscriber_count(), 0);
}

#[tokio::test]
async fn cancelled_connect_unregisters() {
    let did_exchange = Arc::new(EventHub::default());
    let provider = provider(Arc::new(MemoryStoreProvider::new()), |b| {
        b.with_out_of_band(Arc::new(StalledOutOfBand))
            .with_did_exchange(did_exchange.clone())
    })
    .await;
    let wallet = open_wallet(&provider).await;
    let invitation = invitation();

    for _ in 0..3 {
        let connect = wallet.connect(&invitation, ConnectOptions::default());
        assert!(tokio::time::timeout(Duration::from_millis(20), connect)
            .await
            .is_err());
    }
    // Unregistration of a dropped call runs on a spawned task.
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(did_exchange.subscriber_count(), 0);
}

#[tokio::test]
async fn missing_services() {
    let provider = provider(Arc::new(MemoryStoreProvider::new()), |b| b).await;
    let wallet = open_wallet(&provider).await;

    assert!(matches!(
        wallet.connect(&invitation(), ConnectOptions::default()).await,
        Err(WalletError::ServiceUnavailable(_))
    ));
    assert!(matches!(
        wallet
            .present_proof("thread", json!({}), ConcludeOptions::default())
            .await,
        Err(WalletError::ServiceUnavailable(_))
    ));
    assert!(matches!(
        wallet
            .propose_credential(&invitation(), ProposeOptions::default())
            .await,
        Err(WalletError::ServiceUnavailable(_))
    ));
}

#[tokio::test]
async fn propose_then_present() {
    let present_proof = Arc::new(ProtocolMock::concluding(
        "done",
        EventProperties::default().with_redirect_url("https://example.com/success"),
    ));
    let (wallet, _) = unlocked_wallet(present_proof.clone(), Default::default()).await;

    let request = wallet
        .propose_presentation(
            &invitation(),
            ProposeOptions {
                timeout: Some(Duration::from_secs(1)),
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .expect("verifier replied with a request");
    assert_eq!(request.message.thread_id(), Some(request.thread_id.as_str()));

    let presentation = json!({"type": ["VerifiablePresentation"]});
    let ack = wallet
        .present_proof(
            &request.thread_id,
            presentation.clone(),
            ConcludeOptions::wait_for_done(Duration::from_secs(1)),
        )
        .await
        .unwrap();
    assert_eq!(ack.status, ACK_STATUS_OK);
    assert_eq!(
        ack.redirect_url.as_deref(),
        Some("https://example.com/success")
    );
    assert_eq!(present_proof.events.subscriber_count(), 0);
    assert_eq!(
        present_proof.continued.lock().unwrap().as_slice(),
        [(request.thread_id.clone(), presentation)]
    );
}

#[tokio::test]
async fn present_without_waiting() {
    let present_proof = Arc::new(ProtocolMock::default());
    let (wallet, _) = unlocked_wallet(present_proof.clone(), Default::default()).await;

    let ack = wallet
        .present_proof("thread-1", json!({}), ConcludeOptions::default())
        .await
        .unwrap();
    assert_eq!(ack.status, ACK_STATUS_PENDING);
    assert_eq!(ack.redirect_url, None);
    assert_eq!(present_proof.continued.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn wait_for_done_times_out() {
    // Only an event for another thread is ever sent.
    let present_proof = Arc::new(ProtocolMock::default());
    let (wallet, _) = unlocked_wallet(present_proof.clone(), Default::default()).await;

    let err = wallet
        .present_proof(
            "thread-1",
            json!({}),
            ConcludeOptions::wait_for_done(Duration::from_millis(50)),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, WalletError::ProtocolTimeout(_)));
    assert_eq!(present_proof.events.subscriber_count(), 0);
}

#[tokio::test]
async fn cancelled_wait_for_done_unregisters() {
    let present_proof = Arc::new(ProtocolMock::default());
    let (wallet, _) = unlocked_wallet(present_proof.clone(), Default::default()).await;

    let present = wallet.present_proof(
        "thread-1",
        json!({}),
        ConcludeOptions::wait_for_done(Duration::ZERO),
    );
    assert!(tokio::time::timeout(Duration::from_millis(20), present)
        .await
        .is_err());

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(present_proof.events.subscriber_count(), 0);
    assert_eq!(present_proof.continued.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn abandoned_credential_request() {
    let issue_credential = Arc::new(ProtocolMock::concluding(
        "abandoned",
        EventProperties::default(),
    ));
    let (wallet, _) = unlocked_wallet(Default::default(), issue_credential.clone()).await;

    let offer = wallet
        .propose_credential(&invitation(), ProposeOptions::default())
        .await
        .unwrap()
        .expect("issuer replied with an offer");

    let ack = wallet
        .request_credential(
            &offer.thread_id,
            json!({}),
            ConcludeOptions::wait_for_done(Duration::from_secs(1)),
        )
        .await
        .unwrap();
    assert_eq!(ack.status, ACK_STATUS_FAIL);

    let explicit_status = Arc::new(ProtocolMock::concluding(
        "abandoned",
        EventProperties::default().with_status("DECLINED"),
    ));
    let (wallet, _) = unlocked_wallet(Default::default(), explicit_status).await;
    let ack = wallet
        .request_credential(
            "thread-1",
            json!({}),
            ConcludeOptions::wait_for_done(Duration::ZERO),
        )
        .await
        .unwrap();
    assert_eq!(ack.status, "DECLINED");
}
