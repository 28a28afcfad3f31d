use std::{sync::Arc, time::Duration};

use serde_json::Value;
use tokio::{
    sync::mpsc::{self, UnboundedReceiver},
    time::Instant,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{
    ConnectOptions, ConnectionLookup, DidCommMsg, MessageEvents, OutOfBandService,
    ProtocolService, StateMsg, StateMsgType, PROPOSE_CREDENTIAL_MSG_TYPE,
    PROPOSE_PRESENTATION_MSG_TYPE,
};
use crate::error::{Result, WalletError};

pub const ACK_STATUS_PENDING: &str = "PENDING";
pub const ACK_STATUS_OK: &str = "OK";
pub const ACK_STATUS_FAIL: &str = "FAIL";

const STATE_COMPLETED: &str = "completed";
const STATE_DONE: &str = "done";
const STATE_ABANDONED: &str = "abandoned";

#[derive(Debug, Clone, Default)]
pub struct ProposeOptions {
    pub connect: ConnectOptions,
    /// How long to poll for the counterpart's reply. `None` polls once.
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ConcludeOptions {
    /// Wait for the protocol to finish. A zero duration waits without
    /// deadline. `None` returns as soon as the reply is sent.
    pub wait_for_done: Option<Duration>,
}

impl ConcludeOptions {
    pub fn wait_for_done(timeout: Duration) -> Self {
        Self {
            wait_for_done: Some(timeout),
        }
    }
}

/// A request or offer received in reply to a proposal.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingAction {
    pub thread_id: String,
    pub message: DidCommMsg,
}

/// Outcome of concluding a protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Acknowledgement {
    pub status: String,
    pub redirect_url: Option<String>,
}

impl Acknowledgement {
    fn pending() -> Self {
        Self {
            status: ACK_STATUS_PENDING.to_owned(),
            redirect_url: None,
        }
    }

    fn from_event(event: &StateMsg) -> Self {
        let default_status = if event.state_id == STATE_ABANDONED {
            ACK_STATUS_FAIL
        } else {
            ACK_STATUS_OK
        };

        Self {
            status: event
                .properties
                .status()
                .unwrap_or(default_status)
                .to_owned(),
            redirect_url: event.properties.redirect_url().map(str::to_owned),
        }
    }
}

/// A registered state event channel.
///
/// Closed with [Subscription::close] on the normal path. A subscription
/// dropped while still registered, such as by a cancelled call, is
/// unregistered on a spawned task.
struct Subscription<E: MessageEvents + ?Sized + 'static> {
    events: Arc<E>,
    id: Option<Uuid>,
    receiver: UnboundedReceiver<StateMsg>,
}

impl<E: MessageEvents + ?Sized + 'static> Subscription<E> {
    async fn register(events: Arc<E>, context: &'static str) -> Result<Self> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();
        events
            .register_msg_event(id, sender)
            .await
            .map_err(WalletError::protocol(context))?;

        Ok(Self {
            events,
            id: Some(id),
            receiver,
        })
    }

    /// Next event accepted by `matches`, skipping the others.
    async fn next_matching(&mut self, matches: impl Fn(&StateMsg) -> bool) -> Result<StateMsg> {
        while let Some(event) = self.receiver.recv().await {
            if matches(&event) {
                return Ok(event);
            }
            debug!(
                protocol = %event.protocol_name,
                state = %event.state_id,
                "ignoring unrelated state event"
            );
        }
        Err(anyhow::anyhow!("state event channel closed").into())
    }

    async fn close(mut self) {
        if let Some(id) = self.id.take() {
            unregister(self.events.as_ref(), id).await;
        }
    }
}

impl<E: MessageEvents + ?Sized + 'static> Drop for Subscription<E> {
    fn drop(&mut self) {
        let Some(id) = self.id.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let events = self.events.clone();
                handle.spawn(async move { unregister(events.as_ref(), id).await });
            }
            Err(_) => warn!(subscription = %id, "no runtime to unregister state events"),
        }
    }
}

async fn unregister<E: MessageEvents + ?Sized>(events: &E, id: Uuid) {
    if let Err(e) = events.unregister_msg_event(id).await {
        warn!(subscription = %id, "failed to unregister state events: {e:#}");
    }
}

/// Drives DIDComm protocols on behalf of a wallet, turning their state
/// events into call results.
#[derive(Debug, Clone)]
pub struct ProtocolOrchestrator {
    out_of_band: Option<Arc<dyn OutOfBandService>>,
    did_exchange: Option<Arc<dyn MessageEvents>>,
    present_proof: Option<Arc<dyn ProtocolService>>,
    issue_credential: Option<Arc<dyn ProtocolService>>,
    connections: Option<Arc<dyn ConnectionLookup>>,
    poll_interval: Duration,
}

impl ProtocolOrchestrator {
    pub fn new(
        out_of_band: Option<Arc<dyn OutOfBandService>>,
        did_exchange: Option<Arc<dyn MessageEvents>>,
        present_proof: Option<Arc<dyn ProtocolService>>,
        issue_credential: Option<Arc<dyn ProtocolService>>,
        connections: Option<Arc<dyn ConnectionLookup>>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            out_of_band,
            did_exchange,
            present_proof,
            issue_credential,
            connections,
            poll_interval,
        }
    }

    fn present_proof_service(&self) -> Result<&Arc<dyn ProtocolService>> {
        self.present_proof
            .as_ref()
            .ok_or(WalletError::ServiceUnavailable("present proof"))
    }

    fn issue_credential_service(&self) -> Result<&Arc<dyn ProtocolService>> {
        self.issue_credential
            .as_ref()
            .ok_or(WalletError::ServiceUnavailable("issue credential"))
    }

    fn connections(&self) -> Result<&Arc<dyn ConnectionLookup>> {
        self.connections
            .as_ref()
            .ok_or(WalletError::ServiceUnavailable("connection lookup"))
    }

    /// Accept an out-of-band invitation and wait until the connection is
    /// completed, returning its id.
    ///
    /// There is no deadline; wrap the call in a timeout to bound it. The
    /// event registration is released when the call is cancelled.
    pub async fn connect(&self, invitation: &Value, options: &ConnectOptions) -> Result<String> {
        let out_of_band = self
            .out_of_band
            .as_ref()
            .ok_or(WalletError::ServiceUnavailable("out-of-band"))?;
        let did_exchange = self
            .did_exchange
            .as_ref()
            .ok_or(WalletError::ServiceUnavailable("DID exchange"))?;

        // Subscribe first, the exchange may complete before accept returns.
        let mut subscription = Subscription::register(
            did_exchange.clone(),
            "failed to register for DID exchange events",
        )
        .await?;

        let result = async {
            let connection_id = out_of_band
                .accept_invitation(invitation, options)
                .await
                .map_err(WalletError::protocol("failed to accept invitation"))?;
            debug!(connection = %connection_id, "invitation accepted, waiting for DID exchange");

            subscription
                .next_matching(|event| {
                    event.msg_type == StateMsgType::PostState
                        && event.state_id == STATE_COMPLETED
                        && event.properties.connection_id() == Some(connection_id.as_str())
                })
                .await?;
            Ok::<_, WalletError>(connection_id)
        }
        .await;

        subscription.close().await;
        if let Ok(connection_id) = &result {
            info!(connection = %connection_id, "connection completed");
        }
        result
    }

    /// Connect and propose a presentation, returning the verifier's request
    /// if one arrived.
    pub async fn propose_presentation(
        &self,
        invitation: &Value,
        options: &ProposeOptions,
    ) -> Result<Option<PendingAction>> {
        let service = self.present_proof_service()?;
        self.propose(service, PROPOSE_PRESENTATION_MSG_TYPE, invitation, options)
            .await
    }

    /// Connect and propose a credential, returning the issuer's offer if
    /// one arrived.
    pub async fn propose_credential(
        &self,
        invitation: &Value,
        options: &ProposeOptions,
    ) -> Result<Option<PendingAction>> {
        let service = self.issue_credential_service()?;
        self.propose(service, PROPOSE_CREDENTIAL_MSG_TYPE, invitation, options)
            .await
    }

    async fn propose(
        &self,
        service: &Arc<dyn ProtocolService>,
        msg_type: &str,
        invitation: &Value,
        options: &ProposeOptions,
    ) -> Result<Option<PendingAction>> {
        let connections = self.connections()?;
        let connection_id = self.connect(invitation, &options.connect).await?;

        let record = connections
            .get_connection_record(&connection_id)
            .await
            .map_err(WalletError::protocol("failed to lookup connection"))?;

        let thread_id = service
            .handle_outbound(DidCommMsg::new(msg_type), &record.my_did, &record.their_did)
            .await
            .map_err(WalletError::protocol("failed to send proposal"))?;
        debug!(thread = %thread_id, msg_type, "proposal sent");

        let deadline = options.timeout.map(|timeout| Instant::now() + timeout);
        loop {
            let actions = service
                .actions()
                .await
                .map_err(WalletError::protocol("failed to get pending actions"))?;

            if let Some(action) = actions.into_iter().find(|action| {
                action.my_did == record.my_did && action.their_did == record.their_did
            }) {
                return Ok(Some(PendingAction {
                    thread_id: action.piid,
                    message: action.msg,
                }));
            }

            match deadline {
                Some(deadline) if Instant::now() < deadline => {
                    tokio::time::sleep(self.poll_interval).await
                }
                _ => {
                    debug!(thread = %thread_id, "no reply to proposal yet");
                    return Ok(None);
                }
            }
        }
    }

    /// Send a presentation in reply to request `thread_id`.
    pub async fn present_proof(
        &self,
        thread_id: &str,
        presentation: Value,
        options: ConcludeOptions,
    ) -> Result<Acknowledgement> {
        let service = self.present_proof_service()?;
        self.conclude(service, "present proof", thread_id, presentation, options)
            .await
    }

    /// Accept offer `thread_id`, sending `presentation` with the credential
    /// request.
    pub async fn request_credential(
        &self,
        thread_id: &str,
        presentation: Value,
        options: ConcludeOptions,
    ) -> Result<Acknowledgement> {
        let service = self.issue_credential_service()?;
        self.conclude(service, "issue credential", thread_id, presentation, options)
            .await
    }

    async fn conclude(
        &self,
        service: &Arc<dyn ProtocolService>,
        protocol: &'static str,
        thread_id: &str,
        presentation: Value,
        options: ConcludeOptions,
    ) -> Result<Acknowledgement> {
        let Some(wait) = options.wait_for_done else {
            service
                .action_continue(thread_id, presentation)
                .await
                .map_err(WalletError::protocol("failed to continue protocol"))?;
            return Ok(Acknowledgement::pending());
        };

        let mut subscription = Subscription::register(
            service.clone(),
            "failed to register for protocol events",
        )
        .await?;

        let result = async {
            service
                .action_continue(thread_id, presentation)
                .await
                .map_err(WalletError::protocol("failed to continue protocol"))?;

            let done = subscription.next_matching(|event| {
                event.msg_type == StateMsgType::PostState
                    && (event.state_id == STATE_DONE || event.state_id == STATE_ABANDONED)
                    && event.is_in_thread(thread_id)
            });
            let event = if wait.is_zero() {
                done.await?
            } else {
                tokio::time::timeout(wait, done)
                    .await
                    .map_err(|_| WalletError::ProtocolTimeout(protocol))??
            };
            Ok::<_, WalletError>(Acknowledgement::from_event(&event))
        }
        .await;

        subscription.close().await;
        match &result {
            Ok(ack) => info!(thread = thread_id, status = %ack.status, "{protocol} concluded"),
            Err(e) => warn!(thread = thread_id, "{protocol} did not conclude: {e}"),
        }
        result
    }
}
