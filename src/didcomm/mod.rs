//! DIDComm protocol collaborators and the orchestrator driving them.
//!
//! The wallet does not implement DIDComm. Connection establishment, present
//! proof and issue credential are provided by protocol services implementing
//! the traits below, which report progress through state events.

use std::fmt::Debug;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

mod connection;
mod orchestrator;

pub use connection::{ConnectionRecord, StoreConnectionLookup, DID_EXCHANGE_STORE};
pub use orchestrator::{
    Acknowledgement, ConcludeOptions, PendingAction, ProposeOptions, ProtocolOrchestrator,
    ACK_STATUS_FAIL, ACK_STATUS_OK, ACK_STATUS_PENDING,
};

pub const PROPOSE_PRESENTATION_MSG_TYPE: &str =
    "https://didcomm.org/present-proof/2.0/propose-presentation";
pub const PROPOSE_CREDENTIAL_MSG_TYPE: &str =
    "https://didcomm.org/issue-credential/2.0/propose-credential";

/// A DIDComm message as a JSON object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DidCommMsg(pub Value);

impl DidCommMsg {
    /// A new message of `msg_type` with a fresh `@id`.
    pub fn new(msg_type: &str) -> Self {
        Self(json!({
            "@id": Uuid::new_v4().to_string(),
            "@type": msg_type,
        }))
    }

    pub fn id(&self) -> Option<&str> {
        self.0.get("@id").and_then(Value::as_str)
    }

    pub fn msg_type(&self) -> Option<&str> {
        self.0.get("@type").and_then(Value::as_str)
    }

    /// The `~thread.thid` decorator, or the message id for the first
    /// message of a thread.
    pub fn thread_id(&self) -> Option<&str> {
        self.0
            .pointer("/~thread/thid")
            .and_then(Value::as_str)
            .filter(|thid| !thid.is_empty())
            .or_else(|| self.id())
    }

    pub fn parent_thread_id(&self) -> Option<&str> {
        self.0
            .pointer("/~thread/pthid")
            .and_then(Value::as_str)
            .filter(|pthid| !pthid.is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateMsgType {
    /// Sent before a protocol state transition.
    PreState,
    /// Sent after a protocol state transition.
    PostState,
}

/// Properties attached to a state event.
///
/// Well known properties have accessors. Anything else is kept in the
/// extra bag.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventProperties {
    connection_id: Option<String>,
    invitation_id: Option<String>,
    status: Option<String>,
    redirect_url: Option<String>,
    extra: Map<String, Value>,
}

const CONNECTION_ID: &str = "connectionID";
const INVITATION_ID: &str = "invitationID";
const STATUS: &str = "status";
const REDIRECT_URL: &str = "url";

impl EventProperties {
    pub fn from_map(mut map: Map<String, Value>) -> Self {
        let mut take = |key: &str| match map.remove(key) {
            Some(Value::String(value)) => Some(value),
            Some(other) => {
                map.insert(key.to_owned(), other);
                None
            }
            None => None,
        };

        Self {
            connection_id: take(CONNECTION_ID),
            invitation_id: take(INVITATION_ID),
            status: take(STATUS),
            redirect_url: take(REDIRECT_URL),
            extra: map,
        }
    }

    pub fn with_connection_id(mut self, connection_id: impl Into<String>) -> Self {
        self.connection_id = Some(connection_id.into());
        self
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    pub fn with_redirect_url(mut self, redirect_url: impl Into<String>) -> Self {
        self.redirect_url = Some(redirect_url.into());
        self
    }

    pub fn connection_id(&self) -> Option<&str> {
        self.connection_id.as_deref()
    }

    pub fn invitation_id(&self) -> Option<&str> {
        self.invitation_id.as_deref()
    }

    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }

    pub fn redirect_url(&self) -> Option<&str> {
        self.redirect_url.as_deref()
    }

    pub fn extra(&self) -> &Map<String, Value> {
        &self.extra
    }
}

/// A protocol state event.
#[derive(Debug, Clone, PartialEq)]
pub struct StateMsg {
    pub protocol_name: String,
    pub msg_type: StateMsgType,
    pub state_id: String,
    pub message: Option<DidCommMsg>,
    pub properties: EventProperties,
}

impl StateMsg {
    /// Whether the message of this event belongs to thread `thread_id`.
    pub fn is_in_thread(&self, thread_id: &str) -> bool {
        self.message.as_ref().is_some_and(|message| {
            message.thread_id() == Some(thread_id) || message.parent_thread_id() == Some(thread_id)
        })
    }
}

/// Delivery of protocol state events to subscribers.
#[async_trait]
pub trait MessageEvents: Debug + Send + Sync {
    /// Deliver every state event to `channel` until unregistered.
    async fn register_msg_event(
        &self,
        id: Uuid,
        channel: UnboundedSender<StateMsg>,
    ) -> anyhow::Result<()>;

    async fn unregister_msg_event(&self, id: Uuid) -> anyhow::Result<()>;
}

/// Options for accepting an out-of-band invitation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectOptions {
    pub my_label: Option<String>,
    pub router_connections: Vec<String>,
    /// Connection to reuse instead of exchanging DIDs again.
    pub reuse_connection: Option<String>,
    pub reuse_any_connection: bool,
}

/// Accepts out-of-band invitations.
#[async_trait]
pub trait OutOfBandService: Debug + Send + Sync {
    /// Accept `invitation`, returning the id of the connection being
    /// established.
    async fn accept_invitation(
        &self,
        invitation: &Value,
        options: &ConnectOptions,
    ) -> anyhow::Result<String>;
}

/// A protocol instance waiting for the wallet to act.
#[derive(Debug, Clone, PartialEq)]
pub struct Action {
    /// Protocol instance id, the thread id of the exchange.
    pub piid: String,
    pub my_did: String,
    pub their_did: String,
    pub msg: DidCommMsg,
}

/// A present proof or issue credential protocol service.
#[async_trait]
pub trait ProtocolService: MessageEvents {
    /// Start a protocol instance by sending `msg`, returning its id.
    async fn handle_outbound(
        &self,
        msg: DidCommMsg,
        my_did: &str,
        their_did: &str,
    ) -> anyhow::Result<String>;

    /// Protocol instances waiting for the wallet to act.
    async fn actions(&self) -> anyhow::Result<Vec<Action>>;

    /// Continue protocol instance `piid` with `presentation`.
    async fn action_continue(&self, piid: &str, presentation: Value) -> anyhow::Result<()>;
}

/// Reads established DIDComm connections.
#[async_trait]
pub trait ConnectionLookup: Debug + Send + Sync {
    async fn get_connection_record(&self, connection_id: &str) -> anyhow::Result<ConnectionRecord>;
}
