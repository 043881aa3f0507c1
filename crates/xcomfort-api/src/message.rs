//! Message envelope and the bridge's message-type catalog.
//!
//! Every frame, plaintext or encrypted, carries the same JSON envelope:
//! `{"type_int": 281, "mc": 12, "payload": {...}}`. Acknowledgements use
//! `ref` instead of `mc`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Sequence value used for every message sent before the secure channel
/// is authenticated.
pub const HANDSHAKE_MC: i64 = -1;

// ── Message ─────────────────────────────────────────────────────────

/// One protocol message.
///
/// All fields are optional on the wire: heartbeat frames decrypt to an
/// empty object, and acks carry neither `mc` nor `payload`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_int: Option<i32>,

    /// Sender's sequence number. Present means "acknowledge me".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mc: Option<i64>,

    /// Sequence number being acknowledged.
    #[serde(default, rename = "ref", skip_serializing_if = "Option::is_none")]
    pub reference: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl Message {
    pub fn new(message_type: MessageType, mc: i64, payload: Value) -> Self {
        Self {
            type_int: Some(message_type.code()),
            mc: Some(mc),
            reference: None,
            payload: Some(payload),
        }
    }

    /// Handshake-phase message: `mc = -1`, payload optional.
    pub fn handshake(message_type: MessageType, payload: Option<Value>) -> Self {
        Self {
            type_int: Some(message_type.code()),
            mc: Some(HANDSHAKE_MC),
            reference: None,
            payload,
        }
    }

    /// Acknowledgement echoing the given sequence number.
    pub fn ack(reference: i64) -> Self {
        Self {
            type_int: Some(MessageType::Ack.code()),
            mc: None,
            reference: Some(reference),
            payload: None,
        }
    }

    /// The catalog entry for `type_int`, if it is a known code.
    pub fn message_type(&self) -> Option<MessageType> {
        self.type_int.and_then(MessageType::from_code)
    }

    pub fn is_type(&self, message_type: MessageType) -> bool {
        self.type_int == Some(message_type.code())
    }

    /// Look up a top-level payload field.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.payload.as_ref().and_then(|p| p.get(name))
    }

    /// Look up a top-level payload field as a string.
    pub fn str_field(&self, name: &str) -> Option<&str> {
        self.field(name).and_then(Value::as_str)
    }

    /// Short human-readable description of the message type for logs.
    pub fn type_name(&self) -> String {
        match (self.message_type(), self.type_int) {
            (Some(t), _) => t.to_string(),
            (None, Some(code)) => format!("UNKNOWN({code})"),
            (None, None) => "EMPTY".into(),
        }
    }
}

// ── MessageType ─────────────────────────────────────────────────────

/// The closed catalog of message-type codes the bridge speaks.
///
/// Unknown codes are not an error anywhere in this crate: they decode as
/// `None` from [`MessageType::from_code`] and are ignored by dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::FromRepr, strum::Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[repr(i32)]
pub enum MessageType {
    Nack = 0,
    Ack = 1,
    Heartbeat = 2,

    // ── Connection setup ──
    ConnectionStart = 10,
    ConnectionConfirm = 11,
    ConnectionEstablished = 12,
    ConnectionDeclined = 13,
    ScInit = 14,
    ScPubkey = 15,
    ScSecret = 16,
    ScEstablished = 17,
    ScInvalid = 18,

    // ── Authentication ──
    AuthLogin = 30,
    AuthLoginDenied = 31,
    AuthLoginSuccess = 32,
    AuthApplyToken = 33,
    AuthApplyTokenResponse = 34,
    AuthVerifyToken = 35,
    AuthVerifyTokenResponse = 36,
    AuthRenewToken = 37,
    AuthRenewTokenResponse = 38,
    AuthKillToken = 39,

    // ── Test ──
    TestOn = 100,
    TestOff = 101,
    TestCrypto = 102,
    TestAlert = 104,
    TestDeviceState = 105,
    TestCommand = 120,

    // ── Bulk / incremental data ──
    InitialData = 240,
    HomeData = 242,
    Diagnostics = 243,
    InitSwupdate = 247,
    DataSwupdate = 248,
    StartSwupdate = 249,
    UpdateBridge = 250,
    StartLearnmode = 251,
    StopLearnmode = 252,
    BarcodeDevice = 253,
    UpdateDevice = 254,
    DeleteDevice = 255,
    ArrangeDevices = 256,
    SetRoom = 257,
    DeleteRoom = 259,
    ArrangeRooms = 260,
    SetScene = 261,
    DeleteScene = 263,
    ArrangeScenes = 264,
    EditRfPwd = 270,
    SetTime = 271,
    SetAstro = 272,
    SetTimer = 273,
    DeleteTimer = 274,

    // ── Device / room commands ──
    ActionSlideDevice = 280,
    ActionSwitchDevice = 281,
    ActionShadeDevice = 282,
    ActionSlideRoom = 283,
    ActionSwitchRoom = 284,
    ActivateScene = 285,
    AddDevice = 290,
    SetDeviceState = 291,
    SetDeviceInfo = 292,
    SetRoomState = 293,
    SetRoomInfo = 294,
    AppInfo = 295,
    DeviceDeleted = 296,
    RoomDeleted = 297,
    SceneDeleted = 298,
    SetAllData = 300,
    SetRoomId = 301,
    SetSceneId = 302,
    SetHomeData = 303,
    SetDiagnostics = 304,
    SetTimerId = 305,
    FoundComp = 306,
    AddComp = 307,
    SetCompInfo = 308,
    CompDeleted = 309,
    SetStateInfo = 310,
    ConfigSaved = 311,
    ConfigList = 312,
    RestoreConfigResponse = 313,

    // ── Heating ──
    SetHeatingProgram = 350,
    DeleteHeatingProgram = 351,
    SetRoomHeating = 352,
    SetHeatingState = 353,
    SetHeatingProgramId = 360,
    HeatingProgramDeleted = 362,
    SetRoomHeatingState = 363,
    SetBridgeState = 364,

    // ── Idle / error signalling ──
    Idle = -1,
    NackInfoInvalidAction = -98,
    NackInfoDeviceNotDimmable = -99,
    NackInfoUnknownDevice = -100,
}

impl MessageType {
    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn from_code(code: i32) -> Option<Self> {
        Self::from_repr(code)
    }
}
