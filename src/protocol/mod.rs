pub mod messages;
pub mod wire;

pub use messages::{ErrorPayload, EventPayload, JoinProjectArgs};
pub use wire::{FrameError, decode_packet, encode_packet};

/// Event sent by the server exactly once per session to confirm project
/// membership. Received only, never sent.
pub const EVENT_JOIN_PROJECT: &str = "joinProjectResponse";
/// Remote call opening a document; replies with `[error, lines]`.
pub const RPC_JOIN_DOCUMENT: &str = "joinDoc";
/// Remote call releasing a document; fire-and-forget for this client.
pub const RPC_LEAVE_DOCUMENT: &str = "leaveDoc";
/// Prefix of presence events describing other collaborators' cursors and
/// selections. This client models none of that state and discards them.
pub const EVENT_PRESENCE_PREFIX: &str = "clientTracking.";

/// Packet category tag, encoded on the wire as a single decimal digit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    Disconnect,
    Connect,
    Heartbeat,
    Message,
    Json,
    Event,
    Ack,
    Error,
    Noop,
}

impl Opcode {
    pub fn from_digit(digit: u8) -> Option<Self> {
        match digit {
            b'0' => Some(Opcode::Disconnect),
            b'1' => Some(Opcode::Connect),
            b'2' => Some(Opcode::Heartbeat),
            b'3' => Some(Opcode::Message),
            b'4' => Some(Opcode::Json),
            b'5' => Some(Opcode::Event),
            b'6' => Some(Opcode::Ack),
            b'7' => Some(Opcode::Error),
            b'8' => Some(Opcode::Noop),
            _ => None,
        }
    }

    pub fn as_digit(self) -> u8 {
        match self {
            Opcode::Disconnect => b'0',
            Opcode::Connect => b'1',
            Opcode::Heartbeat => b'2',
            Opcode::Message => b'3',
            Opcode::Json => b'4',
            Opcode::Event => b'5',
            Opcode::Ack => b'6',
            Opcode::Error => b'7',
            Opcode::Noop => b'8',
        }
    }
}

/// One framed unit of the legacy wire protocol.
///
/// For `Ack` packets the id lives after the endpoint separator on the wire
/// (the primary slot must be empty); the decoded form normalizes it into
/// `id` so dispatch code never sees the irregularity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub opcode: Opcode,
    pub id: Option<u64>,
    pub ack_with_data: bool,
    /// Protocol namespace; always empty for this client.
    pub endpoint: String,
    /// Raw payload bytes, interpreted per opcode (JSON for Event/Ack).
    pub payload: String,
}

impl Packet {
    /// Packet carrying nothing but an opcode, like the `1::` handshake ack.
    pub fn bare(opcode: Opcode) -> Self {
        Packet {
            opcode,
            id: None,
            ack_with_data: false,
            endpoint: String::new(),
            payload: String::new(),
        }
    }

    /// Outbound EVENT requesting an acknowledgement with data.
    pub fn event(id: u64, payload: &EventPayload) -> Self {
        Packet {
            opcode: Opcode::Event,
            id: Some(id),
            ack_with_data: true,
            endpoint: String::new(),
            // EventPayload serialization cannot fail: plain strings and
            // already-validated JSON values.
            payload: serde_json::to_string(payload).unwrap_or_default(),
        }
    }

    pub fn event_payload(&self) -> Result<EventPayload, serde_json::Error> {
        serde_json::from_str(&self.payload)
    }

    pub fn error_payload(&self) -> ErrorPayload {
        ErrorPayload::from_wire(&self.payload)
    }
}
