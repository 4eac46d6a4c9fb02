//! Socket.IO 0.7/0.8 packet types and single-packet encode/decode.
//!
//! Wire form: `<kind>:<mid>:<endpoint>:<data>`, where `kind` is a single
//! ASCII digit `0`..`8`. See the module-level docs in `lib.rs` for the full
//! grammar; this module only deals with one packet at a time. Multi-packet
//! framing lives in [`crate::frame`].

use crate::error::{CodecError, CodecResult};
use serde_json::{Map, Value};

/// An ack id carried in the `mid` slot of an inbound Message/Json/Event
/// packet. The trailing `+` some clients send (`"2+"`) requests that the
/// server always reply with an Ack, even if `on_message`/`on_event` has
/// nothing to say — see `Session::raw_message` dispatch in `sio-server`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageId {
    pub id: u64,
    pub want_reply: bool,
}

impl MessageId {
    pub fn new(id: u64) -> Self {
        Self { id, want_reply: false }
    }

    pub fn with_reply(id: u64) -> Self {
        Self { id, want_reply: true }
    }
}

/// The positional-vs-named ambiguity baked into the 0.8 Event wire format:
/// a single object argument is indistinguishable from kwargs, so decoding
/// always prefers [`EventArgs::Named`] in that one case.
#[derive(Debug, Clone, PartialEq)]
pub enum EventArgs {
    Positional(Vec<Value>),
    Named(Map<String, Value>),
}

impl EventArgs {
    pub fn to_wire(&self) -> Vec<Value> {
        match self {
            EventArgs::Positional(args) => args.clone(),
            EventArgs::Named(map) => vec![Value::Object(map.clone())],
        }
    }

    pub fn from_wire(args: Vec<Value>) -> Self {
        if args.len() == 1 {
            if let Value::Object(map) = &args[0] {
                return EventArgs::Named(map.clone());
            }
        }
        EventArgs::Positional(args)
    }

    pub fn is_empty(&self) -> bool {
        match self {
            EventArgs::Positional(args) => args.is_empty(),
            EventArgs::Named(map) => map.is_empty(),
        }
    }
}

/// A single Socket.IO protocol packet (kinds 0-8).
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    Disconnect { endpoint: Option<String> },
    Connect { endpoint: Option<String> },
    Heartbeat,
    Message { ack_id: Option<MessageId>, endpoint: Option<String>, data: String },
    Json { ack_id: Option<MessageId>, endpoint: Option<String>, data: Value },
    Event { ack_id: Option<MessageId>, endpoint: Option<String>, name: String, args: EventArgs },
    /// The ack-id here (unlike `Message`/`Json`/`Event`'s `mid`) is never
    /// suffixed with `+` on the wire — it lives in the data slot, see §4.1.
    Ack { endpoint: Option<String>, ack_id: u64, response: Option<Value> },
    Error { endpoint: Option<String>, reason: String, advice: Option<String> },
    Noop,
}

impl Packet {
    pub fn endpoint(&self) -> Option<&str> {
        match self {
            Packet::Disconnect { endpoint }
            | Packet::Connect { endpoint }
            | Packet::Message { endpoint, .. }
            | Packet::Json { endpoint, .. }
            | Packet::Event { endpoint, .. }
            | Packet::Ack { endpoint, .. }
            | Packet::Error { endpoint, .. } => endpoint.as_deref(),
            Packet::Heartbeat | Packet::Noop => None,
        }
    }
}

fn empty_to_none(s: &str) -> Option<String> {
    if s.is_empty() { None } else { Some(s.to_owned()) }
}

fn ep_str(endpoint: &Option<String>) -> &str {
    endpoint.as_deref().unwrap_or("")
}

fn format_mid(mid: Option<MessageId>) -> String {
    match mid {
        None => String::new(),
        Some(MessageId { id, want_reply: false }) => id.to_string(),
        Some(MessageId { id, want_reply: true }) => format!("{id}+"),
    }
}

fn parse_mid(s: &str) -> CodecResult<Option<MessageId>> {
    if s.is_empty() {
        return Ok(None);
    }
    let (digits, want_reply) = match s.strip_suffix('+') {
        Some(stripped) => (stripped, true),
        None => (s, false),
    };
    let id: u64 = digits
        .parse()
        .map_err(|_| CodecError::MalformedAck(s.to_owned()))?;
    Ok(Some(MessageId { id, want_reply }))
}

/// Serializes a [`Value`] to a JSON string. Infallible because `Value`'s
/// object keys are always `String` — the only case `serde_json::to_string`
/// can fail on for an owned `Value` tree.
fn json_to_string(value: &Value) -> String {
    serde_json::to_string(value).expect("serde_json::Value serialization is infallible")
}

/// Encodes a single packet to its wire form. Total: never fails.
pub fn encode(packet: &Packet) -> String {
    match packet {
        Packet::Disconnect { endpoint } => format!("0::{}", ep_str(endpoint)),
        Packet::Connect { endpoint } => format!("1::{}", ep_str(endpoint)),
        Packet::Heartbeat => "2::".to_owned(),
        Packet::Message { ack_id, endpoint, data } => {
            format!("3:{}:{}:{}", format_mid(*ack_id), ep_str(endpoint), data)
        }
        Packet::Json { ack_id, endpoint, data } => {
            format!(
                "4:{}:{}:{}",
                format_mid(*ack_id),
                ep_str(endpoint),
                json_to_string(data)
            )
        }
        Packet::Event { ack_id, endpoint, name, args } => {
            let payload = serde_json::json!({ "name": name, "args": args.to_wire() });
            format!(
                "5:{}:{}:{}",
                format_mid(*ack_id),
                ep_str(endpoint),
                json_to_string(&payload)
            )
        }
        Packet::Ack { endpoint, ack_id, response } => match response {
            None => format!("6::{}:{}", ep_str(endpoint), ack_id),
            Some(value) => {
                let wrapped = match value {
                    Value::Array(_) => value.clone(),
                    other => Value::Array(vec![other.clone()]),
                };
                format!(
                    "6::{}:{}+{}",
                    ep_str(endpoint),
                    ack_id,
                    json_to_string(&wrapped)
                )
            }
        },
        Packet::Error { endpoint, reason, advice } => {
            let advice = advice.as_deref().unwrap_or("");
            format!("7::{}:{}+{}", ep_str(endpoint), reason, advice)
        }
        Packet::Noop => "8::".to_owned(),
    }
}

/// Decodes a single packet from its wire form.
pub fn decode(raw: &str) -> CodecResult<Packet> {
    let mut parts = raw.splitn(4, ':');
    let kind = parts.next().unwrap_or("");
    let mid = parts.next().unwrap_or("");
    let endpoint = parts.next().unwrap_or("");
    let data = parts.next();

    let packet = match kind {
        "0" => Packet::Disconnect { endpoint: empty_to_none(endpoint) },
        "1" => Packet::Connect { endpoint: empty_to_none(endpoint) },
        "2" => Packet::Heartbeat,
        "3" => Packet::Message {
            ack_id: parse_mid(mid)?,
            endpoint: empty_to_none(endpoint),
            data: data.unwrap_or("").to_owned(),
        },
        "4" => {
            let raw_data = data.unwrap_or("");
            let value = if raw_data.is_empty() {
                Value::Null
            } else {
                serde_json::from_str(raw_data)?
            };
            Packet::Json {
                ack_id: parse_mid(mid)?,
                endpoint: empty_to_none(endpoint),
                data: value,
            }
        }
        "5" => {
            let raw_data = data.unwrap_or("");
            let value: Value = serde_json::from_str(raw_data)?;
            let obj = value
                .as_object()
                .ok_or(CodecError::MalformedEvent("event payload must be a JSON object"))?;
            let name = obj
                .get("name")
                .and_then(Value::as_str)
                .ok_or(CodecError::MalformedEvent("name"))?
                .to_owned();
            let args = match obj.get("args") {
                Some(Value::Array(args)) => args.clone(),
                Some(Value::Null) | None => Vec::new(),
                Some(_) => return Err(CodecError::MalformedEvent("args")),
            };
            Packet::Event {
                ack_id: parse_mid(mid)?,
                endpoint: empty_to_none(endpoint),
                name,
                args: EventArgs::from_wire(args),
            }
        }
        "6" => {
            let raw_data = data.unwrap_or("");
            let (id_str, response_json) = match raw_data.split_once('+') {
                Some((id, json)) => (id, Some(json)),
                None => (raw_data, None),
            };
            let ack_id: u64 = id_str
                .parse()
                .map_err(|_| CodecError::MalformedAck(raw_data.to_owned()))?;
            let response = match response_json {
                Some(json) if !json.is_empty() => Some(serde_json::from_str(json)?),
                _ => None,
            };
            Packet::Ack { endpoint: empty_to_none(endpoint), ack_id, response }
        }
        "7" => {
            let raw_data = data.unwrap_or("");
            let (reason, advice) = match raw_data.split_once('+') {
                Some((reason, advice)) => (reason, if advice.is_empty() { None } else { Some(advice.to_owned()) }),
                None => (raw_data, None),
            };
            Packet::Error {
                endpoint: empty_to_none(endpoint),
                reason: reason.to_owned(),
                advice,
            }
        }
        "8" => Packet::Noop,
        other => return Err(CodecError::InvalidKind(other.to_owned())),
    };

    Ok(packet)
}
