use std::collections::BTreeMap;

use anyhow::anyhow;
use bytes::{Buf, BufMut, BytesMut};
use bytes_varint::{VarIntSupport, VarIntSupportMut};
use num_enum::TryFromPrimitive;

use crate::util::buf::{put_string, try_get_string};

/// Destination id that floods to all peers instead of being routed.
pub const BROADCAST: &str = "broadcast";
/// Legacy broadcast discriminator, kept for wire compatibility.
pub const BROADCAST_COMPAT: &str = "-1";

/// Forwarding budget of a freshly created message.
pub const DEFAULT_HOP_LIMIT: u32 = 10;

#[derive(Clone, Copy, Eq, PartialEq, Debug, TryFromPrimitive)]
#[repr(u8)]
pub enum MessageType {
    Chat = 1,
    AeRequest = 2,
    AeResponse = 3,
    Ack = 4,
    RouteRumor = 5,
}

/// A self-contained datagram payload. One `Message` is one UDP datagram;
/// there is no session state on the wire.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct Message {
    pub msg_type: MessageType,
    pub origin: String,
    pub destination: String,
    pub sequence_number: u32,
    pub chat_text: String,
    pub hop_limit: u32,
    /// previous forwarder's address; rumors use it to install direct routes
    pub last_ip: Option<String>,
    pub last_port: Option<u16>,
    /// origin -> highest chat sequence number known to the sender
    pub vector_clock: BTreeMap<String, u32>,
}

impl Message {
    pub fn chat(chat_text: impl Into<String>, origin: impl Into<String>, destination: impl Into<String>, sequence_number: u32) -> Message {
        Message {
            msg_type: MessageType::Chat,
            origin: origin.into(),
            destination: destination.into(),
            sequence_number,
            chat_text: chat_text.into(),
            hop_limit: DEFAULT_HOP_LIMIT,
            last_ip: None,
            last_port: None,
            vector_clock: BTreeMap::new(),
        }
    }

    pub fn control(msg_type: MessageType, origin: impl Into<String>, destination: impl Into<String>) -> Message {
        Message {
            msg_type,
            origin: origin.into(),
            destination: destination.into(),
            sequence_number: 0,
            chat_text: String::new(),
            hop_limit: DEFAULT_HOP_LIMIT,
            last_ip: None,
            last_port: None,
            vector_clock: BTreeMap::new(),
        }
    }

    pub fn route_rumor(origin: impl Into<String>, sequence_number: u32) -> Message {
        Message {
            msg_type: MessageType::RouteRumor,
            origin: origin.into(),
            destination: BROADCAST.to_string(),
            sequence_number,
            chat_text: String::new(),
            hop_limit: DEFAULT_HOP_LIMIT,
            last_ip: None,
            last_port: None,
            vector_clock: BTreeMap::new(),
        }
    }

    /// Canonical id, derived rather than transmitted: `{origin}_{sequence_number}`.
    pub fn message_id(&self) -> String {
        format!("{}_{}", self.origin, self.sequence_number)
    }

    /// The id an ACK acknowledges. An ACK names the chat through its
    /// `destination` (the chat's origin) and `sequence_number` fields - it
    /// cannot reuse the chat's origin as its own, or the originator's
    /// receive path would discard it as a self-addressed message.
    pub fn acked_message_id(&self) -> String {
        format!("{}_{}", self.destination, self.sequence_number)
    }

    pub fn is_broadcast(&self) -> bool {
        self.destination == BROADCAST || self.destination == BROADCAST_COMPAT
    }

    pub fn is_valid(&self) -> bool {
        match self.msg_type {
            MessageType::Chat => {
                !self.chat_text.is_empty()
                    && !self.origin.is_empty()
                    && !self.destination.is_empty()
                    && self.sequence_number >= 1
            }
            MessageType::AeRequest => true,
            _ => !self.origin.is_empty() && !self.destination.is_empty(),
        }
    }

    pub fn ser(&self, buf: &mut BytesMut) {
        buf.put_u8(self.msg_type as u8);
        put_string(buf, &self.origin);
        put_string(buf, &self.destination);
        buf.put_u32(self.sequence_number);
        put_string(buf, &self.chat_text);
        buf.put_u32(self.hop_limit);
        put_string(buf, self.last_ip.as_deref().unwrap_or(""));
        buf.put_u16(self.last_port.unwrap_or(0));
        buf.put_usize_varint(self.vector_clock.len());
        for (origin, &seq) in &self.vector_clock {
            put_string(buf, origin);
            buf.put_u32(seq);
        }
    }

    pub fn deser(mut buf: impl Buf) -> anyhow::Result<Message> {
        let type_tag = buf.try_get_u8()?;
        let msg_type = MessageType::try_from(type_tag)
            .map_err(|_| anyhow!("invalid message type discriminator: {}", type_tag))?;

        let origin = try_get_string(&mut buf)?;
        let destination = try_get_string(&mut buf)?;
        let sequence_number = buf.try_get_u32()?;
        let chat_text = try_get_string(&mut buf)?;
        let hop_limit = buf.try_get_u32()?;

        let last_ip = match try_get_string(&mut buf)? {
            s if s.is_empty() => None,
            s => Some(s),
        };
        let last_port = match buf.try_get_u16()? {
            0 => None,
            p => Some(p),
        };

        let num_clock_entries = buf.try_get_usize_varint()?;
        let mut vector_clock = BTreeMap::new();
        for _ in 0..num_clock_entries {
            let clock_origin = try_get_string(&mut buf)?;
            let seq = buf.try_get_u32()?;
            vector_clock.insert(clock_origin, seq);
        }

        Ok(Message {
            msg_type,
            origin,
            destination,
            sequence_number,
            chat_text,
            hop_limit,
            last_ip,
            last_port,
            vector_clock,
        })
    }

    pub fn to_datagram(&self) -> BytesMut {
        let mut buf = BytesMut::new();
        self.ser(&mut buf);
        buf
    }
}
