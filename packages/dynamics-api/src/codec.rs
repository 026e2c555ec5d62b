use crate::error::{DynamicsError, Result};
use crate::messages::{Dynamics, Frame, Imu, Record};
use prost::Message;
use std::collections::HashMap;

pub type DecodeFn = fn(&[u8]) -> std::result::Result<Record, prost::DecodeError>;

/// How to turn a datagram of one message type into a [`Record`].
#[derive(Clone, Copy)]
pub struct Decoder {
    pub decode: DecodeFn,
    /// Receive buffer size large enough for one datagram of this type
    pub buffer_hint: usize,
}

/// Registry of the message types a receiver can decode, keyed by the type
/// name the device reports in its stream catalog.
#[derive(Clone)]
pub struct DecoderTable {
    decoders: HashMap<String, Decoder>,
}

impl Default for DecoderTable {
    fn default() -> Self {
        let mut table = Self::empty();
        table.register(
            "Frame",
            Decoder {
                decode: |buf| Frame::decode(buf).map(Record::Frame),
                buffer_hint: 512,
            },
        );
        table.register(
            "Imu",
            Decoder {
                decode: |buf| Imu::decode(buf).map(Record::Imu),
                buffer_hint: 512,
            },
        );
        table.register(
            "Dynamics",
            Decoder {
                decode: |buf| Dynamics::decode(buf).map(Record::Dynamics),
                buffer_hint: 1024,
            },
        );
        table
    }
}

impl DecoderTable {
    pub fn empty() -> Self {
        Self {
            decoders: HashMap::new(),
        }
    }

    /// Adds or replaces the decoder for `type_name`.
    pub fn register(&mut self, type_name: &str, decoder: Decoder) {
        self.decoders.insert(type_name.to_string(), decoder);
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.decoders.contains_key(type_name)
    }

    pub fn supported_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.decoders.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }

    pub fn get(&self, type_name: &str) -> Result<&Decoder> {
        self.decoders
            .get(type_name)
            .ok_or_else(|| DynamicsError::UnsupportedMessageType {
                requested: type_name.to_string(),
                supported: self.supported_types().join(", "),
            })
    }

    pub fn decode(&self, type_name: &str, payload: &[u8]) -> Result<Record> {
        let decoder = self.get(type_name)?;
        (decoder.decode)(payload).map_err(|source| DynamicsError::Decode {
            message_type: type_name.to_string(),
            source,
        })
    }
}
