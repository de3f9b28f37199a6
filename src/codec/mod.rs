//! # Value Codecs
//!
//! Values on the wire use schema-registry framing:
//!
//! ```text
//! +------+----------------+----------------------+
//! | 0x00 | schema id (BE) | body                 |
//! | 1 B  | 4 B            | bincode / JSON bytes |
//! +------+----------------+----------------------+
//! ```
//!
//! Binary bodies are `bincode`, text bodies are `serde_json`. Each
//! (format, size, record type) combination is a separate subject with a
//! fixed schema id, so a consumer decoding the wrong topic fails with
//! `SchemaMismatch` instead of producing garbage.

pub mod accountant;

pub use accountant::ByteAccountant;

use crate::payload::{BenchRecord, GenericRecord, LargeOrder, SmallOrder};
use crate::scenario::{Format, PayloadSize, RecordType, Scenario};
use thiserror::Error;

pub const MAGIC_BYTE: u8 = 0x00;
pub const FRAME_HEADER_LEN: usize = 5;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("unknown magic byte {0:#04x}")]
    BadMagic(u8),

    #[error("frame too short: {0} bytes")]
    Truncated(usize),

    #[error("schema id mismatch: expected {expected}, found {found}")]
    SchemaMismatch { expected: u32, found: u32 },

    #[error("binary body: {0}")]
    Binary(#[from] bincode::Error),

    #[error("text body: {0}")]
    Text(#[from] serde_json::Error),

    #[error("record shape does not match subject {0}")]
    Unsupported(String),
}

/// A registry subject: one schema per (format, size, record type).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Subject {
    pub format: Format,
    pub size: PayloadSize,
    pub record_type: RecordType,
}

impl Subject {
    /// Text subjects have no record type; it is normalized away.
    pub fn new(format: Format, size: PayloadSize, record_type: RecordType) -> Self {
        let record_type = match format {
            Format::Text => RecordType::NotApplicable,
            Format::Binary if record_type == RecordType::NotApplicable => RecordType::Specific,
            Format::Binary => record_type,
        };
        Self {
            format,
            size,
            record_type,
        }
    }

    pub fn for_scenario(scenario: &Scenario) -> Self {
        Self::new(scenario.format, scenario.size, scenario.record_type)
    }

    pub fn schema_id(&self) -> u32 {
        let format = match self.format {
            Format::Binary => 100,
            Format::Text => 200,
        };
        let size = match self.size {
            PayloadSize::Small => 0,
            PayloadSize::Large => 10,
        };
        let record_type = match self.record_type {
            RecordType::Specific | RecordType::NotApplicable => 1,
            RecordType::Generic => 2,
        };
        format + size + record_type
    }

    pub fn name(&self) -> String {
        let shape = match self.size {
            PayloadSize::Small => "SmallOrder",
            PayloadSize::Large => "LargeOrder",
        };
        match self.record_type {
            RecordType::NotApplicable => format!("{}-{}-value", shape, self.format),
            rt => format!("{}-{}-{}-value", shape, self.format, rt),
        }
    }

    fn accepts(&self, record: &BenchRecord) -> bool {
        match (record, self.size, self.record_type) {
            (BenchRecord::Generic(_), _, RecordType::Generic) => true,
            (BenchRecord::Small(_), PayloadSize::Small, rt) => rt != RecordType::Generic,
            (BenchRecord::Large(_), PayloadSize::Large, rt) => rt != RecordType::Generic,
            _ => false,
        }
    }
}

/// Message key: `<scenario>-<trial>-<sequence>`.
pub fn message_key(scenario_id: &str, trial: u32, sequence: u64) -> Vec<u8> {
    format!("{}-{}-{}", scenario_id, trial, sequence).into_bytes()
}

/// Encodes record templates for one subject.
#[derive(Clone, Copy, Debug)]
pub struct ValueSerializer {
    subject: Subject,
}

impl ValueSerializer {
    pub fn new(subject: Subject) -> Self {
        Self { subject }
    }

    pub fn subject(&self) -> Subject {
        self.subject
    }

    pub fn encode(&self, record: &BenchRecord) -> Result<Vec<u8>, CodecError> {
        if !self.subject.accepts(record) {
            return Err(CodecError::Unsupported(self.subject.name()));
        }

        let mut buf = Vec::with_capacity(256);
        buf.push(MAGIC_BYTE);
        buf.extend_from_slice(&self.subject.schema_id().to_be_bytes());

        match self.subject.format {
            Format::Binary => match record {
                BenchRecord::Small(r) => bincode::serialize_into(&mut buf, r)?,
                BenchRecord::Large(r) => bincode::serialize_into(&mut buf, r.as_ref())?,
                BenchRecord::Generic(r) => bincode::serialize_into(&mut buf, r)?,
            },
            Format::Text => match record {
                BenchRecord::Small(r) => serde_json::to_writer(&mut buf, r)?,
                BenchRecord::Large(r) => serde_json::to_writer(&mut buf, r.as_ref())?,
                BenchRecord::Generic(r) => serde_json::to_writer(&mut buf, r)?,
            },
        }
        Ok(buf)
    }
}

/// The decode contract consumers hand to the broker client.
///
/// Implementations are invoked from whichever thread the client decodes on,
/// so they must be shareable.
pub trait ValueDecoder: Send + Sync {
    fn decode(&self, bytes: &[u8]) -> Result<BenchRecord, CodecError>;
}

/// Decodes framed values of one subject.
#[derive(Clone, Copy, Debug)]
pub struct ValueDeserializer {
    subject: Subject,
}

impl ValueDeserializer {
    pub fn new(subject: Subject) -> Self {
        Self { subject }
    }
}

impl ValueDecoder for ValueDeserializer {
    fn decode(&self, bytes: &[u8]) -> Result<BenchRecord, CodecError> {
        if bytes.len() < FRAME_HEADER_LEN {
            return Err(CodecError::Truncated(bytes.len()));
        }
        if bytes[0] != MAGIC_BYTE {
            return Err(CodecError::BadMagic(bytes[0]));
        }
        let found = u32::from_be_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]);
        let expected = self.subject.schema_id();
        if found != expected {
            return Err(CodecError::SchemaMismatch { expected, found });
        }

        let body = &bytes[FRAME_HEADER_LEN..];
        let generic = self.subject.record_type == RecordType::Generic;
        let record = match (self.subject.format, self.subject.size, generic) {
            (Format::Binary, _, true) => {
                BenchRecord::Generic(bincode::deserialize::<GenericRecord>(body)?)
            }
            (Format::Binary, PayloadSize::Small, false) => {
                BenchRecord::Small(bincode::deserialize::<SmallOrder>(body)?)
            }
            (Format::Binary, PayloadSize::Large, false) => {
                BenchRecord::Large(Box::new(bincode::deserialize::<LargeOrder>(body)?))
            }
            (Format::Text, _, true) => {
                BenchRecord::Generic(serde_json::from_slice::<GenericRecord>(body)?)
            }
            (Format::Text, PayloadSize::Small, false) => {
                BenchRecord::Small(serde_json::from_slice::<SmallOrder>(body)?)
            }
            (Format::Text, PayloadSize::Large, false) => {
                BenchRecord::Large(Box::new(serde_json::from_slice::<LargeOrder>(body)?))
            }
        };
        Ok(record)
    }
}
