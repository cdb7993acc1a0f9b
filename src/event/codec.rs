//! Versioned binary records.
//!
//! Every record is a one-byte version tag followed by a bincode body.
//! Decoding dispatches on the tag; older layouts are upgraded with
//! default-filled fields and unknown tags are rejected.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::types::{EventFlags, EventId, EventObject, Language, MessageDigest, MessageInfo};
use crate::membership::types::{BankId, DispositionSnapshot};
use crate::similarity::{WordId, WordWeight};
use crate::storage::counter::WordPairKey;

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("empty {0} record")]
    Empty(&'static str),

    #[error("unsupported {kind} record version {version}")]
    UnsupportedVersion { kind: &'static str, version: u8 },

    #[error("malformed record: {0}")]
    Bincode(#[from] bincode::Error),
}

pub trait Versioned: Sized {
    const KIND: &'static str;
    /// Version written by `encode`.
    const VERSION: u8;

    fn encode_body(&self) -> bincode::Result<Vec<u8>>;

    fn decode_body(version: u8, body: &[u8]) -> Result<Self, CodecError>;
}

pub fn encode<T: Versioned>(record: &T) -> Result<Vec<u8>, CodecError> {
    let body = record.encode_body()?;
    let mut bytes = Vec::with_capacity(body.len() + 1);
    bytes.push(T::VERSION);
    bytes.extend_from_slice(&body);
    Ok(bytes)
}

pub fn decode<T: Versioned>(bytes: &[u8]) -> Result<T, CodecError> {
    let (version, body) = bytes.split_first().ok_or(CodecError::Empty(T::KIND))?;
    T::decode_body(*version, body)
}

fn unsupported<T: Versioned>(version: u8) -> CodecError {
    CodecError::UnsupportedVersion {
        kind: T::KIND,
        version,
    }
}

// --- Event ---

/// First layout: words carried no first-occurrence counter.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct EventRecordV1 {
    pub id: Uuid,
    pub flags: u8,
    pub spin: i32,
    pub dissenters: u32,
    pub lang: Language,
    pub words: Vec<(WordId, u32)>,
    pub messages: Vec<MessageInfo>,
}

#[derive(Debug, Serialize, Deserialize)]
struct EventRecordV2 {
    id: Uuid,
    flags: u8,
    spin: i32,
    dissenters: u32,
    lang: Language,
    words: Vec<WordWeight>,
    messages: Vec<MessageInfo>,
}

impl Versioned for EventObject {
    const KIND: &'static str = "event";
    const VERSION: u8 = 2;

    fn encode_body(&self) -> bincode::Result<Vec<u8>> {
        bincode::serialize(&EventRecordV2 {
            id: self.id.0,
            flags: self.flags.persistent().0,
            spin: self.spin,
            dissenters: self.dissenters(),
            lang: self.lang,
            words: self.words().to_vec(),
            messages: self.messages().to_vec(),
        })
    }

    fn decode_body(version: u8, body: &[u8]) -> Result<Self, CodecError> {
        let record = match version {
            1 => {
                let old: EventRecordV1 = bincode::deserialize(body)?;
                EventRecordV2 {
                    id: old.id,
                    flags: old.flags,
                    spin: old.spin,
                    dissenters: old.dissenters,
                    lang: old.lang,
                    words: old
                        .words
                        .into_iter()
                        .map(|(word_id, weight)| WordWeight::new(word_id, weight, 0))
                        .collect(),
                    messages: old.messages,
                }
            }
            2 => bincode::deserialize(body)?,
            other => return Err(unsupported::<Self>(other)),
        };

        Ok(EventObject::from_parts(
            EventId(record.id),
            record.lang,
            record.spin,
            EventFlags(record.flags).persistent(),
            record.dissenters,
            record.words,
            record.messages,
        ))
    }
}

// --- MessageInfo ---

impl Versioned for MessageInfo {
    const KIND: &'static str = "message";
    const VERSION: u8 = 1;

    fn encode_body(&self) -> bincode::Result<Vec<u8>> {
        bincode::serialize(self)
    }

    fn decode_body(version: u8, body: &[u8]) -> Result<Self, CodecError> {
        match version {
            1 => Ok(bincode::deserialize(body)?),
            other => Err(unsupported::<Self>(other)),
        }
    }
}

// --- MessageDigest ---

/// A bank keeps the normalized digest of every member so a restart can
/// rebuild event profiles and indexes.
impl Versioned for MessageDigest {
    const KIND: &'static str = "message digest";
    const VERSION: u8 = 1;

    fn encode_body(&self) -> bincode::Result<Vec<u8>> {
        bincode::serialize(self)
    }

    fn decode_body(version: u8, body: &[u8]) -> Result<Self, CodecError> {
        match version {
            1 => Ok(bincode::deserialize(body)?),
            other => Err(unsupported::<Self>(other)),
        }
    }
}

// --- Word pair statistics ---

impl Versioned for WordPairKey {
    const KIND: &'static str = "word pair key";
    const VERSION: u8 = 1;

    fn encode_body(&self) -> bincode::Result<Vec<u8>> {
        bincode::serialize(self)
    }

    fn decode_body(version: u8, body: &[u8]) -> Result<Self, CodecError> {
        match version {
            1 => Ok(bincode::deserialize(body)?),
            other => Err(unsupported::<Self>(other)),
        }
    }
}

// --- Disposition snapshot ---

#[derive(Debug, Serialize, Deserialize)]
struct DispositionRecordV1 {
    guid: Uuid,
    banks: Vec<String>,
}

impl Versioned for DispositionSnapshot {
    const KIND: &'static str = "disposition";
    const VERSION: u8 = 1;

    fn encode_body(&self) -> bincode::Result<Vec<u8>> {
        bincode::serialize(&DispositionRecordV1 {
            guid: self.guid,
            banks: self.banks.iter().map(|b| b.0.clone()).collect(),
        })
    }

    fn decode_body(version: u8, body: &[u8]) -> Result<Self, CodecError> {
        match version {
            1 => {
                let record: DispositionRecordV1 = bincode::deserialize(body)?;
                Ok(DispositionSnapshot {
                    guid: record.guid,
                    banks: record.banks.into_iter().map(BankId).collect(),
                })
            }
            other => Err(unsupported::<Self>(other)),
        }
    }
}
