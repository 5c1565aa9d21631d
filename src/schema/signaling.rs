//! Signaling envelopes exchanged with the relay.
//!
//! Wire format, one JSON envelope per frame:
//!
//! ```text
//! {"type":"SIGNALLING","data":{"type":"DESCRIPTION","data":{"type":"offer","sdp":"v=0..."}}}
//! {"type":"SIGNALLING","data":{"type":"ICE_CANDIDATE","data":{...opaque...}}}
//! {"type":"SERVER_ERROR","data":{"type":"CREATE_OFFER_FAILED"}}
//! ```
//!
//! Inbound frames go through [`decode`], which runs the schema validator
//! before anything is interpreted. Frames that fail are reported as
//! [`DecodeError`] and callers drop them.

use std::sync::LazyLock;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use super::validator::{either, exact, object, string, Either, Typed, ValidationError, Validator};
use crate::core::constants::{
    SDP_ANSWER, SDP_OFFER, TAG_CLIENT_ERROR, TAG_DESCRIPTION, TAG_ICE_CANDIDATE,
    TAG_SERVER_ERROR, TAG_SIGNALLING, TAG_UNKNOWN_ERROR,
};

/// Offer or answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    /// An offer.
    Offer,
    /// An answer.
    Answer,
}

/// A session description as carried in a `DESCRIPTION` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    /// Offer or answer.
    #[serde(rename = "type")]
    pub sdp_type: SdpType,
    /// SDP text.
    pub sdp: String,
}

impl SessionDescription {
    /// An offer with the given SDP.
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Offer,
            sdp: sdp.into(),
        }
    }

    /// An answer with the given SDP.
    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Answer,
            sdp: sdp.into(),
        }
    }

    /// Whether the SDP text is non-blank.
    pub fn is_usable(&self) -> bool {
        !self.sdp.trim().is_empty()
    }
}

/// An ICE candidate, passed through to the peer-transport engine uninterpreted.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IceCandidate(Map<String, Value>);

impl IceCandidate {
    /// Wrap a candidate record.
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// Look up a field of the candidate record.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }
}

/// Inner payload of a `SIGNALLING` envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Signal {
    /// Offer or answer.
    #[serde(rename = "DESCRIPTION")]
    Description(SessionDescription),
    /// A network candidate.
    #[serde(rename = "ICE_CANDIDATE")]
    IceCandidate(IceCandidate),
}

/// Body of a relay error envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Machine readable code, e.g. `AUTHENTICATION_FAILED`.
    #[serde(rename = "type")]
    pub code: String,
}

/// Which side the relay blames for an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteErrorCategory {
    /// The relay failed.
    Server,
    /// The client sent something the relay would not accept.
    Client,
    /// Unclassified, including authentication failures.
    Unknown,
}

/// An error reported by the relay.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("relay reported {category:?} error {code}")]
pub struct RemoteError {
    /// Who is at fault.
    pub category: RemoteErrorCategory,
    /// Relay error code.
    pub code: String,
}

/// Every envelope understood on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Envelope {
    /// Offer/answer/candidate exchange.
    #[serde(rename = "SIGNALLING")]
    Signalling(Signal),
    /// Relay-side failure.
    #[serde(rename = "SERVER_ERROR")]
    ServerError(ErrorDetail),
    /// The relay rejected a client message.
    #[serde(rename = "CLIENT_ERROR")]
    ClientError(ErrorDetail),
    /// Unclassified failure.
    #[serde(rename = "UNKNOWN_ERROR")]
    UnknownError(ErrorDetail),
}

impl Envelope {
    /// Wrap a session description.
    pub fn description(description: SessionDescription) -> Self {
        Envelope::Signalling(Signal::Description(description))
    }

    /// Wrap an ICE candidate.
    pub fn ice_candidate(candidate: IceCandidate) -> Self {
        Envelope::Signalling(Signal::IceCandidate(candidate))
    }

    /// The relay error carried by this envelope, if any.
    pub fn remote_error(&self) -> Option<RemoteError> {
        let (category, detail) = match self {
            Envelope::Signalling(_) => return None,
            Envelope::ServerError(d) => (RemoteErrorCategory::Server, d),
            Envelope::ClientError(d) => (RemoteErrorCategory::Client, d),
            Envelope::UnknownError(d) => (RemoteErrorCategory::Unknown, d),
        };
        Some(RemoteError {
            category,
            code: detail.code.clone(),
        })
    }

    /// Serialize to a wire frame.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Why an inbound frame was dropped.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Not JSON.
    #[error("malformed json: {0}")]
    Json(#[from] serde_json::Error),

    /// JSON, but not an envelope we accept.
    #[error("invalid envelope: {0}")]
    Invalid(#[from] ValidationError),
}

type EnvelopeSchema = Typed<Either<Map<String, Value>>, Envelope>;

static ENVELOPE_SCHEMA: LazyLock<EnvelopeSchema> = LazyLock::new(envelope_schema);

fn envelope_schema() -> EnvelopeSchema {
    let description = object()
        .field("type", exact(TAG_DESCRIPTION))
        .field(
            "data",
            object()
                .field(
                    "type",
                    either([exact(SDP_OFFER).boxed(), exact(SDP_ANSWER).boxed()]),
                )
                .field("sdp", string()),
        );
    let candidate = object()
        .field("type", exact(TAG_ICE_CANDIDATE))
        .field("data", object());

    let signalling = object()
        .field("type", exact(TAG_SIGNALLING))
        .field("data", either([description.boxed(), candidate.boxed()]));

    let remote_error = object()
        .field(
            "type",
            either([
                exact(TAG_SERVER_ERROR).boxed(),
                exact(TAG_CLIENT_ERROR).boxed(),
                exact(TAG_UNKNOWN_ERROR).boxed(),
            ]),
        )
        .field("data", object().field("type", string()));

    either([signalling.boxed(), remote_error.boxed()]).typed()
}

/// Parse and validate one inbound frame.
pub fn decode(frame: &str) -> Result<Envelope, DecodeError> {
    let value: Value = serde_json::from_str(frame)?;
    decode_value(&value)
}

/// Validate an already parsed frame.
pub fn decode_value(value: &Value) -> Result<Envelope, DecodeError> {
    Ok(ENVELOPE_SCHEMA.validate(value)?)
}
