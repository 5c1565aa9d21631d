//! Proof-of-possession challenge handshake.
//!
//! ```text
//! client                                   relay
//!   │ connect  ?clientId=<Client ID>          │
//!   │ ◄───── {"type":"CHALLENGE","data":{"payload":"<b64>"}}
//!   │ ─────► {"type":"CHALLENGE_RESPONSE","data":{"payload":"<b64 sig>"}}
//!   │ ◄───── {"type":"AUTHENTICATED"}  |  error envelope
//! ```
//!
//! The signer is called exactly once per connection attempt, after the
//! challenge arrives. Any failure ends the attempt; the session then retries
//! with a fresh connection.

use std::fmt;
use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde_json::{json, Value};
use tracing::{debug, warn};
use url::Url;

use super::identity::{ClientId, SignError, Signer};
use crate::core::constants::{
    PARAM_CLIENT_ID, TAG_AUTHENTICATED, TAG_CHALLENGE, TAG_CHALLENGE_RESPONSE,
};
use crate::schema::{self, exact, object, string, BoxedValidator, Validator};
use crate::transport::{Handshake, HandshakeError, Link};

impl From<SignError> for HandshakeError {
    fn from(e: SignError) -> Self {
        HandshakeError::Sign(e.to_string())
    }
}

static CHALLENGE_SCHEMA: LazyLock<BoxedValidator<String>> = LazyLock::new(|| {
    object()
        .field("type", exact(TAG_CHALLENGE))
        .field("data", object().field("payload", string()))
        .map(|frame| {
            frame
                .get("data")
                .and_then(|data| data.get("payload"))
                .and_then(Value::as_str)
                .map(str::to_owned)
                .unwrap_or_default()
        })
        .boxed()
});

static ADMISSION_SCHEMA: LazyLock<BoxedValidator<Value>> =
    LazyLock::new(|| exact(TAG_AUTHENTICATED).boxed());

/// Signs the relay's challenge with the key behind a Client ID.
#[derive(Clone)]
pub struct ChallengeHandshake {
    client_id: ClientId,
    signer: Arc<dyn Signer>,
}

impl fmt::Debug for ChallengeHandshake {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChallengeHandshake")
            .field("client_id", &self.client_id.as_str())
            .finish_non_exhaustive()
    }
}

impl ChallengeHandshake {
    /// Authenticate as `client_id`, signing with `signer`.
    pub fn new(client_id: ClientId, signer: Arc<dyn Signer>) -> Self {
        Self { client_id, signer }
    }

    /// The identity presented to the relay.
    pub fn client_id(&self) -> &ClientId {
        &self.client_id
    }
}

fn parse(frame: &str) -> Result<Value, HandshakeError> {
    serde_json::from_str(frame).map_err(|e| HandshakeError::Malformed(e.to_string()))
}

/// Map a non-admission frame to the reason we were turned away.
fn rejection(frame: &Value) -> HandshakeError {
    match schema::decode_value(frame).ok().and_then(|envelope| envelope.remote_error()) {
        Some(error) => HandshakeError::Rejected(error.code),
        None => HandshakeError::Malformed(frame.to_string()),
    }
}

#[async_trait]
impl Handshake for ChallengeHandshake {
    fn address(&self, base: &str) -> String {
        match Url::parse(base) {
            Ok(mut url) => {
                let kept: Vec<(String, String)> = url
                    .query_pairs()
                    .filter(|(key, _)| key != PARAM_CLIENT_ID)
                    .map(|(key, value)| (key.into_owned(), value.into_owned()))
                    .collect();
                url.query_pairs_mut()
                    .clear()
                    .extend_pairs(kept)
                    .append_pair(PARAM_CLIENT_ID, self.client_id.as_str());
                url.into()
            }
            Err(e) => {
                warn!(address = base, error = %e, "address is not a url, client id not attached");
                base.to_owned()
            }
        }
    }

    async fn admit(&self, link: &mut Link) -> Result<(), HandshakeError> {
        let frame = link.recv().await.ok_or(HandshakeError::LinkClosed)?;
        let frame = parse(&frame)?;
        let challenge = match CHALLENGE_SCHEMA.validate(&frame) {
            Ok(challenge) => challenge,
            Err(_) => return Err(rejection(&frame)),
        };
        let challenge = BASE64
            .decode(challenge)
            .map_err(|e| HandshakeError::Malformed(e.to_string()))?;

        debug!(client_id = %self.client_id, "signing challenge");
        let signature = self.signer.sign(&challenge).await?;

        let response = json!({
            "type": TAG_CHALLENGE_RESPONSE,
            "data": { "payload": BASE64.encode(signature) },
        });
        link.send(response.to_string())
            .map_err(|_| HandshakeError::LinkClosed)?;

        let frame = link.recv().await.ok_or(HandshakeError::LinkClosed)?;
        let frame = parse(&frame)?;
        match frame.get("type").map(|tag| ADMISSION_SCHEMA.validate(tag)) {
            Some(Ok(_)) => {
                debug!(client_id = %self.client_id, "authenticated");
                Ok(())
            }
            _ => Err(rejection(&frame)),
        }
    }
}
