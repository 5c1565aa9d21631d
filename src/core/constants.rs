//! Wire-level constants and default timings.
//!
//! Tag strings are part of the relay's wire format and MUST NOT be changed.

use std::time::Duration;

// =============================================================================
// ENVELOPE TAGS
// =============================================================================

/// Outer tag of a signaling envelope.
pub const TAG_SIGNALLING: &str = "SIGNALLING";

/// Inner tag carrying a session description.
pub const TAG_DESCRIPTION: &str = "DESCRIPTION";

/// Inner tag carrying an ICE candidate.
pub const TAG_ICE_CANDIDATE: &str = "ICE_CANDIDATE";

/// Relay-side failure.
pub const TAG_SERVER_ERROR: &str = "SERVER_ERROR";

/// Relay rejected something the client sent.
pub const TAG_CLIENT_ERROR: &str = "CLIENT_ERROR";

/// Failure the relay could not classify (used for authentication failures).
pub const TAG_UNKNOWN_ERROR: &str = "UNKNOWN_ERROR";

/// Description type of an offer.
pub const SDP_OFFER: &str = "offer";

/// Description type of an answer.
pub const SDP_ANSWER: &str = "answer";

// =============================================================================
// HANDSHAKE TAGS
// =============================================================================

/// Relay's challenge frame.
pub const TAG_CHALLENGE: &str = "CHALLENGE";

/// Client's signed reply to a challenge.
pub const TAG_CHALLENGE_RESPONSE: &str = "CHALLENGE_RESPONSE";

/// Relay's admission frame.
pub const TAG_AUTHENTICATED: &str = "AUTHENTICATED";

// =============================================================================
// ADDRESS QUERY PARAMETERS
// =============================================================================

/// Key identifier of the publisher a receiver subscribes to.
pub const PARAM_KEY_ID: &str = "keyId";

/// Stream identifier a receiver subscribes to.
pub const PARAM_STREAM_ID: &str = "streamId";

/// Media kind a receiver subscribes to.
pub const PARAM_KIND: &str = "kind";

/// Client ID presented by an authenticating sender.
pub const PARAM_CLIENT_ID: &str = "clientId";

// =============================================================================
// CLIENT ID
// =============================================================================

/// Prefix of every Client ID (`WebCrypto-raw.EC.<curve>$<base64>`).
pub const CLIENT_ID_PREFIX: &str = "WebCrypto-raw.EC.";

/// Separator between the curve name and the encoded public key.
pub const CLIENT_ID_SEPARATOR: char = '$';

// =============================================================================
// TIMING DEFAULTS
// =============================================================================

/// How long a single connection attempt may take.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// How long the proof-of-possession handshake may take.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// First reconnect delay.
pub const DEFAULT_BACKOFF_INITIAL: Duration = Duration::from_millis(250);

/// Reconnect delay cap.
pub const DEFAULT_BACKOFF_MAX: Duration = Duration::from_secs(30);

/// Growth factor between consecutive reconnect delays.
pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;

/// Fraction of each delay that is randomised.
pub const DEFAULT_BACKOFF_JITTER: f64 = 0.2;
