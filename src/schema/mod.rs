//! Trust-boundary validation.
//!
//! - [`validator`]: schema combinators over untrusted JSON
//! - [`signaling`]: the envelope sum type and its decoder

pub mod signaling;
pub mod validator;

pub use signaling::{
    decode, decode_value, DecodeError, Envelope, ErrorDetail, IceCandidate, RemoteError,
    RemoteErrorCategory, SdpType, SessionDescription, Signal,
};
pub use validator::{
    any, either, exact, object, string, unknown, AnyValidator, BoxedValidator, Either, Exact,
    Mapped, ObjectValidator, StringValidator, Typed, ValidationError, Validator,
};
