//! Runtime validators for untrusted JSON.
//!
//! Validators are small combinators over [`serde_json::Value`]:
//!
//! - [`exact`] accepts one literal value
//! - [`string`], [`any`], [`unknown`] check the value's type tag
//! - [`object`] checks a set of required keys, ignoring extra ones
//! - [`either`] tries alternatives in order and keeps the first match
//!
//! Every validator returns a typed [`ValidationError`] instead of panicking.
//! [`Validator::typed`] turns an accepted value into a concrete Rust type, so
//! code past the trust boundary only ever sees strongly typed data.
//!
//! ```
//! use media_relay_client::schema::{either, exact, object, string, Validator};
//! use serde_json::json;
//!
//! let description = object()
//!     .field("type", either([exact("offer").boxed(), exact("answer").boxed()]))
//!     .field("sdp", string());
//!
//! assert!(description.validate(&json!({"type": "offer", "sdp": "v=0"})).is_ok());
//! assert!(description.validate(&json!({"type": "pranswer", "sdp": "v=0"})).is_err());
//! ```

use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use thiserror::Error;

/// Why a value was rejected.
///
/// `path` is a JSON path rooted at `$`, e.g. `$.data.sdp`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// The value has the wrong JSON type.
    #[error("{path}: expected {expected}, found {found}")]
    TypeMismatch {
        /// Location of the value.
        path: String,
        /// Expected JSON type.
        expected: &'static str,
        /// Actual JSON type.
        found: &'static str,
    },

    /// The value is not the required literal.
    #[error("{path}: expected literal {expected}")]
    LiteralMismatch {
        /// Location of the value.
        path: String,
        /// The literal, JSON encoded.
        expected: String,
    },

    /// A required key is absent.
    #[error("{path}: missing key `{key}`")]
    MissingKey {
        /// Location of the object.
        path: String,
        /// The absent key.
        key: String,
    },

    /// No alternative of an `either` accepted the value.
    #[error("{path}: no alternative matched")]
    NoAlternative {
        /// Location of the value.
        path: String,
    },

    /// The value passed validation but does not fit the target type.
    #[error("{path}: {message}")]
    Shape {
        /// Location of the value.
        path: String,
        /// Deserializer message.
        message: String,
    },
}

impl ValidationError {
    /// Re-root this error under `key` of an enclosing object.
    fn nested(mut self, key: &str) -> Self {
        let path = match &mut self {
            Self::TypeMismatch { path, .. }
            | Self::LiteralMismatch { path, .. }
            | Self::MissingKey { path, .. }
            | Self::NoAlternative { path }
            | Self::Shape { path, .. } => path,
        };
        let rerooted = format!("{ROOT}.{key}{}", path.strip_prefix(ROOT).unwrap_or(path.as_str()));
        *path = rerooted;
        self
    }
}

const ROOT: &str = "$";

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// A pure check over a JSON value.
pub trait Validator: Send + Sync {
    /// What an accepted value is turned into.
    type Output;

    /// Accept or reject `value`.
    fn validate(&self, value: &Value) -> Result<Self::Output, ValidationError>;

    /// Transform the accepted output.
    fn map<F, U>(self, f: F) -> Mapped<Self, F>
    where
        Self: Sized,
        F: Fn(Self::Output) -> U + Send + Sync,
    {
        Mapped { inner: self, f }
    }

    /// Deserialize an accepted value into `T`.
    fn typed<T>(self) -> Typed<Self, T>
    where
        Self: Sized,
        T: DeserializeOwned,
    {
        Typed {
            inner: self,
            _target: PhantomData,
        }
    }

    /// Erase the concrete validator type.
    fn boxed(self) -> BoxedValidator<Self::Output>
    where
        Self: Sized + 'static,
    {
        Box::new(self)
    }
}

/// A type-erased validator.
pub type BoxedValidator<O> = Box<dyn Validator<Output = O>>;

impl<O> Validator for Box<dyn Validator<Output = O>> {
    type Output = O;

    fn validate(&self, value: &Value) -> Result<O, ValidationError> {
        (**self).validate(value)
    }
}

/// See [`exact`].
#[derive(Debug, Clone)]
pub struct Exact {
    literal: Value,
}

/// Accept only values strictly equal to `literal`.
pub fn exact(literal: impl Into<Value>) -> Exact {
    Exact {
        literal: literal.into(),
    }
}

impl Validator for Exact {
    type Output = Value;

    fn validate(&self, value: &Value) -> Result<Value, ValidationError> {
        if *value == self.literal {
            Ok(value.clone())
        } else {
            Err(ValidationError::LiteralMismatch {
                path: ROOT.to_owned(),
                expected: self.literal.to_string(),
            })
        }
    }
}

/// See [`string`].
#[derive(Debug, Clone, Copy, Default)]
pub struct StringValidator;

/// Accept any JSON string.
pub fn string() -> StringValidator {
    StringValidator
}

impl Validator for StringValidator {
    type Output = String;

    fn validate(&self, value: &Value) -> Result<String, ValidationError> {
        match value {
            Value::String(s) => Ok(s.clone()),
            other => Err(ValidationError::TypeMismatch {
                path: ROOT.to_owned(),
                expected: "string",
                found: type_name(other),
            }),
        }
    }
}

/// See [`any`].
#[derive(Debug, Clone, Copy, Default)]
pub struct AnyValidator;

/// Accept every value, carrying it through opaquely.
pub fn any() -> AnyValidator {
    AnyValidator
}

/// Same as [`any`]; use it to mark values that are checked later.
pub fn unknown() -> AnyValidator {
    AnyValidator
}

impl Validator for AnyValidator {
    type Output = Value;

    fn validate(&self, value: &Value) -> Result<Value, ValidationError> {
        Ok(value.clone())
    }
}

type FieldCheck = Box<dyn Fn(&Value) -> Result<(), ValidationError> + Send + Sync>;

/// See [`object`].
pub struct ObjectValidator {
    fields: Vec<(String, FieldCheck)>,
}

/// Accept a JSON object. Add required keys with [`ObjectValidator::field`].
///
/// Keys not named by a field are ignored and kept in the output.
pub fn object() -> ObjectValidator {
    ObjectValidator { fields: Vec::new() }
}

impl ObjectValidator {
    /// Require `key` to be present and accepted by `validator`.
    pub fn field<V>(mut self, key: impl Into<String>, validator: V) -> Self
    where
        V: Validator + 'static,
    {
        let check: FieldCheck = Box::new(move |value| validator.validate(value).map(|_| ()));
        self.fields.push((key.into(), check));
        self
    }
}

impl Validator for ObjectValidator {
    type Output = Map<String, Value>;

    fn validate(&self, value: &Value) -> Result<Self::Output, ValidationError> {
        let record = match value {
            Value::Object(record) => record,
            other => {
                return Err(ValidationError::TypeMismatch {
                    path: ROOT.to_owned(),
                    expected: "object",
                    found: type_name(other),
                })
            }
        };

        for (key, check) in &self.fields {
            let Some(field) = record.get(key) else {
                return Err(ValidationError::MissingKey {
                    path: ROOT.to_owned(),
                    key: key.clone(),
                });
            };
            check(field).map_err(|e| e.nested(key))?;
        }

        Ok(record.clone())
    }
}

/// See [`either`].
pub struct Either<O> {
    alternatives: Vec<BoxedValidator<O>>,
}

/// Try each alternative in order; the first one that accepts wins.
pub fn either<O, I>(alternatives: I) -> Either<O>
where
    I: IntoIterator<Item = BoxedValidator<O>>,
{
    Either {
        alternatives: alternatives.into_iter().collect(),
    }
}

impl<O> Validator for Either<O> {
    type Output = O;

    fn validate(&self, value: &Value) -> Result<O, ValidationError> {
        self.alternatives
            .iter()
            .find_map(|alternative| alternative.validate(value).ok())
            .ok_or_else(|| ValidationError::NoAlternative {
                path: ROOT.to_owned(),
            })
    }
}

/// See [`Validator::map`].
#[derive(Debug, Clone)]
pub struct Mapped<V, F> {
    inner: V,
    f: F,
}

impl<V, F, U> Validator for Mapped<V, F>
where
    V: Validator,
    F: Fn(V::Output) -> U + Send + Sync,
{
    type Output = U;

    fn validate(&self, value: &Value) -> Result<U, ValidationError> {
        self.inner.validate(value).map(&self.f)
    }
}

/// See [`Validator::typed`].
pub struct Typed<V, T> {
    inner: V,
    _target: PhantomData<fn() -> T>,
}

impl<V, T> Validator for Typed<V, T>
where
    V: Validator,
    T: DeserializeOwned,
{
    type Output = T;

    fn validate(&self, value: &Value) -> Result<T, ValidationError> {
        self.inner.validate(value)?;
        serde_json::from_value(value.clone()).map_err(|e| ValidationError::Shape {
            path: ROOT.to_owned(),
            message: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::num::i64::ANY as ANY_I64;
    use proptest::{prop_assert, prop_assert_eq, prop_assume, proptest};
    use serde::Deserialize;
    use serde_json::json;

    #[test]
    fn test_exact_is_strict() {
        let v = exact("offer");
        assert_eq!(v.validate(&json!("offer")), Ok(json!("offer")));
        assert!(v.validate(&json!("Offer")).is_err());
        assert!(v.validate(&json!(["offer"])).is_err());

        let n = exact(1);
        assert!(n.validate(&json!(1)).is_ok());
        assert!(n.validate(&json!("1")).is_err());
    }

    #[test]
    fn test_string_type_check() {
        assert_eq!(string().validate(&json!("sdp")), Ok("sdp".to_owned()));
        assert_eq!(
            string().validate(&json!(3)),
            Err(ValidationError::TypeMismatch {
                path: "$".into(),
                expected: "string",
                found: "number",
            })
        );
    }

    #[test]
    fn test_any_and_unknown_accept_everything() {
        for value in [json!(null), json!(1), json!({"a": [1, 2]}), json!("x")] {
            assert_eq!(any().validate(&value), Ok(value.clone()));
            assert_eq!(unknown().validate(&value), Ok(value));
        }
    }

    #[test]
    fn test_object_requires_keys() {
        let v = object().field("k", string());

        assert!(v.validate(&json!({"k": "v"})).is_ok());
        assert_eq!(
            v.validate(&json!({"other": "v"})),
            Err(ValidationError::MissingKey {
                path: "$".into(),
                key: "k".into(),
            })
        );
        assert!(v.validate(&json!({"k": 5})).is_err());
        assert!(v.validate(&json!(null)).is_err());
        assert!(v.validate(&json!([["k", "v"]])).is_err());
    }

    #[test]
    fn test_object_keeps_extra_keys() {
        let v = object().field("k", string());
        let out = v.validate(&json!({"k": "v", "extra": 1})).unwrap();
        assert_eq!(out.get("extra"), Some(&json!(1)));
    }

    #[test]
    fn test_empty_object_accepts_any_record() {
        let v = object();
        assert!(v.validate(&json!({})).is_ok());
        assert!(v.validate(&json!({"candidate": "a=1"})).is_ok());
        assert!(v.validate(&json!("candidate")).is_err());
    }

    #[test]
    fn test_nested_error_path() {
        let v = object().field("data", object().field("data", object().field("sdp", string())));
        let err = v
            .validate(&json!({"data": {"data": {"sdp": false}}}))
            .unwrap_err();
        assert!(err.to_string().starts_with("$.data.data.sdp:"), "{err}");
    }

    #[test]
    fn test_either_first_match_wins() {
        let v = either([
            any().map(|_| "first").boxed(),
            exact("x").map(|_| "second").boxed(),
        ]);
        assert_eq!(v.validate(&json!("x")), Ok("first"));
    }

    #[test]
    fn test_either_falls_through() {
        let v = either([exact("a").boxed(), exact("b").boxed()]);
        assert_eq!(v.validate(&json!("b")), Ok(json!("b")));
        assert_eq!(
            v.validate(&json!("c")),
            Err(ValidationError::NoAlternative { path: "$".into() })
        );
    }

    #[test]
    fn test_nested_composition() {
        let v = object().field(
            "outer",
            object().field("inner", either([exact(1).boxed(), exact(2).boxed()])),
        );
        assert!(v.validate(&json!({"outer": {"inner": 2}})).is_ok());
        assert!(v.validate(&json!({"outer": {"inner": 3}})).is_err());
    }

    #[test]
    fn test_typed_output() {
        #[derive(Debug, Deserialize, PartialEq)]
        struct Point {
            x: i64,
        }

        let v = object().field("x", any()).typed::<Point>();
        assert_eq!(v.validate(&json!({"x": 3})), Ok(Point { x: 3 }));
        assert!(matches!(
            v.validate(&json!({"x": "three"})),
            Err(ValidationError::Shape { .. })
        ));
    }

    proptest! {
        #[test]
        fn prop_either_reports_earliest_branch(key in "[a-z]{1,8}", n in ANY_I64) {
            let value = json!({ key.clone(): n });
            let v = either([
                object().field(key.clone(), any()).map(|_| 0u8).boxed(),
                object().map(|_| 1u8).boxed(),
            ]);
            prop_assert_eq!(v.validate(&value), Ok(0u8));
        }

        #[test]
        fn prop_object_rejects_missing_key(present in "[a-z]{1,8}", n in ANY_I64) {
            let v = object().field("required", any());
            prop_assume!(present != "required");
            let result = v.validate(&json!({ present: n }));
            let rejected = matches!(result, Err(ValidationError::MissingKey { .. }));
            prop_assert!(rejected);
        }
    }
}
