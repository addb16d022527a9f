//! Bearer tokens and their decoded claims view
//!
//! Tokens are opaque to everything except expiry scheduling and role checks,
//! so decoding is lenient: any malformed token simply has no
//! claims. Nothing here ever returns an error to the caller.

use base64::Engine as _;
use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque bearer credential
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Token(String);

impl Token {
    /// Wrap a raw token string
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// The raw token string
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Decode the claims carried in the payload segment
    ///
    /// Returns `None` when the token is not three dot-separated segments, the
    /// payload is not base64url, or the payload is not a JSON object.
    #[must_use]
    pub fn claims(&self) -> Option<Claims> {
        Claims::decode(&self.0)
    }

    /// Expiry in epoch seconds, if the token carries a readable one
    #[must_use]
    pub fn expires_at(&self) -> Option<i64> {
        self.claims().and_then(|claims| claims.expires_at)
    }

    /// Roles granted by the token, empty when the claims are unreadable
    #[must_use]
    pub fn roles(&self) -> Vec<String> {
        self.claims().map(|claims| claims.roles).unwrap_or_default()
    }
}

impl From<String> for Token {
    fn from(raw: String) -> Self {
        Self(raw)
    }
}

impl From<&str> for Token {
    fn from(raw: &str) -> Self {
        Self(raw.to_string())
    }
}

// Tokens are credentials; keep them out of logs.
impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let len = self.0.len();
        write!(f, "Token(<{len} bytes>)")
    }
}

/// Decoded view of a token's payload
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID)
    #[serde(rename = "sub", default, deserialize_with = "lenient_subject")]
    pub subject_id: String,
    /// Granted roles, normalized to a sequence
    #[serde(default, deserialize_with = "one_or_many")]
    pub roles: Vec<String>,
    /// Expiration time (epoch seconds)
    #[serde(rename = "exp", default, deserialize_with = "lenient_exp")]
    pub expires_at: Option<i64>,
}

impl Claims {
    /// Decode the middle segment of a three-part token
    #[must_use]
    pub fn decode(raw: &str) -> Option<Self> {
        let mut segments = raw.split('.');
        let (Some(_header), Some(payload), Some(_signature), None) = (
            segments.next(),
            segments.next(),
            segments.next(),
            segments.next(),
        ) else {
            return None;
        };

        let bytes = URL_SAFE_NO_PAD
            .decode(payload)
            .or_else(|_| URL_SAFE.decode(payload))
            .ok()?;

        let value: serde_json::Value = serde_json::from_slice(&bytes).ok()?;
        if !value.is_object() {
            return None;
        }
        serde_json::from_value(value).ok()
    }

    /// Whether any of `required` is among the granted roles
    #[must_use]
    pub fn has_any_role<S: AsRef<str>>(&self, required: &[S]) -> bool {
        required
            .iter()
            .any(|role| self.roles.iter().any(|granted| granted == role.as_ref()))
    }
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
        Other(serde_json::Value),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(role) => vec![role],
        OneOrMany::Many(roles) => roles,
        OneOrMany::Other(_) => Vec::new(),
    })
}

// Numeric subjects are kept as their decimal text; anything else is empty.
fn lenient_subject<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(subject) => subject,
        serde_json::Value::Number(subject) => subject.to_string(),
        _ => String::new(),
    })
}

// A non-numeric `exp` is untrusted and treated as absent.
#[allow(clippy::cast_possible_truncation)]
fn lenient_exp<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(value
        .as_i64()
        .or_else(|| value.as_f64().map(|exp| exp.floor() as i64)))
}
