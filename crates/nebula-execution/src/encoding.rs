//! Action spec encoding for transport into a container environment.
//!
//! A spec is converted to canonical JSON (object keys sorted, so equal
//! specs always encode to the same bytes), then optionally passed through
//! a further [`SpecEncoder`]. The executor uses [`Base64Encoder`] so quotes
//! and newlines survive a single-line environment variable.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use nebula_plan::Action;
use serde_json::{Map, Number, Value as Json};
use serde_yaml::Value as Yaml;
use thiserror::Error;

/// Environment variable carrying the encoded action spec.
pub const ACTION_SPEC_ENV: &str = "NEBULA_ACTION_SPEC";

/// Errors converting a spec for transport.
///
/// The conversion accepts every YAML value that has a JSON equivalent, so
/// these point at a spec using YAML-only features or at a bug.
#[derive(Debug, Error)]
pub enum EncodeError {
  #[error("spec contains a number with no JSON representation: {0}")]
  NonFiniteNumber(String),

  #[error("spec mapping key has no JSON representation: {0}")]
  UnsupportedKey(String),

  #[error("failed to serialize spec: {source}")]
  Json {
    #[source]
    source: serde_json::Error,
  },

  #[error("encoded spec is not valid base64: {source}")]
  Base64 {
    #[source]
    source: base64::DecodeError,
  },
}

/// A step applied to the JSON bytes after conversion.
pub trait SpecEncoder: Send + Sync {
  fn encode(&self, json: &[u8]) -> Result<String, EncodeError>;
}

/// Standard, padded base64.
#[derive(Debug, Clone, Copy, Default)]
pub struct Base64Encoder;

impl SpecEncoder for Base64Encoder {
  fn encode(&self, json: &[u8]) -> Result<String, EncodeError> {
    Ok(STANDARD.encode(json))
  }
}

/// The action's spec as canonical JSON text.
pub fn json_encode(action: &Action) -> Result<String, EncodeError> {
  let value = yaml_to_json(action.spec.value())?;
  serde_json::to_string(&value).map_err(|e| EncodeError::Json { source: e })
}

/// The action's spec as JSON, passed through `after` when given.
pub fn encode_action_spec(
  action: &Action,
  after: Option<&dyn SpecEncoder>,
) -> Result<String, EncodeError> {
  let json = json_encode(action)?;
  match after {
    Some(encoder) => encoder.encode(json.as_bytes()),
    None => Ok(json),
  }
}

/// Recover the spec from an [`ACTION_SPEC_ENV`] value.
pub fn decode_action_spec(encoded: &str) -> Result<Json, EncodeError> {
  let bytes = STANDARD
    .decode(encoded.trim())
    .map_err(|e| EncodeError::Base64 { source: e })?;
  serde_json::from_slice(&bytes).map_err(|e| EncodeError::Json { source: e })
}

/// Convert a YAML document value to its JSON equivalent.
///
/// Scalar mapping keys are stringified (`1: a` becomes `{"1": "a"}`) and
/// tags are dropped in favour of the tagged value.
pub fn yaml_to_json(value: &Yaml) -> Result<Json, EncodeError> {
  Ok(match value {
    Yaml::Null => Json::Null,
    Yaml::Bool(b) => Json::Bool(*b),
    Yaml::Number(n) => Json::Number(number_to_json(n)?),
    Yaml::String(s) => Json::String(s.clone()),
    Yaml::Sequence(items) => Json::Array(items.iter().map(yaml_to_json).collect::<Result<_, _>>()?),
    Yaml::Mapping(map) => {
      let mut object = Map::new();
      for (key, child) in map {
        object.insert(key_to_string(key)?, yaml_to_json(child)?);
      }
      Json::Object(object)
    }
    Yaml::Tagged(tagged) => yaml_to_json(&tagged.value)?,
  })
}

fn number_to_json(n: &serde_yaml::Number) -> Result<Number, EncodeError> {
  if let Some(i) = n.as_i64() {
    Ok(Number::from(i))
  } else if let Some(u) = n.as_u64() {
    Ok(Number::from(u))
  } else {
    n.as_f64()
      .and_then(Number::from_f64)
      .ok_or_else(|| EncodeError::NonFiniteNumber(n.to_string()))
  }
}

fn key_to_string(key: &Yaml) -> Result<String, EncodeError> {
  match key {
    Yaml::String(s) => Ok(s.clone()),
    Yaml::Bool(b) => Ok(b.to_string()),
    Yaml::Number(n) => Ok(n.to_string()),
    Yaml::Null => Ok("null".to_string()),
    Yaml::Tagged(tagged) => key_to_string(&tagged.value),
    other => Err(EncodeError::UnsupportedKey(format!("{:?}", other))),
  }
}
