use serde::de::{Error, SeqAccess, Visitor};
use serde::Deserialize;
use serde::Deserializer;
use std::fmt;
use std::fmt::Formatter;

use crate::block::Value;

/// An input as it is stored in project.json: `[shadow, value, obscured?]`.
/// Block references are still ids here; `json::load` turns them into
/// indices.
#[derive(Debug, PartialEq)]
pub enum Input {
  Block(String),
  Value(Value),
  /// Named references. The ids stored next to the names are not needed.
  Broadcast(String),
  Variable(String),
  List(String),
  Empty,
}

impl<'de> Deserialize<'de> for Input {
  fn deserialize<D: Deserializer<'de>>(de: D) -> Result<Self, D::Error> {
    struct SeqVisitor;
    impl<'de> Visitor<'de> for SeqVisitor {
      type Value = Input;
      fn expecting(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "an input array")
      }
      fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
        #[derive(Debug, Deserialize)]
        #[serde(untagged)]
        enum T {
          String(String),
          Values(Vec<serde_json::Value>),
        }
        let _shadow = seq.next_element::<serde_json::Value>()?;
        let input = match seq.next_element::<Option<T>>()? {
          Some(Some(T::String(id))) => Input::Block(id),
          Some(Some(T::Values(values))) => primitive(values).map_err(A::Error::custom)?,
          Some(None) | None => Input::Empty,
        };
        while seq.next_element::<serde_json::Value>()?.is_some() {}
        Ok(input)
      }
    }
    de.deserialize_seq(SeqVisitor)
  }
}

fn primitive(values: Vec<serde_json::Value>) -> Result<Input, String> {
  let kind = values
    .first()
    .and_then(serde_json::Value::as_i64)
    .ok_or_else(|| format!("primitive without a type: {values:?}"))?;
  let text = |index: usize| -> String {
    match values.get(index) {
      Some(serde_json::Value::String(string)) => string.clone(),
      Some(serde_json::Value::Null) | None => String::new(),
      Some(other) => other.to_string(),
    }
  };
  Ok(match kind {
    4..=10 => Input::Value(literal(values.get(1))),
    11 => Input::Broadcast(text(1)),
    12 => Input::Variable(text(1)),
    13 => Input::List(text(1)),
    _ => return Err(format!("unknown primitive type {kind}")),
  })
}

/// Converts a JSON literal into a [`Value`].
pub fn literal(value: Option<&serde_json::Value>) -> Value {
  match value {
    Some(serde_json::Value::Number(number)) => Value::Number(number.as_f64().unwrap_or(0.)),
    Some(serde_json::Value::String(string)) => Value::String(string.clone()),
    Some(serde_json::Value::Bool(boolean)) => Value::Bool(*boolean),
    Some(serde_json::Value::Null) | None => Value::String(String::new()),
    Some(other) => Value::String(other.to_string()),
  }
}
