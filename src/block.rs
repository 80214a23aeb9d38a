use std::collections::HashMap;
use std::fmt;

use serde::Deserialize;

/// Index of a block inside its target's block list.
pub type BlockId = usize;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Value {
  Number(f64),
  String(String),
  Bool(bool),
}

impl Default for Value {
  fn default() -> Self {
    Value::Number(0.)
  }
}

impl From<f64> for Value {
  fn from(number: f64) -> Self {
    Value::Number(number)
  }
}

impl From<bool> for Value {
  fn from(boolean: bool) -> Self {
    Value::Bool(boolean)
  }
}

impl From<String> for Value {
  fn from(string: String) -> Self {
    Value::String(string)
  }
}

impl From<&str> for Value {
  fn from(string: &str) -> Self {
    Value::String(string.to_string())
  }
}

impl Value {
  /// Numeric value; text that does not look like a number and `NaN` become 0.
  pub fn to_f64(&self) -> f64 {
    let number = match self {
      Value::Number(number) => *number,
      Value::Bool(boolean) => *boolean as u8 as f64,
      Value::String(string) => parse_number(string).unwrap_or(0.),
    };
    if number.is_nan() {
      0.
    } else {
      number
    }
  }

  /// `0`, `""`, `"false"` and `false` are false; everything else is true.
  pub fn to_bool(&self) -> bool {
    match self {
      Value::Bool(boolean) => *boolean,
      Value::Number(number) => *number != 0.,
      Value::String(string) => {
        !(string.is_empty() || string == "false" || parse_number(string) == Some(0.))
      }
    }
  }

  /// Whether the value is a whole number. Numeric text written with a
  /// decimal point never is, so `1.0` asks for a fractional random number.
  pub fn is_int(&self) -> bool {
    match self {
      Value::String(string) if string.contains('.') && parse_number(string).is_some() => false,
      value => value.to_f64().fract() == 0.,
    }
  }

  fn numeric(&self) -> Option<f64> {
    let number = match self {
      Value::Number(number) => *number,
      Value::Bool(boolean) => *boolean as u8 as f64,
      Value::String(string) => {
        if !string.bytes().any(|byte| byte.is_ascii_digit()) {
          return None;
        }
        parse_number(string)?
      }
    };
    if number.is_nan() {
      None
    } else {
      Some(number)
    }
  }

  /// Scratch ordering: numeric when both sides look numeric, otherwise
  /// case-insensitive text comparison. Returns -1, 0 or 1.
  pub fn compare(&self, other: &Value) -> f64 {
    if let (Some(x), Some(y)) = (self.numeric(), other.numeric()) {
      return if x < y {
        -1.
      } else if x == y {
        0.
      } else {
        1.
      };
    }
    let x = self.to_string().to_lowercase();
    let y = other.to_string().to_lowercase();
    match x.cmp(&y) {
      std::cmp::Ordering::Less => -1.,
      std::cmp::Ordering::Equal => 0.,
      std::cmp::Ordering::Greater => 1.,
    }
  }

  pub fn equals(&self, other: &Value) -> bool {
    self.compare(other) == 0.
  }
}

impl fmt::Display for Value {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Value::Number(number) => f.write_str(&number_to_string(*number)),
      Value::String(string) => f.write_str(string),
      Value::Bool(boolean) => write!(f, "{boolean}"),
    }
  }
}

/// Parses numeric-looking text. Empty or blank text is 0, anything
/// non-numeric is `None`.
pub fn parse_number(text: &str) -> Option<f64> {
  let text = text.trim();
  if text.is_empty() {
    return Some(0.);
  }
  match text {
    "Infinity" | "+Infinity" => return Some(f64::INFINITY),
    "-Infinity" => return Some(f64::NEG_INFINITY),
    _ => {}
  }
  for (prefix, radix) in [("0x", 16), ("0X", 16), ("0b", 2), ("0B", 2), ("0o", 8), ("0O", 8)] {
    if let Some(digits) = text.strip_prefix(prefix) {
      if digits.is_empty() || !digits.chars().all(|c| c.is_digit(radix)) {
        return None;
      }
      return u64::from_str_radix(digits, radix).ok().map(|n| n as f64);
    }
  }
  if text
    .bytes()
    .any(|byte| byte.is_ascii_alphabetic() && byte != b'e' && byte != b'E')
  {
    return None;
  }
  text.parse::<f64>().ok()
}

/// Prints a number the way the player shows it: no trailing `.0`,
/// exponent form outside of `1e-6..1e21`.
pub fn number_to_string(number: f64) -> String {
  if number.is_nan() {
    return "NaN".to_string();
  }
  if number.is_infinite() {
    return if number > 0. { "Infinity" } else { "-Infinity" }.to_string();
  }
  if number == 0. {
    return "0".to_string();
  }
  let magnitude = number.abs();
  if magnitude >= 1e21 || magnitude < 1e-6 {
    let formatted = format!("{number:e}");
    return match formatted.split_once('e') {
      Some((mantissa, exponent)) if !exponent.starts_with('-') => format!("{mantissa}e+{exponent}"),
      _ => formatted,
    };
  }
  if number.fract() == 0. {
    format!("{number:.0}")
  } else {
    format!("{number}")
  }
}

/// Joins list items without a separator when every item is a single
/// character, with spaces otherwise.
pub fn list_to_string(list: &[Value]) -> String {
  let items: Vec<String> = list.iter().map(Value::to_string).collect();
  let single = items.iter().all(|item| item.chars().count() == 1);
  items.join(if single { "" } else { " " })
}

#[derive(Debug, Clone, PartialEq)]
pub enum Input {
  Block(BlockId),
  Value(Value),
  Broadcast(String),
  Variable(String),
  List(String),
  Empty,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
  pub value: String,
}

/// Procedure metadata. The argument lists stay as the JSON text they are
/// stored as so the compiler can reject malformed ones per script.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Mutation {
  pub proccode: String,
  pub argument_ids: Option<String>,
  pub argument_names: Option<String>,
  pub warp: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
  pub opcode: String,
  pub next: Option<BlockId>,
  pub inputs: HashMap<String, Input>,
  pub fields: HashMap<String, Field>,
  pub mutation: Option<Mutation>,
  pub top_level: bool,
}

impl Block {
  pub fn input(&self, name: &str) -> &Input {
    self.inputs.get(name).unwrap_or(&Input::Empty)
  }

  pub fn field(&self, name: &str) -> Option<&str> {
    self.fields.get(name).map(|field| field.value.as_str())
  }
}
