use crate::block::{Block, BlockId, Input, Value};
use crate::compiler::Compiler;
use crate::script::{BinaryOp, DataRef, DatePart, Expr, MathFunc, Sensor, Type};

/// Reporters the compiler knows, besides the menus of [`menu_field`].
const EXPRESSIONS: &[&str] = &[
  "motion_xposition",
  "motion_yposition",
  "motion_direction",
  "looks_costumenumbername",
  "looks_backdropnumbername",
  "looks_size",
  "sound_volume",
  "sensing_answer",
  "sensing_keypressed",
  "sensing_mousedown",
  "sensing_mousex",
  "sensing_mousey",
  "sensing_loudness",
  "sensing_timer",
  "sensing_of",
  "sensing_current",
  "sensing_dayssince2000",
  "sensing_username",
  "sensing_distanceto",
  "sensing_touchingobject",
  "sensing_touchingcolor",
  "sensing_coloristouchingcolor",
  "operator_add",
  "operator_subtract",
  "operator_multiply",
  "operator_divide",
  "operator_random",
  "operator_gt",
  "operator_lt",
  "operator_equals",
  "operator_and",
  "operator_or",
  "operator_not",
  "operator_join",
  "operator_letter_of",
  "operator_length",
  "operator_contains",
  "operator_mod",
  "operator_round",
  "operator_mathop",
  "data_variable",
  "data_listcontents",
  "data_itemoflist",
  "data_itemnumoflist",
  "data_lengthoflist",
  "data_listcontainsitem",
  "argument_reporter_string_number",
  "argument_reporter_boolean",
  "procedures_prototype",
  "music_getTempo",
];

/// The field a menu shadow block reports.
fn menu_field(opcode: &str) -> Option<&'static str> {
  Some(match opcode {
    "motion_goto_menu" | "motion_glideto_menu" => "TO",
    "motion_pointtowards_menu" => "TOWARDS",
    "looks_costume" => "COSTUME",
    "looks_backdrops" => "BACKDROP",
    "sound_sounds_menu" => "SOUND_MENU",
    "control_create_clone_of_menu" => "CLONE_OPTION",
    "sensing_touchingobjectmenu" => "TOUCHINGOBJECTMENU",
    "sensing_distancetomenu" => "DISTANCETOMENU",
    "sensing_keyoptions" => "KEY_OPTION",
    "sensing_of_object_menu" => "OBJECT",
    "pen_menu_colorParam" => "colorParam",
    _ => return None,
  })
}

pub fn is_expression(opcode: &str) -> bool {
  menu_field(opcode).is_some() || EXPRESSIONS.contains(&opcode)
}

/// The value an expression of type `ty` has when it cannot be compiled.
pub fn fallback(ty: Type) -> Value {
  match ty {
    Type::Number => Value::Number(0.),
    Type::Boolean => Value::Bool(false),
    Type::String | Type::Any => Value::String(String::new()),
  }
}

pub fn convert(value: &Value, ty: Type) -> Value {
  match ty {
    Type::Number => Value::Number(value.to_f64()),
    Type::String => Value::String(value.to_string()),
    Type::Boolean => Value::Bool(value.to_bool()),
    Type::Any => value.clone(),
  }
}

fn type_of(value: &Value) -> Type {
  match value {
    Value::Number(_) => Type::Number,
    Value::String(_) => Type::String,
    Value::Bool(_) => Type::Boolean,
  }
}

/// Wraps `expr` in a coercion unless it already has type `ty`. Constants
/// are converted right away.
fn cast(expr: Expr, actual: Type, ty: Type) -> Expr {
  if ty == Type::Any || actual == ty {
    return expr;
  }
  match expr {
    Expr::Const(value) => Expr::Const(convert(&value, ty)),
    expr => Expr::Cast(ty, Box::new(expr)),
  }
}

impl Compiler<'_> {
  /// Compiles the input `name` of `block` to an expression of type `ty`.
  pub(crate) fn input(&mut self, block: &Block, name: &str, ty: Type) -> Expr {
    if ty != Type::Boolean && !block.inputs.contains_key(name) {
      self
        .warnings
        .add(format!("missing input {name} of {}", block.opcode));
    }
    self.expression(block.input(name), ty)
  }

  pub(crate) fn expression(&mut self, input: &Input, ty: Type) -> Expr {
    let (expr, actual) = match input {
      Input::Empty => return Expr::Const(fallback(ty)),
      Input::Value(value) => (Expr::Const(value.clone()), type_of(value)),
      Input::Broadcast(name) => (Expr::Const(Value::from(name.as_str())), Type::String),
      Input::Variable(name) => (Expr::Variable(self.variable(name)), Type::Any),
      Input::List(name) => (Expr::ListContents(self.list(name)), Type::String),
      Input::Block(id) => match self.reporter(*id) {
        Some(reporter) => reporter,
        None => return Expr::Const(fallback(ty)),
      },
    };
    cast(expr, actual, ty)
  }

  fn reporter(&mut self, id: BlockId) -> Option<(Expr, Type)> {
    let blocks = self.blocks;
    let block = blocks.get(id)?;
    if !self.enter(id) {
      self
        .warnings
        .add(format!("{} is its own input", block.opcode));
      return None;
    }
    let reporter = self.reporter_block(block);
    self.leave();
    reporter
  }

  fn binary(&mut self, op: BinaryOp, block: &Block, names: [&str; 2], operand: Type) -> Expr {
    let lhs = self.input(block, names[0], operand);
    let rhs = self.input(block, names[1], operand);
    Expr::Binary(op, Box::new(lhs), Box::new(rhs))
  }

  fn reporter_block(&mut self, block: &Block) -> Option<(Expr, Type)> {
    let opcode = block.opcode.as_str();
    if let Some(field) = menu_field(opcode) {
      return Some((Expr::Const(Value::String(self.field(block, field))), Type::String));
    }
    let sensor = |sensor, ty| Some((Expr::Sensor(sensor), ty));
    match opcode {
      "motion_xposition" => sensor(Sensor::X, Type::Number),
      "motion_yposition" => sensor(Sensor::Y, Type::Number),
      "motion_direction" => sensor(Sensor::Direction, Type::Number),
      "looks_costumenumbername" => match self.field(block, "NUMBER_NAME").as_str() {
        "number" => sensor(Sensor::CostumeNumber, Type::Number),
        "name" => sensor(Sensor::CostumeName, Type::String),
        other => self.unknown(format!("unknown NUMBER_NAME {other}")),
      },
      "looks_backdropnumbername" => match self.field(block, "NUMBER_NAME").as_str() {
        "number" => sensor(Sensor::BackdropNumber, Type::Number),
        "name" => sensor(Sensor::BackdropName, Type::String),
        other => self.unknown(format!("unknown NUMBER_NAME {other}")),
      },
      "looks_size" => sensor(Sensor::Size, Type::Number),
      "sound_volume" => sensor(Sensor::Volume, Type::Number),
      "sensing_answer" => sensor(Sensor::Answer, Type::String),
      "sensing_mousedown" => sensor(Sensor::MouseDown, Type::Boolean),
      "sensing_mousex" => sensor(Sensor::MouseX, Type::Number),
      "sensing_mousey" => sensor(Sensor::MouseY, Type::Number),
      "sensing_loudness" => sensor(Sensor::Loudness, Type::Number),
      "sensing_timer" => sensor(Sensor::Timer, Type::Number),
      "sensing_dayssince2000" => sensor(Sensor::DaysSince2000, Type::Number),
      "sensing_username" => sensor(Sensor::Username, Type::String),
      "music_getTempo" => sensor(Sensor::Tempo, Type::Number),
      "sensing_keypressed" => {
        let key = self.input(block, "KEY_OPTION", Type::Any);
        Some((Expr::KeyPressed(Box::new(key)), Type::Boolean))
      }
      "sensing_of" => {
        let property = self.field(block, "PROPERTY");
        let object = self.input(block, "OBJECT", Type::String);
        Some((
          Expr::Attribute {
            property,
            object: Box::new(object),
          },
          Type::Any,
        ))
      }
      "sensing_current" => {
        let part = match self.field(block, "CURRENTMENU").to_uppercase().as_str() {
          "YEAR" => DatePart::Year,
          "MONTH" => DatePart::Month,
          "DATE" => DatePart::Date,
          "DAYOFWEEK" => DatePart::DayOfWeek,
          "HOUR" => DatePart::Hour,
          "MINUTE" => DatePart::Minute,
          "SECOND" => DatePart::Second,
          other => return self.unknown(format!("unknown CURRENTMENU {other}")),
        };
        Some((Expr::Current(part), Type::Number))
      }
      "sensing_distanceto" => {
        let object = self.input(block, "DISTANCETOMENU", Type::String);
        Some((Expr::DistanceTo(Box::new(object)), Type::Number))
      }
      "sensing_touchingobject" | "sensing_touchingcolor" | "sensing_coloristouchingcolor" => {
        self
          .warnings
          .add(format!("{opcode} needs a renderer and is always false"));
        Some((Expr::Const(Value::Bool(false)), Type::Boolean))
      }
      "operator_add" => Some((self.binary(BinaryOp::Add, block, ["NUM1", "NUM2"], Type::Number), Type::Number)),
      "operator_subtract" => Some((
        self.binary(BinaryOp::Subtract, block, ["NUM1", "NUM2"], Type::Number),
        Type::Number,
      )),
      "operator_multiply" => Some((
        self.binary(BinaryOp::Multiply, block, ["NUM1", "NUM2"], Type::Number),
        Type::Number,
      )),
      "operator_divide" => Some((
        self.binary(BinaryOp::Divide, block, ["NUM1", "NUM2"], Type::Number),
        Type::Number,
      )),
      "operator_mod" => Some((self.binary(BinaryOp::Mod, block, ["NUM1", "NUM2"], Type::Number), Type::Number)),
      "operator_random" => Some((self.binary(BinaryOp::Random, block, ["FROM", "TO"], Type::Any), Type::Number)),
      "operator_gt" => Some((
        self.binary(BinaryOp::Gt, block, ["OPERAND1", "OPERAND2"], Type::Any),
        Type::Boolean,
      )),
      "operator_lt" => Some((
        self.binary(BinaryOp::Lt, block, ["OPERAND1", "OPERAND2"], Type::Any),
        Type::Boolean,
      )),
      "operator_equals" => Some((
        self.binary(BinaryOp::Equals, block, ["OPERAND1", "OPERAND2"], Type::Any),
        Type::Boolean,
      )),
      "operator_and" => Some((
        self.binary(BinaryOp::And, block, ["OPERAND1", "OPERAND2"], Type::Boolean),
        Type::Boolean,
      )),
      "operator_or" => Some((
        self.binary(BinaryOp::Or, block, ["OPERAND1", "OPERAND2"], Type::Boolean),
        Type::Boolean,
      )),
      "operator_not" => {
        let operand = self.input(block, "OPERAND", Type::Boolean);
        Some((Expr::Not(Box::new(operand)), Type::Boolean))
      }
      "operator_join" => Some((
        self.binary(BinaryOp::Join, block, ["STRING1", "STRING2"], Type::String),
        Type::String,
      )),
      "operator_letter_of" => {
        let letter = self.input(block, "LETTER", Type::Number);
        let string = self.input(block, "STRING", Type::String);
        Some((
          Expr::Binary(BinaryOp::LetterOf, Box::new(letter), Box::new(string)),
          Type::String,
        ))
      }
      "operator_length" => {
        let string = self.input(block, "STRING", Type::String);
        Some((Expr::Length(Box::new(string)), Type::Number))
      }
      "operator_contains" => Some((
        self.binary(BinaryOp::Contains, block, ["STRING1", "STRING2"], Type::String),
        Type::Boolean,
      )),
      "operator_round" => {
        let number = self.input(block, "NUM", Type::Number);
        Some((Expr::Round(Box::new(number)), Type::Number))
      }
      "operator_mathop" => {
        let func = match self.field(block, "OPERATOR").as_str() {
          "abs" => MathFunc::Abs,
          "floor" => MathFunc::Floor,
          "ceiling" => MathFunc::Ceiling,
          "sqrt" => MathFunc::Sqrt,
          "sin" => MathFunc::Sin,
          "cos" => MathFunc::Cos,
          "tan" => MathFunc::Tan,
          "asin" => MathFunc::Asin,
          "acos" => MathFunc::Acos,
          "atan" => MathFunc::Atan,
          "ln" => MathFunc::Ln,
          "log" => MathFunc::Log,
          "e ^" => MathFunc::Exp,
          "10 ^" => MathFunc::Pow10,
          other => return self.unknown(format!("unknown math function {other}")),
        };
        let number = self.input(block, "NUM", Type::Number);
        Some((Expr::Math(func, Box::new(number)), Type::Number))
      }
      "data_variable" => {
        let name = self.field(block, "VARIABLE");
        Some((Expr::Variable(self.variable(&name)), Type::Any))
      }
      "data_listcontents" => {
        let name = self.field(block, "LIST");
        Some((Expr::ListContents(self.list(&name)), Type::String))
      }
      "data_itemoflist" => {
        let list = self.list_field(block);
        let index = self.input(block, "INDEX", Type::Any);
        Some((Expr::ItemOfList(list, Box::new(index)), Type::Any))
      }
      "data_itemnumoflist" => {
        let list = self.list_field(block);
        let item = self.input(block, "ITEM", Type::Any);
        Some((Expr::ItemNumOfList(list, Box::new(item)), Type::Number))
      }
      "data_lengthoflist" => {
        let list = self.list_field(block);
        Some((Expr::LengthOfList(list), Type::Number))
      }
      "data_listcontainsitem" => {
        let list = self.list_field(block);
        let item = self.input(block, "ITEM", Type::Any);
        Some((Expr::ListContains(list, Box::new(item)), Type::Boolean))
      }
      "argument_reporter_string_number" => {
        let name = self.field(block, "VALUE");
        Some(match self.parameter(&name) {
          Some(index) => (Expr::Argument(index), Type::Any),
          None => (Expr::Const(Value::Number(0.)), Type::Number),
        })
      }
      "argument_reporter_boolean" => {
        let name = self.field(block, "VALUE");
        Some(match self.parameter(&name) {
          Some(index) => (Expr::Cast(Type::Boolean, Box::new(Expr::Argument(index))), Type::Boolean),
          None => (Expr::Const(Value::Bool(false)), Type::Boolean),
        })
      }
      _ => self.unknown(format!("unknown expression {opcode}")),
    }
  }

  pub(crate) fn list_field(&mut self, block: &Block) -> DataRef {
    let name = self.field(block, "LIST");
    self.list(&name)
  }

  fn unknown(&mut self, message: String) -> Option<(Expr, Type)> {
    self.warnings.add(message);
    None
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::compiler::{DataNames, Warnings};
  use crate::script::Scope;
  use crate::target::TargetState;
  use std::collections::HashMap;
  use std::rc::Rc;

  fn block(opcode: &str, inputs: Vec<(&str, Input)>) -> Block {
    Block {
      opcode: opcode.to_string(),
      next: None,
      inputs: inputs
        .into_iter()
        .map(|(name, input)| (name.to_string(), input))
        .collect(),
      fields: HashMap::new(),
      mutation: None,
      top_level: false,
    }
  }

  #[test]
  fn constants_are_coerced_at_compile_time() {
    let blocks = vec![];
    let stage = DataNames::default();
    let mut state = TargetState::default();
    let mut warnings = Warnings::default();
    let mut compiler = Compiler::new(&blocks, &stage, &mut state, &mut warnings);
    let number = compiler.expression(&Input::Value(Value::from("12")), Type::Number);
    assert_eq!(number, Expr::Const(Value::Number(12.)));
    let text = compiler.expression(&Input::Value(Value::from("12")), Type::Any);
    assert_eq!(text, Expr::Const(Value::from("12")));
    let empty = compiler.expression(&Input::Empty, Type::Boolean);
    assert_eq!(empty, Expr::Const(Value::Bool(false)));
  }

  #[test]
  fn unknown_reporters_fall_back_and_warn() {
    let blocks = vec![
      block("operator_add", vec![("NUM1", Input::Block(1)), ("NUM2", Input::Value(Value::Number(2.)))]),
      block("extension_thing", vec![]),
    ];
    let stage = DataNames::default();
    let mut state = TargetState::default();
    let mut warnings = Warnings::default();
    let mut compiler = Compiler::new(&blocks, &stage, &mut state, &mut warnings);
    let expr = compiler.expression(&Input::Block(0), Type::String);
    assert_eq!(
      expr,
      Expr::Cast(
        Type::String,
        Box::new(Expr::Binary(
          BinaryOp::Add,
          Box::new(Expr::Const(Value::Number(0.))),
          Box::new(Expr::Const(Value::Number(2.))),
        ))
      )
    );
    compiler.expression(&Input::Block(1), Type::Any);
    assert_eq!(warnings.count("unknown expression extension_thing"), 2);
  }

  #[test]
  fn variables_resolve_to_stage_first() {
    let blocks = vec![];
    let stage = DataNames {
      variables: ["score".to_string()].into_iter().collect(),
      lists: Default::default(),
    };
    let mut state = TargetState::default();
    let mut warnings = Warnings::default();
    let mut compiler = Compiler::new(&blocks, &stage, &mut state, &mut warnings);
    let global = compiler.expression(&Input::Variable("score".to_string()), Type::Any);
    let local = compiler.expression(&Input::Variable("speed".to_string()), Type::Any);
    assert_eq!(
      global,
      Expr::Variable(DataRef {
        scope: Scope::Stage,
        name: Rc::from("score")
      })
    );
    assert_eq!(
      local,
      Expr::Variable(DataRef {
        scope: Scope::Target,
        name: Rc::from("speed")
      })
    );
    assert_eq!(state.variables.get("speed"), Some(&Value::Number(0.)));
  }
}
