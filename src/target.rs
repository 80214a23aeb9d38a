use crate::{
  block::{parse_number, Value},
  costume::{Costume, Sound},
  pen::{PenInstruction, PenState},
  script::Scripts,
};
use derivative::Derivative;
use serde::Deserialize;
use std::{
  cell::RefCell,
  collections::{HashMap, HashSet},
  f64::consts::PI,
  fmt,
  rc::Rc,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetId(pub u32);

impl fmt::Display for TargetId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "#{}", self.0)
  }
}

/// The stage or a sprite. Clones share `data` with the sprite they were
/// made from and own a copy of `state`.
#[derive(Debug)]
pub struct Target {
  pub id: TargetId,
  pub data: Rc<TargetData>,
  pub state: TargetState,
  pub is_clone: bool,
}

#[derive(Derivative)]
#[derivative(Debug)]
pub struct TargetData {
  pub name: String,
  pub is_stage: bool,
  pub costumes: Vec<Costume>,
  pub sounds: Vec<Sound>,
  #[derivative(Debug = "ignore")]
  pub scripts: RefCell<Scripts>,
}

impl TargetData {
  pub fn new(name: String, is_stage: bool, costumes: Vec<Costume>, sounds: Vec<Sound>) -> Self {
    TargetData {
      name,
      is_stage,
      costumes,
      sounds,
      scripts: RefCell::new(Scripts::default()),
    }
  }

  pub fn sound(&self, name: &Value) -> Option<&Sound> {
    let name = name.to_string();
    if let Some(sound) = self.sounds.iter().find(|sound| sound.name == name) {
      return Some(sound);
    }
    let index = parse_number(&name)?;
    if self.sounds.is_empty() || !index.is_finite() {
      return None;
    }
    let length = self.sounds.len();
    let index = (index.round() - 1.).rem_euclid(length as f64);
    self.sounds.get((index as usize).min(length - 1))
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TargetState {
  pub visible: bool,
  pub x: f64,
  pub y: f64,
  pub size: f64,
  pub direction: f64,
  pub draggable: bool,
  pub current_costume: usize,
  pub rotation_style: RotationStyle,
  pub volume: f64,
  pub variables: HashMap<String, Value>,
  pub lists: HashMap<String, Vec<Value>>,
  pub say: Option<Say>,
  pub say_id: u64,
  pub effects: HashMap<String, f64>,
  pub pen: PenState,
  pub watchers: HashSet<String>,
}

impl Default for TargetState {
  fn default() -> Self {
    TargetState {
      visible: true,
      x: 0.,
      y: 0.,
      size: 100.,
      direction: 90.,
      draggable: false,
      current_costume: 0,
      rotation_style: RotationStyle::AllAround,
      volume: 100.,
      variables: HashMap::new(),
      lists: HashMap::new(),
      say: None,
      say_id: 0,
      effects: HashMap::new(),
      pen: PenState::default(),
      watchers: HashSet::new(),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum RotationStyle {
  #[serde(rename = "all around")]
  AllAround,
  #[serde(rename = "left-right")]
  LeftRight,
  #[serde(rename = "don't rotate")]
  DontRotate,
}

impl RotationStyle {
  pub fn parse(style: &str) -> Option<RotationStyle> {
    match style {
      "all around" => Some(RotationStyle::AllAround),
      "left-right" => Some(RotationStyle::LeftRight),
      "don't rotate" => Some(RotationStyle::DontRotate),
      _ => None,
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Say {
  pub message: String,
  pub think: bool,
}

impl Target {
  pub fn name(&self) -> &str {
    &self.data.name
  }

  pub fn is_stage(&self) -> bool {
    self.data.is_stage
  }

  /// Copies this target for `clone`: state by value, code by reference.
  pub fn clone_as(&self, id: TargetId) -> Target {
    let mut state = self.state.clone();
    state.say = None;
    Target {
      id,
      data: Rc::clone(&self.data),
      state,
      is_clone: true,
    }
  }

  /// Moves to a point, returning the line the pen draws on the way.
  pub fn move_to(&mut self, x: f64, y: f64) -> Option<PenInstruction> {
    let state = &mut self.state;
    let (x1, y1) = (state.x, state.y);
    if x1 == x && y1 == y && !state.pen.down {
      return None;
    }
    state.x = x;
    state.y = y;
    state.pen.down.then(|| PenInstruction::Line {
      size: state.pen.size,
      color: state.pen.color.rgba(),
      x1,
      y1,
      x2: x,
      y2: y,
    })
  }

  pub fn forward(&mut self, steps: f64) -> Option<PenInstruction> {
    let radians = degrees_to_radians(90. - self.state.direction);
    let x = self.state.x + steps * radians.cos();
    let y = self.state.y + steps * radians.sin();
    self.move_to(x, y)
  }

  pub fn set_direction(&mut self, degrees: f64) {
    if !degrees.is_finite() {
      return;
    }
    let mut direction = degrees % 360.;
    if direction > 180. {
      direction -= 360.;
    }
    if direction <= -180. {
      direction += 360.;
    }
    self.state.direction = direction;
  }

  pub fn point_towards(&mut self, x: f64, y: f64) {
    let dx = x - self.state.x;
    let dy = y - self.state.y;
    let direction = if dx == 0. && dy == 0. {
      90.
    } else {
      radians_to_degrees(dx.atan2(dy))
    };
    self.set_direction(direction);
  }

  /// Turns away from the stage edge the sprite's position has crossed.
  pub fn bounce_on_edge(&mut self, stage_width: f64, stage_height: f64) {
    let (half_width, half_height) = (stage_width / 2., stage_height / 2.);
    let left = half_width + self.state.x;
    let top = half_height - self.state.y;
    let right = half_width - self.state.x;
    let bottom = half_height + self.state.y;
    let nearest = left.min(top).min(right).min(bottom);
    if nearest > 0. {
      return;
    }
    let radians = degrees_to_radians(self.state.direction);
    let mut dx = radians.sin();
    let mut dy = -radians.cos();
    if nearest == left {
      dx = dx.abs().max(0.2);
    } else if nearest == top {
      dy = dy.abs().max(0.2);
    } else if nearest == right {
      dx = -dx.abs().max(0.2);
    } else {
      dy = -dy.abs().max(0.2);
    }
    self.set_direction(radians_to_degrees(dy.atan2(dx)) + 90.);
    self.state.x = self.state.x.clamp(-half_width, half_width);
    self.state.y = self.state.y.clamp(-half_height, half_height);
  }

  pub fn costume_name(&self) -> &str {
    self
      .data
      .costumes
      .get(self.state.current_costume)
      .map(|costume| costume.name.as_str())
      .unwrap_or("")
  }

  pub fn next_costume(&mut self) {
    let length = self.data.costumes.len();
    if length > 0 {
      self.state.current_costume = (self.state.current_costume + 1) % length;
    }
  }

  pub fn previous_costume(&mut self) {
    let length = self.data.costumes.len();
    if length > 0 {
      self.state.current_costume = (self.state.current_costume + length - 1) % length;
    }
  }

  /// Switches by name, by the next/previous keywords, or by number.
  pub fn set_costume(&mut self, costume: &Value) {
    let length = self.data.costumes.len();
    if length == 0 {
      return;
    }
    let number = match costume {
      Value::Number(number) => *number,
      _ => {
        let name = costume.to_string();
        if let Some(index) = self.data.costumes.iter().position(|c| c.name == name) {
          self.state.current_costume = index;
          return;
        }
        let (next, previous) = if self.is_stage() {
          ("next backdrop", "previous backdrop")
        } else {
          ("next costume", "previous costume")
        };
        if name == next {
          self.next_costume();
          return;
        }
        if name == previous {
          self.previous_costume();
          return;
        }
        if !name.bytes().any(|byte| byte.is_ascii_digit()) {
          return;
        }
        match parse_number(&name) {
          Some(number) if number.is_finite() => number,
          _ => return,
        }
      }
    };
    let number = if number.is_finite() { number } else { 1. };
    let index = (number.floor() - 1.).rem_euclid(length as f64);
    self.state.current_costume = (index as usize).min(length - 1);
  }

  /// Shows a speech bubble; an empty message removes it. Returns the id
  /// of the bubble.
  pub fn say(&mut self, message: String, think: bool) -> u64 {
    self.state.say_id += 1;
    self.state.say = if message.is_empty() {
      None
    } else {
      Some(Say { message, think })
    };
    self.state.say_id
  }

  pub fn set_size(&mut self, size: f64) {
    self.state.size = size.max(0.);
  }

  pub fn set_effect(&mut self, effect: &str, value: f64) {
    let effect = effect.to_lowercase();
    let value = match effect.as_str() {
      "ghost" => value.clamp(0., 100.),
      "brightness" => value.clamp(-100., 100.),
      _ => value,
    };
    self.state.effects.insert(effect, value);
  }

  pub fn change_effect(&mut self, effect: &str, change: f64) {
    let current = self.state.effects.get(&effect.to_lowercase()).copied().unwrap_or(0.);
    self.set_effect(effect, current + change);
  }

  pub fn set_volume(&mut self, volume: f64) {
    self.state.volume = volume.clamp(0., 100.);
  }
}

pub fn degrees_to_radians(degrees: f64) -> f64 {
  (PI * degrees) / 180.
}

pub fn radians_to_degrees(radians: f64) -> f64 {
  (radians * 180.) / PI
}
