use std::collections::HashMap;
use std::fmt;
use std::fmt::Formatter;

use log::warn;
use serde::de::{MapAccess, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer};

use crate::block;
use crate::block::{BlockId, Value};
use crate::costume::{Costume, Sound};
use crate::error::Result;
use crate::input::{literal, Input};
use crate::target::{RotationStyle, TargetState};

/// One target of project.json, with its blocks resolved to indices.
#[derive(Debug)]
pub struct TargetSource {
  pub name: String,
  pub is_stage: bool,
  pub blocks: Vec<block::Block>,
  pub state: TargetState,
  pub costumes: Vec<Costume>,
  pub sounds: Vec<Sound>,
  pub layer_order: i64,
}

#[derive(Deserialize)]
struct Project {
  targets: Vec<Target>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Target {
  is_stage: bool,
  name: String,
  #[serde(default)]
  variables: HashMap<String, Variable>,
  #[serde(default)]
  lists: HashMap<String, List>,
  #[serde(default)]
  blocks: OrderedBlocks,
  #[serde(default)]
  current_costume: usize,
  #[serde(default)]
  costumes: Vec<Costume>,
  #[serde(default)]
  sounds: Vec<Sound>,
  #[serde(default)]
  layer_order: i64,
  #[serde(default = "default_volume")]
  volume: f64,
  #[serde(default = "default_true")]
  visible: bool,
  #[serde(default)]
  x: f64,
  #[serde(default)]
  y: f64,
  #[serde(default = "default_size")]
  size: f64,
  #[serde(default = "default_direction")]
  direction: f64,
  #[serde(default)]
  draggable: bool,
  #[serde(default = "default_rotation_style")]
  rotation_style: String,
}

fn default_true() -> bool {
  true
}

fn default_volume() -> f64 {
  100.
}

fn default_size() -> f64 {
  100.
}

fn default_direction() -> f64 {
  90.
}

fn default_rotation_style() -> String {
  "all around".to_string()
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Block {
  opcode: String,
  next: Option<String>,
  #[serde(default)]
  inputs: HashMap<String, Input>,
  #[serde(default)]
  fields: HashMap<String, Vec<serde_json::Value>>,
  mutation: Option<Mutation>,
  #[serde(default)]
  top_level: bool,
}

#[derive(Deserialize)]
struct Mutation {
  #[serde(default)]
  proccode: String,
  argumentids: Option<String>,
  argumentnames: Option<String>,
  #[serde(default, deserialize_with = "flag")]
  warp: bool,
}

/// `warp` is stored as a boolean or as the text `"true"`.
fn flag<'de, D: Deserializer<'de>>(de: D) -> std::result::Result<bool, D::Error> {
  Ok(match serde_json::Value::deserialize(de)? {
    serde_json::Value::Bool(flag) => flag,
    serde_json::Value::String(text) => text == "true",
    _ => false,
  })
}

/// The blocks of a target in document order. Loose reporters are stored
/// as arrays instead of objects and are kept out.
#[derive(Default)]
struct OrderedBlocks(Vec<(String, serde_json::Value)>);

impl<'de> Deserialize<'de> for OrderedBlocks {
  fn deserialize<D: Deserializer<'de>>(de: D) -> std::result::Result<Self, D::Error> {
    struct MapVisitor;
    impl<'de> Visitor<'de> for MapVisitor {
      type Value = OrderedBlocks;
      fn expecting(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "a map of blocks")
      }
      fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> std::result::Result<Self::Value, A::Error> {
        let mut blocks = Vec::with_capacity(map.size_hint().unwrap_or(0));
        while let Some((id, value)) = map.next_entry::<String, serde_json::Value>()? {
          if value.is_object() {
            blocks.push((id, value));
          }
        }
        Ok(OrderedBlocks(blocks))
      }
    }
    de.deserialize_map(MapVisitor)
  }
}

#[derive(Debug)]
pub struct Variable {
  pub name: String,
  pub value: Value,
}

/// `[name, value]`, with a trailing cloud flag on cloud variables.
impl<'de> Deserialize<'de> for Variable {
  fn deserialize<D: Deserializer<'de>>(de: D) -> std::result::Result<Self, D::Error> {
    struct SeqVisitor;
    impl<'de> Visitor<'de> for SeqVisitor {
      type Value = Variable;
      fn expecting(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "a variable array")
      }
      fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> std::result::Result<Self::Value, A::Error> {
        let name = seq.next_element::<String>()?.unwrap_or_default();
        let value = literal(seq.next_element::<serde_json::Value>()?.as_ref());
        while seq.next_element::<serde_json::Value>()?.is_some() {}
        Ok(Variable { name, value })
      }
    }
    de.deserialize_seq(SeqVisitor)
  }
}

#[derive(Debug)]
pub struct List {
  pub name: String,
  pub value: Vec<Value>,
}

impl<'de> Deserialize<'de> for List {
  fn deserialize<D: Deserializer<'de>>(de: D) -> std::result::Result<Self, D::Error> {
    struct SeqVisitor;
    impl<'de> Visitor<'de> for SeqVisitor {
      type Value = List;
      fn expecting(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "a list array")
      }
      fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> std::result::Result<Self::Value, A::Error> {
        let name = seq.next_element::<String>()?.unwrap_or_default();
        let items = seq.next_element::<Vec<serde_json::Value>>()?.unwrap_or_default();
        while seq.next_element::<serde_json::Value>()?.is_some() {}
        Ok(List {
          name,
          value: items.iter().map(|item| literal(Some(item))).collect(),
        })
      }
    }
    de.deserialize_seq(SeqVisitor)
  }
}

/// Decodes project.json into its targets, in file order.
pub fn load(text: &str) -> Result<Vec<TargetSource>> {
  let project: Project = serde_json::from_str(text)?;
  project.targets.into_iter().map(target_source).collect()
}

fn target_source(target: Target) -> Result<TargetSource> {
  let raw = target
    .blocks
    .0
    .into_iter()
    .map(|(id, value)| serde_json::from_value::<Block>(value).map(|block| (id, block)))
    .collect::<std::result::Result<Vec<_>, _>>()?;
  let index: HashMap<String, BlockId> = raw
    .iter()
    .enumerate()
    .map(|(i, (id, _))| (id.clone(), i))
    .collect();
  let blocks = raw
    .into_iter()
    .map(|(_, block)| resolve(block, &index))
    .collect();

  let rotation_style = RotationStyle::parse(&target.rotation_style).unwrap_or_else(|| {
    warn!(
      "{}: unknown rotation style {:?}",
      target.name, target.rotation_style
    );
    RotationStyle::AllAround
  });
  let state = TargetState {
    visible: target.visible,
    x: target.x,
    y: target.y,
    size: target.size,
    direction: target.direction,
    draggable: target.draggable,
    current_costume: target.current_costume,
    rotation_style,
    volume: target.volume,
    variables: target
      .variables
      .into_values()
      .map(|variable| (variable.name, variable.value))
      .collect(),
    lists: target
      .lists
      .into_values()
      .map(|list| (list.name, list.value))
      .collect(),
    ..TargetState::default()
  };
  Ok(TargetSource {
    name: target.name,
    is_stage: target.is_stage,
    blocks,
    state,
    costumes: target.costumes,
    sounds: target.sounds,
    layer_order: target.layer_order,
  })
}

fn resolve(block: Block, index: &HashMap<String, BlockId>) -> block::Block {
  let input = |input: Input| match input {
    Input::Block(id) => index
      .get(&id)
      .map_or(block::Input::Empty, |&id| block::Input::Block(id)),
    Input::Value(value) => block::Input::Value(value),
    Input::Broadcast(name) => block::Input::Broadcast(name),
    Input::Variable(name) => block::Input::Variable(name),
    Input::List(name) => block::Input::List(name),
    Input::Empty => block::Input::Empty,
  };
  block::Block {
    opcode: block.opcode,
    next: block.next.and_then(|next| index.get(&next).copied()),
    inputs: block
      .inputs
      .into_iter()
      .map(|(name, value)| (name, input(value)))
      .collect(),
    fields: block
      .fields
      .into_iter()
      .map(|(name, values)| {
        let field = block::Field {
          value: literal(values.first()).to_string(),
        };
        (name, field)
      })
      .collect(),
    mutation: block.mutation.map(|mutation| block::Mutation {
      proccode: mutation.proccode,
      argument_ids: mutation.argumentids,
      argument_names: mutation.argumentnames,
      warp: mutation.warp,
    }),
    top_level: block.top_level,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const PROJECT: &str = r#"{
    "targets": [
      {
        "isStage": true,
        "name": "Stage",
        "variables": {"v1": ["score", 10], "v2": ["cloudy", "x", true]},
        "lists": {"l1": ["items", ["a", 2]]},
        "blocks": {},
        "costumes": [{"name": "backdrop1"}],
        "sounds": []
      },
      {
        "isStage": false,
        "name": "Cat",
        "blocks": {
          "b": {"opcode": "looks_show", "next": null, "parent": "a", "inputs": {}, "fields": {}, "topLevel": false},
          "a": {
            "opcode": "event_whenbroadcastreceived",
            "next": "b",
            "inputs": {},
            "fields": {"BROADCAST_OPTION": ["Go", "id"]},
            "topLevel": true
          },
          "loose": [12, "score", "v1", 10, 10]
        },
        "x": 12,
        "layerOrder": 1,
        "rotationStyle": "left-right",
        "sounds": [{"name": "meow", "sampleCount": 22050, "rate": 44100}]
      }
    ]
  }"#;

  #[test]
  fn decodes_targets() {
    let targets = load(PROJECT).unwrap();
    assert_eq!(targets.len(), 2);
    let stage = &targets[0];
    assert!(stage.is_stage);
    assert_eq!(stage.state.variables["score"], Value::Number(10.));
    assert_eq!(stage.state.variables["cloudy"], Value::from("x"));
    assert_eq!(stage.state.lists["items"], vec![Value::from("a"), Value::Number(2.)]);

    let cat = &targets[1];
    assert_eq!(cat.state.x, 12.);
    assert_eq!(cat.state.size, 100.);
    assert_eq!(cat.state.rotation_style, RotationStyle::LeftRight);
    assert_eq!(cat.sounds[0].duration(), 0.5);
    assert_eq!(cat.layer_order, 1);
  }

  #[test]
  fn block_ids_become_indices_in_document_order() {
    let targets = load(PROJECT).unwrap();
    let blocks = &targets[1].blocks;
    assert_eq!(blocks.len(), 2);
    assert_eq!(blocks[0].opcode, "looks_show");
    assert_eq!(blocks[1].next, Some(0));
    assert!(blocks[1].top_level);
    assert_eq!(blocks[1].field("BROADCAST_OPTION"), Some("Go"));
  }

  #[test]
  fn warp_accepts_text() {
    let block: Block = serde_json::from_str(
      r#"{"opcode": "procedures_prototype", "next": null,
          "mutation": {"proccode": "p", "argumentids": "[]", "warp": "true"}}"#,
    )
    .unwrap();
    assert!(block.mutation.unwrap().warp);
  }
}
