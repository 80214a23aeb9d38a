#![allow(dead_code)]

use serde_json::{json, Map, Value};

use rustphorus_vm::{Config, Project, Runtime};

/// Builds one target of a project.json by hand.
pub struct TargetBuilder {
  name: String,
  is_stage: bool,
  layer_order: i64,
  variables: Map<String, Value>,
  lists: Map<String, Value>,
  blocks: Map<String, Value>,
}

impl TargetBuilder {
  pub fn stage() -> Self {
    Self::new("Stage", true, 0)
  }

  pub fn sprite(name: &str, layer_order: i64) -> Self {
    Self::new(name, false, layer_order)
  }

  fn new(name: &str, is_stage: bool, layer_order: i64) -> Self {
    TargetBuilder {
      name: name.to_string(),
      is_stage,
      layer_order,
      variables: Map::new(),
      lists: Map::new(),
      blocks: Map::new(),
    }
  }

  pub fn variable(mut self, name: &str, value: Value) -> Self {
    self
      .variables
      .insert(format!("{name}-id"), json!([name, value]));
    self
  }

  pub fn list(mut self, name: &str, items: Value) -> Self {
    self.lists.insert(format!("{name}-id"), json!([name, items]));
    self
  }

  /// Adds a block and returns its id. Ids sort in creation order.
  pub fn block(&mut self, opcode: &str, inputs: Value, fields: Value) -> String {
    let id = format!("{}-{:04}", self.name, self.blocks.len());
    self.blocks.insert(
      id.clone(),
      json!({
        "opcode": opcode,
        "next": null,
        "parent": null,
        "inputs": inputs,
        "fields": fields,
        "shadow": false,
        "topLevel": false,
      }),
    );
    id
  }

  pub fn mutate(&mut self, id: &str, mutation: Value) {
    if let Some(block) = self.blocks.get_mut(id) {
      block["mutation"] = mutation;
    }
  }

  /// Links `ids` into a stack and returns its first block.
  pub fn stack(&mut self, ids: &[String]) -> Option<String> {
    for pair in ids.windows(2) {
      self.blocks[&pair[0]]["next"] = json!(pair[1]);
      self.blocks[&pair[1]]["parent"] = json!(pair[0]);
    }
    ids.first().cloned()
  }

  /// Makes `hat` a top level block running `body`.
  pub fn script(&mut self, hat: String, body: &[String]) {
    self.blocks[&hat]["topLevel"] = json!(true);
    let mut ids = vec![hat];
    ids.extend_from_slice(body);
    self.stack(&ids);
  }

  pub fn green_flag(&mut self, body: &[String]) {
    let hat = self.block("event_whenflagclicked", json!({}), json!({}));
    self.script(hat, body);
  }

  pub fn when_received(&mut self, message: &str, body: &[String]) {
    let hat = self.block(
      "event_whenbroadcastreceived",
      json!({}),
      json!({"BROADCAST_OPTION": [message, message]}),
    );
    self.script(hat, body);
  }

  pub fn change(&mut self, variable: &str, by: f64) -> String {
    self.block(
      "data_changevariableby",
      json!({"VALUE": number(by)}),
      json!({"VARIABLE": [variable, format!("{variable}-id")]}),
    )
  }

  pub fn set(&mut self, variable: &str, value: Value) -> String {
    self.block(
      "data_setvariableto",
      json!({"VALUE": value}),
      json!({"VARIABLE": [variable, format!("{variable}-id")]}),
    )
  }

  pub fn repeat(&mut self, times: Value, body: &[String]) -> String {
    let mut inputs = json!({"TIMES": times});
    if let Some(first) = self.stack(body) {
      inputs["SUBSTACK"] = json!([2, first]);
    }
    self.block("control_repeat", inputs, json!({}))
  }

  pub fn wait(&mut self, seconds: f64) -> String {
    self.block("control_wait", json!({"DURATION": number(seconds)}), json!({}))
  }

  pub fn broadcast(&mut self, message: &str, wait: bool) -> String {
    let opcode = if wait {
      "event_broadcastandwait"
    } else {
      "event_broadcast"
    };
    self.block(
      opcode,
      json!({"BROADCAST_INPUT": [1, [11, message, message]]}),
      json!({}),
    )
  }

  pub fn stop(&mut self, option: &str) -> String {
    self.block("control_stop", json!({}), json!({"STOP_OPTION": [option, null]}))
  }

  pub fn forever(&mut self, body: &[String]) -> String {
    let first = self.stack(body);
    self.block("control_forever", json!({"SUBSTACK": [2, first]}), json!({}))
  }

  pub fn when_key_pressed(&mut self, key: &str, body: &[String]) {
    let hat = self.block("event_whenkeypressed", json!({}), json!({"KEY_OPTION": [key, null]}));
    self.script(hat, body);
  }

  pub fn glide_to(&mut self, seconds: f64, x: f64, y: f64) -> String {
    self.block(
      "motion_glidesecstoxy",
      json!({"SECS": number(seconds), "X": number(x), "Y": number(y)}),
      json!({}),
    )
  }

  pub fn create_clone(&mut self, of: &str) -> String {
    let menu = self.block(
      "control_create_clone_of_menu",
      json!({}),
      json!({"CLONE_OPTION": [of, null]}),
    );
    self.block("control_create_clone_of", json!({"CLONE_OPTION": [1, menu]}), json!({}))
  }

  /// Defines the procedure `proccode` with string parameters `parameters`.
  pub fn define(&mut self, proccode: &str, parameters: &[&str], warp: bool, body: &[String]) {
    let prototype = self.block("procedures_prototype", json!({}), json!({}));
    self.mutate(
      &prototype,
      json!({
        "tagName": "mutation",
        "proccode": proccode,
        "argumentids": serde_json::to_string(parameters).unwrap(),
        "argumentnames": serde_json::to_string(parameters).unwrap(),
        "argumentdefaults": "[]",
        "warp": if warp { "true" } else { "false" },
      }),
    );
    let hat = self.block("procedures_definition", json!({"custom_block": [1, prototype]}), json!({}));
    self.script(hat, body);
  }

  /// A call passing `arguments` to the parameters of the same names.
  pub fn call(&mut self, proccode: &str, arguments: &[(&str, Value)]) -> String {
    let inputs: Map<String, Value> = arguments
      .iter()
      .map(|(name, value)| (name.to_string(), value.clone()))
      .collect();
    let ids: Vec<&str> = arguments.iter().map(|(name, _)| *name).collect();
    let call = self.block("procedures_call", Value::Object(inputs), json!({}));
    self.mutate(
      &call,
      json!({
        "tagName": "mutation",
        "proccode": proccode,
        "argumentids": serde_json::to_string(&ids).unwrap(),
        "warp": "false",
      }),
    );
    call
  }

  pub fn argument(&mut self, name: &str) -> Value {
    let id = self.block(
      "argument_reporter_string_number",
      json!({}),
      json!({"VALUE": [name, null]}),
    );
    json!([3, id, [10, ""]])
  }

  fn json(self) -> Value {
    json!({
      "isStage": self.is_stage,
      "name": self.name,
      "variables": self.variables,
      "lists": self.lists,
      "blocks": self.blocks,
      "costumes": [],
      "sounds": [],
      "layerOrder": self.layer_order,
      "visible": true,
    })
  }
}

pub fn number(n: f64) -> Value {
  json!([1, [4, n.to_string()]])
}

pub fn text(s: &str) -> Value {
  json!([1, [10, s]])
}

pub fn runtime(targets: Vec<TargetBuilder>) -> Runtime {
  runtime_with(targets, Config::default())
}

pub fn runtime_with(targets: Vec<TargetBuilder>, config: Config) -> Runtime {
  let targets: Vec<Value> = targets.into_iter().map(TargetBuilder::json).collect();
  let text = json!({"targets": targets, "meta": {"semver": "3.0.0"}}).to_string();
  let project = Project::load(&text, config).unwrap();
  Runtime::new(project)
}

/// Sweeps until no thread is left, at most `limit` times. Returns the
/// number of sweeps.
pub fn run(runtime: &mut Runtime, limit: usize) -> usize {
  let mut sweeps = 0;
  while runtime.queue_len() > 0 && sweeps < limit {
    runtime.sweep().unwrap();
    sweeps += 1;
  }
  sweeps
}

pub fn sprite_position(runtime: &Runtime, name: &str) -> (f64, f64) {
  let state = &runtime.project.target_by_name(name).unwrap().state;
  (state.x, state.y)
}

pub fn stage_variable(runtime: &Runtime, name: &str) -> rustphorus_vm::Value {
  runtime.project.stage().unwrap().state.variables[name].clone()
}
