use std::rc::Rc;

use crate::block::{Block, Input, Mutation};
use crate::compiler::Warnings;
use crate::error::{Error, Result};
use crate::script::{LabelId, Procedure, Scripts};

/// A custom block definition as read from its prototype.
#[derive(Debug, Clone, PartialEq)]
pub struct Definition {
  pub proccode: String,
  pub warp: bool,
  pub parameters: Vec<String>,
}

/// The event a script waits for.
#[derive(Debug, Clone, PartialEq)]
pub enum Hat {
  GreenFlag,
  KeyPressed(String),
  Clicked,
  BackdropSwitch(String),
  Receive(String),
  Cloned,
  Procedure(Definition),
}

/// Reads the hat of a top level block, `None` if the block is no hat.
pub fn parse(block: &Block, blocks: &[Block]) -> Result<Option<Hat>> {
  let field = |name: &str| block.field(name).unwrap_or("");
  Ok(Some(match block.opcode.as_str() {
    "event_whenflagclicked" => Hat::GreenFlag,
    "event_whenkeypressed" => Hat::KeyPressed(key_code(field("KEY_OPTION"))),
    "event_whenthisspriteclicked" | "event_whenstageclicked" => Hat::Clicked,
    "event_whenbackdropswitchesto" => Hat::BackdropSwitch(field("BACKDROP").to_lowercase()),
    "event_whenbroadcastreceived" => Hat::Receive(field("BROADCAST_OPTION").to_lowercase()),
    "control_start_as_clone" => Hat::Cloned,
    "procedures_definition" => Hat::Procedure(definition(block, blocks)?),
    _ => return Ok(None),
  }))
}

fn definition(block: &Block, blocks: &[Block]) -> Result<Definition> {
  let mutation = match block.input("custom_block") {
    Input::Block(id) => blocks.get(*id).and_then(|prototype| prototype.mutation.as_ref()),
    _ => None,
  };
  let Some(mutation) = mutation else {
    return Err(Error::MalformedProcedure {
      proccode: String::new(),
      reason: "definition without a prototype".to_string(),
    });
  };
  Ok(Definition {
    proccode: mutation.proccode.clone(),
    warp: mutation.warp,
    parameters: string_list(mutation, mutation.argument_names.as_deref(), "argumentnames")?,
  })
}

/// Input names a call passes its arguments in, in parameter order.
pub fn argument_ids(mutation: &Mutation) -> Result<Vec<String>> {
  string_list(mutation, mutation.argument_ids.as_deref(), "argumentids")
}

fn string_list(mutation: &Mutation, text: Option<&str>, name: &str) -> Result<Vec<String>> {
  let malformed = |reason: String| Error::MalformedProcedure {
    proccode: mutation.proccode.clone(),
    reason,
  };
  let text = text.ok_or_else(|| malformed(format!("no {name}")))?;
  serde_json::from_str(text).map_err(|err| malformed(format!("{name}: {err}")))
}

/// Binds the script starting at `entry` to its event.
pub fn install(scripts: &mut Scripts, hat: Hat, entry: LabelId, warnings: &mut Warnings) {
  let listeners = &mut scripts.listeners;
  match hat {
    Hat::GreenFlag => listeners.green_flag.push(entry),
    Hat::Clicked => listeners.clicked.push(entry),
    Hat::Cloned => listeners.cloned.push(entry),
    Hat::KeyPressed(key) => listeners.key_pressed.entry(key).or_default().push(entry),
    Hat::Receive(message) => listeners.receive.entry(message).or_default().push(entry),
    Hat::BackdropSwitch(backdrop) => listeners
      .backdrop_switch
      .entry(backdrop)
      .or_default()
      .push(entry),
    Hat::Procedure(definition) => {
      if scripts.procedures.contains_key(&definition.proccode) {
        warnings.add(format!("duplicate definition of {:?}", definition.proccode));
        return;
      }
      scripts.procedures.insert(
        definition.proccode,
        Rc::new(Procedure {
          entry,
          warp: definition.warp,
          parameters: definition.parameters,
        }),
      );
    }
  }
}

/// Normalises a key name to the code listeners and the key state use:
/// a name for special keys, otherwise the code point of the first
/// character, lowercased.
pub fn key_code(name: &str) -> String {
  let name = name.to_lowercase();
  let special = match name.as_str() {
    "space" | " " => "space",
    "left arrow" => "left arrow",
    "up arrow" => "up arrow",
    "right arrow" => "right arrow",
    "down arrow" => "down arrow",
    "any" => "any",
    "enter" => "enter",
    "escape" => "esc",
    "backspace" => "backspace",
    "delete" => "delete",
    "insert" => "insert",
    "home" => "home",
    "end" => "end",
    "page up" => "page up",
    "page down" => "page down",
    "control" => "control",
    "shift" => "shift",
    _ => {
      return name
        .chars()
        .next()
        .map(|c| (c as u32).to_string())
        .unwrap_or_default()
    }
  };
  special.to_string()
}
