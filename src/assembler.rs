//! Turns a compiled script into entries of the continuation table.

use std::rc::Rc;

use crate::compiler::CompiledScript;
use crate::error::{Error, Result};
use crate::script::{Continuation, Op};

/// Checks that every label and jump of `script` stays inside it and
/// returns one continuation per label, in label order.
pub fn assemble(script: CompiledScript) -> Result<Vec<Continuation>> {
  let ids = script.ids();
  let length = script.ops.len();
  for op in &script.ops {
    if let Some(label) = op.target_label() {
      if !ids.contains(&label) {
        return Err(Error::DanglingLabel {
          label,
          start: ids.start,
          end: ids.end,
        });
      }
    }
    if let Some(target) = op.jump_target() {
      if target > length {
        return Err(Error::DanglingJump { target, length });
      }
    }
  }
  if let Some(&pc) = script.labels.iter().find(|&&pc| pc > length) {
    return Err(Error::DanglingJump { target: pc, length });
  }
  let code: Rc<[Op]> = Rc::from(script.ops);
  Ok(
    script
      .labels
      .into_iter()
      .map(|pc| Continuation {
        code: Rc::clone(&code),
        pc,
      })
      .collect(),
  )
}
