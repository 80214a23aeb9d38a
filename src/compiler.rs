//! Lowers the block scripts of one target into continuations.
//!
//! Each hat block starts a script. The script is compiled into one flat
//! list of ops; every point where it may yield gets a label. Labels of a
//! script are reserved as one contiguous range starting at the current
//! length of the target's continuation table, so a script can refer to
//! labels it has not emitted yet.

use std::collections::{HashMap, HashSet};
use std::mem;
use std::ops::Range;
use std::rc::Rc;

use log::{error, trace, warn};

use crate::assembler;
use crate::block::{Block, BlockId, Value};
use crate::error::Result;
use crate::expression;
use crate::hat::{self, Hat};
use crate::script::{DataRef, LabelId, Op, Scope};
use crate::statement;
use crate::target::{TargetData, TargetState};

/// Compiler diagnostics, counted per distinct message.
#[derive(Debug, Default)]
pub struct Warnings {
  counts: HashMap<String, usize>,
  order: Vec<String>,
}

impl Warnings {
  pub fn add(&mut self, message: impl Into<String>) {
    let message = message.into();
    match self.counts.get_mut(&message) {
      Some(count) => *count += 1,
      None => {
        self.counts.insert(message.clone(), 1);
        self.order.push(message);
      }
    }
  }

  pub fn count(&self, message: &str) -> usize {
    self.counts.get(message).copied().unwrap_or(0)
  }

  pub fn len(&self) -> usize {
    self.order.len()
  }

  pub fn is_empty(&self) -> bool {
    self.order.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> {
    self
      .order
      .iter()
      .map(|message| (message.as_str(), self.counts[message]))
  }

  /// Logs every warning once.
  pub fn flush(&self) {
    for (message, count) in self.iter() {
      if count > 1 {
        warn!("{message} (repeated {count} times)");
      } else {
        warn!("{message}");
      }
    }
  }
}

/// Names of the variables and lists the stage owns.
#[derive(Debug, Default, Clone)]
pub struct DataNames {
  pub variables: HashSet<String>,
  pub lists: HashSet<String>,
}

impl DataNames {
  pub fn of(state: &TargetState) -> Self {
    DataNames {
      variables: state.variables.keys().cloned().collect(),
      lists: state.lists.keys().cloned().collect(),
    }
  }
}

#[derive(Debug)]
pub struct CompiledScript {
  pub ops: Vec<Op>,
  /// Offset in `ops` of every label, in label order.
  pub labels: Vec<usize>,
  pub base: LabelId,
}

impl CompiledScript {
  pub fn ids(&self) -> Range<LabelId> {
    self.base..self.base + self.labels.len()
  }
}

pub struct Compiler<'a> {
  pub(crate) blocks: &'a [Block],
  stage: &'a DataNames,
  state: &'a mut TargetState,
  pub(crate) warnings: &'a mut Warnings,
  base: LabelId,
  ops: Vec<Op>,
  labels: Vec<usize>,
  parameters: Vec<String>,
  active: Vec<BlockId>,
}

impl<'a> Compiler<'a> {
  pub fn new(
    blocks: &'a [Block],
    stage: &'a DataNames,
    state: &'a mut TargetState,
    warnings: &'a mut Warnings,
  ) -> Self {
    Compiler {
      blocks,
      stage,
      state,
      warnings,
      base: 0,
      ops: Vec::new(),
      labels: Vec::new(),
      parameters: Vec::new(),
      active: Vec::new(),
    }
  }

  /// Compiles the script below `hat`, reserving labels from `base` on.
  pub fn compile_script(&mut self, base: LabelId, hat: &Hat, first: Option<BlockId>) -> Result<CompiledScript> {
    self.base = base;
    self.ops.clear();
    self.labels.clear();
    self.active.clear();
    self.parameters = match hat {
      Hat::Procedure(definition) => definition.parameters.clone(),
      _ => Vec::new(),
    };
    self.label();
    self.statements(first)?;
    if let Hat::Procedure(_) = hat {
      self.emit(Op::EndCall);
    }
    Ok(CompiledScript {
      ops: mem::take(&mut self.ops),
      labels: mem::take(&mut self.labels),
      base,
    })
  }

  pub(crate) fn emit(&mut self, op: Op) -> usize {
    self.ops.push(op);
    self.ops.len() - 1
  }

  /// The id the next call to [`Compiler::label`] returns.
  pub(crate) fn next_label(&self) -> LabelId {
    self.base + self.labels.len()
  }

  /// Starts a new continuation at the current position.
  pub(crate) fn label(&mut self) -> LabelId {
    let id = self.next_label();
    self.labels.push(self.ops.len());
    id
  }

  /// Points the jump emitted at `at` to the current position.
  pub(crate) fn patch(&mut self, at: usize) {
    let pc = self.ops.len();
    match &mut self.ops[at] {
      Op::Jump(to)
      | Op::JumpUnless(_, to)
      | Op::JumpIf(_, to)
      | Op::CountDown(to)
      | Op::StartSound { missing: to, .. } => *to = pc,
      op => unreachable!("patching {op:?}"),
    }
  }

  pub(crate) fn parameter(&self, name: &str) -> Option<usize> {
    self.parameters.iter().position(|parameter| parameter == name)
  }

  /// Marks `id` as being compiled. Returns `false` if it already is, which
  /// means the blocks refer to themselves.
  pub(crate) fn enter(&mut self, id: BlockId) -> bool {
    if self.active.contains(&id) {
      return false;
    }
    self.active.push(id);
    true
  }

  pub(crate) fn leave(&mut self) {
    self.active.pop();
  }

  pub(crate) fn variable(&mut self, name: &str) -> DataRef {
    if self.stage.variables.contains(name) {
      return DataRef {
        scope: Scope::Stage,
        name: Rc::from(name),
      };
    }
    self
      .state
      .variables
      .entry(name.to_string())
      .or_insert_with(Value::default);
    DataRef {
      scope: Scope::Target,
      name: Rc::from(name),
    }
  }

  pub(crate) fn list(&mut self, name: &str) -> DataRef {
    if self.stage.lists.contains(name) {
      return DataRef {
        scope: Scope::Stage,
        name: Rc::from(name),
      };
    }
    self.state.lists.entry(name.to_string()).or_default();
    DataRef {
      scope: Scope::Target,
      name: Rc::from(name),
    }
  }

  /// Reads a field, warning when the block lacks it.
  pub(crate) fn field(&mut self, block: &Block, name: &str) -> String {
    match block.field(name) {
      Some(value) => value.to_string(),
      None => {
        self
          .warnings
          .add(format!("missing field {name} of {}", block.opcode));
        String::new()
      }
    }
  }
}

/// Compiles every script of a target into its continuation table and
/// installs the hats. A script that fails to compile is skipped.
pub fn compile_target(
  data: &TargetData,
  blocks: &[Block],
  stage: &DataNames,
  state: &mut TargetState,
  warnings: &mut Warnings,
) {
  let mut scripts = data.scripts.borrow_mut();
  let mut compiler = Compiler::new(blocks, stage, state, warnings);
  for block in blocks.iter().filter(|block| block.top_level) {
    let hat = match hat::parse(block, blocks) {
      Ok(Some(hat)) => hat,
      Ok(None) => {
        if !statement::is_statement(&block.opcode) && !expression::is_expression(&block.opcode) {
          compiler
            .warnings
            .add(format!("unknown top level block {}", block.opcode));
        }
        continue;
      }
      Err(err) => {
        error!("{}: {err}", data.name);
        compiler.warnings.add(err.to_string());
        continue;
      }
    };
    let base = scripts.continuations.len();
    let compiled = compiler
      .compile_script(base, &hat, block.next)
      .and_then(assembler::assemble);
    match compiled {
      Ok(continuations) => {
        trace!(
          "{}: {} compiled into labels {}..{}",
          data.name,
          block.opcode,
          base,
          base + continuations.len()
        );
        scripts.continuations.extend(continuations);
        hat::install(&mut scripts, hat, base, compiler.warnings);
      }
      Err(err) => {
        error!("{}: skipping {} script: {err}", data.name, block.opcode);
        compiler.warnings.add(err.to_string());
      }
    }
  }
}
