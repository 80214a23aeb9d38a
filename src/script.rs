//! Compiled form of scripts.
//!
//! A script is lowered into one flat list of [`Op`]s. Every suspension
//! point is a label: an index into the owning target's continuation table
//! that points at an offset of that list. Running a continuation means
//! executing ops from its offset until one of them yields or the list ends.

use std::collections::HashMap;
use std::rc::Rc;

use crate::block::Value;
use crate::target::RotationStyle;

/// Index into a target's continuation table.
pub type LabelId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Type {
  String,
  Number,
  Boolean,
  Any,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
  Stage,
  Target,
}

/// A variable or list, resolved at compile time to the storage it lives in.
#[derive(Debug, Clone, PartialEq)]
pub struct DataRef {
  pub scope: Scope,
  pub name: Rc<str>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
  Const(Value),
  Variable(DataRef),
  ListContents(DataRef),
  Argument(usize),
  Cast(Type, Box<Expr>),
  Not(Box<Expr>),
  Binary(BinaryOp, Box<Expr>, Box<Expr>),
  Round(Box<Expr>),
  Length(Box<Expr>),
  Math(MathFunc, Box<Expr>),
  Sensor(Sensor),
  Current(DatePart),
  KeyPressed(Box<Expr>),
  Attribute { property: String, object: Box<Expr> },
  DistanceTo(Box<Expr>),
  ItemOfList(DataRef, Box<Expr>),
  ItemNumOfList(DataRef, Box<Expr>),
  LengthOfList(DataRef),
  ListContains(DataRef, Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
  Add,
  Subtract,
  Multiply,
  Divide,
  Mod,
  Random,
  Lt,
  Gt,
  Equals,
  And,
  Or,
  Join,
  LetterOf,
  Contains,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MathFunc {
  Abs,
  Floor,
  Ceiling,
  Sqrt,
  Sin,
  Cos,
  Tan,
  Asin,
  Acos,
  Atan,
  Ln,
  Log,
  Exp,
  Pow10,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sensor {
  X,
  Y,
  Direction,
  CostumeNumber,
  CostumeName,
  BackdropNumber,
  BackdropName,
  Size,
  Volume,
  Answer,
  MouseX,
  MouseY,
  MouseDown,
  Loudness,
  Timer,
  DaysSince2000,
  Username,
  Tempo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatePart {
  Year,
  Month,
  Date,
  DayOfWeek,
  Hour,
  Minute,
  Second,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Destination {
  Point(Expr, Expr),
  Object(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Backdrop {
  To(Expr),
  Next,
}

/// Statements that only touch the running target, the stage or shared
/// state, never the control flow of the thread.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
  MoveSteps(Expr),
  Turn(Expr),
  GoTo(Expr),
  GoToXY(Expr, Expr),
  PointInDirection(Expr),
  PointTowards(Expr),
  ChangeX(Expr),
  SetX(Expr),
  ChangeY(Expr),
  SetY(Expr),
  BounceOnEdge,
  SetRotationStyle(RotationStyle),
  /// `remember` keeps the bubble id in the live frame so a timed say can
  /// clear only its own bubble.
  Say { message: Expr, think: bool, remember: bool },
  Unsay,
  SwitchCostume(Expr),
  NextCostume,
  ChangeSize(Expr),
  SetSize(Expr),
  ChangeEffect(String, Expr),
  SetEffect(String, Expr),
  ClearEffects,
  Show,
  Hide,
  GoToFront,
  GoToBack,
  ChangeLayer(Expr),
  PlaySound(Expr),
  StopAllSounds,
  ChangeVolume(Expr),
  SetVolume(Expr),
  SetDragMode(bool),
  ResetTimer,
  SetVariable(DataRef, Expr),
  ChangeVariable(DataRef, Expr),
  ShowVariable(DataRef, bool),
  AddToList(DataRef, Expr),
  DeleteOfList(DataRef, Expr),
  DeleteAllOfList(DataRef),
  InsertAtList(DataRef, Expr, Expr),
  ReplaceItemOfList(DataRef, Expr, Expr),
  Clone(Expr),
  PenClear,
  Stamp,
  PenDown,
  PenUp,
  SetPenColor(Expr),
  /// Parameter name, then value.
  SetPenParam(Expr, Expr),
  ChangePenParam(Expr, Expr),
  ChangePenSize(Expr),
  SetPenSize(Expr),
  SetTempo(Expr),
  ChangeTempo(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Op {
  Do(Statement),
  Jump(usize),
  /// Jumps when the condition is false.
  JumpUnless(Expr, usize),
  JumpIf(Expr, usize),
  Save,
  Restore,
  SetCount(Expr),
  /// Takes one from the saved counter while it is at least 0.5,
  /// otherwise jumps.
  CountDown(usize),
  StartTimer(Expr),
  /// Starts a sound and times its duration, or jumps when there is no
  /// such sound.
  StartSound { sound: Expr, missing: usize },
  AwaitTimer(LabelId),
  StartGlide { duration: Expr, destination: Destination },
  GlideStep(LabelId),
  Queue(LabelId),
  ForceQueue(LabelId),
  Broadcast { message: Expr, wait: bool },
  AwaitThreads(LabelId),
  SwitchBackdrop { backdrop: Backdrop, wait: bool },
  Call {
    proccode: Rc<str>,
    arguments: Vec<Expr>,
    then: LabelId,
  },
  EndCall,
  StopAll,
  StopOthers,
  DeleteClone,
  WarpEnter,
  WarpExit,
  TakePromptTicket,
  AwaitPromptTurn(LabelId),
  Ask(Expr),
  AwaitAnswer(LabelId),
}

impl Op {
  /// The label this op can hand control to.
  pub fn target_label(&self) -> Option<LabelId> {
    match self {
      Op::AwaitTimer(label)
      | Op::GlideStep(label)
      | Op::Queue(label)
      | Op::ForceQueue(label)
      | Op::AwaitThreads(label)
      | Op::AwaitPromptTurn(label)
      | Op::AwaitAnswer(label)
      | Op::Call { then: label, .. } => Some(*label),
      _ => None,
    }
  }

  /// The offset this op may jump to within its own script.
  pub fn jump_target(&self) -> Option<usize> {
    match self {
      Op::Jump(to)
      | Op::JumpUnless(_, to)
      | Op::JumpIf(_, to)
      | Op::CountDown(to)
      | Op::StartSound { missing: to, .. } => Some(*to),
      _ => None,
    }
  }
}

#[derive(Debug, Clone)]
pub struct Continuation {
  pub code: Rc<[Op]>,
  pub pc: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Procedure {
  pub entry: LabelId,
  pub warp: bool,
  pub parameters: Vec<String>,
}

#[derive(Debug, Default)]
pub struct Listeners {
  pub green_flag: Vec<LabelId>,
  pub clicked: Vec<LabelId>,
  pub cloned: Vec<LabelId>,
  pub key_pressed: HashMap<String, Vec<LabelId>>,
  pub receive: HashMap<String, Vec<LabelId>>,
  pub backdrop_switch: HashMap<String, Vec<LabelId>>,
}

/// Compiled code of one sprite or the stage, shared with all its clones.
#[derive(Debug, Default)]
pub struct Scripts {
  pub continuations: Vec<Continuation>,
  pub listeners: Listeners,
  pub procedures: HashMap<String, Rc<Procedure>>,
}
