use std::rc::Rc;

use crate::block::{Block, BlockId, Input, Value};
use crate::compiler::Compiler;
use crate::error::{Error, Result};
use crate::hat;
use crate::script::{Backdrop, BinaryOp, Destination, Expr, Op, Statement, Type};
use crate::target::RotationStyle;

const STATEMENTS: &[&str] = &[
  "motion_movesteps",
  "motion_turnright",
  "motion_turnleft",
  "motion_goto",
  "motion_gotoxy",
  "motion_glideto",
  "motion_glidesecstoxy",
  "motion_pointindirection",
  "motion_pointtowards",
  "motion_changexby",
  "motion_setx",
  "motion_changeyby",
  "motion_sety",
  "motion_ifonedgebounce",
  "motion_setrotationstyle",
  "looks_sayforsecs",
  "looks_say",
  "looks_thinkforsecs",
  "looks_think",
  "looks_switchcostumeto",
  "looks_nextcostume",
  "looks_switchbackdropto",
  "looks_switchbackdroptoandwait",
  "looks_nextbackdrop",
  "looks_changesizeby",
  "looks_setsizeto",
  "looks_changeeffectby",
  "looks_seteffectto",
  "looks_cleargraphiceffects",
  "looks_show",
  "looks_hide",
  "looks_gotofrontback",
  "looks_goforwardbackwardlayers",
  "sound_play",
  "sound_playuntildone",
  "sound_stopallsounds",
  "sound_changevolumeby",
  "sound_setvolumeto",
  "event_broadcast",
  "event_broadcastandwait",
  "control_wait",
  "control_repeat",
  "control_forever",
  "control_forever_if",
  "control_if",
  "control_if_else",
  "control_wait_until",
  "control_repeat_until",
  "control_while",
  "control_stop",
  "control_create_clone_of",
  "control_delete_this_clone",
  "control_warp",
  "sensing_askandwait",
  "sensing_setdragmode",
  "sensing_resettimer",
  "data_setvariableto",
  "data_changevariableby",
  "data_showvariable",
  "data_hidevariable",
  "data_showlist",
  "data_hidelist",
  "data_addtolist",
  "data_deleteoflist",
  "data_deletealloflist",
  "data_insertatlist",
  "data_replaceitemoflist",
  "procedures_call",
  "pen_clear",
  "pen_stamp",
  "pen_penDown",
  "pen_penUp",
  "pen_setPenColorToColor",
  "pen_setPenColorParamTo",
  "pen_changePenColorParamBy",
  "pen_setPenHueToNumber",
  "pen_changePenHueBy",
  "pen_setPenShadeToNumber",
  "pen_changePenShadeBy",
  "pen_changePenSizeBy",
  "pen_setPenSizeTo",
  "music_setTempo",
  "music_changeTempo",
];

pub fn is_statement(opcode: &str) -> bool {
  STATEMENTS.contains(&opcode)
}

impl Compiler<'_> {
  /// Compiles the stack of blocks starting at `first`.
  pub(crate) fn statements(&mut self, first: Option<BlockId>) -> Result<()> {
    let blocks = self.blocks;
    let mut next = first;
    let mut entered = 0;
    let mut result = Ok(());
    while let Some(id) = next {
      let Some(block) = blocks.get(id) else {
        break;
      };
      if !self.enter(id) {
        result = Err(Error::BlockCycle(id));
        break;
      }
      entered += 1;
      if let Err(err) = self.statement(block) {
        result = Err(err);
        break;
      }
      next = block.next;
    }
    for _ in 0..entered {
      self.leave();
    }
    result
  }

  fn substack(&mut self, block: &Block, name: &str) -> Result<()> {
    match block.input(name) {
      Input::Block(id) => self.statements(Some(*id)),
      _ => Ok(()),
    }
  }

  fn run(&mut self, statement: Statement) {
    self.emit(Op::Do(statement));
  }

  /// Yields until the timer in the live registers has run out.
  fn await_timer(&mut self) {
    let id = self.label();
    self.emit(Op::AwaitTimer(id));
  }

  /// Yields while threads in the live registers are still queued.
  fn await_threads(&mut self) {
    let id = self.label();
    self.emit(Op::AwaitThreads(id));
  }

  fn statement(&mut self, block: &Block) -> Result<()> {
    use Statement as S;
    use Type::{Any, Boolean, Number, String};
    match block.opcode.as_str() {
      // Motion
      "motion_movesteps" => {
        let steps = self.input(block, "STEPS", Number);
        self.run(S::MoveSteps(steps));
      }
      "motion_turnright" => {
        let degrees = self.input(block, "DEGREES", Number);
        self.run(S::Turn(degrees));
      }
      "motion_turnleft" => {
        let degrees = self.input(block, "DEGREES", Number);
        self.run(S::Turn(negate(degrees)));
      }
      "motion_goto" => {
        let to = self.input(block, "TO", String);
        self.run(S::GoTo(to));
      }
      "motion_gotoxy" => {
        let x = self.input(block, "X", Number);
        let y = self.input(block, "Y", Number);
        self.run(S::GoToXY(x, y));
      }
      "motion_glideto" => {
        let duration = self.input(block, "SECS", Number);
        let to = self.input(block, "TO", String);
        self.glide(duration, Destination::Object(to));
      }
      "motion_glidesecstoxy" => {
        let duration = self.input(block, "SECS", Number);
        let x = self.input(block, "X", Number);
        let y = self.input(block, "Y", Number);
        self.glide(duration, Destination::Point(x, y));
      }
      "motion_pointindirection" => {
        let direction = self.input(block, "DIRECTION", Number);
        self.run(S::PointInDirection(direction));
      }
      "motion_pointtowards" => {
        let towards = self.input(block, "TOWARDS", String);
        self.run(S::PointTowards(towards));
      }
      "motion_changexby" => {
        let dx = self.input(block, "DX", Number);
        self.run(S::ChangeX(dx));
      }
      "motion_setx" => {
        let x = self.input(block, "X", Number);
        self.run(S::SetX(x));
      }
      "motion_changeyby" => {
        let dy = self.input(block, "DY", Number);
        self.run(S::ChangeY(dy));
      }
      "motion_sety" => {
        let y = self.input(block, "Y", Number);
        self.run(S::SetY(y));
      }
      "motion_ifonedgebounce" => self.run(S::BounceOnEdge),
      "motion_setrotationstyle" => {
        let style = self.field(block, "STYLE");
        match RotationStyle::parse(&style) {
          Some(style) => self.run(S::SetRotationStyle(style)),
          None => self.warnings.add(format!("unknown rotation style {style}")),
        }
      }

      // Looks
      "looks_sayforsecs" | "looks_thinkforsecs" => {
        let message = self.input(block, "MESSAGE", Any);
        let duration = self.input(block, "SECS", Number);
        self.emit(Op::Save);
        self.run(S::Say {
          message,
          think: block.opcode == "looks_thinkforsecs",
          remember: true,
        });
        self.emit(Op::StartTimer(duration));
        self.await_timer();
        self.run(S::Unsay);
        self.emit(Op::Restore);
      }
      "looks_say" | "looks_think" => {
        let message = self.input(block, "MESSAGE", Any);
        self.run(S::Say {
          message,
          think: block.opcode == "looks_think",
          remember: false,
        });
      }
      "looks_switchcostumeto" => {
        let costume = self.input(block, "COSTUME", Any);
        self.run(S::SwitchCostume(costume));
      }
      "looks_nextcostume" => self.run(S::NextCostume),
      "looks_switchbackdropto" => {
        let backdrop = self.input(block, "BACKDROP", Any);
        self.emit(Op::SwitchBackdrop {
          backdrop: Backdrop::To(backdrop),
          wait: false,
        });
      }
      "looks_switchbackdroptoandwait" => {
        let backdrop = self.input(block, "BACKDROP", Any);
        self.emit(Op::Save);
        self.emit(Op::SwitchBackdrop {
          backdrop: Backdrop::To(backdrop),
          wait: true,
        });
        self.await_threads();
        self.emit(Op::Restore);
      }
      "looks_nextbackdrop" => {
        self.emit(Op::SwitchBackdrop {
          backdrop: Backdrop::Next,
          wait: false,
        });
      }
      "looks_changesizeby" => {
        let change = self.input(block, "CHANGE", Number);
        self.run(S::ChangeSize(change));
      }
      "looks_setsizeto" => {
        let size = self.input(block, "SIZE", Number);
        self.run(S::SetSize(size));
      }
      "looks_changeeffectby" => {
        let effect = self.field(block, "EFFECT").to_lowercase();
        let change = self.input(block, "CHANGE", Number);
        self.run(S::ChangeEffect(effect, change));
      }
      "looks_seteffectto" => {
        let effect = self.field(block, "EFFECT").to_lowercase();
        let value = self.input(block, "VALUE", Number);
        self.run(S::SetEffect(effect, value));
      }
      "looks_cleargraphiceffects" => self.run(S::ClearEffects),
      "looks_show" => self.run(S::Show),
      "looks_hide" => self.run(S::Hide),
      "looks_gotofrontback" => match self.field(block, "FRONT_BACK").as_str() {
        "front" => self.run(S::GoToFront),
        "back" => self.run(S::GoToBack),
        other => self.warnings.add(format!("unknown layer {other}")),
      },
      "looks_goforwardbackwardlayers" => {
        let direction = self.field(block, "FORWARD_BACKWARD");
        let layers = self.input(block, "NUM", Number);
        match direction.as_str() {
          "forward" => self.run(S::ChangeLayer(layers)),
          "backward" => self.run(S::ChangeLayer(negate(layers))),
          other => self.warnings.add(format!("unknown layer direction {other}")),
        }
      }

      // Sound
      "sound_play" => {
        let sound = self.input(block, "SOUND_MENU", Any);
        self.run(S::PlaySound(sound));
      }
      "sound_playuntildone" => {
        let sound = self.input(block, "SOUND_MENU", Any);
        self.emit(Op::Save);
        let start = self.emit(Op::StartSound { sound, missing: 0 });
        self.await_timer();
        self.patch(start);
        self.emit(Op::Restore);
      }
      "sound_stopallsounds" => self.run(S::StopAllSounds),
      "sound_changevolumeby" => {
        let volume = self.input(block, "VOLUME", Number);
        self.run(S::ChangeVolume(volume));
      }
      "sound_setvolumeto" => {
        let volume = self.input(block, "VOLUME", Number);
        self.run(S::SetVolume(volume));
      }

      // Events
      "event_broadcast" => {
        let message = self.input(block, "BROADCAST_INPUT", String);
        self.emit(Op::Broadcast { message, wait: false });
      }
      "event_broadcastandwait" => {
        let message = self.input(block, "BROADCAST_INPUT", String);
        self.emit(Op::Save);
        self.emit(Op::Broadcast { message, wait: true });
        self.await_threads();
        self.emit(Op::Restore);
      }

      // Control
      "control_wait" => {
        let duration = self.input(block, "DURATION", Number);
        self.emit(Op::Save);
        self.emit(Op::StartTimer(duration));
        self.await_timer();
        self.emit(Op::Restore);
      }
      "control_repeat" => {
        let times = self.input(block, "TIMES", Number);
        self.emit(Op::Save);
        self.emit(Op::SetCount(times));
        let id = self.label();
        let exit = self.emit(Op::CountDown(0));
        self.substack(block, "SUBSTACK")?;
        self.emit(Op::Queue(id));
        self.patch(exit);
        self.emit(Op::Restore);
      }
      "control_forever" => {
        let id = self.label();
        self.substack(block, "SUBSTACK")?;
        self.emit(Op::Queue(id));
      }
      "control_forever_if" => {
        let id = self.label();
        let condition = self.input(block, "CONDITION", Boolean);
        let skip = self.emit(Op::JumpUnless(condition, 0));
        self.substack(block, "SUBSTACK")?;
        self.patch(skip);
        self.emit(Op::Queue(id));
      }
      "control_if" => {
        let condition = self.input(block, "CONDITION", Boolean);
        let skip = self.emit(Op::JumpUnless(condition, 0));
        self.substack(block, "SUBSTACK")?;
        self.patch(skip);
      }
      "control_if_else" => {
        let condition = self.input(block, "CONDITION", Boolean);
        let otherwise = self.emit(Op::JumpUnless(condition, 0));
        self.substack(block, "SUBSTACK")?;
        let end = self.emit(Op::Jump(0));
        self.patch(otherwise);
        self.substack(block, "SUBSTACK2")?;
        self.patch(end);
      }
      "control_wait_until" => {
        let id = self.label();
        let condition = self.input(block, "CONDITION", Boolean);
        let done = self.emit(Op::JumpIf(condition, 0));
        self.emit(Op::ForceQueue(id));
        self.patch(done);
      }
      "control_repeat_until" => {
        let id = self.label();
        let condition = self.input(block, "CONDITION", Boolean);
        let done = self.emit(Op::JumpIf(condition, 0));
        self.substack(block, "SUBSTACK")?;
        self.emit(Op::Queue(id));
        self.patch(done);
      }
      "control_while" => {
        let id = self.label();
        let condition = self.input(block, "CONDITION", Boolean);
        let done = self.emit(Op::JumpUnless(condition, 0));
        self.substack(block, "SUBSTACK")?;
        self.emit(Op::Queue(id));
        self.patch(done);
      }
      "control_stop" => match self.field(block, "STOP_OPTION").as_str() {
        "all" => {
          self.emit(Op::StopAll);
        }
        "this script" => {
          self.emit(Op::EndCall);
        }
        "other scripts in sprite" | "other scripts in stage" => {
          self.emit(Op::StopOthers);
        }
        other => self.warnings.add(format!("unknown stop option {other}")),
      },
      "control_create_clone_of" => {
        let of = self.input(block, "CLONE_OPTION", String);
        self.run(S::Clone(of));
      }
      "control_delete_this_clone" => {
        self.emit(Op::DeleteClone);
      }
      "control_warp" => {
        self.emit(Op::WarpEnter);
        self.substack(block, "SUBSTACK")?;
        self.emit(Op::WarpExit);
      }

      // Sensing
      "sensing_askandwait" => {
        let question = self.input(block, "QUESTION", String);
        self.emit(Op::TakePromptTicket);
        let turn = self.label();
        self.emit(Op::AwaitPromptTurn(turn));
        self.emit(Op::Ask(question));
        let answered = self.label();
        self.emit(Op::AwaitAnswer(answered));
      }
      "sensing_setdragmode" => {
        let draggable = self.field(block, "DRAG_MODE") == "draggable";
        self.run(S::SetDragMode(draggable));
      }
      "sensing_resettimer" => self.run(S::ResetTimer),

      // Data
      "data_setvariableto" => {
        let name = self.field(block, "VARIABLE");
        let variable = self.variable(&name);
        let value = self.input(block, "VALUE", Any);
        self.run(S::SetVariable(variable, value));
      }
      "data_changevariableby" => {
        let name = self.field(block, "VARIABLE");
        let variable = self.variable(&name);
        let value = self.input(block, "VALUE", Number);
        self.run(S::ChangeVariable(variable, value));
      }
      "data_showvariable" | "data_hidevariable" => {
        let name = self.field(block, "VARIABLE");
        let variable = self.variable(&name);
        self.run(S::ShowVariable(variable, block.opcode == "data_showvariable"));
      }
      "data_showlist" | "data_hidelist" => {
        let list = self.list_field(block);
        self.run(S::ShowVariable(list, block.opcode == "data_showlist"));
      }
      "data_addtolist" => {
        let list = self.list_field(block);
        let item = self.input(block, "ITEM", String);
        self.run(S::AddToList(list, item));
      }
      "data_deleteoflist" => {
        let list = self.list_field(block);
        let index = self.input(block, "INDEX", Any);
        self.run(S::DeleteOfList(list, index));
      }
      "data_deletealloflist" => {
        let list = self.list_field(block);
        self.run(S::DeleteAllOfList(list));
      }
      "data_insertatlist" => {
        let list = self.list_field(block);
        let index = self.input(block, "INDEX", Any);
        let item = self.input(block, "ITEM", String);
        self.run(S::InsertAtList(list, index, item));
      }
      "data_replaceitemoflist" => {
        let list = self.list_field(block);
        let index = self.input(block, "INDEX", Any);
        let item = self.input(block, "ITEM", String);
        self.run(S::ReplaceItemOfList(list, index, item));
      }

      // Procedures
      "procedures_call" => {
        let Some(mutation) = &block.mutation else {
          return Err(Error::MalformedProcedure {
            proccode: Default::default(),
            reason: "call without mutation".to_string(),
          });
        };
        let arguments = hat::argument_ids(mutation)?
          .iter()
          .map(|id| self.expression(block.input(id), Any))
          .collect();
        let then = self.next_label();
        self.emit(Op::Call {
          proccode: Rc::from(mutation.proccode.as_str()),
          arguments,
          then,
        });
        self.label();
      }

      // Pen
      "pen_clear" => self.run(S::PenClear),
      "pen_stamp" => self.run(S::Stamp),
      "pen_penDown" => self.run(S::PenDown),
      "pen_penUp" => self.run(S::PenUp),
      "pen_setPenColorToColor" => {
        let color = self.input(block, "COLOR", Any);
        self.run(S::SetPenColor(color));
      }
      "pen_setPenColorParamTo" => {
        let param = self.input(block, "COLOR_PARAM", String);
        let value = self.input(block, "VALUE", Number);
        self.run(S::SetPenParam(param, value));
      }
      "pen_changePenColorParamBy" => {
        let param = self.input(block, "COLOR_PARAM", String);
        let value = self.input(block, "VALUE", Number);
        self.run(S::ChangePenParam(param, value));
      }
      "pen_setPenHueToNumber" => {
        let hue = self.input(block, "HUE", Number);
        self.run(S::SetPenParam(Expr::Const(Value::from("color")), hue));
      }
      "pen_changePenHueBy" => {
        let hue = self.input(block, "HUE", Number);
        self.run(S::ChangePenParam(Expr::Const(Value::from("color")), hue));
      }
      "pen_setPenShadeToNumber" => {
        let shade = self.input(block, "SHADE", Number);
        self.run(S::SetPenParam(Expr::Const(Value::from("brightness")), shade));
      }
      "pen_changePenShadeBy" => {
        let shade = self.input(block, "SHADE", Number);
        self.run(S::ChangePenParam(Expr::Const(Value::from("brightness")), shade));
      }
      "pen_changePenSizeBy" => {
        let size = self.input(block, "SIZE", Number);
        self.run(S::ChangePenSize(size));
      }
      "pen_setPenSizeTo" => {
        let size = self.input(block, "SIZE", Number);
        self.run(S::SetPenSize(size));
      }

      // Music
      "music_setTempo" => {
        let tempo = self.input(block, "TEMPO", Number);
        self.run(S::SetTempo(tempo));
      }
      "music_changeTempo" => {
        let tempo = self.input(block, "TEMPO", Number);
        self.run(S::ChangeTempo(tempo));
      }

      opcode => self.warnings.add(format!("unknown statement {opcode}")),
    }
    Ok(())
  }

  fn glide(&mut self, duration: Expr, destination: Destination) {
    self.emit(Op::Save);
    self.emit(Op::StartGlide { duration, destination });
    let id = self.label();
    self.emit(Op::GlideStep(id));
    self.emit(Op::Restore);
  }
}

fn negate(expr: Expr) -> Expr {
  match expr {
    Expr::Const(Value::Number(number)) => Expr::Const(Value::Number(-number)),
    expr => Expr::Binary(
      BinaryOp::Subtract,
      Box::new(Expr::Const(Value::Number(0.))),
      Box::new(expr),
    ),
  }
}
