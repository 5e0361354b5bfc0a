//! Observers invoked per event, and the registry that names them.

use crate::config::TraceConfig;
use crate::error::TraceError;
use crate::event::{Event, EventKind};
use crate::frame::Frame;
use crate::instruction::format_instruction;
use crate::session::{DisplayFlag, TraceSession};
use crate::stack::render_stack_with;
use alloc::boxed::Box;
use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt::{self, Display, Formatter};
use core::marker::PhantomData;

/// Selects a handler in a [`HandlerRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(usize);

impl HandlerId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl Display for HandlerId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What a handler sees while processing one event.
///
/// Lines are buffered and only reach the output once the handler succeeds.
pub struct TraceContext<'a> {
    session: &'a mut TraceSession,
    config: &'a TraceConfig,
    lines: Vec<String>,
}

impl<'a> TraceContext<'a> {
    pub(crate) fn new(session: &'a mut TraceSession, config: &'a TraceConfig) -> Self {
        Self {
            session,
            config,
            lines: Vec::new(),
        }
    }

    pub fn session(&self) -> &TraceSession {
        &*self.session
    }

    /// Policy changes made here apply from the next event on.
    pub fn session_mut(&mut self) -> &mut TraceSession {
        &mut *self.session
    }

    pub fn config(&self) -> &TraceConfig {
        self.config
    }

    pub fn emit(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }

    pub fn emit_stack<F: Frame>(&mut self, frame: &F) {
        let lines = render_stack_with(frame, self.config);
        self.lines.extend(lines);
    }

    /// Instruction text, numbered when the config asks for it.
    pub fn instruction_line<F: Frame>(&self, frame: &F) -> String {
        let text = format_instruction(frame.instruction().as_ref());
        if self.config.number_instructions {
            format!("{:<6} {}", self.session.instruction_count(), text)
        } else {
            text
        }
    }

    pub(crate) fn into_lines(self) -> Vec<String> {
        self.lines
    }
}

pub trait Handler<F> {
    fn name(&self) -> &str;

    fn handle(
        &mut self,
        cx: &mut TraceContext<'_>,
        frame: &F,
        event: &Event<'_>,
    ) -> Result<(), TraceError>;
}

/// The default observer: one line per executed instruction, exceptions
/// marked, and the stack when the session asks for it.
#[derive(Debug, Default)]
pub struct InstructionTicker;

impl<F: Frame> Handler<F> for InstructionTicker {
    fn name(&self) -> &str {
        "instruction-ticker"
    }

    fn handle(
        &mut self,
        cx: &mut TraceContext<'_>,
        frame: &F,
        event: &Event<'_>,
    ) -> Result<(), TraceError> {
        if event.kind == EventKind::Exception {
            let text = if cx.session().policy_has(DisplayFlag::Instruction) {
                cx.instruction_line(frame)
            } else {
                String::new()
            };
            cx.emit(format!("!! exception at {}", text));
        } else if cx.session().policy_has(DisplayFlag::Instruction) && frame.instruction().is_some()
        {
            let line = cx.instruction_line(frame);
            cx.emit(line);
        }
        if cx.session().policy_has(DisplayFlag::Stacktrace) {
            cx.emit_stack(frame);
        }
        Ok(())
    }
}

/// Step-into observer: reports every event with the full stack, whatever
/// the display policy says.
#[derive(Debug, Default)]
pub struct StackReporter;

impl<F: Frame> Handler<F> for StackReporter {
    fn name(&self) -> &str {
        "stack-reporter"
    }

    fn handle(
        &mut self,
        cx: &mut TraceContext<'_>,
        frame: &F,
        event: &Event<'_>,
    ) -> Result<(), TraceError> {
        cx.emit(format!(
            "== {} {}:{}",
            event.kind,
            frame.module_name(),
            frame.code_name()
        ));
        cx.emit_stack(frame);
        Ok(())
    }
}

/// Wraps a closure as a [`Handler`].
pub struct FnHandler<F, C> {
    name: String,
    callback: C,
    _frame: PhantomData<fn(&F)>,
}

pub fn handler_fn<F, C>(name: &str, callback: C) -> FnHandler<F, C>
where
    F: Frame,
    C: FnMut(&mut TraceContext<'_>, &F, &Event<'_>) -> Result<(), TraceError>,
{
    FnHandler {
        name: name.into(),
        callback,
        _frame: PhantomData,
    }
}

impl<F, C> Handler<F> for FnHandler<F, C>
where
    F: Frame,
    C: FnMut(&mut TraceContext<'_>, &F, &Event<'_>) -> Result<(), TraceError>,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn handle(
        &mut self,
        cx: &mut TraceContext<'_>,
        frame: &F,
        event: &Event<'_>,
    ) -> Result<(), TraceError> {
        (self.callback)(cx, frame, event)
    }
}

pub struct HandlerRegistry<'h, F> {
    handlers: Vec<Box<dyn Handler<F> + 'h>>,
}

impl<'h, F: Frame> HandlerRegistry<'h, F> {
    pub fn new() -> Self {
        Self {
            handlers: Vec::new(),
        }
    }

    pub fn register(&mut self, handler: impl Handler<F> + 'h) -> HandlerId {
        let id = HandlerId(self.handlers.len());
        self.handlers.push(Box::new(handler));
        id
    }

    pub fn contains(&self, id: HandlerId) -> bool {
        id.index() < self.handlers.len()
    }

    pub fn get_mut(&mut self, id: HandlerId) -> Option<&mut (dyn Handler<F> + 'h)> {
        self.handlers.get_mut(id.index()).map(|h| h.as_mut())
    }

    pub fn name(&self, id: HandlerId) -> Option<&str> {
        self.handlers.get(id.index()).map(|h| h.name())
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl<F: Frame> Default for HandlerRegistry<'_, F> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::FrameSnapshot;
    use crate::instruction::Instruction;
    use crate::session::DisplayPolicy;

    fn run<'f, H: Handler<&'f FrameSnapshot>>(
        handler: &mut H,
        session: &mut TraceSession,
        config: &TraceConfig,
        frame: &'f FrameSnapshot,
        event: Event<'_>,
    ) -> Vec<String> {
        let mut cx = TraceContext::new(session, config);
        handler.handle(&mut cx, &frame, &event).unwrap();
        cx.into_lines()
    }

    #[test]
    fn test_ticker_instruction_only() {
        let config = TraceConfig::default();
        let mut session = TraceSession::new(DisplayPolicy::empty().with(DisplayFlag::Instruction));
        let frame = FrameSnapshot::new("m", "f", "m.py")
            .with_line(2)
            .with_instruction(Instruction::new(0, "LOAD_CONST").with_const(999));
        let lines = run(&mut InstructionTicker, &mut session, &config, &frame, Event::line());
        assert_eq!(lines, alloc::vec!["LOAD_CONST  $999"]);
    }

    #[test]
    fn test_ticker_without_instruction_is_quiet() {
        let config = TraceConfig::default();
        let mut session = TraceSession::new(DisplayPolicy::empty().with(DisplayFlag::Instruction));
        let frame = FrameSnapshot::new("m", "f", "m.py").with_line(2);
        let lines = run(&mut InstructionTicker, &mut session, &config, &frame, Event::call());
        assert!(lines.is_empty());
    }

    #[test]
    fn test_ticker_marks_exceptions() {
        let config = TraceConfig::default();
        let mut session = TraceSession::new(DisplayPolicy::empty().with(DisplayFlag::Instruction));
        let frame = FrameSnapshot::new("m", "f", "m.py")
            .with_instruction(Instruction::new(8, "RAISE_VARARGS").with_const(1));
        let lines = run(
            &mut InstructionTicker,
            &mut session,
            &config,
            &frame,
            Event::exception(None),
        );
        assert_eq!(lines, alloc::vec!["!! exception at RAISE_VARARGS  $1"]);
    }

    #[test]
    fn test_ticker_numbered_with_stack() {
        let config = TraceConfig::default().with_numbered_instructions(true);
        let mut session = TraceSession::new(config.policy);
        session.tick(EventKind::Line);
        let frame = FrameSnapshot::new("m", "f", "m.py")
            .with_line(4)
            .with_instruction(Instruction::new(0, "POP_TOP"));
        let lines = run(&mut InstructionTicker, &mut session, &config, &frame, Event::line());
        assert_eq!(lines, alloc::vec!["1      POP_TOP  ", "* 0: @m:f => m.py:4"]);
    }

    #[test]
    fn test_stack_reporter_ignores_policy() {
        let config = TraceConfig::default();
        let mut session = TraceSession::new(DisplayPolicy::empty());
        let frame = FrameSnapshot::new("m", "g", "m.py").with_line(9);
        let lines = run(&mut StackReporter, &mut session, &config, &frame, Event::call());
        assert_eq!(lines, alloc::vec!["== call m:g", "* 0: @m:g => m.py:9"]);
    }

    #[test]
    fn test_registry_ids_are_dense() {
        let mut registry: HandlerRegistry<'_, &FrameSnapshot> = HandlerRegistry::new();
        let a = registry.register(InstructionTicker);
        let b = registry.register(handler_fn::<&FrameSnapshot, _>("noop", |_, _, _| Ok(())));
        assert_eq!(a.index(), 0);
        assert_eq!(b.index(), 1);
        assert_eq!(registry.name(b), Some("noop"));
        assert!(registry.contains(a));
        assert!(!registry.contains(HandlerId(2)));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_registry_ids_never_alias() {
        let mut registry: HandlerRegistry<'_, &FrameSnapshot> = HandlerRegistry::new();
        let first = registry.register(InstructionTicker);
        let last = (0..=u16::MAX)
            .map(|_| registry.register(StackReporter))
            .last()
            .unwrap();
        assert_ne!(last, first);
        assert_eq!(last.index(), u16::MAX as usize + 1);
        assert_eq!(registry.name(last), Some("stack-reporter"));
        assert_eq!(registry.name(first), Some("instruction-ticker"));
    }

    #[test]
    fn test_ticker_exception_marker_without_flags() {
        let config = TraceConfig::default();
        let mut session = TraceSession::new(DisplayPolicy::empty());
        let frame = FrameSnapshot::new("m", "f", "m.py")
            .with_instruction(Instruction::new(8, "RAISE_VARARGS").with_const(1));
        let lines = run(
            &mut InstructionTicker,
            &mut session,
            &config,
            &frame,
            Event::exception(None),
        );
        assert_eq!(lines, alloc::vec!["!! exception at "]);
    }
}
