//! Per-event dispatch: filtering, counting, rendering through the armed
//! handler, and choosing the handler for what comes next.

use crate::config::TraceConfig;
use crate::error::TraceError;
use crate::event::{Event, EventKind};
use crate::frame::Frame;
use crate::handler::{Handler, HandlerId, HandlerRegistry, InstructionTicker, TraceContext};
use crate::output::TraceOutput;
use crate::session::TraceSession;
use alloc::collections::VecDeque;
use alloc::string::String;
use alloc::vec::Vec;
use log::{debug, trace, warn};

pub struct Dispatcher<'h, F, O> {
    config: TraceConfig,
    session: TraceSession,
    registry: HandlerRegistry<'h, F>,
    /// Armed again on calls once no escalation is pending.
    default: HandlerId,
    escalations: VecDeque<HandlerId>,
    output: O,
}

impl<'h, F: Frame, O: TraceOutput> Dispatcher<'h, F, O> {
    /// Creates a dispatcher with [`InstructionTicker`] as the default handler.
    pub fn new(config: TraceConfig, output: O) -> Self {
        let mut registry = HandlerRegistry::new();
        let default = registry.register(InstructionTicker);
        Self {
            session: TraceSession::new(config.policy),
            config,
            registry,
            default,
            escalations: VecDeque::new(),
            output,
        }
    }

    pub fn register(&mut self, handler: impl Handler<F> + 'h) -> HandlerId {
        let id = self.registry.register(handler);
        debug!("registered handler {} ({})", id, self.handler_name(id));
        id
    }

    pub fn default_handler(&self) -> HandlerId {
        self.default
    }

    pub fn set_default(&mut self, id: HandlerId) -> Result<(), TraceError> {
        self.check(id)?;
        self.default = id;
        Ok(())
    }

    /// Queues `id` to take over the subtree of the next unconsumed call.
    pub fn escalate(&mut self, id: HandlerId) -> Result<(), TraceError> {
        self.check(id)?;
        debug!("queued escalation to {} ({})", id, self.handler_name(id));
        self.escalations.push_back(id);
        Ok(())
    }

    pub fn pending_escalations(&self) -> usize {
        self.escalations.len()
    }

    pub fn contains(&self, id: HandlerId) -> bool {
        self.registry.contains(id)
    }

    pub fn handler_name(&self, id: HandlerId) -> &str {
        self.registry.name(id).unwrap_or("<unregistered>")
    }

    pub fn config(&self) -> &TraceConfig {
        &self.config
    }

    pub fn session(&self) -> &TraceSession {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut TraceSession {
        &mut self.session
    }

    pub fn output(&self) -> &O {
        &self.output
    }

    pub fn output_mut(&mut self) -> &mut O {
        &mut self.output
    }

    pub(crate) fn into_parts(self) -> (TraceSession, O) {
        (self.session, self.output)
    }

    /// Handles one event with the `armed` handler and returns the handler for
    /// the next event of this subtree, or `None` to stop observing it.
    ///
    /// Never fails: a failing handler turns the event into a no-op.
    pub fn dispatch(&mut self, armed: HandlerId, frame: &F, event: &Event<'_>) -> Option<HandlerId> {
        if self.config.is_excluded(frame.module_name()) {
            trace!(
                "{} in {}:{} filtered",
                event.kind,
                frame.module_name(),
                frame.code_name()
            );
            return None;
        }

        let checkpoint = self.session.clone();
        self.session.tick(event.kind);
        match self.run_handler(armed, frame, event) {
            Ok(lines) => self.flush(&lines),
            Err(err) => {
                warn!(
                    "dropped {} event in {}:{}: {}",
                    event.kind,
                    frame.module_name(),
                    frame.code_name(),
                    err
                );
                self.session = checkpoint;
            }
        }

        Some(self.next_handler(armed, event.kind))
    }

    fn run_handler(
        &mut self,
        id: HandlerId,
        frame: &F,
        event: &Event<'_>,
    ) -> Result<Vec<String>, TraceError> {
        let handler = self
            .registry
            .get_mut(id)
            .ok_or(TraceError::UnknownHandler(id))?;
        let mut cx = TraceContext::new(&mut self.session, &self.config);
        invoke(handler, &mut cx, frame, event)?;
        Ok(cx.into_lines())
    }

    fn flush(&mut self, lines: &[String]) {
        for line in lines {
            if let Err(err) = self.output.write_line(line) {
                warn!("trace output failed: {}", err);
                return;
            }
        }
    }

    fn next_handler(&mut self, armed: HandlerId, kind: EventKind) -> HandlerId {
        if kind != EventKind::Call {
            return armed;
        }
        match self.escalations.pop_front() {
            Some(next) => {
                debug!("call escalates {} -> {}", armed, next);
                next
            }
            None => self.default,
        }
    }

    fn check(&self, id: HandlerId) -> Result<(), TraceError> {
        if self.registry.contains(id) {
            Ok(())
        } else {
            Err(TraceError::UnknownHandler(id))
        }
    }
}

/// Runs one handler call. With `std`, a panic becomes [`TraceError::Panicked`]
/// so it is rolled back like any other failure.
#[cfg(feature = "std")]
fn invoke<F>(
    handler: &mut (dyn Handler<F> + '_),
    cx: &mut TraceContext<'_>,
    frame: &F,
    event: &Event<'_>,
) -> Result<(), TraceError> {
    use std::panic::{catch_unwind, AssertUnwindSafe};

    match catch_unwind(AssertUnwindSafe(|| handler.handle(cx, frame, event))) {
        Ok(result) => result,
        Err(_) => Err(TraceError::Panicked {
            name: handler.name().into(),
        }),
    }
}

/// Without `std` there is no unwinding to catch; panics abort or escape.
#[cfg(not(feature = "std"))]
fn invoke<F>(
    handler: &mut (dyn Handler<F> + '_),
    cx: &mut TraceContext<'_>,
    frame: &F,
    event: &Event<'_>,
) -> Result<(), TraceError> {
    handler.handle(cx, frame, event)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::FrameSnapshot;
    use crate::handler::{handler_fn, StackReporter};
    use crate::instruction::Instruction;
    use crate::session::{DisplayFlag, DisplayPolicy};

    fn quiet_config() -> TraceConfig {
        TraceConfig::default().with_policy(DisplayPolicy::empty().with(DisplayFlag::Instruction))
    }

    fn frame(module: &str, code: &str) -> FrameSnapshot {
        FrameSnapshot::new(module, code, "m.py")
            .with_line(1)
            .with_instruction(Instruction::new(0, "NOP"))
    }

    #[test]
    fn test_filtered_module_is_untouched() {
        let f = frame("importlib.util", "find_spec");
        let mut out: Vec<String> = Vec::new();
        let mut dispatcher = Dispatcher::new(quiet_config(), &mut out);
        let armed = dispatcher.default_handler();
        assert_eq!(dispatcher.dispatch(armed, &&f, &Event::call()), None);
        assert_eq!(dispatcher.session().instruction_count(), 0);
        drop(dispatcher);
        assert!(out.is_empty());
    }

    #[test]
    fn test_escalations_follow_call_order() {
        let f = frame("m", "f");
        let mut out: Vec<String> = Vec::new();
        let mut dispatcher = Dispatcher::new(quiet_config(), &mut out);
        let default = dispatcher.default_handler();
        let first = dispatcher.register(StackReporter);
        let second = dispatcher.register(StackReporter);
        dispatcher.escalate(first).unwrap();
        dispatcher.escalate(second).unwrap();

        let line = Event::line();
        assert_eq!(dispatcher.dispatch(default, &&f, &line), Some(default));
        assert_eq!(dispatcher.dispatch(default, &&f, &Event::call()), Some(first));
        assert_eq!(dispatcher.dispatch(first, &&f, &line), Some(first));
        assert_eq!(dispatcher.dispatch(first, &&f, &Event::call()), Some(second));
        assert_eq!(dispatcher.dispatch(second, &&f, &Event::call()), Some(default));
        assert_eq!(dispatcher.dispatch(default, &&f, &Event::call()), Some(default));
        assert_eq!(dispatcher.pending_escalations(), 0);
    }

    #[test]
    fn test_failing_handler_is_a_noop() {
        let f = frame("m", "f");
        let mut out: Vec<String> = Vec::new();
        let mut dispatcher = Dispatcher::new(quiet_config(), &mut out);
        let failing = dispatcher.register(handler_fn::<&FrameSnapshot, _>("broken", |cx, _, _| {
            cx.emit("partial");
            cx.session_mut().set_policy(DisplayFlag::Stacktrace, true);
            Err(TraceError::Handler {
                name: "broken".into(),
                reason: "render failed".into(),
            })
        }));
        assert_eq!(dispatcher.dispatch(failing, &&f, &Event::line()), Some(failing));
        assert_eq!(dispatcher.session().instruction_count(), 0);
        assert!(!dispatcher.session().policy_has(DisplayFlag::Stacktrace));
        drop(dispatcher);
        assert!(out.is_empty());
    }

    #[cfg(feature = "std")]
    #[test]
    fn test_panicking_handler_is_a_noop() {
        let f = frame("m", "f");
        let mut out: Vec<String> = Vec::new();
        let mut dispatcher = Dispatcher::new(quiet_config(), &mut out);
        let empty: Vec<u32> = Vec::new();
        let panicky = dispatcher.register(handler_fn::<&FrameSnapshot, _>(
            "panicky",
            move |cx, _, _| {
                cx.emit("partial");
                cx.emit(alloc::format!("{}", empty[3]));
                Ok(())
            },
        ));
        assert_eq!(dispatcher.dispatch(panicky, &&f, &Event::line()), Some(panicky));
        assert_eq!(dispatcher.session().instruction_count(), 0);

        // The dispatcher keeps working afterwards.
        let default = dispatcher.default_handler();
        dispatcher.dispatch(default, &&f, &Event::line());
        assert_eq!(dispatcher.session().instruction_count(), 1);
        drop(dispatcher);
        assert_eq!(out, alloc::vec!["NOP  "]);
    }

    #[test]
    fn test_unknown_handler_still_rearms() {
        let f = frame("m", "f");
        let mut out: Vec<String> = Vec::new();
        let mut dispatcher = Dispatcher::new(quiet_config(), &mut out);
        let stray = {
            let mut other: HandlerRegistry<'_, &FrameSnapshot> = HandlerRegistry::new();
            other.register(InstructionTicker);
            other.register(InstructionTicker)
        };
        assert!(dispatcher.escalate(stray).is_err());
        assert_eq!(dispatcher.dispatch(stray, &&f, &Event::line()), Some(stray));
        assert_eq!(dispatcher.session().instruction_count(), 0);
    }

    #[test]
    fn test_exception_not_counted() {
        let f = frame("m", "f");
        let mut out: Vec<String> = Vec::new();
        let mut dispatcher = Dispatcher::new(quiet_config(), &mut out);
        let armed = dispatcher.default_handler();
        dispatcher.dispatch(armed, &&f, &Event::line());
        dispatcher.dispatch(armed, &&f, &Event::exception(None));
        assert_eq!(dispatcher.session().instruction_count(), 1);
        drop(dispatcher);
        assert_eq!(out, alloc::vec!["NOP  ", "!! exception at NOP  "]);
    }
}
