//! The hook a host runtime drives: one entry point per event kind, tracking
//! which handler is armed for every live frame entered while tracing.

use crate::config::TraceConfig;
use crate::dispatcher::Dispatcher;
use crate::error::TraceError;
use crate::event::Event;
use crate::frame::Frame;
use crate::handler::{Handler, HandlerId};
use crate::output::TraceOutput;
use crate::session::{Summary, TraceSession};
use crate::value::Value;
use alloc::vec::Vec;
use log::{debug, trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HookState {
    Detached,
    Installed(HandlerId),
    Uninstalled,
}

/// Per-frame record of what observes it.
#[derive(Debug, Clone, Copy)]
struct Activation {
    /// `None` once the subtree is no longer observed.
    handler: Option<HandlerId>,
    last_line: Option<u32>,
}

pub struct Monitor<'h, F, O> {
    dispatcher: Dispatcher<'h, F, O>,
    state: HookState,
    frames: Vec<Activation>,
}

impl<'h, F: Frame, O: TraceOutput> Monitor<'h, F, O> {
    pub fn new(config: TraceConfig, output: O) -> Self {
        Self {
            dispatcher: Dispatcher::new(config, output),
            state: HookState::Detached,
            frames: Vec::new(),
        }
    }

    pub fn register(&mut self, handler: impl Handler<F> + 'h) -> HandlerId {
        self.dispatcher.register(handler)
    }

    pub fn default_handler(&self) -> HandlerId {
        self.dispatcher.default_handler()
    }

    /// Hands the next unconsumed call's subtree to `handler`.
    pub fn escalate(&mut self, handler: HandlerId) -> Result<(), TraceError> {
        self.dispatcher.escalate(handler)
    }

    pub fn session(&self) -> &TraceSession {
        self.dispatcher.session()
    }

    pub fn session_mut(&mut self) -> &mut TraceSession {
        self.dispatcher.session_mut()
    }

    pub fn dispatcher(&self) -> &Dispatcher<'h, F, O> {
        &self.dispatcher
    }

    pub fn output(&self) -> &O {
        self.dispatcher.output()
    }

    pub fn is_installed(&self) -> bool {
        matches!(self.state, HookState::Installed(_))
    }

    /// Number of live frames entered since tracing was installed.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Arms `handler` for every frame entered from now on. `None` deregisters,
    /// after which the session cannot be armed again.
    pub fn install(&mut self, handler: Option<HandlerId>) -> Result<(), TraceError> {
        let Some(id) = handler else {
            if self.state != HookState::Uninstalled {
                debug!("tracing uninstalled at depth {}", self.frames.len());
            }
            self.state = HookState::Uninstalled;
            self.frames.clear();
            return Ok(());
        };
        if self.state == HookState::Uninstalled {
            return Err(TraceError::Uninstalled);
        }
        self.dispatcher.set_default(id)?;
        debug!(
            "tracing installed with {} ({})",
            id,
            self.dispatcher.handler_name(id)
        );
        self.state = HookState::Installed(id);
        Ok(())
    }

    pub fn uninstall(&mut self) {
        // Deregistering cannot fail.
        let _ = self.install(None);
    }

    /// A new frame is about to run.
    pub fn on_call(&mut self, frame: &F) {
        let HookState::Installed(global) = self.state else {
            return;
        };
        // Frames entered before install have no activation; their callees
        // start from the installed handler.
        let armed = match self.frames.last() {
            Some(parent) => parent.handler,
            None => Some(global),
        };
        let handler = match armed {
            Some(id) => self.dispatcher.dispatch(id, frame, &Event::call()),
            None => None,
        };
        trace!(
            "enter {}:{} at depth {} -> {:?}",
            frame.module_name(),
            frame.code_name(),
            self.frames.len(),
            handler
        );
        self.frames.push(Activation {
            handler,
            last_line: frame.line(),
        });
    }

    pub fn on_line(&mut self, frame: &F) {
        self.deliver(frame, Event::line());
    }

    pub fn on_opcode(&mut self, frame: &F) {
        self.deliver(frame, Event::opcode());
    }

    pub fn on_exception(&mut self, frame: &F, exception: Option<&Value>) {
        self.deliver(frame, Event::exception(exception));
    }

    /// The innermost frame is returning (or unwinding) with `value`.
    pub fn on_return(&mut self, frame: &F, value: Option<&Value>) {
        if !self.is_installed() {
            return;
        }
        if self.frames.is_empty() {
            trace!(
                "return from untracked {}:{}",
                frame.module_name(),
                frame.code_name()
            );
            return;
        }
        self.deliver(frame, Event::returning(value));
        self.frames.pop();
    }

    /// One instruction of `frame` is about to execute. Emits `line` when the
    /// source line moved and `opcode` when opcode tracing is on.
    pub fn on_step(&mut self, frame: &F) {
        if !self.is_installed() {
            return;
        }
        let line = frame.line();
        let config = self.dispatcher.config();
        let (trace_lines, trace_opcodes) = (config.trace_lines, config.trace_opcodes);
        let Some(top) = self.frames.last_mut() else {
            return;
        };
        let moved = line != top.last_line;
        top.last_line = line;
        if moved && trace_lines {
            self.on_line(frame);
        }
        if trace_opcodes {
            self.on_opcode(frame);
        }
    }

    /// Stops tracing, closes the session and writes its summary.
    pub fn finish(mut self) -> Summary {
        self.uninstall();
        let (session, mut output) = self.dispatcher.into_parts();
        let summary = session.finalize();
        for line in summary.lines() {
            if let Err(err) = output.write_line(&line) {
                warn!("summary output failed: {}", err);
                break;
            }
        }
        summary
    }

    /// Abort path: drops the session unfinalized, so no summary is written
    /// and none is returned. Use [`finish`](Self::finish) for a normal teardown.
    pub fn into_output(self) -> O {
        self.dispatcher.into_parts().1
    }

    fn deliver(&mut self, frame: &F, event: Event<'_>) {
        if !self.is_installed() {
            return;
        }
        let Some(top) = self.frames.last().copied() else {
            return;
        };
        let Some(armed) = top.handler else {
            return;
        };
        let next = self.dispatcher.dispatch(armed, frame, &event);
        if let Some(top) = self.frames.last_mut() {
            top.handler = next;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::FrameSnapshot;
    use crate::session::{DisplayFlag, DisplayPolicy};
    use alloc::string::String;

    fn config() -> TraceConfig {
        TraceConfig::default().with_policy(DisplayPolicy::empty())
    }

    #[test]
    fn test_events_ignored_until_installed() {
        let f = FrameSnapshot::new("m", "f", "m.py").with_line(1);
        let mut monitor: Monitor<'_, &FrameSnapshot, Vec<String>> =
            Monitor::new(config(), Vec::new());
        monitor.on_call(&&f);
        monitor.on_line(&&f);
        assert_eq!(monitor.session().instruction_count(), 0);
        assert_eq!(monitor.depth(), 0);
    }

    #[test]
    fn test_install_after_uninstall_fails() {
        let mut monitor: Monitor<'_, &FrameSnapshot, Vec<String>> =
            Monitor::new(config(), Vec::new());
        let default = monitor.default_handler();
        monitor.install(Some(default)).unwrap();
        monitor.uninstall();
        assert!(matches!(
            monitor.install(Some(default)),
            Err(TraceError::Uninstalled)
        ));
        assert!(!monitor.is_installed());
    }

    #[test]
    fn test_step_detects_line_changes() {
        let first = FrameSnapshot::new("m", "f", "m.py").with_line(1);
        let second = first.clone().with_line(2);
        let mut monitor: Monitor<'_, &FrameSnapshot, Vec<String>> =
            Monitor::new(config(), Vec::new());
        let default = monitor.default_handler();
        monitor.install(Some(default)).unwrap();
        monitor.on_call(&&first);
        monitor.on_step(&&first);
        assert_eq!(monitor.session().instruction_count(), 1);
        monitor.on_step(&&second);
        monitor.on_step(&&second);
        assert_eq!(monitor.session().instruction_count(), 2);
    }

    #[test]
    fn test_opcode_events_when_enabled() {
        let f = FrameSnapshot::new("m", "f", "m.py").with_line(1);
        let mut monitor: Monitor<'_, &FrameSnapshot, Vec<String>> = Monitor::new(
            config().with_line_events(false).with_opcode_events(true),
            Vec::new(),
        );
        let default = monitor.default_handler();
        monitor.install(Some(default)).unwrap();
        monitor.on_call(&&f);
        monitor.on_step(&&f);
        monitor.on_step(&&f);
        assert_eq!(monitor.session().instruction_count(), 3);
    }

    #[test]
    fn test_finish_writes_summary() {
        let f = FrameSnapshot::new("m", "f", "m.py").with_line(1);
        let mut monitor: Monitor<'_, &FrameSnapshot, Vec<String>> =
            Monitor::new(config(), Vec::new());
        let default = monitor.default_handler();
        monitor.install(Some(default)).unwrap();
        monitor.session_mut().set_policy(DisplayFlag::Stacktrace, false);
        monitor.on_call(&&f);
        monitor.on_return(&&f, None);
        assert_eq!(monitor.depth(), 0);

        let mut out = Vec::new();
        let mut sink: Monitor<'_, &FrameSnapshot, &mut Vec<String>> =
            Monitor::new(config(), &mut out);
        sink.install(Some(default)).unwrap();
        sink.on_call(&&f);
        sink.on_return(&&f, None);
        let summary = sink.finish();
        assert_eq!(summary.instructions, 2);
        assert_eq!(
            out,
            alloc::vec![
                "",
                "------------------ script exited ------------------",
                "Total instructions executed: 2",
            ]
        );
        assert_eq!(monitor.finish().instructions, 2);
    }
}
