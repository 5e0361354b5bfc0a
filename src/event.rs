use crate::value::Value;
use core::fmt::{self, Display, Formatter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Call,
    Line,
    Return,
    Exception,
    Opcode,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Call => "call",
            EventKind::Line => "line",
            EventKind::Return => "return",
            EventKind::Exception => "exception",
            EventKind::Opcode => "opcode",
        }
    }
}

impl Display for EventKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A traced occurrence. `arg` is the return value for `return` and the
/// raised exception for `exception`.
#[derive(Debug, Clone, Copy)]
pub struct Event<'a> {
    pub kind: EventKind,
    pub arg: Option<&'a Value>,
}

impl<'a> Event<'a> {
    pub fn new(kind: EventKind) -> Self {
        Self { kind, arg: None }
    }

    pub fn with_arg(kind: EventKind, arg: Option<&'a Value>) -> Self {
        Self { kind, arg }
    }

    pub fn call() -> Self {
        Self::new(EventKind::Call)
    }

    pub fn line() -> Self {
        Self::new(EventKind::Line)
    }

    pub fn opcode() -> Self {
        Self::new(EventKind::Opcode)
    }

    pub fn returning(value: Option<&'a Value>) -> Self {
        Self::with_arg(EventKind::Return, value)
    }

    pub fn exception(exc: Option<&'a Value>) -> Self {
        Self::with_arg(EventKind::Exception, exc)
    }
}
