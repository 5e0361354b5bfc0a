use crate::config::TraceConfig;
use crate::frame::{Frame, UNKNOWN_LINE};
use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;
use log::trace;

/// One frame of a walked stack, innermost at level 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackEntry {
    pub level: usize,
    pub module_name: String,
    pub code_name: String,
    pub filename: String,
    /// Source line, or [`UNKNOWN_LINE`].
    pub line: i64,
    pub instruction_offset: Option<usize>,
}

impl StackEntry {
    fn from_frame<F: Frame>(level: usize, frame: &F) -> Self {
        Self {
            level,
            module_name: frame.module_name().into(),
            code_name: frame.code_name().into(),
            filename: frame.filename().into(),
            line: frame.line().map_or(UNKNOWN_LINE, i64::from),
            instruction_offset: frame.instruction_offset(),
        }
    }

    /// `*<level>: <indent>@<module>:<code> => <file>:<line>`
    pub fn render(&self) -> String {
        format!(
            "*{:2}: {}@{}:{} => {}:{}",
            self.level,
            "  ".repeat(self.level),
            self.module_name,
            self.code_name,
            self.filename,
            self.line
        )
    }

    /// Like [`render`](Self::render), with `0x<offset>` ahead of the `@`
    /// when the frame reported an offset.
    pub fn render_with_offset(&self) -> String {
        let Some(offset) = self.instruction_offset else {
            return self.render();
        };
        format!(
            "*{:2}: {}0x{:04x}@{}:{} => {}:{}",
            self.level,
            "  ".repeat(self.level),
            offset,
            self.module_name,
            self.code_name,
            self.filename,
            self.line
        )
    }
}

/// Walks a frame's caller chain, innermost first.
///
/// Holds only the next frame to visit, so the depth of the observed stack
/// never turns into recursion here.
pub struct StackWalk<F> {
    next: Option<F>,
    level: usize,
}

impl<F: Frame> StackWalk<F> {
    pub fn new(frame: &F) -> Self {
        Self {
            next: Some(frame.clone()),
            level: 0,
        }
    }
}

impl<F: Frame> Iterator for StackWalk<F> {
    type Item = StackEntry;

    fn next(&mut self) -> Option<Self::Item> {
        let frame = self.next.take()?;
        let entry = StackEntry::from_frame(self.level, &frame);
        trace!(
            "walk level {}: {}:{}",
            self.level,
            entry.module_name,
            entry.code_name
        );
        self.next = frame.back();
        self.level += 1;
        Some(entry)
    }
}

pub fn render_stack<F: Frame>(frame: &F) -> Vec<String> {
    StackWalk::new(frame).map(|entry| entry.render()).collect()
}

pub fn render_stack_with<F: Frame>(frame: &F, config: &TraceConfig) -> Vec<String> {
    if config.stack_offsets {
        StackWalk::new(frame)
            .map(|entry| entry.render_with_offset())
            .collect()
    } else {
        render_stack(frame)
    }
}
