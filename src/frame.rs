use crate::instruction::Instruction;
use alloc::rc::Rc;
use alloc::string::String;

/// Line number rendered for frames that cannot report one.
pub const UNKNOWN_LINE: i64 = -3;

/// Read-only view over one execution frame of the observed program.
///
/// The host runtime implements this for whatever it uses as a frame handle.
/// Handles are expected to be cheap to clone (a reference or an index).
pub trait Frame: Clone {
    fn code_name(&self) -> &str;
    fn filename(&self) -> &str;
    fn module_name(&self) -> &str;
    /// Current source line, if the runtime tracks one.
    fn line(&self) -> Option<u32>;
    fn instruction_offset(&self) -> Option<usize> {
        None
    }
    /// The instruction about to execute, for runtimes that can decode it.
    fn instruction(&self) -> Option<Instruction> {
        None
    }
    /// The caller. `None` for the outermost frame.
    fn back(&self) -> Option<Self>;
}

/// An owned copy of a frame's state, linked to its caller's snapshot.
#[derive(Debug, Clone)]
pub struct FrameSnapshot {
    pub code_name: String,
    pub filename: String,
    pub module_name: String,
    pub line: Option<u32>,
    pub instruction_offset: Option<usize>,
    pub instruction: Option<Instruction>,
    pub back: Option<Rc<FrameSnapshot>>,
}

impl FrameSnapshot {
    pub fn new(module_name: &str, code_name: &str, filename: &str) -> Self {
        Self {
            code_name: code_name.into(),
            filename: filename.into(),
            module_name: module_name.into(),
            line: None,
            instruction_offset: None,
            instruction: None,
            back: None,
        }
    }

    pub fn with_line(mut self, line: u32) -> Self {
        self.line = Some(line);
        self
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.instruction_offset = Some(offset);
        self
    }

    /// Sets the current instruction; its offset becomes the frame offset.
    pub fn with_instruction(mut self, instruction: Instruction) -> Self {
        self.instruction_offset = Some(instruction.offset);
        self.instruction = Some(instruction);
        self
    }

    pub fn called_from(mut self, caller: Rc<FrameSnapshot>) -> Self {
        self.back = Some(caller);
        self
    }

    /// Number of callers above this frame.
    pub fn depth(&self) -> usize {
        let mut depth = 0;
        let mut cur = self.back.as_deref();
        while let Some(frame) = cur {
            depth += 1;
            cur = frame.back.as_deref();
        }
        depth
    }
}

impl<'a> Frame for &'a FrameSnapshot {
    fn code_name(&self) -> &str {
        &self.code_name
    }

    fn filename(&self) -> &str {
        &self.filename
    }

    fn module_name(&self) -> &str {
        &self.module_name
    }

    fn line(&self) -> Option<u32> {
        self.line
    }

    fn instruction_offset(&self) -> Option<usize> {
        self.instruction_offset
    }

    fn instruction(&self) -> Option<Instruction> {
        self.instruction.clone()
    }

    fn back(&self) -> Option<Self> {
        let this: &'a FrameSnapshot = *self;
        this.back.as_deref()
    }
}
