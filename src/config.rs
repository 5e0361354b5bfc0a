use crate::session::{DisplayFlag, DisplayPolicy};
use alloc::string::String;
use alloc::vec::Vec;

/// Module prefixes of the runtime's own loader machinery.
pub const DEFAULT_EXCLUDED_PREFIXES: &[&str] = &["importlib.", "_frozen_importlib"];

#[derive(Debug, Clone)]
pub struct TraceConfig {
    /// Frames whose module name starts with any of these are not observed,
    /// and neither is anything they call.
    pub excluded_prefixes: Vec<String>,
    /// Display policy the session starts with.
    pub policy: DisplayPolicy,
    /// Prefix instruction lines with the running instruction count.
    pub number_instructions: bool,
    /// Show the instruction offset in stack lines.
    pub stack_offsets: bool,
    /// Derive `line` events from instruction steps.
    pub trace_lines: bool,
    /// Derive `opcode` events from instruction steps.
    pub trace_opcodes: bool,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            excluded_prefixes: DEFAULT_EXCLUDED_PREFIXES
                .iter()
                .map(|p| String::from(*p))
                .collect(),
            policy: DisplayPolicy::empty()
                .with(DisplayFlag::Instruction)
                .with(DisplayFlag::Stacktrace),
            number_instructions: false,
            stack_offsets: false,
            trace_lines: true,
            trace_opcodes: false,
        }
    }
}

impl TraceConfig {
    pub fn with_excluded_prefix(mut self, prefix: &str) -> Self {
        self.excluded_prefixes.push(prefix.into());
        self
    }

    pub fn without_excluded_prefixes(mut self) -> Self {
        self.excluded_prefixes.clear();
        self
    }

    pub fn with_policy(mut self, policy: DisplayPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_numbered_instructions(mut self, on: bool) -> Self {
        self.number_instructions = on;
        self
    }

    pub fn with_stack_offsets(mut self, on: bool) -> Self {
        self.stack_offsets = on;
        self
    }

    pub fn with_line_events(mut self, on: bool) -> Self {
        self.trace_lines = on;
        self
    }

    pub fn with_opcode_events(mut self, on: bool) -> Self {
        self.trace_opcodes = on;
        self
    }

    pub fn is_excluded(&self, module_name: &str) -> bool {
        self.excluded_prefixes
            .iter()
            .any(|prefix| module_name.starts_with(prefix.as_str()))
    }
}
