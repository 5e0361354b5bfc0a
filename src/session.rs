//! Per-run trace state: what to display and how much has executed.

use crate::event::EventKind;
use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;
use bit_field::BitField;

pub const SUMMARY_BANNER: &str = "------------------ script exited ------------------";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayFlag {
    Instruction,
    Stacktrace,
}

impl DisplayFlag {
    fn bit(self) -> usize {
        match self {
            DisplayFlag::Instruction => 0,
            DisplayFlag::Stacktrace => 1,
        }
    }
}

/// Bitmask of [`DisplayFlag`]s. Flags are independent of each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DisplayPolicy(u8);

impl DisplayPolicy {
    pub const fn empty() -> Self {
        Self(0)
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn has(self, flag: DisplayFlag) -> bool {
        self.0.get_bit(flag.bit())
    }

    pub fn set(&mut self, flag: DisplayFlag, on: bool) {
        self.0.set_bit(flag.bit(), on);
    }

    pub fn with(mut self, flag: DisplayFlag) -> Self {
        self.set(flag, true);
        self
    }
}

#[derive(Debug, Clone)]
pub struct TraceSession {
    display_policy: DisplayPolicy,
    instruction_count: u64,
}

impl TraceSession {
    pub fn new(policy: DisplayPolicy) -> Self {
        Self {
            display_policy: policy,
            instruction_count: 0,
        }
    }

    /// Counts one event. Exceptions are reported but never counted.
    pub fn tick(&mut self, kind: EventKind) -> u64 {
        if kind != EventKind::Exception {
            self.instruction_count += 1;
        }
        self.instruction_count
    }

    pub fn instruction_count(&self) -> u64 {
        self.instruction_count
    }

    pub fn policy(&self) -> DisplayPolicy {
        self.display_policy
    }

    pub fn policy_has(&self, flag: DisplayFlag) -> bool {
        self.display_policy.has(flag)
    }

    pub fn set_policy(&mut self, flag: DisplayFlag, on: bool) {
        self.display_policy.set(flag, on);
    }

    pub fn finalize(self) -> Summary {
        Summary {
            instructions: self.instruction_count,
        }
    }
}

/// Totals of a finished session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Summary {
    pub instructions: u64,
}

impl Summary {
    pub fn lines(&self) -> Vec<String> {
        alloc::vec![
            String::new(),
            String::from(SUMMARY_BANNER),
            format!("Total instructions executed: {}", self.instructions),
        ]
    }
}
