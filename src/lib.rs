#![no_std]
mod config;
mod dispatcher;
mod error;
mod event;
mod frame;
mod handler;
mod instruction;
mod lineinfo;
mod monitor;
mod output;
mod session;
mod stack;
mod value;

extern crate alloc;
#[cfg(feature = "std")]
extern crate std;

pub use config::{TraceConfig, DEFAULT_EXCLUDED_PREFIXES};
pub use dispatcher::Dispatcher;
pub use error::TraceError;
pub use event::{Event, EventKind};
pub use frame::{Frame, FrameSnapshot, UNKNOWN_LINE};
pub use handler::{
    handler_fn, FnHandler, Handler, HandlerId, HandlerRegistry, InstructionTicker, StackReporter,
    TraceContext,
};
pub use instruction::{format_instruction, format_listing, Instruction};
pub use lineinfo::{LineEntries, LineTable, LineTableBuilder};
pub use monitor::Monitor;
#[cfg(feature = "std")]
pub use output::StdoutOutput;
pub use output::{LogOutput, TraceOutput};
pub use session::{DisplayFlag, DisplayPolicy, Summary, TraceSession, SUMMARY_BANNER};
pub use stack::{render_stack, render_stack_with, StackEntry, StackWalk};
pub use value::Value;
