use crate::error::TraceError;
use alloc::string::String;
use alloc::vec::Vec;
use log::info;

/// Where rendered trace lines go. Writes complete before the event returns.
pub trait TraceOutput {
    fn write_line(&mut self, line: &str) -> Result<(), TraceError>;
}

impl TraceOutput for Vec<String> {
    fn write_line(&mut self, line: &str) -> Result<(), TraceError> {
        self.push(line.into());
        Ok(())
    }
}

impl<T: TraceOutput + ?Sized> TraceOutput for &mut T {
    fn write_line(&mut self, line: &str) -> Result<(), TraceError> {
        (**self).write_line(line)
    }
}

/// Sends every line to the `log` facade at info level, target `runtrace`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogOutput;

impl TraceOutput for LogOutput {
    fn write_line(&mut self, line: &str) -> Result<(), TraceError> {
        info!(target: "runtrace", "{}", line);
        Ok(())
    }
}

#[cfg(feature = "std")]
pub use self::stdout::StdoutOutput;

#[cfg(feature = "std")]
mod stdout {
    use super::TraceOutput;
    use crate::error::TraceError;
    use std::io::{self, Write};

    /// Writes each line to the process stdout, flushed per line.
    #[derive(Debug, Default)]
    pub struct StdoutOutput;

    impl TraceOutput for StdoutOutput {
        fn write_line(&mut self, line: &str) -> Result<(), TraceError> {
            let stdout = io::stdout();
            let mut lock = stdout.lock();
            writeln!(lock, "{}", line)
                .and_then(|_| lock.flush())
                .map_err(|_| TraceError::Output(core::fmt::Error))
        }
    }
}
