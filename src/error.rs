use crate::handler::HandlerId;
use alloc::string::String;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TraceError {
    #[error("handler {0} is not registered")]
    UnknownHandler(HandlerId),
    /// Tracing was deregistered; a session cannot be re-armed after that.
    #[error("tracing was already uninstalled for this session")]
    Uninstalled,
    #[error("failed to write trace output")]
    Output(#[from] core::fmt::Error),
    #[error("handler `{name}` failed: {reason}")]
    Handler { name: String, reason: String },
    /// Only produced with the `std` feature, where unwinding can be caught.
    #[error("handler `{name}` panicked")]
    Panicked { name: String },
}
