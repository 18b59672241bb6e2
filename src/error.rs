use std::cell::RefCell;
use std::fmt;

/// The taxonomy from the spec's error handling design: every failure bucket
/// a public call can surface, plus the internal-only `WouldBlock` case that
/// never crosses the public boundary (it is translated into "zero bytes /
/// no event now" by the caller-facing APIs).
#[derive(Debug, thiserror::Error)]
pub enum NetError {
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    #[error("would block")]
    WouldBlock,

    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("endpoint has failed: {0}")]
    Fatal(String),

    #[error("resource exhausted: {0}")]
    ResourceExhausted(&'static str),

    #[error("address is not resolved yet")]
    NotResolved,

    #[error("end of stream")]
    EndOfStream,
}

impl NetError {
    pub(crate) fn fatal(msg: impl Into<String>) -> Self {
        NetError::Fatal(msg.into())
    }
}

thread_local! {
    static LAST_ERROR: RefCell<Option<String>> = const { RefCell::new(None) };
}

/// Sets the thread-local "last error" string, mirroring the spec's
/// propagation rule: a thread-local is set on every failure and readable via
/// a `get_error` facility.
pub fn set_last_error(err: impl fmt::Display) {
    LAST_ERROR.with(|cell| *cell.borrow_mut() = Some(err.to_string()));
}

pub(crate) fn set_last_error_str(s: impl Into<String>) {
    LAST_ERROR.with(|cell| *cell.borrow_mut() = Some(s.into()));
}

/// Returns the last error recorded on this thread, if any.
pub fn get_last_error() -> Option<String> {
    LAST_ERROR.with(|cell| cell.borrow().clone())
}

/// Sets the thread-local last error from `err` and hands it back, so call
/// sites can write `return Err(note_err(NetError::Fatal(text)))`.
pub(crate) fn note_err(err: NetError) -> NetError {
    set_last_error(&err);
    err
}
