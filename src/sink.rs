use log::error;

use crate::error::Error;

/// Receives archiving failures that must not reach the caller.
///
/// Implementations are fire-and-forget and must not panic.
pub trait ErrorSink {
    fn report(&self, context: &str, error: &Error);
}

/// Logs reported failures through the `log` facade at error level. The
/// error's display already carries its underlying cause.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl ErrorSink for LogSink {
    fn report(&self, context: &str, err: &Error) {
        error!("{context}: {err}");
    }
}

impl<S: ErrorSink + ?Sized> ErrorSink for &S {
    fn report(&self, context: &str, error: &Error) {
        (**self).report(context, error)
    }
}

impl<S: ErrorSink + ?Sized> ErrorSink for Box<S> {
    fn report(&self, context: &str, error: &Error) {
        (**self).report(context, error)
    }
}
