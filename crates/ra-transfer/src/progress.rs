use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ra_connection::{RaError, RaResult};

/// Shared cancellation flag, polled between recursive steps.
///
/// Clones share the flag: a UI thread keeps one and the worker running the
/// transfer holds another.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Receives the path of every object a recursive operation visits.
pub trait ProgressSink: Send + Sync {
    fn visit(&self, path: &str);
}

impl<F> ProgressSink for F
where
    F: Fn(&str) + Send + Sync,
{
    fn visit(&self, path: &str) {
        self(path)
    }
}

/// Cancellation and progress plumbing for one transfer.
#[derive(Default)]
pub struct TransferContext {
    cancel: CancelFlag,
    progress: Option<Box<dyn ProgressSink>>,
}

impl TransferContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_progress(mut self, sink: impl ProgressSink + 'static) -> Self {
        self.progress = Some(Box::new(sink));
        self
    }

    pub fn cancel_flag(&self) -> &CancelFlag {
        &self.cancel
    }

    /// `Err(Cancelled)` once the flag is raised.
    pub fn check(&self) -> RaResult<()> {
        if self.cancel.is_cancelled() {
            Err(RaError::Cancelled)
        } else {
            Ok(())
        }
    }

    pub fn report(&self, path: &str) {
        if let Some(sink) = &self.progress {
            sink.visit(path);
        }
    }
}

impl fmt::Debug for TransferContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransferContext")
            .field("cancelled", &self.cancel.is_cancelled())
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn clones_share_the_flag() {
        let flag = CancelFlag::new();
        let ctx = TransferContext::new().with_cancel(flag.clone());
        assert!(ctx.check().is_ok());
        flag.cancel();
        assert!(matches!(ctx.check(), Err(RaError::Cancelled)));
        ctx.cancel_flag().reset();
        assert!(!flag.is_cancelled());
    }

    #[test]
    fn progress_reaches_the_sink() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = {
            let seen = Arc::clone(&seen);
            move |path: &str| seen.lock().unwrap().push(path.to_string())
        };
        let ctx = TransferContext::new().with_progress(sink);
        ctx.report("/a");
        ctx.report("/a/ext/b");
        assert_eq!(*seen.lock().unwrap(), vec!["/a", "/a/ext/b"]);
    }
}
