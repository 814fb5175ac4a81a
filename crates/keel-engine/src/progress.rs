//! Progress reporting and cancellation

use std::fmt;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::debug;

use keel_core::error::EngineError;

/// Optional sink for human-readable status lines.
///
/// A silent sink changes nothing but the output.
#[derive(Default)]
pub struct Progress<'a> {
    sink: Option<&'a mut dyn Write>,
}

impl<'a> Progress<'a> {
    /// Stream status lines to `sink`
    pub fn new(sink: &'a mut dyn Write) -> Self {
        Self { sink: Some(sink) }
    }

    /// Discard status lines
    pub fn silent() -> Self {
        Self { sink: None }
    }

    /// Whether lines are discarded
    pub fn is_silent(&self) -> bool {
        self.sink.is_none()
    }

    /// Write one line. A failing sink is logged and otherwise ignored.
    pub fn line(&mut self, args: fmt::Arguments<'_>) {
        if let Some(sink) = self.sink.as_mut() {
            if let Err(err) = writeln!(sink, "{}", args) {
                debug!(error = %err, "progress sink write failed");
            }
        }
    }
}

impl fmt::Debug for Progress<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Progress")
            .field("silent", &self.is_silent())
            .finish()
    }
}

/// Shared cancellation flag, checked between pipeline stages
#[derive(Debug, Clone, Default)]
pub struct Cancellation {
    flag: Arc<AtomicBool>,
}

impl Cancellation {
    /// A flag that is not set
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an existing flag, e.g. one set by a signal handler
    pub fn from_flag(flag: Arc<AtomicBool>) -> Self {
        Self { flag }
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Fail with [`EngineError::Cancelled`] if cancellation was requested
    /// before `stage` starts
    pub fn check(&self, stage: &'static str) -> Result<(), EngineError> {
        if self.is_cancelled() {
            debug!(stage, "run cancelled");
            return Err(EngineError::Cancelled(stage));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_writes_lines() {
        let mut buf = Vec::new();
        {
            let mut progress = Progress::new(&mut buf);
            assert!(!progress.is_silent());
            progress.line(format_args!("found {} modules", 3));
            progress.line(format_args!("done"));
        }
        assert_eq!(String::from_utf8(buf).unwrap(), "found 3 modules\ndone\n");
    }

    #[test]
    fn test_silent_progress() {
        let mut progress = Progress::silent();
        assert!(progress.is_silent());
        progress.line(format_args!("ignored"));
    }

    #[test]
    fn test_cancellation_is_shared() {
        let flag = Arc::new(AtomicBool::new(false));
        let cancel = Cancellation::from_flag(flag.clone());
        let clone = cancel.clone();
        assert!(cancel.check("discovery").is_ok());

        flag.store(true, Ordering::SeqCst);
        assert!(clone.is_cancelled());
        assert!(matches!(
            cancel.check("verdict"),
            Err(EngineError::Cancelled("verdict"))
        ));
    }
}
