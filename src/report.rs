use tracing::error;

use crate::error::SessionError;
use crate::model::SessionId;

/// Receives failures that happen after the response is already decided.
///
/// Commit failures never change the HTTP response; they are handed to the
/// reporter and otherwise dropped. Hook crash reporting in here.
pub trait FailureReporter: Send + Sync + 'static {
    fn flush_failed(&self, session: &SessionId, error: &SessionError);
}

/// Default reporter: logs at error level.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingReporter;

impl FailureReporter for TracingReporter {
    fn flush_failed(&self, session: &SessionId, error: &SessionError) {
        error!(
            session = %session.fingerprint(),
            transient = error.is_transient(),
            error = %error,
            "failed to commit session changes"
        );
    }
}
