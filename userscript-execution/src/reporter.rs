//! Error reporters for background failures

use std::sync::Arc;
use tracing::{error, warn};
use userscript_core::EngineError;
use userscript_interfaces::{ErrorReporter, HostApi, MessageKind};

/// Logs reported errors; user mistakes at warn level, defects at error level
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingErrorReporter;

impl ErrorReporter for TracingErrorReporter {
    fn report(&self, err: &EngineError, context: &str) {
        if err.is_user_facing() {
            warn!(code = err.error_code(), "{}: {}", context, err);
        } else {
            error!(code = err.error_code(), "{}: {}", context, err);
        }
    }
}

/// Shows reported errors to the user through the host
pub struct HostErrorReporter {
    host: Arc<dyn HostApi>,
}

impl HostErrorReporter {
    pub fn new(host: Arc<dyn HostApi>) -> Self {
        Self { host }
    }
}

impl ErrorReporter for HostErrorReporter {
    fn report(&self, err: &EngineError, context: &str) {
        TracingErrorReporter.report(err, context);

        let message = format!("{}: {}", context, err.user_message());
        self.host.append_output(&message);
        self.host.show_message(MessageKind::Error, &message);
    }
}
