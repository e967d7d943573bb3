//! Log setup and forwarding to the host
//!
//! The broker logs through `tracing`. The subscriber installed here writes
//! to stderr under an `EnvFilter` and forwards every event that passes the
//! filter to the host's log callback, if one is registered.

use std::fmt::Write as _;
use std::os::raw::{c_char, c_int};

use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use tracing::field::{Field, Visit};
use tracing::{debug, Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Environment variable that overrides the configured log filter
pub const LOG_ENV: &str = "HOSTBRIDGE_LOG";

/// Host function receiving log events.
///
/// `message` is only valid for the duration of the call.
pub type HostLogFn = unsafe extern "C" fn(level: c_int, message: *const c_char);

static HOST_LOG: RwLock<Option<HostLogFn>> = RwLock::new(None);
static INSTALLED: OnceCell<()> = OnceCell::new();

/// Numeric severity passed to the host log callback
pub fn level_code(level: &Level) -> c_int {
    match *level {
        Level::TRACE => 0,
        Level::DEBUG => 1,
        Level::INFO => 2,
        Level::WARN => 3,
        Level::ERROR => 4,
    }
}

/// Install the global subscriber once.
///
/// `HOSTBRIDGE_LOG` takes precedence over `filter`. If the process already
/// has a global subscriber, that one is kept.
pub(crate) fn init(filter: &str) {
    INSTALLED.get_or_init(|| {
        let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(filter));
        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true);
        let installed = tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .with(HostLogLayer)
            .try_init();
        if installed.is_err() {
            debug!("global tracing subscriber already set");
        }
    });
}

/// Tracing layer that forwards events to the host callback
pub struct HostLogLayer;

impl<S> Layer<S> for HostLogLayer
where
    S: Subscriber,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let Some(callback) = *HOST_LOG.read() else {
            return;
        };
        let metadata = event.metadata();
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);

        let mut line = format!("{}: {}", metadata.target(), visitor.message);
        line.push_str(&visitor.fields);
        let line = line.replace('\0', " ");
        if let Ok(message) = std::ffi::CString::new(line) {
            unsafe { callback(level_code(metadata.level()), message.as_ptr()) };
        }
    }
}

/// Collects the `message` field and renders the rest as `key=value`
#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: String,
}

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{:?}", value);
        } else {
            let _ = write!(self.fields, " {}={:?}", field.name(), value);
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            let _ = write!(self.fields, " {}={}", field.name(), value);
        }
    }
}

/// Register (or with NULL, remove) the host log callback
///
/// # Arguments
/// * `callback` - Function receiving `(level, message)`; level is
///   0 = trace, 1 = debug, 2 = info, 3 = warn, 4 = error
///
/// # Safety
/// The callback must not call back into hostbridge and must not retain
/// `message` past the call.
#[no_mangle]
pub unsafe extern "C" fn hostbridge_set_log_callback(callback: Option<HostLogFn>) {
    init(&hostbridge_engine::BrokerOptions::default().log_filter);
    *HOST_LOG.write() = callback;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_codes() {
        assert_eq!(level_code(&Level::TRACE), 0);
        assert_eq!(level_code(&Level::INFO), 2);
        assert_eq!(level_code(&Level::ERROR), 4);
    }

    #[test]
    fn test_visitor_defaults_empty() {
        let visitor = MessageVisitor::default();
        assert!(visitor.message.is_empty());
        assert!(visitor.fields.is_empty());
    }
}
