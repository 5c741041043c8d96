//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber for binaries
//! - Pick the default filter from debug mode and the configured level
//!
//! # Design Decisions
//! - `RUST_LOG` always wins when set
//! - Debug mode raises the default filter for this crate and tower_http
//! - Outside debug mode, events inside a `component` span recorded with
//!   `debug = true` still pass at debug level, whatever their target. The
//!   flag is the unit's `debug` setting, so one unit can be made verbose
//!   without the rest

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default filter directive when `RUST_LOG` is unset.
pub fn default_filter(debug: bool, level: &str) -> String {
    if debug {
        "aioli=debug,tower_http=debug".to_string()
    } else {
        format!("aioli={level},tower_http={level},[component{{debug=true}}]=debug")
    }
}

/// Install the global subscriber. Safe to call more than once.
pub fn init(debug: bool, level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(debug, level)));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::{Arc, Mutex};
    use tracing_subscriber::fmt::MakeWriter;

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Captured {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for Captured {
        type Writer = Captured;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[test]
    fn test_default_filter() {
        assert_eq!(default_filter(true, "warn"), "aioli=debug,tower_http=debug");
        assert_eq!(
            default_filter(false, "warn"),
            "aioli=warn,tower_http=warn,[component{debug=true}]=debug"
        );
        assert!(EnvFilter::try_new(default_filter(false, "info")).is_ok());
    }

    #[test]
    fn test_debug_units_log_at_debug() {
        let captured = Captured::default();
        let subscriber = tracing_subscriber::registry()
            .with(EnvFilter::new(default_filter(false, "info")))
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(captured.clone())
                    .with_ansi(false),
            );

        tracing::subscriber::with_default(subscriber, || {
            let quiet = tracing::info_span!("component", unit = "billing", debug = false);
            quiet.in_scope(|| tracing::debug!("billing detail"));

            let loud = tracing::info_span!("component", unit = "audit", debug = true);
            loud.in_scope(|| tracing::debug!("audit detail"));

            tracing::info!("framework notice");
        });

        let text = captured.text();
        assert!(!text.contains("billing detail"));
        assert!(text.contains("audit detail"));
        assert!(text.contains("framework notice"));
    }
}
