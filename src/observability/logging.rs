//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber
//! - Route panics through tracing so a crashed request leaves a structured
//!   record with its backtrace
//!
//! # Design Decisions
//! - `RUST_LOG` overrides the configured level
//! - The panic hook only logs; unwinding continues and the HTTP layer turns
//!   the panic into a 500 for that one request

use std::backtrace::Backtrace;
use std::panic::PanicHookInfo;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global subscriber. `level` is used when `RUST_LOG` is unset.
pub fn init(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("resttree={level},tower_http={level}").into());
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

/// Log every panic (message, location, backtrace) at error level.
pub fn install_panic_hook() {
    std::panic::set_hook(Box::new(|info| {
        tracing::error!(
            panic = %panic_message(info),
            location = %info
                .location()
                .map(|l| format!("{}:{}", l.file(), l.line()))
                .unwrap_or_else(|| "unknown".to_string()),
            backtrace = %Backtrace::force_capture(),
            "Panic"
        );
    }));
}

fn panic_message(info: &PanicHookInfo<'_>) -> String {
    let payload = info.payload();
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
