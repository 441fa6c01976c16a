//! Structured logging setup and a couple of small tracing helpers shared
//! across modules.

use tracing::{Subscriber, subscriber::set_global_default};
use tracing_log::LogTracer;
use tracing_subscriber::{EnvFilter, Registry, fmt::format::FmtSpan, layer::SubscriberExt};

/// Build a tracing subscriber writing pretty-printed spans to stderr.
///
/// `env_filter` is used as the default when `RUST_LOG` is unset.
pub fn get_subscriber(env_filter: String) -> impl Subscriber + Send + Sync {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(env_filter));
    let formatting_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_span_events(FmtSpan::CLOSE);
    Registry::default().with(env_filter).with(formatting_layer)
}

/// Register the subscriber as the global default and redirect `log` crate
/// output through `tracing`.
pub fn init_subscriber(subscriber: impl Subscriber + Send + Sync) {
    LogTracer::init().expect("Failed to set logger");
    set_global_default(subscriber).expect("Failed to set subscriber");
}

/// Log an error with its full chain of sources.
pub fn log_error(e: impl Into<anyhow::Error>) {
    let e = e.into();
    tracing::error!("{:#}", e);
}

/// Spawn a blocking task, preserving the current tracing span across the
/// `spawn_blocking` boundary (which would otherwise detach it).
pub fn spawn_blocking_with_tracing<F, R>(f: F) -> tokio::task::JoinHandle<R>
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    let current_span = tracing::Span::current();
    tokio::task::spawn_blocking(move || current_span.in_scope(f))
}
