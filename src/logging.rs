use tracing_subscriber::{fmt, EnvFilter};

/// Install the global fmt subscriber used by the binaries.
///
/// `RUST_LOG` wins when set; otherwise everything logs at `info`.
pub fn init() {
    let env = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,lakeimport=info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_span_events(fmt::format::FmtSpan::CLOSE)
        .init();
}

/// Route logs into the test harness output. Safe to call from every test.
#[cfg(test)]
pub(crate) fn init_test_logging() {
    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,lakeimport=debug")),
        )
        .with_test_writer()
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}
