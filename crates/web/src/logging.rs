//! Console logging for the browser

use tessera_core::LogConfig;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use tracing_web::MakeWebConsoleWriter;

/// Route `tracing` events to the browser console
///
/// `log` records from dependencies are bridged into the same subscriber.
/// Also installs the panic hook. Safe to call more than once; only the first
/// call takes effect.
pub fn init_logging(config: &LogConfig) {
    console_error_panic_hook::set_once();

    let filter = EnvFilter::try_new(&config.level).unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .without_time()
        .with_target(true)
        .with_writer(MakeWebConsoleWriter::new());

    if tracing_subscriber::registry()
        .with(fmt_layer)
        .with(filter)
        .try_init()
        .is_err()
    {
        tracing::debug!("Logging already initialized");
    }
}
