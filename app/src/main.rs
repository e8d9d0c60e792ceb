use tracing::Level;

use ecbalance_core::targets;
use ecbalance_ui::logging::{init_logging, LogBuffer, LogLevel};
use ecbalance_ui::{run, Flags, UiResult};

fn main() -> UiResult {
    let log_buffer = LogBuffer::default();
    let reload_handle = init_logging(log_buffer.clone(), LogLevel::Info);

    tracing::info!(target: targets::UI, "EC Balance starting");
    tracing::info!(target: targets::PRICING, "Pricing target ready");
    tracing::info!(target: targets::OBJECTS, "Objects target ready");
    tracing::info!(target: targets::API, "Service target ready");
    tracing::info!(target: targets::STORAGE, "Storage target ready");
    tracing::event!(target: targets::UI, Level::DEBUG, "Logging infrastructure online");

    let api_base = std::env::var("ECB_API_BASE").ok();

    run(Flags {
        log_buffer,
        reload_handle,
        api_base,
    })
}
