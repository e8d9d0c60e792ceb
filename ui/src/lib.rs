pub mod app;
pub mod logging;

use iced::Application;

pub use app::{EcBalanceApp, Flags};
pub use logging::{
    apply_log_level, init_logging, LogBuffer, LogEntry, LogLevel, ReloadHandle,
};

pub type UiResult = iced::Result;

pub fn run(flags: Flags) -> UiResult {
    EcBalanceApp::run(iced::Settings::with_flags(flags))
}
