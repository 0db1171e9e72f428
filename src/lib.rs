pub mod app;
pub mod signals;

pub use app::BotApp;
pub use signals::{shutdown_channel, wait_for_shutdown};
