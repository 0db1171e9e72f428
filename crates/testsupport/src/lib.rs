pub mod fake_telegram;
pub mod helpers;

pub use fake_telegram::*;
pub use helpers::*;
