pub mod backoff;
pub mod dispatcher;
pub mod persistence;
pub mod poller;
pub mod session;

pub use backoff::*;
pub use dispatcher::*;
pub use persistence::*;
pub use poller::*;
pub use session::*;
