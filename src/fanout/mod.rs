pub mod dispatcher;
pub mod registry;
pub mod sink;

pub use dispatcher::Dispatcher;
pub use registry::SubscriptionRegistry;
pub use sink::{OverflowPolicy, SinkHandle};
