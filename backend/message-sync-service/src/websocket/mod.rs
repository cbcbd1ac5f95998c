pub mod dispatch;
pub mod gateway;
pub mod message_types;
pub mod registry;
pub mod session;
pub mod subscription;

pub use dispatch::Dispatcher;
pub use registry::{ConnectionHandle, ConnectionId, ConnectionRegistry, SendOutcome};
pub use subscription::SubscriptionManager;
