pub mod domain_clients;
pub mod membership;
pub mod message_repository;
pub mod message_service;
pub mod message_store;
pub mod notifier;
pub mod read_receipts;
pub mod sequencer;
pub mod sync_coordinator;

pub use membership::{InMemoryMembershipDirectory, MembershipDirectory, PgMembershipDirectory};
pub use message_service::MessageService;
pub use message_store::MessageStore;
pub use notifier::Notifier;
pub use read_receipts::ReadReceiptTracker;
pub use sync_coordinator::{SyncCoordinator, SyncDomains};
