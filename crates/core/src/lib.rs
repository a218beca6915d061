pub mod config;
pub mod directory;
pub mod error;
pub mod event_bus;
pub mod types;

pub use config::AppConfig;
pub use error::{LiyaqaError, LiyaqaResult};
pub use types::{Gender, LocalizedText, Money, Page, PageRequest};
pub use directory::{
    InMemoryDirectory, Member, MemberDirectory, MemberStatus, OverdueInvoiceSource,
    SubscriptionRecord, SubscriptionStatus,
};
pub use event_bus::{make_event, CaptureSink, DomainEvent, EventSink, EventType, NoOpSink};
