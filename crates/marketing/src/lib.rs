//! Marketing automation: drip campaigns with scheduled steps, A/B variants,
//! trigger-based enrollment, message tracking, and campaign analytics.

pub mod analytics;
pub mod campaign;
pub mod executor;
pub mod scheduler;
pub mod state_machine;
pub mod store;
pub mod templates;
pub mod tracking;
pub mod triggers;
pub mod types;

pub use analytics::MarketingAnalytics;
pub use campaign::CampaignService;
pub use executor::{CampaignExecutor, LoggingNotifier, Notifier, OutboundMessage};
pub use scheduler::MarketingScheduler;
pub use store::MarketingStore;
pub use tracking::TrackingService;
pub use triggers::TriggerEngine;
