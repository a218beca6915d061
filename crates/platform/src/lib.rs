//! Platform administration: tenants and their lifecycle, organizations with
//! clubs and locations, gender access policies, tenant API keys, support
//! impersonation, team invites, the audit log, and platform analytics.

pub mod analytics;
pub mod api_keys;
pub mod audit;
pub mod gender;
pub mod impersonation;
pub mod invites;
pub mod organization;
pub mod tenancy;

pub use analytics::PlatformAnalytics;
pub use api_keys::{ApiKeyService, TenantApiKey, TenantContext};
pub use audit::AuditLogger;
pub use gender::{GenderPolicy, GenderPolicyService};
pub use impersonation::{ImpersonationService, ImpersonationSession};
pub use invites::{TeamInvite, TeamMember, TeamRole, TeamService};
pub use organization::{Club, Location, Organization, OrganizationService};
pub use tenancy::{PricingTier, Tenant, TenantService, TenantStatus};
