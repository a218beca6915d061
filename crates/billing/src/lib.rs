//! Member invoicing with Saudi VAT, simplified e-invoice data (QR code and
//! chained invoice hash), and e-invoice reporting.

pub mod compliance;
pub mod invoice;
pub mod service;
pub mod zatca;

pub use compliance::{ComplianceService, ComplianceSubmission, ReportingClient, SandboxReportingClient};
pub use invoice::{Invoice, InvoiceFilter, InvoiceStatus};
pub use service::InvoiceService;
pub use zatca::ZatcaService;
