//! E-invoice reporting to the tax authority.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::invoice::{Invoice, InvoiceStatus};
use crate::zatca::{decode_tlv, is_valid_vat_number};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    Reported,
    Rejected,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplianceSubmission {
    pub id: Uuid,
    pub invoice_id: Uuid,
    pub invoice_number: String,
    pub status: SubmissionStatus,
    pub messages: Vec<String>,
    pub submitted_at: DateTime<Utc>,
}

/// Transport to the reporting endpoint. Returns validation messages;
/// an empty list means the invoice was accepted.
pub trait ReportingClient: Send + Sync {
    fn report(&self, invoice: &Invoice, vat_number: &str) -> anyhow::Result<Vec<String>>;
}

/// Local validation standing in for the sandbox endpoint.
pub struct SandboxReportingClient;

impl ReportingClient for SandboxReportingClient {
    fn report(&self, invoice: &Invoice, vat_number: &str) -> anyhow::Result<Vec<String>> {
        let mut messages = Vec::new();
        if !is_valid_vat_number(vat_number) {
            messages.push(format!("Invalid seller VAT number {vat_number}"));
        }
        if !matches!(
            invoice.status,
            InvoiceStatus::Issued | InvoiceStatus::PartiallyPaid | InvoiceStatus::Paid | InvoiceStatus::Overdue
        ) {
            messages.push(format!("Invoice in status {:?} cannot be reported", invoice.status));
        }
        if invoice.total.halalas() <= 0 {
            messages.push("Invoice total must be positive".into());
        }
        match &invoice.zatca {
            None => messages.push("Missing QR code and invoice hash".into()),
            Some(data) => {
                let decoded = base64_decode(&data.qr_code).and_then(|b| decode_tlv(&b).ok());
                match decoded {
                    Some(fields) if fields.len() == 5 => {}
                    _ => messages.push("QR code is not a valid five-field TLV payload".into()),
                }
            }
        }
        Ok(messages)
    }
}

fn base64_decode(input: &str) -> Option<Vec<u8>> {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    STANDARD.decode(input).ok()
}

#[derive(Clone)]
pub struct ComplianceService {
    client: Arc<dyn ReportingClient>,
    vat_number: String,
    submissions: Arc<DashMap<Uuid, ComplianceSubmission>>,
}

impl std::fmt::Debug for ComplianceService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComplianceService")
            .field("submissions", &self.submissions.len())
            .finish()
    }
}

impl ComplianceService {
    pub fn new(client: Arc<dyn ReportingClient>, vat_number: impl Into<String>) -> Self {
        Self {
            client,
            vat_number: vat_number.into(),
            submissions: Arc::new(DashMap::new()),
        }
    }

    /// Reports an invoice and records the outcome. Transport failures are
    /// recorded as rejections.
    pub fn report(&self, invoice: &Invoice) -> ComplianceSubmission {
        let (status, messages) = match self.client.report(invoice, &self.vat_number) {
            Ok(messages) if messages.is_empty() => (SubmissionStatus::Reported, messages),
            Ok(messages) => (SubmissionStatus::Rejected, messages),
            Err(e) => (SubmissionStatus::Rejected, vec![format!("Reporting failed: {e}")]),
        };
        let submission = ComplianceSubmission {
            id: Uuid::new_v4(),
            invoice_id: invoice.id,
            invoice_number: invoice.invoice_number.clone(),
            status,
            messages,
            submitted_at: Utc::now(),
        };
        match status {
            SubmissionStatus::Reported => {
                info!(invoice_number = %invoice.invoice_number, "Invoice reported");
                metrics::counter!("billing.compliance.reported").increment(1);
            }
            SubmissionStatus::Rejected => {
                warn!(
                    invoice_number = %invoice.invoice_number,
                    messages = ?submission.messages,
                    "Invoice report rejected"
                );
                metrics::counter!("billing.compliance.rejected").increment(1);
            }
        }
        self.submissions.insert(submission.id, submission.clone());
        submission
    }

    /// Submissions for an invoice, oldest first.
    pub fn submissions_for(&self, invoice_id: Uuid) -> Vec<ComplianceSubmission> {
        let mut found: Vec<ComplianceSubmission> = self
            .submissions
            .iter()
            .filter(|s| s.invoice_id == invoice_id)
            .map(|s| s.value().clone())
            .collect();
        found.sort_by_key(|s| s.submitted_at);
        found
    }
}
