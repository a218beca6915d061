//! Invoice lifecycle: creation, numbering, issue with e-invoicing data,
//! payments, cancellation, and overdue marking.

use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use liyaqa_core::config::BillingConfig;
use liyaqa_core::error::ensure;
use liyaqa_core::event_bus::{make_event, noop_sink, EventSink, EventType};
use liyaqa_core::{
    LiyaqaError, LiyaqaResult, LocalizedText, Money, OverdueInvoiceSource, Page, PageRequest,
};

use crate::invoice::{
    CreateInvoice, CreateSubscriptionInvoice, Invoice, InvoiceFilter, InvoiceLineItem,
    InvoiceStatus, IssueInvoice, LineItemInput, LineItemType, PaymentRecord, RecordPayment,
};
use crate::zatca::ZatcaService;

/// Outcome of one invoice in a bulk operation.
#[derive(Debug, Clone, Serialize)]
pub struct BulkOutcome {
    pub invoice_id: Uuid,
    pub invoice: Option<Invoice>,
    pub error: Option<String>,
}

impl BulkOutcome {
    fn from_result(invoice_id: Uuid, result: LiyaqaResult<Invoice>) -> Self {
        match result {
            Ok(invoice) => Self {
                invoice_id,
                invoice: Some(invoice),
                error: None,
            },
            Err(e) => Self {
                invoice_id,
                invoice: None,
                error: Some(e.to_string()),
            },
        }
    }

    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Longest payment term accepted at issue.
pub const MAX_PAYMENT_DUE_DAYS: i64 = 365;

/// Per-organization yearly invoice sequence.
#[derive(Debug, Clone, Copy)]
struct Sequence {
    year: i32,
    last: u32,
}

#[derive(Clone)]
pub struct InvoiceService {
    invoices: Arc<DashMap<Uuid, Invoice>>,
    sequences: Arc<DashMap<Uuid, Sequence>>,
    zatca: ZatcaService,
    vat_rate: f64,
    due_days: i64,
    event_sink: Arc<dyn EventSink>,
}

impl std::fmt::Debug for InvoiceService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvoiceService")
            .field("invoices", &self.invoices.len())
            .field("vat_rate", &self.vat_rate)
            .finish()
    }
}

impl InvoiceService {
    pub fn new(config: &BillingConfig) -> Self {
        info!(vat_rate = config.vat_rate, "InvoiceService initialized");
        Self {
            invoices: Arc::new(DashMap::new()),
            sequences: Arc::new(DashMap::new()),
            zatca: ZatcaService::new(config.seller_name.clone(), config.vat_number.clone()),
            vat_rate: config.vat_rate,
            due_days: config.invoice_due_days,
            event_sink: noop_sink(),
        }
    }

    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    pub fn zatca(&self) -> &ZatcaService {
        &self.zatca
    }

    // -----------------------------------------------------------------------
    // Creation
    // -----------------------------------------------------------------------

    pub fn create_invoice(&self, cmd: CreateInvoice) -> LiyaqaResult<Invoice> {
        ensure(!cmd.line_items.is_empty(), "Invoice requires at least one line item")?;
        let line_items = cmd
            .line_items
            .into_iter()
            .enumerate()
            .map(|(i, input)| self.line_item(input, i as u32))
            .collect::<LiyaqaResult<Vec<_>>>()?;
        ensure(
            Money::checked_sum(line_items.iter().map(|l| l.line_total)).is_some(),
            "Invoice total is too large",
        )?;
        let invoice = self.draft(
            cmd.tenant_id,
            cmd.organization_id,
            cmd.member_id,
            cmd.subscription_id,
            line_items,
            cmd.notes,
            Utc::now(),
        );
        Ok(invoice)
    }

    /// Invoices a subscription from its plan fees. Rejected while another
    /// invoice for the subscription is still unpaid.
    pub fn create_from_subscription(&self, cmd: CreateSubscriptionInvoice) -> LiyaqaResult<Invoice> {
        if let Some(existing) = self.invoices.iter().find(|i| {
            i.subscription_id == Some(cmd.subscription_id) && i.status.is_unpaid()
        }) {
            return Err(LiyaqaError::Conflict(format!(
                "Subscription {} already has unpaid invoice {} ({:?})",
                cmd.subscription_id, existing.invoice_number, existing.status
            )));
        }

        let mut inputs = Vec::new();
        if !cmd.membership_fee.is_zero() {
            inputs.push(LineItemInput {
                description: LocalizedText {
                    en: format!("Membership Fee - {}", cmd.plan_name.en),
                    ar: Some(format!("رسوم العضوية - {}", cmd.plan_name.ar_or_en())),
                },
                item_type: LineItemType::Subscription,
                quantity: 1,
                unit_price: cmd.membership_fee,
                tax_rate: None,
            });
        }
        if !cmd.administration_fee.is_zero() {
            inputs.push(LineItemInput {
                description: LocalizedText::new("Administration Fee", "رسوم إدارية"),
                item_type: LineItemType::Other,
                quantity: 1,
                unit_price: cmd.administration_fee,
                tax_rate: None,
            });
        }
        if cmd.first_subscription && !cmd.join_fee.is_zero() {
            inputs.push(LineItemInput {
                description: LocalizedText::new("Joining Fee (One-time)", "رسوم الانضمام (مرة واحدة)"),
                item_type: LineItemType::Other,
                quantity: 1,
                unit_price: cmd.join_fee,
                tax_rate: None,
            });
        }
        ensure(
            !inputs.is_empty(),
            "Cannot create invoice: plan has no fees configured",
        )?;

        self.create_invoice(CreateInvoice {
            tenant_id: cmd.tenant_id,
            organization_id: cmd.organization_id,
            member_id: cmd.member_id,
            subscription_id: Some(cmd.subscription_id),
            line_items: inputs,
            notes: cmd.notes,
        })
    }

    fn line_item(&self, input: LineItemInput, sort_order: u32) -> LiyaqaResult<InvoiceLineItem> {
        ensure(input.quantity >= 1, "Line item quantity must be at least 1")?;
        ensure(input.unit_price.halalas() >= 0, "Line item price must not be negative")?;
        ensure(
            input
                .unit_price
                .checked_times(input.quantity)
                .is_some_and(|net| net <= Money::MAX),
            "Line item amount is too large",
        )?;
        let rate = input.tax_rate.unwrap_or(self.vat_rate);
        ensure((0.0..=100.0).contains(&rate), "Tax rate must be between 0 and 100")?;
        let mut item = InvoiceLineItem::new(
            input.description,
            input.item_type,
            input.quantity,
            input.unit_price,
            rate,
        );
        item.sort_order = sort_order;
        Ok(item)
    }

    #[allow(clippy::too_many_arguments)]
    fn draft(
        &self,
        tenant_id: Uuid,
        organization_id: Uuid,
        member_id: Uuid,
        subscription_id: Option<Uuid>,
        line_items: Vec<InvoiceLineItem>,
        notes: Option<LocalizedText>,
        now: DateTime<Utc>,
    ) -> Invoice {
        let mut invoice = Invoice {
            id: Uuid::new_v4(),
            tenant_id,
            organization_id,
            invoice_number: self.next_number(organization_id, now.year()),
            member_id,
            subscription_id,
            status: InvoiceStatus::Draft,
            line_items,
            subtotal: Money::ZERO,
            vat_amount: Money::ZERO,
            total: Money::ZERO,
            paid_amount: Money::ZERO,
            payments: Vec::new(),
            issue_date: None,
            due_date: None,
            paid_at: None,
            notes,
            zatca: None,
            created_at: now,
            updated_at: now,
        };
        invoice.recalculate();
        self.invoices.insert(invoice.id, invoice.clone());
        metrics::counter!("billing.invoices.created").increment(1);
        info!(
            invoice_id = %invoice.id,
            invoice_number = %invoice.invoice_number,
            total = %invoice.total,
            "Invoice drafted"
        );
        invoice
    }

    /// `INV-{year}-{seq:05}`; the sequence restarts every year.
    fn next_number(&self, organization_id: Uuid, year: i32) -> String {
        let mut seq = self
            .sequences
            .entry(organization_id)
            .or_insert(Sequence { year, last: 0 });
        if seq.year != year {
            seq.year = year;
            seq.last = 0;
        }
        seq.last += 1;
        format!("INV-{}-{:05}", year, seq.last)
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn get_invoice(&self, id: Uuid) -> LiyaqaResult<Invoice> {
        self.invoices
            .get(&id)
            .map(|i| i.clone())
            .ok_or_else(|| LiyaqaError::not_found("Invoice", id))
    }

    pub fn get_by_number(&self, invoice_number: &str) -> LiyaqaResult<Invoice> {
        self.invoices
            .iter()
            .find(|i| i.invoice_number == invoice_number)
            .map(|i| i.value().clone())
            .ok_or_else(|| LiyaqaError::not_found("Invoice", invoice_number))
    }

    /// Matching invoices, newest first.
    pub fn search(&self, filter: &InvoiceFilter, page: PageRequest) -> Page<Invoice> {
        let mut found: Vec<Invoice> = self
            .invoices
            .iter()
            .filter(|i| filter.matches(i.value()))
            .map(|i| i.value().clone())
            .collect();
        found.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.invoice_number.cmp(&a.invoice_number))
        });
        Page::from_vec(found, page)
    }

    /// Issued, partially paid, or overdue invoices of a tenant.
    pub fn count_pending(&self, tenant_id: Uuid) -> usize {
        self.invoices
            .iter()
            .filter(|i| i.tenant_id == tenant_id && i.status.is_pending())
            .count()
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    pub fn update_notes(&self, id: Uuid, notes: Option<LocalizedText>) -> LiyaqaResult<Invoice> {
        let mut entry = self
            .invoices
            .get_mut(&id)
            .ok_or_else(|| LiyaqaError::not_found("Invoice", id))?;
        entry.notes = notes;
        entry.updated_at = Utc::now();
        Ok(entry.clone())
    }

    /// Draft → Issued. Sets issue and due dates and attaches the QR code
    /// and chained hash. Issuance proceeds without them if generation fails.
    pub fn issue(&self, id: Uuid, cmd: IssueInvoice) -> LiyaqaResult<Invoice> {
        let due_days = cmd.payment_due_days.unwrap_or(self.due_days);
        ensure(
            (0..=MAX_PAYMENT_DUE_DAYS).contains(&due_days),
            format!("Payment due days must be between 0 and {MAX_PAYMENT_DUE_DAYS}"),
        )?;
        let due_date = cmd
            .issue_date
            .checked_add_signed(Duration::days(due_days))
            .ok_or_else(|| LiyaqaError::Validation("Due date is out of range".into()))?;
        let now = Utc::now();
        let issued = {
            let mut entry = self
                .invoices
                .get_mut(&id)
                .ok_or_else(|| LiyaqaError::not_found("Invoice", id))?;
            if entry.status != InvoiceStatus::Draft {
                return Err(LiyaqaError::InvalidState(format!(
                    "Only draft invoices can be issued; invoice {} is {:?}",
                    entry.invoice_number, entry.status
                )));
            }
            entry.status = InvoiceStatus::Issued;
            entry.issue_date = Some(cmd.issue_date);
            entry.due_date = Some(due_date);
            match self.zatca.generate(&entry, now) {
                Ok(data) => entry.zatca = Some(data),
                Err(e) => warn!(
                    invoice_number = %entry.invoice_number,
                    error = %e,
                    "E-invoicing data not generated"
                ),
            }
            entry.updated_at = now;
            entry.clone()
        };
        metrics::counter!("billing.invoices.issued").increment(1);
        info!(invoice_number = %issued.invoice_number, due_date = ?issued.due_date, "Invoice issued");
        self.emit(EventType::InvoiceIssued, &issued);
        Ok(issued)
    }

    pub fn record_payment(&self, id: Uuid, cmd: RecordPayment) -> LiyaqaResult<Invoice> {
        ensure(cmd.amount.halalas() > 0, "Payment amount must be positive")?;
        ensure(cmd.amount <= Money::MAX, "Payment amount is too large")?;
        let now = Utc::now();
        let updated = {
            let mut entry = self
                .invoices
                .get_mut(&id)
                .ok_or_else(|| LiyaqaError::not_found("Invoice", id))?;
            if !entry.status.is_pending() {
                return Err(LiyaqaError::InvalidState(format!(
                    "Cannot record payment on invoice {} in status {:?}",
                    entry.invoice_number, entry.status
                )));
            }
            entry.paid_amount = entry
                .paid_amount
                .checked_add(cmd.amount)
                .ok_or_else(|| LiyaqaError::Validation("Paid amount is too large".into()))?;
            entry.payments.push(PaymentRecord {
                amount: cmd.amount,
                method: cmd.method,
                reference: cmd.reference,
                paid_at: now,
            });
            if entry.paid_amount >= entry.total {
                entry.status = InvoiceStatus::Paid;
                entry.paid_at = Some(now);
            } else {
                entry.status = InvoiceStatus::PartiallyPaid;
            }
            entry.updated_at = now;
            entry.clone()
        };
        info!(
            invoice_number = %updated.invoice_number,
            amount = %cmd.amount,
            status = ?updated.status,
            "Payment recorded"
        );
        if updated.status == InvoiceStatus::Paid {
            metrics::counter!("billing.invoices.paid").increment(1);
            self.emit(EventType::InvoicePaid, &updated);
        }
        Ok(updated)
    }

    pub fn cancel(&self, id: Uuid) -> LiyaqaResult<Invoice> {
        let cancelled = {
            let mut entry = self
                .invoices
                .get_mut(&id)
                .ok_or_else(|| LiyaqaError::not_found("Invoice", id))?;
            if matches!(
                entry.status,
                InvoiceStatus::Paid | InvoiceStatus::Refunded | InvoiceStatus::Cancelled
            ) {
                return Err(LiyaqaError::InvalidState(format!(
                    "Invoice {} in status {:?} cannot be cancelled",
                    entry.invoice_number, entry.status
                )));
            }
            entry.status = InvoiceStatus::Cancelled;
            entry.updated_at = Utc::now();
            entry.clone()
        };
        info!(invoice_number = %cancelled.invoice_number, "Invoice cancelled");
        self.emit(EventType::InvoiceCancelled, &cancelled);
        Ok(cancelled)
    }

    /// Only draft or cancelled invoices can be deleted.
    pub fn delete(&self, id: Uuid) -> LiyaqaResult<()> {
        let invoice = self.get_invoice(id)?;
        if !matches!(invoice.status, InvoiceStatus::Draft | InvoiceStatus::Cancelled) {
            return Err(LiyaqaError::InvalidState(format!(
                "Only draft or cancelled invoices can be deleted; invoice {} is {:?}",
                invoice.invoice_number, invoice.status
            )));
        }
        self.invoices.remove(&id);
        Ok(())
    }

    /// Moves issued and partially paid invoices past their due date to
    /// Overdue. Returns how many changed.
    pub fn mark_overdue(&self, today: NaiveDate) -> usize {
        let mut count = 0;
        for mut entry in self.invoices.iter_mut() {
            if matches!(entry.status, InvoiceStatus::Issued | InvoiceStatus::PartiallyPaid)
                && entry.is_past_due(today)
            {
                entry.status = InvoiceStatus::Overdue;
                entry.updated_at = Utc::now();
                count += 1;
            }
        }
        if count > 0 {
            info!(count, %today, "Invoices marked overdue");
            metrics::counter!("billing.invoices.overdue").increment(count as u64);
        }
        count
    }

    pub fn bulk_issue(&self, ids: &[Uuid], issue_date: NaiveDate, payment_due_days: Option<i64>) -> Vec<BulkOutcome> {
        ids.iter()
            .map(|id| {
                BulkOutcome::from_result(
                    *id,
                    self.issue(
                        *id,
                        IssueInvoice {
                            issue_date,
                            payment_due_days,
                        },
                    ),
                )
            })
            .collect()
    }

    pub fn bulk_cancel(&self, ids: &[Uuid]) -> Vec<BulkOutcome> {
        ids.iter()
            .map(|id| BulkOutcome::from_result(*id, self.cancel(*id)))
            .collect()
    }

    fn emit(&self, event_type: EventType, invoice: &Invoice) {
        self.event_sink.emit(make_event(
            event_type,
            Some(invoice.tenant_id),
            invoice.id,
            serde_json::json!({
                "invoice_number": invoice.invoice_number,
                "member_id": invoice.member_id,
                "total": invoice.total,
            }),
        ));
    }
}

impl OverdueInvoiceSource for InvoiceService {
    fn overdue_invoices(&self, tenant_id: Uuid) -> Vec<(Uuid, Uuid)> {
        self.invoices
            .iter()
            .filter(|i| i.tenant_id == tenant_id && i.status == InvoiceStatus::Overdue)
            .map(|i| (i.id, i.member_id))
            .collect()
    }
}
