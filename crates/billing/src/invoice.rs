//! Invoice model: statuses, line items, totals, and the commands that
//! create and settle invoices.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use liyaqa_core::{LocalizedText, Money};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Draft,
    Issued,
    PartiallyPaid,
    Paid,
    Overdue,
    Cancelled,
    Refunded,
}

impl InvoiceStatus {
    /// Issued but not settled.
    pub fn is_pending(self) -> bool {
        matches!(self, Self::Issued | Self::Overdue | Self::PartiallyPaid)
    }

    /// Blocks a new invoice for the same subscription.
    pub fn is_unpaid(self) -> bool {
        self == Self::Draft || self.is_pending()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineItemType {
    Subscription,
    ClassPack,
    Product,
    PersonalTraining,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Card,
    BankTransfer,
    Online,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceLineItem {
    pub description: LocalizedText,
    pub item_type: LineItemType,
    pub quantity: u32,
    pub unit_price: Money,
    /// VAT rate in percent.
    pub tax_rate: f64,
    pub net_amount: Money,
    pub vat_amount: Money,
    pub line_total: Money,
    pub sort_order: u32,
}

impl InvoiceLineItem {
    pub fn new(
        description: LocalizedText,
        item_type: LineItemType,
        quantity: u32,
        unit_price: Money,
        tax_rate: f64,
    ) -> Self {
        let net_amount = unit_price.times(quantity);
        let vat_amount = net_amount.percent(tax_rate);
        Self {
            description,
            item_type,
            quantity,
            unit_price,
            tax_rate,
            net_amount,
            vat_amount,
            line_total: net_amount + vat_amount,
            sort_order: 0,
        }
    }
}

/// Simplified-invoice e-invoicing data attached at issue time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZatcaData {
    pub qr_code: String,
    pub invoice_hash: String,
    pub previous_hash: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub amount: Money,
    pub method: PaymentMethod,
    pub reference: Option<String>,
    pub paid_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub organization_id: Uuid,
    pub invoice_number: String,
    pub member_id: Uuid,
    pub subscription_id: Option<Uuid>,
    pub status: InvoiceStatus,
    pub line_items: Vec<InvoiceLineItem>,
    pub subtotal: Money,
    pub vat_amount: Money,
    pub total: Money,
    pub paid_amount: Money,
    pub payments: Vec<PaymentRecord>,
    pub issue_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub paid_at: Option<DateTime<Utc>>,
    pub notes: Option<LocalizedText>,
    pub zatca: Option<ZatcaData>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Invoice {
    pub fn recalculate(&mut self) {
        self.subtotal = self.line_items.iter().map(|l| l.net_amount).sum();
        self.vat_amount = self.line_items.iter().map(|l| l.vat_amount).sum();
        self.total = self.subtotal + self.vat_amount;
    }

    pub fn balance_due(&self) -> Money {
        self.total - self.paid_amount
    }

    pub fn is_past_due(&self, today: NaiveDate) -> bool {
        self.due_date.is_some_and(|due| due < today)
    }
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineItemInput {
    pub description: LocalizedText,
    #[serde(default = "default_item_type")]
    pub item_type: LineItemType,
    pub quantity: u32,
    pub unit_price: Money,
    /// Falls back to the configured VAT rate.
    #[serde(default)]
    pub tax_rate: Option<f64>,
}

fn default_item_type() -> LineItemType {
    LineItemType::Other
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateInvoice {
    /// Filled from the caller's tenant context by the API.
    #[serde(default = "Uuid::nil")]
    pub tenant_id: Uuid,
    pub organization_id: Uuid,
    pub member_id: Uuid,
    #[serde(default)]
    pub subscription_id: Option<Uuid>,
    pub line_items: Vec<LineItemInput>,
    #[serde(default)]
    pub notes: Option<LocalizedText>,
}

/// Fee structure of the plan behind a subscription.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSubscriptionInvoice {
    /// Filled from the caller's tenant context by the API.
    #[serde(default = "Uuid::nil")]
    pub tenant_id: Uuid,
    pub organization_id: Uuid,
    pub subscription_id: Uuid,
    pub member_id: Uuid,
    pub plan_name: LocalizedText,
    #[serde(default)]
    pub membership_fee: Money,
    #[serde(default)]
    pub administration_fee: Money,
    /// Only charged on the member's first subscription.
    #[serde(default)]
    pub join_fee: Money,
    #[serde(default)]
    pub first_subscription: bool,
    #[serde(default)]
    pub notes: Option<LocalizedText>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueInvoice {
    pub issue_date: NaiveDate,
    /// Falls back to the configured due days.
    #[serde(default)]
    pub payment_due_days: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordPayment {
    pub amount: Money,
    pub method: PaymentMethod,
    #[serde(default)]
    pub reference: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InvoiceFilter {
    pub tenant_id: Option<Uuid>,
    pub member_id: Option<Uuid>,
    pub status: Option<InvoiceStatus>,
    /// Substring of the invoice number.
    pub search: Option<String>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl InvoiceFilter {
    pub fn matches(&self, invoice: &Invoice) -> bool {
        let created = invoice.created_at.date_naive();
        self.tenant_id.map_or(true, |t| invoice.tenant_id == t)
            && self.member_id.map_or(true, |m| invoice.member_id == m)
            && self.status.map_or(true, |s| invoice.status == s)
            && self.search.as_deref().map_or(true, |q| {
                invoice
                    .invoice_number
                    .to_lowercase()
                    .contains(&q.trim().to_lowercase())
            })
            && self.from.map_or(true, |f| created >= f)
            && self.to.map_or(true, |t| created <= t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_item_vat_rounds_to_halala() {
        let item = InvoiceLineItem::new(
            LocalizedText::en("Day pass"),
            LineItemType::Other,
            3,
            Money::from_halalas(3333),
            15.0,
        );
        assert_eq!(item.net_amount, Money::from_halalas(9999));
        assert_eq!(item.vat_amount, Money::from_halalas(1500));
        assert_eq!(item.line_total, Money::from_halalas(11499));
    }

    #[test]
    fn test_unpaid_statuses() {
        assert!(InvoiceStatus::Draft.is_unpaid());
        assert!(InvoiceStatus::PartiallyPaid.is_unpaid());
        assert!(!InvoiceStatus::Draft.is_pending());
        assert!(!InvoiceStatus::Paid.is_unpaid());
        assert!(!InvoiceStatus::Cancelled.is_unpaid());
    }
}
