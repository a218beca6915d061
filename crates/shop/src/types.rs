use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use liyaqa_core::{LiyaqaError, LiyaqaResult, LocalizedText, Money};

pub const DEFAULT_TAX_RATE: f64 = 15.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductType {
    Goods,
    Service,
    DayPass,
    ClassPack,
    Bundle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductStatus {
    Draft,
    Active,
    Inactive,
    Discontinued,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleItem {
    pub product_id: Uuid,
    pub quantity: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductCategory {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: LocalizedText,
    pub sort_order: i32,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: LocalizedText,
    pub description: Option<LocalizedText>,
    pub sku: Option<String>,
    pub product_type: ProductType,
    pub category_id: Option<Uuid>,
    /// Net price before VAT.
    pub list_price: Money,
    /// VAT rate in percent.
    pub tax_rate: f64,
    pub status: ProductStatus,
    pub stock_quantity: Option<u32>,
    pub track_inventory: bool,
    pub max_quantity_per_order: Option<u32>,
    pub sort_order: i32,
    pub image_url: Option<String>,
    pub bundle_items: Vec<BundleItem>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    pub fn is_bundle(&self) -> bool {
        self.product_type == ProductType::Bundle
    }

    pub fn is_available(&self) -> bool {
        self.status == ProductStatus::Active
    }

    /// Whether `quantity` units can be taken from stock.
    pub fn has_stock(&self, quantity: u32) -> bool {
        !self.track_inventory || self.stock_quantity.unwrap_or(0) >= quantity
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateProduct {
    /// Filled from the caller's tenant context by the API.
    #[serde(default = "Uuid::nil")]
    pub tenant_id: Uuid,
    pub name: LocalizedText,
    #[serde(default)]
    pub description: Option<LocalizedText>,
    #[serde(default)]
    pub sku: Option<String>,
    pub product_type: ProductType,
    #[serde(default)]
    pub category_id: Option<Uuid>,
    pub list_price: Money,
    #[serde(default)]
    pub tax_rate: Option<f64>,
    #[serde(default)]
    pub stock_quantity: Option<u32>,
    #[serde(default)]
    pub track_inventory: bool,
    #[serde(default)]
    pub max_quantity_per_order: Option<u32>,
    #[serde(default)]
    pub sort_order: i32,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub bundle_items: Vec<BundleItem>,
}

impl CreateProduct {
    pub fn goods(tenant_id: Uuid, name: &str, price: Money) -> Self {
        Self {
            tenant_id,
            name: LocalizedText::en(name),
            description: None,
            sku: None,
            product_type: ProductType::Goods,
            category_id: None,
            list_price: price,
            tax_rate: None,
            stock_quantity: None,
            track_inventory: false,
            max_quantity_per_order: None,
            sort_order: 0,
            image_url: None,
            bundle_items: Vec::new(),
        }
    }

    pub fn with_stock(mut self, quantity: u32) -> Self {
        self.track_inventory = true;
        self.stock_quantity = Some(quantity);
        self
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateProduct {
    pub name: Option<LocalizedText>,
    pub description: Option<LocalizedText>,
    pub sku: Option<String>,
    pub category_id: Option<Uuid>,
    pub list_price: Option<Money>,
    pub tax_rate: Option<f64>,
    pub max_quantity_per_order: Option<u32>,
    pub sort_order: Option<i32>,
    pub image_url: Option<String>,
    pub bundle_items: Option<Vec<BundleItem>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProductFilter {
    pub status: Option<ProductStatus>,
    pub product_type: Option<ProductType>,
    pub category_id: Option<Uuid>,
    /// Case-insensitive match on either name.
    pub search: Option<String>,
}

impl ProductFilter {
    pub fn matches(&self, product: &Product) -> bool {
        self.status.map_or(true, |s| product.status == s)
            && self.product_type.map_or(true, |t| product.product_type == t)
            && self.category_id.map_or(true, |c| product.category_id == Some(c))
            && self.search.as_deref().map_or(true, |q| {
                let q = q.trim().to_lowercase();
                product.name.en.to_lowercase().contains(&q)
                    || product
                        .name
                        .ar
                        .as_deref()
                        .is_some_and(|ar| ar.to_lowercase().contains(&q))
            })
    }
}

// ─── Orders ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Cart,
    Pending,
    Paid,
    Fulfilled,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_id: Uuid,
    pub name: LocalizedText,
    pub quantity: u32,
    pub unit_price: Money,
    pub tax_rate: f64,
    pub net_amount: Money,
    pub vat_amount: Money,
    pub line_total: Money,
}

impl OrderItem {
    pub fn new(product: &Product, quantity: u32) -> LiyaqaResult<Self> {
        let mut item = Self {
            product_id: product.id,
            name: product.name.clone(),
            quantity,
            unit_price: product.list_price,
            tax_rate: product.tax_rate,
            net_amount: Money::ZERO,
            vat_amount: Money::ZERO,
            line_total: Money::ZERO,
        };
        item.set_quantity(quantity)?;
        Ok(item)
    }

    pub fn set_quantity(&mut self, quantity: u32) -> LiyaqaResult<()> {
        let net_amount = self
            .unit_price
            .checked_times(quantity)
            .filter(|net| *net <= Money::MAX)
            .ok_or_else(|| {
                LiyaqaError::Validation(format!("Order line for {} is too large", self.name.en))
            })?;
        self.quantity = quantity;
        self.net_amount = net_amount;
        self.vat_amount = self.net_amount.percent(self.tax_rate);
        self.line_total = self.net_amount + self.vat_amount;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub member_id: Uuid,
    pub order_number: String,
    pub status: OrderStatus,
    pub items: Vec<OrderItem>,
    pub subtotal: Money,
    pub vat_amount: Money,
    pub total: Money,
    /// Stock taken at checkout, per tracked product.
    #[serde(default)]
    pub stock_taken: Vec<BundleItem>,
    pub created_at: DateTime<Utc>,
    pub placed_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
    pub fulfilled_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl Order {
    pub fn recalculate(&mut self) -> LiyaqaResult<()> {
        let too_large = || LiyaqaError::Validation("Order total is too large".into());
        let subtotal = Money::checked_sum(self.items.iter().map(|i| i.net_amount)).ok_or_else(too_large)?;
        let vat_amount = Money::checked_sum(self.items.iter().map(|i| i.vat_amount)).ok_or_else(too_large)?;
        self.total = subtotal.checked_add(vat_amount).ok_or_else(too_large)?;
        self.subtotal = subtotal;
        self.vat_amount = vat_amount;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_item_totals() {
        let mut product = {
            let now = Utc::now();
            Product {
                id: Uuid::new_v4(),
                tenant_id: Uuid::new_v4(),
                name: LocalizedText::en("Protein bar"),
                description: None,
                sku: None,
                product_type: ProductType::Goods,
                category_id: None,
                list_price: Money::from_halalas(1250),
                tax_rate: DEFAULT_TAX_RATE,
                status: ProductStatus::Active,
                stock_quantity: Some(3),
                track_inventory: true,
                max_quantity_per_order: None,
                sort_order: 0,
                image_url: None,
                bundle_items: Vec::new(),
                created_at: now,
                updated_at: now,
            }
        };
        let item = OrderItem::new(&product, 2).unwrap();
        assert_eq!(item.net_amount, Money::from_halalas(2500));
        assert_eq!(item.vat_amount, Money::from_halalas(375));
        assert_eq!(item.line_total, Money::from_halalas(2875));

        assert!(product.has_stock(3));
        assert!(!product.has_stock(4));
        product.track_inventory = false;
        assert!(product.has_stock(100));

        product.list_price = Money::MAX;
        let mut item = OrderItem::new(&product, 1).unwrap();
        assert!(matches!(item.set_quantity(u32::MAX), Err(LiyaqaError::Validation(_))));
        assert_eq!(item.quantity, 1);
        assert_eq!(item.net_amount, Money::MAX);
    }
}
