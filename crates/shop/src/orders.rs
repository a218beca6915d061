//! Member shop orders: cart building, checkout with stock reservation,
//! payment, fulfilment, and cancellation.

use std::sync::Arc;

use chrono::{Datelike, Utc};
use dashmap::DashMap;
use tracing::{info, warn};
use uuid::Uuid;

use liyaqa_core::error::ensure;
use liyaqa_core::event_bus::{make_event, noop_sink, EventSink, EventType};
use liyaqa_core::{LiyaqaError, LiyaqaResult, Money, Page, PageRequest};

use crate::catalog::CatalogService;
use crate::types::{BundleItem, Order, OrderItem, OrderStatus, Product};

#[derive(Clone)]
pub struct OrderService {
    catalog: CatalogService,
    orders: Arc<DashMap<Uuid, Order>>,
    /// Last order sequence per (tenant, year).
    sequences: Arc<DashMap<(Uuid, i32), u32>>,
    event_sink: Arc<dyn EventSink>,
}

impl std::fmt::Debug for OrderService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderService")
            .field("orders", &self.orders.len())
            .finish()
    }
}

impl OrderService {
    pub fn new(catalog: CatalogService) -> Self {
        Self {
            catalog,
            orders: Arc::new(DashMap::new()),
            sequences: Arc::new(DashMap::new()),
            event_sink: noop_sink(),
        }
    }

    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    pub fn catalog(&self) -> &CatalogService {
        &self.catalog
    }

    pub fn create_cart(&self, tenant_id: Uuid, member_id: Uuid) -> Order {
        let order = Order {
            id: Uuid::new_v4(),
            tenant_id,
            member_id,
            order_number: String::new(),
            status: OrderStatus::Cart,
            items: Vec::new(),
            subtotal: Money::ZERO,
            vat_amount: Money::ZERO,
            total: Money::ZERO,
            stock_taken: Vec::new(),
            created_at: Utc::now(),
            placed_at: None,
            paid_at: None,
            fulfilled_at: None,
            cancelled_at: None,
        };
        self.orders.insert(order.id, order.clone());
        order
    }

    pub fn get(&self, id: Uuid) -> LiyaqaResult<Order> {
        self.orders
            .get(&id)
            .map(|o| o.clone())
            .ok_or_else(|| LiyaqaError::not_found("Order", id))
    }

    /// A member's orders, newest first.
    pub fn list_by_member(&self, member_id: Uuid, page: PageRequest) -> Page<Order> {
        let mut found: Vec<Order> = self
            .orders
            .iter()
            .filter(|o| o.member_id == member_id)
            .map(|o| o.value().clone())
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Page::from_vec(found, page)
    }

    // ─── Cart ───────────────────────────────────────────────────────────

    /// Adds `quantity` of a product, merging with an existing line.
    pub fn add_item(&self, order_id: Uuid, product_id: Uuid, quantity: u32) -> LiyaqaResult<Order> {
        ensure(quantity >= 1, "Quantity must be at least 1")?;
        let existing = self
            .get(order_id)?
            .items
            .iter()
            .find(|i| i.product_id == product_id)
            .map_or(0, |i| i.quantity);
        let total = existing
            .checked_add(quantity)
            .ok_or_else(|| LiyaqaError::Validation("Quantity is too large".into()))?;
        self.set_item_quantity(order_id, product_id, total)
    }

    /// Sets a line's quantity; zero removes the line.
    pub fn set_item_quantity(&self, order_id: Uuid, product_id: Uuid, quantity: u32) -> LiyaqaResult<Order> {
        if quantity == 0 {
            return self.remove_item(order_id, product_id);
        }
        let product = self.catalog.get_product(product_id)?;
        let mut order = self
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| LiyaqaError::not_found("Order", order_id))?;
        ensure_cart(&order)?;
        if product.tenant_id != order.tenant_id {
            return Err(LiyaqaError::not_found("Product", product_id));
        }
        self.check_orderable(&product, quantity)?;

        let mut updated = order.clone();
        match updated.items.iter_mut().find(|i| i.product_id == product_id) {
            Some(item) => item.set_quantity(quantity)?,
            None => updated.items.push(OrderItem::new(&product, quantity)?),
        }
        updated.recalculate()?;
        *order = updated.clone();
        Ok(updated)
    }

    pub fn remove_item(&self, order_id: Uuid, product_id: Uuid) -> LiyaqaResult<Order> {
        let mut order = self
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| LiyaqaError::not_found("Order", order_id))?;
        ensure_cart(&order)?;
        let before = order.items.len();
        order.items.retain(|i| i.product_id != product_id);
        if order.items.len() == before {
            return Err(LiyaqaError::not_found("Order item", product_id));
        }
        order.recalculate()?;
        Ok(order.clone())
    }

    fn check_orderable(&self, product: &Product, quantity: u32) -> LiyaqaResult<()> {
        if !product.is_available() {
            return Err(LiyaqaError::InvalidState(format!(
                "Product {} is not available",
                product.id
            )));
        }
        if let Some(max) = product.max_quantity_per_order {
            ensure(
                quantity <= max,
                format!("Maximum {max} per order for {}", product.name.en),
            )?;
        }
        for need in self.catalog.stock_demand(product, quantity)? {
            let stocked = self.catalog.get_product(need.product_id)?;
            if !stocked.has_stock(need.quantity) {
                return Err(LiyaqaError::Validation(format!(
                    "Insufficient stock for {}. Available: {}",
                    stocked.name.en,
                    stocked.stock_quantity.unwrap_or(0)
                )));
            }
        }
        Ok(())
    }

    // ─── Lifecycle ──────────────────────────────────────────────────────

    /// Places the cart: re-validates every line, takes stock, and assigns
    /// the order number.
    pub fn checkout(&self, order_id: Uuid) -> LiyaqaResult<Order> {
        let cart = self.get(order_id)?;
        ensure_cart(&cart)?;
        ensure(!cart.items.is_empty(), "Cannot check out an empty cart")?;

        let mut demand: Vec<BundleItem> = Vec::new();
        for item in &cart.items {
            let product = self.catalog.get_product(item.product_id)?;
            self.check_orderable(&product, item.quantity)?;
            for need in self.catalog.stock_demand(&product, item.quantity)? {
                match demand.iter_mut().find(|d| d.product_id == need.product_id) {
                    Some(d) => {
                        d.quantity = d.quantity.checked_add(need.quantity).ok_or_else(|| {
                            LiyaqaError::Validation("Ordered quantity is too large".into())
                        })?
                    }
                    None => demand.push(need),
                }
            }
        }
        self.catalog.take_stock(&demand)?;

        let now = Utc::now();
        let order_number = self.next_number(cart.tenant_id, now.year());
        let mut order = match self.orders.get_mut(&order_id) {
            Some(order) => order,
            None => {
                self.catalog.return_stock(&demand);
                return Err(LiyaqaError::not_found("Order", order_id));
            }
        };
        if order.status != OrderStatus::Cart {
            self.catalog.return_stock(&demand);
            return Err(LiyaqaError::InvalidState("Order was already placed".into()));
        }
        order.order_number = order_number;
        order.status = OrderStatus::Pending;
        order.stock_taken = demand;
        order.placed_at = Some(now);
        let placed = order.clone();
        drop(order);

        info!(order_number = %placed.order_number, total = %placed.total, "Order placed");
        metrics::counter!("shop.orders.placed").increment(1);
        self.emit(EventType::OrderPlaced, &placed);
        Ok(placed)
    }

    pub fn mark_paid(&self, order_id: Uuid) -> LiyaqaResult<Order> {
        let paid = self.transition(order_id, &[OrderStatus::Pending], OrderStatus::Paid, |o| {
            o.paid_at = Some(Utc::now());
        })?;
        metrics::counter!("shop.orders.paid").increment(1);
        self.emit(EventType::OrderPaid, &paid);
        Ok(paid)
    }

    pub fn fulfil(&self, order_id: Uuid) -> LiyaqaResult<Order> {
        self.transition(order_id, &[OrderStatus::Paid], OrderStatus::Fulfilled, |o| {
            o.fulfilled_at = Some(Utc::now());
        })
    }

    /// Cancels a cart or unpaid order, returning any stock it took.
    pub fn cancel(&self, order_id: Uuid) -> LiyaqaResult<Order> {
        let cancelled = self.transition(
            order_id,
            &[OrderStatus::Cart, OrderStatus::Pending],
            OrderStatus::Cancelled,
            |o| o.cancelled_at = Some(Utc::now()),
        )?;
        if !cancelled.stock_taken.is_empty() {
            self.catalog.return_stock(&cancelled.stock_taken);
        }
        warn!(order_id = %order_id, "Order cancelled");
        metrics::counter!("shop.orders.cancelled").increment(1);
        self.emit(EventType::OrderCancelled, &cancelled);
        Ok(cancelled)
    }

    fn transition(
        &self,
        order_id: Uuid,
        from: &[OrderStatus],
        to: OrderStatus,
        stamp: impl FnOnce(&mut Order),
    ) -> LiyaqaResult<Order> {
        let mut order = self
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| LiyaqaError::not_found("Order", order_id))?;
        if !from.contains(&order.status) {
            return Err(LiyaqaError::InvalidState(format!(
                "Order {} cannot move from {:?} to {:?}",
                order_id, order.status, to
            )));
        }
        order.status = to;
        stamp(&mut order);
        Ok(order.clone())
    }

    fn next_number(&self, tenant_id: Uuid, year: i32) -> String {
        let mut last = self.sequences.entry((tenant_id, year)).or_insert(0);
        *last += 1;
        format!("ORD-{year}-{:06}", *last)
    }

    fn emit(&self, event_type: EventType, order: &Order) {
        self.event_sink.emit(make_event(
            event_type,
            Some(order.tenant_id),
            order.id,
            serde_json::json!({
                "order_number": order.order_number,
                "member_id": order.member_id,
                "total": order.total.to_string(),
            }),
        ));
    }
}

fn ensure_cart(order: &Order) -> LiyaqaResult<()> {
    if order.status != OrderStatus::Cart {
        return Err(LiyaqaError::InvalidState(format!(
            "Order {} is no longer a cart",
            order.id
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CreateProduct, ProductType};
    use liyaqa_core::event_bus::capture_sink;

    struct Fixture {
        orders: OrderService,
        tenant: Uuid,
        member: Uuid,
    }

    fn fixture() -> Fixture {
        Fixture {
            orders: OrderService::new(CatalogService::new()),
            tenant: Uuid::new_v4(),
            member: Uuid::new_v4(),
        }
    }

    fn active(f: &Fixture, cmd: CreateProduct) -> Product {
        let product = f.orders.catalog().create_product(cmd).unwrap();
        f.orders.catalog().publish(product.id).unwrap()
    }

    #[test]
    fn test_cart_totals_merge_lines() {
        let f = fixture();
        let bar = active(&f, CreateProduct::goods(f.tenant, "Bar", Money::from_sar(10)));
        let cart = f.orders.create_cart(f.tenant, f.member);
        f.orders.add_item(cart.id, bar.id, 1).unwrap();
        let cart = f.orders.add_item(cart.id, bar.id, 2).unwrap();
        assert_eq!(cart.items.len(), 1);
        assert_eq!(cart.items[0].quantity, 3);
        assert_eq!(cart.subtotal, Money::from_sar(30));
        assert_eq!(cart.vat_amount, Money::from_halalas(450));
        assert_eq!(cart.total, Money::from_halalas(3450));
    }

    #[test]
    fn test_oversized_quantities_rejected() {
        let f = fixture();
        let pass = active(&f, CreateProduct::goods(f.tenant, "Guest pass", Money::from_sar(1)));
        let cart = f.orders.create_cart(f.tenant, f.member);
        f.orders.add_item(cart.id, pass.id, u32::MAX).unwrap();
        assert!(matches!(
            f.orders.add_item(cart.id, pass.id, 1).unwrap_err(),
            LiyaqaError::Validation(_)
        ));
        assert_eq!(f.orders.get(cart.id).unwrap().items[0].quantity, u32::MAX);

        let pricey = active(&f, CreateProduct::goods(f.tenant, "Lifetime", Money::MAX));
        assert!(matches!(
            f.orders.add_item(cart.id, pricey.id, 2).unwrap_err(),
            LiyaqaError::Validation(_)
        ));
        let unchanged = f.orders.get(cart.id).unwrap();
        assert_eq!(unchanged.items.len(), 1);
        assert_eq!(unchanged.subtotal, Money::from_sar(1).times(u32::MAX));

        let err = f
            .orders
            .catalog()
            .create_product(CreateProduct::goods(f.tenant, "Priceless", Money::from_halalas(i64::MAX)))
            .unwrap_err();
        assert!(matches!(err, LiyaqaError::Validation(_)));
    }

    #[test]
    fn test_draft_product_not_orderable() {
        let f = fixture();
        let draft = f
            .orders
            .catalog()
            .create_product(CreateProduct::goods(f.tenant, "Soon", Money::from_sar(5)))
            .unwrap();
        let cart = f.orders.create_cart(f.tenant, f.member);
        assert!(matches!(
            f.orders.add_item(cart.id, draft.id, 1).unwrap_err(),
            LiyaqaError::InvalidState(_)
        ));
    }

    #[test]
    fn test_max_quantity_per_order() {
        let f = fixture();
        let mut cmd = CreateProduct::goods(f.tenant, "Day pass", Money::from_sar(50));
        cmd.product_type = ProductType::DayPass;
        cmd.max_quantity_per_order = Some(2);
        let pass = active(&f, cmd);
        let cart = f.orders.create_cart(f.tenant, f.member);
        f.orders.add_item(cart.id, pass.id, 2).unwrap();
        assert!(f.orders.add_item(cart.id, pass.id, 1).is_err());
    }

    #[test]
    fn test_checkout_takes_stock_and_numbers_order() {
        let f = fixture();
        let bottle = active(&f, CreateProduct::goods(f.tenant, "Bottle", Money::from_sar(15)).with_stock(5));
        let cart = f.orders.create_cart(f.tenant, f.member);
        assert!(f.orders.add_item(cart.id, bottle.id, 6).is_err());
        f.orders.add_item(cart.id, bottle.id, 4).unwrap();

        let placed = f.orders.checkout(cart.id).unwrap();
        assert_eq!(placed.status, OrderStatus::Pending);
        assert!(placed.order_number.starts_with("ORD-"));
        assert!(placed.order_number.ends_with("-000001"));
        assert_eq!(
            f.orders.catalog().get_product(bottle.id).unwrap().stock_quantity,
            Some(1)
        );
        assert!(f.orders.add_item(placed.id, bottle.id, 1).is_err());
    }

    #[test]
    fn test_bundle_checkout_takes_component_stock() {
        let f = fixture();
        let bar = active(&f, CreateProduct::goods(f.tenant, "Bar", Money::from_sar(10)).with_stock(5));
        let mut cmd = CreateProduct::goods(f.tenant, "Bar pack", Money::from_sar(25));
        cmd.product_type = ProductType::Bundle;
        cmd.bundle_items = vec![BundleItem {
            product_id: bar.id,
            quantity: 3,
        }];
        let pack = active(&f, cmd);

        let cart = f.orders.create_cart(f.tenant, f.member);
        assert!(f.orders.add_item(cart.id, pack.id, 2).is_err());
        f.orders.add_item(cart.id, pack.id, 1).unwrap();
        f.orders.add_item(cart.id, bar.id, 2).unwrap();
        let placed = f.orders.checkout(cart.id).unwrap();
        assert_eq!(placed.stock_taken, vec![BundleItem { product_id: bar.id, quantity: 5 }]);
        assert_eq!(f.orders.catalog().get_product(bar.id).unwrap().stock_quantity, Some(0));

        f.orders.cancel(placed.id).unwrap();
        assert_eq!(f.orders.catalog().get_product(bar.id).unwrap().stock_quantity, Some(5));
    }

    #[test]
    fn test_checkout_fails_when_stock_ran_out() {
        let f = fixture();
        let bottle = active(&f, CreateProduct::goods(f.tenant, "Bottle", Money::from_sar(15)).with_stock(2));
        let first = f.orders.create_cart(f.tenant, f.member);
        let second = f.orders.create_cart(f.tenant, f.member);
        f.orders.add_item(first.id, bottle.id, 2).unwrap();
        f.orders.add_item(second.id, bottle.id, 1).unwrap();
        f.orders.checkout(first.id).unwrap();
        assert!(f.orders.checkout(second.id).is_err());
        assert_eq!(f.orders.get(second.id).unwrap().status, OrderStatus::Cart);
    }

    #[test]
    fn test_payment_and_fulfilment() {
        let f = fixture();
        let sink = capture_sink();
        let orders = f.orders.clone().with_event_sink(sink.clone());
        let towel = active(&f, CreateProduct::goods(f.tenant, "Towel", Money::from_sar(30)));
        let cart = orders.create_cart(f.tenant, f.member);
        orders.add_item(cart.id, towel.id, 1).unwrap();

        assert!(orders.mark_paid(cart.id).is_err());
        orders.checkout(cart.id).unwrap();
        assert!(orders.fulfil(cart.id).is_err());
        orders.mark_paid(cart.id).unwrap();
        let done = orders.fulfil(cart.id).unwrap();
        assert_eq!(done.status, OrderStatus::Fulfilled);
        assert!(orders.cancel(cart.id).is_err());

        assert_eq!(sink.count_type(EventType::OrderPlaced), 1);
        assert_eq!(sink.count_type(EventType::OrderPaid), 1);
    }

    #[test]
    fn test_empty_cart_checkout_rejected() {
        let f = fixture();
        let cart = f.orders.create_cart(f.tenant, f.member);
        assert!(f.orders.checkout(cart.id).is_err());
        assert_eq!(f.orders.list_by_member(f.member, PageRequest::default()).total_elements, 1);
    }
}
