//! Product catalog: categories, products, bundles, and stock levels.

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use tracing::info;
use uuid::Uuid;

use liyaqa_core::error::ensure;
use liyaqa_core::{LiyaqaError, LiyaqaResult, LocalizedText, Money, Page, PageRequest};

use crate::types::{
    BundleItem, CreateProduct, Product, ProductCategory, ProductFilter, ProductStatus,
    ProductType, UpdateProduct, DEFAULT_TAX_RATE,
};

#[derive(Clone, Default)]
pub struct CatalogService {
    categories: Arc<DashMap<Uuid, ProductCategory>>,
    products: Arc<DashMap<Uuid, Product>>,
}

impl std::fmt::Debug for CatalogService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogService")
            .field("products", &self.products.len())
            .finish()
    }
}

impl CatalogService {
    pub fn new() -> Self {
        Self::default()
    }

    // ─── Categories ─────────────────────────────────────────────────────

    pub fn create_category(&self, tenant_id: Uuid, name: LocalizedText, sort_order: i32) -> LiyaqaResult<ProductCategory> {
        ensure(!name.en.trim().is_empty(), "Category name is required")?;
        let category = ProductCategory {
            id: Uuid::new_v4(),
            tenant_id,
            name,
            sort_order,
            is_active: true,
        };
        self.categories.insert(category.id, category.clone());
        Ok(category)
    }

    pub fn get_category(&self, id: Uuid) -> LiyaqaResult<ProductCategory> {
        self.categories
            .get(&id)
            .map(|c| c.clone())
            .ok_or_else(|| LiyaqaError::not_found("Category", id))
    }

    pub fn list_categories(&self, tenant_id: Uuid) -> Vec<ProductCategory> {
        let mut found: Vec<ProductCategory> = self
            .categories
            .iter()
            .filter(|c| c.tenant_id == tenant_id)
            .map(|c| c.value().clone())
            .collect();
        found.sort_by(|a, b| a.sort_order.cmp(&b.sort_order).then_with(|| a.name.en.cmp(&b.name.en)));
        found
    }

    pub fn update_category(
        &self,
        id: Uuid,
        name: Option<LocalizedText>,
        sort_order: Option<i32>,
        is_active: Option<bool>,
    ) -> LiyaqaResult<ProductCategory> {
        let mut entry = self
            .categories
            .get_mut(&id)
            .ok_or_else(|| LiyaqaError::not_found("Category", id))?;
        if let Some(name) = name {
            ensure(!name.en.trim().is_empty(), "Category name is required")?;
            entry.name = name;
        }
        if let Some(order) = sort_order {
            entry.sort_order = order;
        }
        if let Some(active) = is_active {
            entry.is_active = active;
        }
        Ok(entry.clone())
    }

    /// Removes a category; its products become uncategorized.
    pub fn delete_category(&self, id: Uuid) -> LiyaqaResult<()> {
        self.categories
            .remove(&id)
            .ok_or_else(|| LiyaqaError::not_found("Category", id))?;
        for mut product in self.products.iter_mut() {
            if product.category_id == Some(id) {
                product.category_id = None;
            }
        }
        Ok(())
    }

    // ─── Products ───────────────────────────────────────────────────────

    pub fn create_product(&self, cmd: CreateProduct) -> LiyaqaResult<Product> {
        ensure(!cmd.name.en.trim().is_empty(), "Product name is required")?;
        ensure(cmd.list_price.halalas() >= 0, "Price must not be negative")?;
        ensure(cmd.list_price <= Money::MAX, "Price is too large")?;
        let tax_rate = cmd.tax_rate.unwrap_or(DEFAULT_TAX_RATE);
        ensure((0.0..=100.0).contains(&tax_rate), "Tax rate must be between 0 and 100")?;
        if let Some(max) = cmd.max_quantity_per_order {
            ensure(max >= 1, "Max quantity per order must be at least 1")?;
        }
        if let Some(sku) = &cmd.sku {
            self.ensure_unique_sku(cmd.tenant_id, sku, None)?;
        }
        if let Some(category_id) = cmd.category_id {
            self.ensure_category(cmd.tenant_id, category_id)?;
        }
        if cmd.product_type == ProductType::Bundle {
            self.validate_bundle(cmd.tenant_id, &cmd.bundle_items)?;
        } else {
            ensure(cmd.bundle_items.is_empty(), "Only bundles can contain items")?;
        }

        let now = Utc::now();
        let product = Product {
            id: Uuid::new_v4(),
            tenant_id: cmd.tenant_id,
            name: cmd.name,
            description: cmd.description,
            sku: cmd.sku.map(|s| s.trim().to_string()),
            product_type: cmd.product_type,
            category_id: cmd.category_id,
            list_price: cmd.list_price,
            tax_rate,
            status: ProductStatus::Draft,
            stock_quantity: if cmd.track_inventory {
                Some(cmd.stock_quantity.unwrap_or(0))
            } else {
                cmd.stock_quantity
            },
            track_inventory: cmd.track_inventory,
            max_quantity_per_order: cmd.max_quantity_per_order,
            sort_order: cmd.sort_order,
            image_url: cmd.image_url,
            bundle_items: cmd.bundle_items,
            created_at: now,
            updated_at: now,
        };
        self.products.insert(product.id, product.clone());
        info!(product_id = %product.id, sku = ?product.sku, product_type = ?product.product_type, "Product created");
        Ok(product)
    }

    pub fn get_product(&self, id: Uuid) -> LiyaqaResult<Product> {
        self.products
            .get(&id)
            .map(|p| p.clone())
            .ok_or_else(|| LiyaqaError::not_found("Product", id))
    }

    /// Tenant products ordered by sort order, then English name.
    pub fn list_products(&self, tenant_id: Uuid, filter: &ProductFilter, page: PageRequest) -> Page<Product> {
        let mut found: Vec<Product> = self
            .products
            .iter()
            .filter(|p| p.tenant_id == tenant_id && filter.matches(p.value()))
            .map(|p| p.value().clone())
            .collect();
        found.sort_by(|a, b| {
            a.sort_order
                .cmp(&b.sort_order)
                .then_with(|| a.name.en.to_lowercase().cmp(&b.name.en.to_lowercase()))
        });
        Page::from_vec(found, page)
    }

    pub fn update_product(&self, id: Uuid, cmd: UpdateProduct) -> LiyaqaResult<Product> {
        let current = self.get_product(id)?;
        if let Some(name) = &cmd.name {
            ensure(!name.en.trim().is_empty(), "Product name is required")?;
        }
        if let Some(price) = cmd.list_price {
            ensure(price.halalas() >= 0, "Price must not be negative")?;
            ensure(price <= Money::MAX, "Price is too large")?;
        }
        if let Some(rate) = cmd.tax_rate {
            ensure((0.0..=100.0).contains(&rate), "Tax rate must be between 0 and 100")?;
        }
        if let Some(sku) = &cmd.sku {
            self.ensure_unique_sku(current.tenant_id, sku, Some(id))?;
        }
        if let Some(category_id) = cmd.category_id {
            self.ensure_category(current.tenant_id, category_id)?;
        }
        if let Some(items) = &cmd.bundle_items {
            ensure(current.is_bundle(), "Only bundles can contain items")?;
            ensure(!items.iter().any(|i| i.product_id == id), "A bundle cannot contain itself")?;
            self.validate_bundle(current.tenant_id, items)?;
        }

        let mut entry = self
            .products
            .get_mut(&id)
            .ok_or_else(|| LiyaqaError::not_found("Product", id))?;
        if let Some(name) = cmd.name {
            entry.name = name;
        }
        if cmd.description.is_some() {
            entry.description = cmd.description;
        }
        if let Some(sku) = cmd.sku {
            entry.sku = Some(sku.trim().to_string());
        }
        if cmd.category_id.is_some() {
            entry.category_id = cmd.category_id;
        }
        if let Some(price) = cmd.list_price {
            entry.list_price = price;
        }
        if let Some(rate) = cmd.tax_rate {
            entry.tax_rate = rate;
        }
        if cmd.max_quantity_per_order.is_some() {
            entry.max_quantity_per_order = cmd.max_quantity_per_order;
        }
        if let Some(order) = cmd.sort_order {
            entry.sort_order = order;
        }
        if cmd.image_url.is_some() {
            entry.image_url = cmd.image_url;
        }
        if let Some(items) = cmd.bundle_items {
            entry.bundle_items = items;
        }
        entry.updated_at = Utc::now();
        Ok(entry.clone())
    }

    /// Deletes a product unless a bundle still includes it.
    pub fn delete_product(&self, id: Uuid) -> LiyaqaResult<()> {
        self.get_product(id)?;
        if let Some(bundle) = self
            .products
            .iter()
            .find(|p| p.bundle_items.iter().any(|i| i.product_id == id))
        {
            return Err(LiyaqaError::Conflict(format!(
                "Product {id} is part of bundle {}",
                bundle.id
            )));
        }
        self.products.remove(&id);
        Ok(())
    }

    // ─── Status transitions ─────────────────────────────────────────────

    pub fn publish(&self, id: Uuid) -> LiyaqaResult<Product> {
        self.transition(id, &[ProductStatus::Draft], ProductStatus::Active)
    }

    pub fn activate(&self, id: Uuid) -> LiyaqaResult<Product> {
        self.transition(id, &[ProductStatus::Inactive], ProductStatus::Active)
    }

    pub fn deactivate(&self, id: Uuid) -> LiyaqaResult<Product> {
        self.transition(id, &[ProductStatus::Active], ProductStatus::Inactive)
    }

    pub fn discontinue(&self, id: Uuid) -> LiyaqaResult<Product> {
        self.transition(
            id,
            &[ProductStatus::Draft, ProductStatus::Active, ProductStatus::Inactive],
            ProductStatus::Discontinued,
        )
    }

    fn transition(&self, id: Uuid, from: &[ProductStatus], to: ProductStatus) -> LiyaqaResult<Product> {
        let mut entry = self
            .products
            .get_mut(&id)
            .ok_or_else(|| LiyaqaError::not_found("Product", id))?;
        if !from.contains(&entry.status) {
            return Err(LiyaqaError::InvalidState(format!(
                "Product {} cannot move from {:?} to {:?}",
                id, entry.status, to
            )));
        }
        info!(product_id = %id, from = ?entry.status, to = ?to, "Product status change");
        entry.status = to;
        entry.updated_at = Utc::now();
        Ok(entry.clone())
    }

    // ─── Bundles and stock ──────────────────────────────────────────────

    pub fn bundle_items(&self, id: Uuid) -> LiyaqaResult<Vec<(Product, u32)>> {
        let bundle = self.get_product(id)?;
        ensure(bundle.is_bundle(), "Product is not a bundle")?;
        bundle
            .bundle_items
            .iter()
            .map(|item| Ok((self.get_product(item.product_id)?, item.quantity)))
            .collect()
    }

    /// Adds (positive) or removes (negative) stock on a tracked product.
    pub fn adjust_stock(&self, id: Uuid, delta: i64) -> LiyaqaResult<Product> {
        ensure(delta != 0, "Stock adjustment must not be zero")?;
        let mut entry = self
            .products
            .get_mut(&id)
            .ok_or_else(|| LiyaqaError::not_found("Product", id))?;
        ensure(entry.track_inventory, "Product does not track inventory")?;
        let current = i64::from(entry.stock_quantity.unwrap_or(0));
        let next = current + delta;
        if next < 0 {
            return Err(LiyaqaError::Validation(format!(
                "Insufficient stock. Available: {current}"
            )));
        }
        entry.stock_quantity = Some(u32::try_from(next).map_err(|_| {
            LiyaqaError::Validation("Stock quantity out of range".into())
        })?);
        entry.updated_at = Utc::now();
        Ok(entry.clone())
    }

    /// Tracked stock units `quantity` of a product consumes, expanding
    /// bundles into their components.
    pub(crate) fn stock_demand(&self, product: &Product, quantity: u32) -> LiyaqaResult<Vec<BundleItem>> {
        let mut demand = Vec::new();
        if product.track_inventory {
            demand.push(BundleItem {
                product_id: product.id,
                quantity,
            });
        }
        if product.is_bundle() {
            for item in &product.bundle_items {
                let component = self.get_product(item.product_id)?;
                if component.track_inventory {
                    demand.push(BundleItem {
                        product_id: component.id,
                        quantity: item.quantity.checked_mul(quantity).ok_or_else(|| {
                            LiyaqaError::Validation(format!(
                                "Quantity of {} is too large",
                                component.name.en
                            ))
                        })?,
                    });
                }
            }
        }
        Ok(demand)
    }

    /// Takes all of `demand` from stock or none of it.
    pub(crate) fn take_stock(&self, demand: &[BundleItem]) -> LiyaqaResult<()> {
        let mut taken: Vec<BundleItem> = Vec::new();
        for item in demand {
            if let Err(e) = self.adjust_stock(item.product_id, -i64::from(item.quantity)) {
                self.return_stock(&taken);
                return Err(e);
            }
            taken.push(*item);
        }
        Ok(())
    }

    pub(crate) fn return_stock(&self, taken: &[BundleItem]) {
        for item in taken {
            if let Some(mut product) = self.products.get_mut(&item.product_id) {
                product.stock_quantity = Some(product.stock_quantity.unwrap_or(0).saturating_add(item.quantity));
            }
        }
    }

    fn ensure_unique_sku(&self, tenant_id: Uuid, sku: &str, except: Option<Uuid>) -> LiyaqaResult<()> {
        let sku = sku.trim();
        ensure(!sku.is_empty(), "SKU must not be blank")?;
        let taken = self.products.iter().any(|p| {
            p.tenant_id == tenant_id
                && Some(p.id) != except
                && p.sku.as_deref().is_some_and(|s| s.eq_ignore_ascii_case(sku))
        });
        if taken {
            return Err(LiyaqaError::Conflict(format!("SKU already exists: {sku}")));
        }
        Ok(())
    }

    fn ensure_category(&self, tenant_id: Uuid, category_id: Uuid) -> LiyaqaResult<()> {
        match self.categories.get(&category_id) {
            Some(c) if c.tenant_id == tenant_id => Ok(()),
            _ => Err(LiyaqaError::not_found("Category", category_id)),
        }
    }

    fn validate_bundle(&self, tenant_id: Uuid, items: &[BundleItem]) -> LiyaqaResult<()> {
        ensure(!items.is_empty(), "A bundle needs at least one item")?;
        for item in items {
            ensure(item.quantity >= 1, "Bundle item quantity must be at least 1")?;
            let product = match self.products.get(&item.product_id) {
                Some(p) if p.tenant_id == tenant_id => p.clone(),
                _ => return Err(LiyaqaError::not_found("Product", item.product_id)),
            };
            ensure(!product.is_bundle(), "Cannot nest bundles")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use liyaqa_core::Money;

    fn catalog() -> (CatalogService, Uuid) {
        (CatalogService::new(), Uuid::new_v4())
    }

    #[test]
    fn test_create_product_starts_draft() {
        let (catalog, tenant) = catalog();
        let product = catalog
            .create_product(CreateProduct::goods(tenant, "Water", Money::from_sar(2)))
            .unwrap();
        assert_eq!(product.status, ProductStatus::Draft);
        assert_eq!(product.tax_rate, DEFAULT_TAX_RATE);
    }

    #[test]
    fn test_sku_unique_per_tenant() {
        let (catalog, tenant) = catalog();
        let mut cmd = CreateProduct::goods(tenant, "Towel", Money::from_sar(30));
        cmd.sku = Some("TWL-1".into());
        catalog.create_product(cmd.clone()).unwrap();
        assert!(matches!(
            catalog.create_product(cmd.clone()).unwrap_err(),
            LiyaqaError::Conflict(_)
        ));
        cmd.tenant_id = Uuid::new_v4();
        assert!(catalog.create_product(cmd).is_ok());
    }

    #[test]
    fn test_category_must_exist() {
        let (catalog, tenant) = catalog();
        let mut cmd = CreateProduct::goods(tenant, "Shaker", Money::from_sar(25));
        cmd.category_id = Some(Uuid::new_v4());
        assert!(catalog.create_product(cmd.clone()).is_err());

        let category = catalog
            .create_category(tenant, LocalizedText::en("Accessories"), 1)
            .unwrap();
        cmd.category_id = Some(category.id);
        let product = catalog.create_product(cmd).unwrap();

        catalog.delete_category(category.id).unwrap();
        assert_eq!(catalog.get_product(product.id).unwrap().category_id, None);
    }

    #[test]
    fn test_bundles_cannot_nest() {
        let (catalog, tenant) = catalog();
        let bar = catalog
            .create_product(CreateProduct::goods(tenant, "Bar", Money::from_sar(10)))
            .unwrap();
        let mut bundle_cmd = CreateProduct::goods(tenant, "Snack pack", Money::from_sar(25));
        bundle_cmd.product_type = ProductType::Bundle;
        bundle_cmd.bundle_items = vec![BundleItem {
            product_id: bar.id,
            quantity: 3,
        }];
        let bundle = catalog.create_product(bundle_cmd.clone()).unwrap();
        assert_eq!(catalog.bundle_items(bundle.id).unwrap()[0].1, 3);

        bundle_cmd.bundle_items = vec![BundleItem {
            product_id: bundle.id,
            quantity: 1,
        }];
        assert!(catalog.create_product(bundle_cmd).is_err());
        assert!(matches!(
            catalog.delete_product(bar.id).unwrap_err(),
            LiyaqaError::Conflict(_)
        ));
    }

    #[test]
    fn test_status_transitions() {
        let (catalog, tenant) = catalog();
        let product = catalog
            .create_product(CreateProduct::goods(tenant, "Gloves", Money::from_sar(40)))
            .unwrap();
        assert!(catalog.activate(product.id).is_err());
        catalog.publish(product.id).unwrap();
        catalog.deactivate(product.id).unwrap();
        assert_eq!(
            catalog.activate(product.id).unwrap().status,
            ProductStatus::Active
        );
        catalog.discontinue(product.id).unwrap();
        assert!(matches!(
            catalog.discontinue(product.id).unwrap_err(),
            LiyaqaError::InvalidState(_)
        ));
    }

    #[test]
    fn test_list_sorted_and_filtered() {
        let (catalog, tenant) = catalog();
        let mut b = CreateProduct::goods(tenant, "Banana", Money::from_sar(1));
        b.sort_order = 1;
        let mut a = CreateProduct::goods(tenant, "Apple", Money::from_sar(1));
        a.sort_order = 1;
        let mut z = CreateProduct::goods(tenant, "Zinc", Money::from_sar(1));
        z.sort_order = 0;
        for cmd in [b, a, z] {
            catalog.create_product(cmd).unwrap();
        }
        let page = catalog.list_products(tenant, &ProductFilter::default(), PageRequest::default());
        let names: Vec<&str> = page.content.iter().map(|p| p.name.en.as_str()).collect();
        assert_eq!(names, vec!["Zinc", "Apple", "Banana"]);

        let search = ProductFilter {
            search: Some("an".into()),
            ..Default::default()
        };
        assert_eq!(catalog.list_products(tenant, &search, PageRequest::default()).total_elements, 1);
    }

    #[test]
    fn test_adjust_stock() {
        let (catalog, tenant) = catalog();
        let product = catalog
            .create_product(CreateProduct::goods(tenant, "Bottle", Money::from_sar(15)).with_stock(5))
            .unwrap();
        assert_eq!(catalog.adjust_stock(product.id, 3).unwrap().stock_quantity, Some(8));
        assert!(catalog.adjust_stock(product.id, -9).is_err());
        assert_eq!(catalog.adjust_stock(product.id, -8).unwrap().stock_quantity, Some(0));

        let untracked = catalog
            .create_product(CreateProduct::goods(tenant, "Service", Money::from_sar(15)))
            .unwrap();
        assert!(catalog.adjust_stock(untracked.id, 1).is_err());
    }
}
