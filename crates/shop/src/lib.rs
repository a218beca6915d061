//! Club shop: product catalog with categories, bundles, and inventory, plus
//! member orders from cart through fulfilment.

pub mod catalog;
pub mod orders;
pub mod types;

pub use catalog::CatalogService;
pub use orders::OrderService;
pub use types::{Order, OrderStatus, Product, ProductCategory, ProductStatus, ProductType};
