use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);
    };
}

id_newtype!(ProductoId);
id_newtype!(ProductCategoryId);
id_newtype!(CustomerId);
id_newtype!(ProductOrderId);
id_newtype!(OrderItemId);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Size {
    S,
    M,
    L,
    #[serde(rename = "XL")]
    Xl,
    #[serde(rename = "XXL")]
    Xxl,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Completed,
    Pending,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderItemStatus {
    Available,
    OutOfStock,
    BackOrder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Gender {
    Male,
    Female,
    Other,
}

/// The entity collections exposed by the catalog backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Producto,
    ProductCategory,
    Customer,
    ProductOrder,
    OrderItem,
}

impl EntityKind {
    pub const ALL: [EntityKind; 5] = [
        EntityKind::Producto,
        EntityKind::ProductCategory,
        EntityKind::Customer,
        EntityKind::ProductOrder,
        EntityKind::OrderItem,
    ];

    /// Path segment of the REST collection, relative to `/api/`.
    pub fn resource_path(self) -> &'static str {
        match self {
            EntityKind::Producto => "productos",
            EntityKind::ProductCategory => "product-categories",
            EntityKind::Customer => "customers",
            EntityKind::ProductOrder => "product-orders",
            EntityKind::OrderItem => "order-items",
        }
    }

    /// Topic broadcast whenever a record of this kind is created, updated or deleted.
    pub fn list_modification_topic(self) -> &'static str {
        match self {
            EntityKind::Producto => "productoListModification",
            EntityKind::ProductCategory => "productCategoryListModification",
            EntityKind::Customer => "customerListModification",
            EntityKind::ProductOrder => "productOrderListModification",
            EntityKind::OrderItem => "orderItemListModification",
        }
    }
}

pub trait Entity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const KIND: EntityKind;

    fn id(&self) -> Option<i64>;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Producto {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ProductoId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<Size>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_content_type: Option<String>,
    /// Base64 encoded image payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_category_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_category_id: Option<ProductCategoryId>,
}

impl Producto {
    pub fn image_bytes(&self) -> Result<Option<Vec<u8>>, base64::DecodeError> {
        self.image
            .as_deref()
            .map(|encoded| STANDARD.decode(encoded))
            .transpose()
    }
}

impl Entity for Producto {
    const KIND: EntityKind = EntityKind::Producto;

    fn id(&self) -> Option<i64> {
        self.id.map(|id| id.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductCategory {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ProductCategoryId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Entity for ProductCategory {
    const KIND: EntityKind = EntityKind::ProductCategory;

    fn id(&self) -> Option<i64> {
        self.id.map(|id| id.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<CustomerId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<Gender>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address_line1: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address_line2: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_login: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
}

impl Entity for Customer {
    const KIND: EntityKind = EntityKind::Customer;

    fn id(&self) -> Option<i64> {
        self.id.map(|id| id.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductOrder {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ProductOrderId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placed_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<OrderStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invoice_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<CustomerId>,
}

impl Entity for ProductOrder {
    const KIND: EntityKind = EntityKind::ProductOrder;

    fn id(&self) -> Option<i64> {
        self.id.map(|id| id.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<OrderItemId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<OrderItemStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub producto_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub producto_id: Option<ProductoId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_id: Option<ProductOrderId>,
}

impl Entity for OrderItem {
    const KIND: EntityKind = EntityKind::OrderItem;

    fn id(&self) -> Option<i64> {
        self.id.map(|id| id.0)
    }
}
