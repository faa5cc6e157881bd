//! Client core of the catalog admin: entity services, the notification bus
//! and the paginated list controller every entity screen is built on.

pub mod config;
pub mod entity_service;
pub mod error;
pub mod link_header;
pub mod list_controller;
pub mod list_state;
pub mod notification_bus;

pub use config::{load_settings, ClientSettings};
pub use entity_service::{EntityPage, EntityService, RestEntityService};
pub use error::{ControllerError, ServiceError};
pub use link_header::{LinkHeaderError, LinkHeaderParser, PageLinks};
pub use list_controller::{
    initial_search_from_url, ListController, ListEvent, ListOptions, ListSnapshot,
};
pub use list_state::{ListMode, ListQueryState, ListRequest, Page};
pub use notification_bus::{NotificationBus, SubscriptionHandle, SubscriptionId};
