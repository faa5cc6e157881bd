use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, ValueEnum};
use client_core::{
    load_settings, ListController, ListEvent, ListOptions, NotificationBus, RestEntityService,
};
use shared::domain::{Customer, Entity, OrderItem, ProductCategory, ProductOrder, Producto};
use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum EntityArg {
    Producto,
    ProductCategory,
    Customer,
    ProductOrder,
    OrderItem,
}

#[derive(Parser, Debug)]
#[command(about = "Lists catalog records page by page")]
struct Args {
    #[arg(long, value_enum, default_value = "product-order")]
    entity: EntityArg,
    /// Overrides the server url from settings.
    #[arg(long)]
    server_url: Option<String>,
    #[arg(long)]
    search: Option<String>,
    #[arg(long)]
    page_size: Option<u32>,
    /// Stop after this many pages even if the server reports more.
    #[arg(long, default_value_t = 1)]
    pages: u32,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mut settings = load_settings()?;
    if let Some(server_url) = &args.server_url {
        settings.server_url = server_url.clone();
    }
    if let Some(page_size) = args.page_size {
        settings.items_per_page = page_size;
    }

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.log_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let bus = NotificationBus::new();
    let options = ListOptions {
        page_size: settings.items_per_page,
        initial_search: args.search.clone().filter(|term| !term.is_empty()),
    };
    let server_url = settings.server_url.as_str();
    let timeout = settings.request_timeout();

    match args.entity {
        EntityArg::Producto => {
            list_entity::<Producto>(server_url, timeout, bus, options, args.pages).await
        }
        EntityArg::ProductCategory => {
            list_entity::<ProductCategory>(server_url, timeout, bus, options, args.pages).await
        }
        EntityArg::Customer => {
            list_entity::<Customer>(server_url, timeout, bus, options, args.pages).await
        }
        EntityArg::ProductOrder => {
            list_entity::<ProductOrder>(server_url, timeout, bus, options, args.pages).await
        }
        EntityArg::OrderItem => {
            list_entity::<OrderItem>(server_url, timeout, bus, options, args.pages).await
        }
    }
}

async fn list_entity<E: Entity>(
    server_url: &str,
    timeout: std::time::Duration,
    bus: NotificationBus,
    options: ListOptions,
    max_pages: u32,
) -> Result<()> {
    let service = RestEntityService::<E>::with_timeout(server_url, timeout)
        .with_context(|| format!("invalid server url: {server_url}"))?
        .with_notifications(bus.clone());
    let controller = ListController::for_entity(Arc::new(service), bus, options)?;
    let mut events = controller.subscribe_events();

    controller.activate().await?;
    ensure_loaded(&mut events)?;

    let mut loaded_pages = 1;
    while loaded_pages < max_pages {
        let snapshot = controller.snapshot();
        if !snapshot.has_more() {
            break;
        }
        controller.load_page(snapshot.page + 1).await?;
        ensure_loaded(&mut events)?;
        loaded_pages += 1;
    }

    let snapshot = controller.snapshot();
    for item in &snapshot.items {
        println!("{}", serde_json::to_string(item)?);
    }
    info!(
        resource = E::KIND.resource_path(),
        items = snapshot.items.len(),
        page = snapshot.page,
        last_page = snapshot.last_page_index,
        "admin: listing complete"
    );

    controller.teardown();
    Ok(())
}

fn ensure_loaded(events: &mut broadcast::Receiver<ListEvent>) -> Result<()> {
    loop {
        match events.try_recv() {
            Ok(ListEvent::Failed { error, page, .. }) => {
                return Err(anyhow!("failed to load page {page}: {error}"));
            }
            Ok(ListEvent::Loaded { .. }) | Err(TryRecvError::Lagged(_)) => continue,
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return Ok(()),
        }
    }
}
