//! Paginated, searchable list view that refreshes itself when the underlying
//! collection is modified elsewhere in the application.
//!
//! Fetches run as tasks on the runtime captured at construction. Each fetch
//! is tagged with a request generation; only the response of the most recent
//! request is applied, older ones are aborted or discarded. Outcomes are
//! published on the controller's event channel, which is also where fetch
//! failures surface.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use shared::{domain::Entity, protocol::ITEMS_PER_PAGE};
use tokio::{
    runtime::Handle,
    sync::broadcast,
    task::{AbortHandle, JoinHandle},
};
use tracing::{debug, info, warn};
use url::Url;

use crate::{
    entity_service::{EntityPage, EntityService},
    error::{ControllerError, ServiceError},
    link_header::LinkHeaderParser,
    list_state::{ListMode, ListQueryState, ListRequest, Page},
    notification_bus::{NotificationBus, SubscriptionHandle},
};

const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
pub struct ListOptions {
    pub page_size: u32,
    /// Search term the screen opens with; empty or absent means browse mode.
    pub initial_search: Option<String>,
}

impl Default for ListOptions {
    fn default() -> Self {
        Self {
            page_size: ITEMS_PER_PAGE,
            initial_search: None,
        }
    }
}

#[derive(Debug, Clone)]
pub enum ListEvent {
    Loaded {
        generation: u64,
        mode: ListMode,
        page: u32,
        received: usize,
        total_items: usize,
        last_page_index: u32,
    },
    Failed {
        generation: u64,
        mode: ListMode,
        page: u32,
        error: Arc<ServiceError>,
    },
}

impl ListEvent {
    pub fn generation(&self) -> u64 {
        match self {
            ListEvent::Loaded { generation, .. } | ListEvent::Failed { generation, .. } => {
                *generation
            }
        }
    }
}

/// Point in time copy of what a list screen displays.
#[derive(Debug, Clone, PartialEq)]
pub struct ListSnapshot<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub last_page_index: u32,
    pub search: Option<String>,
    pub sort: Vec<String>,
}

impl<T> ListSnapshot<T> {
    pub fn has_more(&self) -> bool {
        self.page < self.last_page_index
    }
}

struct ControllerState<T> {
    query: ListQueryState,
    page: Page<T>,
    generation: u64,
    inflight: Option<AbortHandle>,
}

pub struct ListController<S: EntityService> {
    service: Arc<S>,
    bus: NotificationBus,
    topic: String,
    links: LinkHeaderParser,
    runtime: Handle,
    inner: Mutex<ControllerState<S::Item>>,
    subscription: Mutex<Option<SubscriptionHandle>>,
    events: broadcast::Sender<ListEvent>,
}

impl<S> ListController<S>
where
    S: EntityService + 'static,
    S::Item: Entity,
{
    /// Controller listening on the entity's own collection-modified topic.
    pub fn for_entity(
        service: Arc<S>,
        bus: NotificationBus,
        options: ListOptions,
    ) -> Result<Arc<Self>, ControllerError> {
        Self::new(
            service,
            bus,
            <S::Item as Entity>::KIND.list_modification_topic(),
            options,
        )
    }
}

impl<S> ListController<S>
where
    S: EntityService + 'static,
{
    pub fn new(
        service: Arc<S>,
        bus: NotificationBus,
        topic: impl Into<String>,
        options: ListOptions,
    ) -> Result<Arc<Self>, ControllerError> {
        let runtime = Handle::try_current()?;
        let query = ListQueryState::new(options.page_size, options.initial_search.as_deref())?;
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Ok(Arc::new(Self {
            service,
            bus,
            topic: topic.into(),
            links: LinkHeaderParser::new(),
            runtime,
            inner: Mutex::new(ControllerState {
                query,
                page: Page::default(),
                generation: 0,
                inflight: None,
            }),
            subscription: Mutex::new(None),
            events,
        }))
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ListEvent> {
        self.events.subscribe()
    }

    pub fn is_active(&self) -> bool {
        self.subscription.lock().is_some()
    }

    pub fn query_state(&self) -> ListQueryState {
        self.inner.lock().query.clone()
    }

    pub fn snapshot(&self) -> ListSnapshot<S::Item> {
        let guard = self.inner.lock();
        ListSnapshot {
            items: guard.page.items().to_vec(),
            page: guard.query.page(),
            last_page_index: guard.page.last_page_index(),
            search: guard.query.search().map(str::to_string),
            sort: guard.query.build_sort_spec(),
        }
    }

    pub fn build_sort_spec(&self) -> Vec<String> {
        self.inner.lock().query.build_sort_spec()
    }

    /// Subscribes to collection changes and loads the first page into an
    /// empty list.
    pub fn activate(self: &Arc<Self>) -> JoinHandle<()> {
        {
            let mut subscription = self.subscription.lock();
            if subscription.is_none() {
                let controller: Weak<Self> = Arc::downgrade(self);
                *subscription = Some(self.bus.subscribe(self.topic.clone(), move || {
                    if let Some(controller) = controller.upgrade() {
                        debug!(topic = %controller.topic, "list: collection modified, reloading");
                        drop(controller.reset());
                    }
                }));
            }
        }
        info!(topic = %self.topic, "list: activated");
        self.reset()
    }

    /// Fetches the current page and appends it to the displayed items.
    pub fn load_all(self: &Arc<Self>) -> JoinHandle<()> {
        let (generation, request) = {
            let mut guard = self.inner.lock();
            guard.generation += 1;
            if let Some(previous) = guard.inflight.take() {
                previous.abort();
            }
            (guard.generation, guard.query.request())
        };

        debug!(
            topic = %self.topic,
            generation,
            request = ?request,
            "list: loading page"
        );
        let controller = Arc::clone(self);
        let task = self
            .runtime
            .spawn(async move { controller.fetch(generation, request).await });

        let mut guard = self.inner.lock();
        if guard.generation == generation && !task.is_finished() {
            guard.inflight = Some(task.abort_handle());
        }
        task
    }

    /// Back to the first page with an empty list, then reload.
    pub fn reset(self: &Arc<Self>) -> JoinHandle<()> {
        {
            let mut guard = self.inner.lock();
            guard.query.reset_page();
            guard.page.clear_items();
        }
        self.load_all()
    }

    /// Loads page `page` and appends it to the items already shown.
    pub fn load_page(self: &Arc<Self>, page: u32) -> JoinHandle<()> {
        self.inner.lock().query.select_page(page);
        self.load_all()
    }

    /// Switches to search mode for `term`, or back to browse mode when empty.
    pub fn search(self: &Arc<Self>, term: &str) -> JoinHandle<()> {
        {
            let mut guard = self.inner.lock();
            guard.page.clear();
            guard.query.apply_search(term);
        }
        info!(topic = %self.topic, term, "list: search");
        self.load_all()
    }

    /// Re-sorts the list and reloads it from the first page.
    pub fn sort_by(self: &Arc<Self>, field: &str, ascending: bool) -> JoinHandle<()> {
        self.inner.lock().query.sort_by(field, ascending);
        self.reset()
    }

    /// Releases the bus subscription and cancels the in-flight fetch.
    pub fn teardown(&self) {
        if let Some(handle) = self.subscription.lock().take() {
            self.bus.unsubscribe(handle);
            info!(topic = %self.topic, "list: deactivated");
        }
        let mut guard = self.inner.lock();
        guard.generation += 1;
        if let Some(inflight) = guard.inflight.take() {
            inflight.abort();
        }
    }

    async fn fetch(&self, generation: u64, request: ListRequest) {
        let result = match &request {
            ListRequest::Browse(page_request) => self.service.query(page_request).await,
            ListRequest::Search(search_request) => self.service.search(search_request).await,
        };
        match result {
            Ok(page) => self.apply(generation, &request, page),
            Err(err) => self.fail(generation, &request, err),
        }
    }

    fn apply(&self, generation: u64, request: &ListRequest, page: EntityPage<S::Item>) {
        let event = {
            let mut guard = self.inner.lock();
            if guard.generation != generation {
                debug!(
                    topic = %self.topic,
                    generation,
                    current = guard.generation,
                    "list: discarding stale response"
                );
                return;
            }
            guard.inflight = None;
            let received = page.items.len();
            let last_page_index = self.links.last_page_index(page.link_header.as_deref());
            guard.page.append(page.items, last_page_index);
            ListEvent::Loaded {
                generation,
                mode: request.mode(),
                page: request.page(),
                received,
                total_items: guard.page.items().len(),
                last_page_index,
            }
        };
        debug!(topic = %self.topic, event = ?event, "list: page loaded");
        let _ = self.events.send(event);
    }

    fn fail(&self, generation: u64, request: &ListRequest, err: ServiceError) {
        {
            let mut guard = self.inner.lock();
            if guard.generation != generation {
                debug!(topic = %self.topic, generation, "list: ignoring stale failure");
                return;
            }
            guard.inflight = None;
        }
        warn!(
            topic = %self.topic,
            generation,
            page = request.page(),
            error = %err,
            "list: fetch failed"
        );
        let _ = self.events.send(ListEvent::Failed {
            generation,
            mode: request.mode(),
            page: request.page(),
            error: Arc::new(err),
        });
    }
}

/// Reads the `search` query parameter of a navigation url such as
/// `/product-order?search=shoe`. Returns `None` when absent or empty.
pub fn initial_search_from_url(navigation_url: &str) -> Option<String> {
    let base = Url::parse("http://localhost/").ok()?;
    let url = Url::options()
        .base_url(Some(&base))
        .parse(navigation_url)
        .ok()?;
    url.query_pairs()
        .find(|(key, _)| key == "search")
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
#[path = "tests/list_controller_tests.rs"]
mod tests;
