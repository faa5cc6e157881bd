use super::*;
use std::time::Duration;

use async_trait::async_trait;
use shared::{
    domain::{ProductOrder, ProductOrderId},
    error::ErrorCode,
    protocol::{PageRequest, SearchRequest},
};
use tokio::{sync::Semaphore, time::timeout};

const TOPIC: &str = "productOrderListModification";

struct ScriptedService {
    calls: Mutex<Vec<ListRequest>>,
    items_per_page: usize,
    link_header: Mutex<Option<String>>,
    fail_with_status: Mutex<Option<u16>>,
    gate: Option<Semaphore>,
}

impl ScriptedService {
    fn new(items_per_page: usize, last_page: Option<u32>) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            items_per_page,
            link_header: Mutex::new(last_page.map(|last| {
                format!("<http://localhost/api/product-orders?page={last}&size=20>; rel=\"last\"")
            })),
            fail_with_status: Mutex::new(None),
            gate: None,
        }
    }

    fn gated(mut self) -> Self {
        self.gate = Some(Semaphore::new(0));
        self
    }

    fn release(&self, responses: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(responses);
        }
    }

    fn calls(&self) -> Vec<ListRequest> {
        self.calls.lock().clone()
    }

    async fn respond(&self, request: ListRequest) -> Result<EntityPage<ProductOrder>, ServiceError> {
        let page = request.page();
        self.calls.lock().push(request);
        if let Some(gate) = &self.gate {
            gate.acquire().await.expect("gate open").forget();
        }
        if let Some(status) = *self.fail_with_status.lock() {
            return Err(ServiceError::Status {
                code: ErrorCode::from_status(status),
                status,
                problem: None,
            });
        }
        let items = (0..self.items_per_page)
            .map(|offset| ProductOrder {
                id: Some(ProductOrderId(i64::from(page) * 100 + offset as i64)),
                ..ProductOrder::default()
            })
            .collect();
        Ok(EntityPage::new(items, self.link_header.lock().clone()))
    }
}

#[async_trait]
impl EntityService for ScriptedService {
    type Item = ProductOrder;

    async fn query(&self, request: &PageRequest) -> Result<EntityPage<ProductOrder>, ServiceError> {
        self.respond(ListRequest::Browse(request.clone())).await
    }

    async fn search(
        &self,
        request: &SearchRequest,
    ) -> Result<EntityPage<ProductOrder>, ServiceError> {
        self.respond(ListRequest::Search(request.clone())).await
    }
}

fn controller_with(
    service: &Arc<ScriptedService>,
    bus: &NotificationBus,
    options: ListOptions,
) -> Arc<ListController<ScriptedService>> {
    ListController::for_entity(Arc::clone(service), bus.clone(), options).expect("controller")
}

async fn next_loaded(events: &mut broadcast::Receiver<ListEvent>) -> ListEvent {
    loop {
        let event = timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("event before timeout")
            .expect("event channel open");
        if matches!(event, ListEvent::Loaded { .. }) {
            return event;
        }
    }
}

fn ids(snapshot: &ListSnapshot<ProductOrder>) -> Vec<i64> {
    snapshot
        .items
        .iter()
        .filter_map(|order| order.id.map(|id| id.0))
        .collect()
}

#[tokio::test]
async fn initial_load_browses_first_page_and_reads_last_page() {
    let service = Arc::new(ScriptedService::new(20, Some(4)));
    let bus = NotificationBus::new();
    let controller = controller_with(&service, &bus, ListOptions::default());

    controller.activate().await.expect("initial load");

    assert_eq!(
        service.calls(),
        vec![ListRequest::Browse(PageRequest {
            page: 0,
            size: 20,
            sort: vec!["id,asc".into()],
        })]
    );
    let snapshot = controller.snapshot();
    assert_eq!(snapshot.items.len(), 20);
    assert_eq!(snapshot.last_page_index, 4);
    assert!(snapshot.has_more());
    assert_eq!(controller.topic(), TOPIC);
    assert!(controller.is_active());
}

#[tokio::test]
async fn load_page_appends_to_existing_items() {
    let service = Arc::new(ScriptedService::new(3, Some(2)));
    let bus = NotificationBus::new();
    let controller = controller_with(&service, &bus, ListOptions::default());

    controller.activate().await.expect("initial load");
    let before = controller.snapshot().items.len();
    controller.load_page(1).await.expect("page 1");
    controller.load_page(2).await.expect("page 2");

    let snapshot = controller.snapshot();
    assert_eq!(before, 3);
    assert_eq!(ids(&snapshot), vec![0, 1, 2, 100, 101, 102, 200, 201, 202]);
    assert_eq!(snapshot.page, 2);
    assert!(!snapshot.has_more());
}

#[tokio::test]
async fn reset_empties_list_before_reload_completes() {
    let service = Arc::new(ScriptedService::new(4, Some(1)).gated());
    let bus = NotificationBus::new();
    let controller = controller_with(&service, &bus, ListOptions::default());

    service.release(2);
    controller.activate().await.expect("initial load");
    controller.load_page(1).await.expect("page 1");
    assert_eq!(controller.snapshot().items.len(), 8);

    let reload = controller.reset();
    let pending = controller.snapshot();
    assert!(pending.items.is_empty());
    assert_eq!(pending.page, 0);

    service.release(1);
    reload.await.expect("reload");
    assert_eq!(ids(&controller.snapshot()), vec![0, 1, 2, 3]);
}

#[tokio::test]
async fn search_uses_search_endpoint_with_relevance_sort() {
    let service = Arc::new(ScriptedService::new(2, None));
    let bus = NotificationBus::new();
    let controller = controller_with(&service, &bus, ListOptions::default());

    controller.activate().await.expect("initial load");
    controller.search("shoe").await.expect("search");

    let state = controller.query_state();
    assert_eq!(state.mode(), ListMode::Search);
    assert_eq!(state.sort_field(), "_score");
    assert!(!state.ascending());
    assert_eq!(
        service.calls().last(),
        Some(&ListRequest::Search(SearchRequest {
            query: "shoe".into(),
            page: 0,
            size: 20,
            sort: vec!["_score,desc".into(), "id".into()],
        }))
    );
    assert_eq!(controller.snapshot().items.len(), 2);

    controller.search("").await.expect("browse again");
    assert_eq!(
        service.calls().last(),
        Some(&ListRequest::Browse(PageRequest {
            page: 0,
            size: 20,
            sort: vec!["id,asc".into()],
        }))
    );
    assert_eq!(controller.snapshot().items.len(), 2);
}

#[tokio::test]
async fn initial_search_term_opens_in_search_mode() {
    let service = Arc::new(ScriptedService::new(1, None));
    let bus = NotificationBus::new();
    let controller = controller_with(
        &service,
        &bus,
        ListOptions {
            page_size: 5,
            initial_search: initial_search_from_url("/product-order?search=boots"),
        },
    );

    controller.activate().await.expect("initial load");

    assert_eq!(
        service.calls(),
        vec![ListRequest::Search(SearchRequest {
            query: "boots".into(),
            page: 0,
            size: 5,
            sort: vec!["id,asc".into()],
        })]
    );
}

#[tokio::test]
async fn sort_by_reloads_from_first_page_with_tie_breaker() {
    let service = Arc::new(ScriptedService::new(2, Some(3)));
    let bus = NotificationBus::new();
    let controller = controller_with(&service, &bus, ListOptions::default());

    controller.activate().await.expect("initial load");
    controller.load_page(1).await.expect("page 1");
    controller.sort_by("code", true).await.expect("sorted");

    assert_eq!(controller.build_sort_spec(), vec!["code,asc", "id"]);
    let snapshot = controller.snapshot();
    assert_eq!(snapshot.page, 0);
    assert_eq!(ids(&snapshot), vec![0, 1]);
}

#[tokio::test]
async fn modification_notification_resets_and_reloads() {
    let service = Arc::new(ScriptedService::new(3, Some(5)));
    let bus = NotificationBus::new();
    let controller = controller_with(&service, &bus, ListOptions::default());

    controller.activate().await.expect("initial load");
    controller.load_page(1).await.expect("page 1");
    assert_eq!(controller.snapshot().items.len(), 6);

    let mut events = controller.subscribe_events();
    assert_eq!(bus.publish(TOPIC), 1);
    let event = next_loaded(&mut events).await;

    match event {
        ListEvent::Loaded {
            page, total_items, ..
        } => {
            assert_eq!(page, 0);
            assert_eq!(total_items, 3);
        }
        other => panic!("unexpected event: {other:?}"),
    }
    assert_eq!(ids(&controller.snapshot()), vec![0, 1, 2]);
    assert_eq!(bus.publish("productoListModification"), 0);
}

#[tokio::test]
async fn teardown_releases_subscription_and_is_idempotent() {
    let service = Arc::new(ScriptedService::new(1, None));
    let bus = NotificationBus::new();
    let controller = controller_with(&service, &bus, ListOptions::default());

    controller.teardown();
    controller.activate().await.expect("initial load");
    controller.activate().await.expect("second activation");
    assert_eq!(bus.subscriber_count(TOPIC), 1);
    assert_eq!(controller.snapshot().items.len(), 1);

    controller.teardown();
    controller.teardown();

    assert!(!controller.is_active());
    assert_eq!(bus.subscriber_count(TOPIC), 0);
    assert_eq!(bus.publish(TOPIC), 0);
}

#[tokio::test]
async fn reactivation_after_teardown_starts_from_an_empty_list() {
    let service = Arc::new(ScriptedService::new(2, Some(3)));
    let bus = NotificationBus::new();
    let controller = controller_with(&service, &bus, ListOptions::default());

    controller.activate().await.expect("initial load");
    controller.load_page(1).await.expect("page 1");
    assert_eq!(ids(&controller.snapshot()), vec![0, 1, 100, 101]);

    controller.teardown();
    controller.activate().await.expect("reactivated");

    let snapshot = controller.snapshot();
    assert_eq!(snapshot.page, 0);
    assert_eq!(ids(&snapshot), vec![0, 1]);
    assert_eq!(bus.subscriber_count(TOPIC), 1);
}

#[tokio::test]
async fn dropping_controller_releases_subscription() {
    let service = Arc::new(ScriptedService::new(1, None));
    let bus = NotificationBus::new();
    let controller = controller_with(&service, &bus, ListOptions::default());

    controller.activate().await.expect("initial load");
    assert_eq!(bus.subscriber_count(TOPIC), 1);
    drop(controller);

    assert_eq!(bus.subscriber_count(TOPIC), 0);
}

#[tokio::test]
async fn teardown_cancels_inflight_fetch() {
    let service = Arc::new(ScriptedService::new(2, None).gated());
    let bus = NotificationBus::new();
    let controller = controller_with(&service, &bus, ListOptions::default());

    let load = controller.activate();
    controller.teardown();
    service.release(1);

    let outcome = load.await;
    assert!(outcome.is_err_and(|err| err.is_cancelled()));
    assert!(controller.snapshot().items.is_empty());
}

#[tokio::test]
async fn superseded_request_never_lands() {
    let service = Arc::new(ScriptedService::new(2, None).gated());
    let bus = NotificationBus::new();
    let controller = controller_with(&service, &bus, ListOptions::default());

    let first = controller.load_page(7);
    let second = controller.search("shoe");
    service.release(2);

    assert!(first.await.is_err_and(|err| err.is_cancelled()));
    second.await.expect("search completes");
    assert_eq!(ids(&controller.snapshot()), vec![0, 1]);
    assert_eq!(controller.snapshot().search.as_deref(), Some("shoe"));
}

#[tokio::test]
async fn failure_leaves_items_untouched_and_reports_error() {
    let service = Arc::new(ScriptedService::new(2, Some(1)));
    let bus = NotificationBus::new();
    let controller = controller_with(&service, &bus, ListOptions::default());
    controller.activate().await.expect("initial load");

    let mut events = controller.subscribe_events();
    *service.fail_with_status.lock() = Some(503);
    controller.load_page(1).await.expect("task completes");

    let event = timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("event before timeout")
        .expect("event");
    match event {
        ListEvent::Failed { page, error, .. } => {
            assert_eq!(page, 1);
            assert_eq!(error.code(), Some(ErrorCode::Internal));
        }
        other => panic!("unexpected event: {other:?}"),
    }
    let snapshot = controller.snapshot();
    assert_eq!(ids(&snapshot), vec![0, 1]);
    assert_eq!(snapshot.last_page_index, 1);
}

#[tokio::test]
async fn malformed_link_header_means_single_page() {
    let service = Arc::new(ScriptedService::new(2, None));
    *service.link_header.lock() = Some("not a link header".into());
    let bus = NotificationBus::new();
    let controller = controller_with(&service, &bus, ListOptions::default());

    controller.activate().await.expect("initial load");

    let snapshot = controller.snapshot();
    assert_eq!(snapshot.items.len(), 2);
    assert_eq!(snapshot.last_page_index, 0);
}

#[tokio::test]
async fn zero_page_size_is_rejected() {
    let service = Arc::new(ScriptedService::new(1, None));
    let result = ListController::for_entity(
        service,
        NotificationBus::new(),
        ListOptions {
            page_size: 0,
            initial_search: None,
        },
    );
    assert!(matches!(result, Err(ControllerError::ZeroPageSize)));
}

#[test]
fn construction_requires_a_runtime() {
    let service = Arc::new(ScriptedService::new(1, None));
    let result =
        ListController::for_entity(service, NotificationBus::new(), ListOptions::default());
    assert!(matches!(result, Err(ControllerError::NoRuntime(_))));
}

#[test]
fn search_parameter_is_read_from_navigation_url() {
    assert_eq!(
        initial_search_from_url("/product-order?search=red%20shoe&page=2"),
        Some("red shoe".to_string())
    );
    assert_eq!(
        initial_search_from_url("http://admin.local/product-order?search=boots"),
        Some("boots".to_string())
    );
    assert_eq!(initial_search_from_url("/product-order?search="), None);
    assert_eq!(initial_search_from_url("/product-order"), None);
}
