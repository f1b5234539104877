//! Integration tests driving the client against mock services.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use dinput_client::{ClientConfig, ClientError, DistributedInputClient, ProxyState};
use dinput_ipc::mock::{
    Completion, MockServiceLocator, MockSinkService, MockSourceService, SinkCall, SourceCall,
};
use dinput_ipc::{
    PrepareCallback, RegisterCallback, SessionStateCallback, SimulationEventListener,
    StartCallback, StartStopDhIdsCallback, UnregisterCallback,
};
use dinput_types::{
    BusinessEvent, DeviceId, DhId, EnableParams, ErrorKind, InputTypeMask, ServiceRole,
    SessionPeer, TouchEvent,
};
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Poll `check` until it holds or five seconds pass.
async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .is_ok()
}

/// Records every status delivered to it.
#[derive(Default)]
struct Statuses(Mutex<Vec<i32>>);

impl Statuses {
    fn get(&self) -> Vec<i32> {
        self.0.lock().unwrap().clone()
    }

    fn push(&self, status: i32) {
        self.0.lock().unwrap().push(status);
    }
}

impl RegisterCallback for Statuses {
    fn on_result(&self, _device_id: &DeviceId, _dh_id: &DhId, status: i32) {
        self.push(status);
    }
}

impl UnregisterCallback for Statuses {
    fn on_result(&self, _device_id: &DeviceId, _dh_id: &DhId, status: i32) {
        self.push(status);
    }
}

impl PrepareCallback for Statuses {
    fn on_result(&self, _peer: &SessionPeer, status: i32) {
        self.push(status);
    }
}

impl StartCallback for Statuses {
    fn on_result(&self, _peer: &SessionPeer, _input_types: InputTypeMask, status: i32) {
        self.push(status);
    }
}

impl StartStopDhIdsCallback for Statuses {
    fn on_result(&self, _peer: &SessionPeer, _dh_ids: &[DhId], status: i32) {
        self.push(status);
    }
}

#[derive(Default)]
struct Events(Mutex<Vec<(u32, u32, i32)>>);

impl SimulationEventListener for Events {
    fn on_simulation_event(&self, event_type: u32, code: u32, value: i32) {
        self.0.lock().unwrap().push((event_type, code, value));
    }
}

#[derive(Default)]
struct States(Mutex<Vec<(DeviceId, u32)>>);

impl SessionStateCallback for States {
    fn on_result(&self, device_id: &DeviceId, state: u32) {
        self.0.lock().unwrap().push((device_id.clone(), state));
    }
}

struct Harness {
    locator: MockServiceLocator,
    source: MockSourceService,
    sink: MockSinkService,
    client: Arc<DistributedInputClient>,
}

fn harness_with(config: ClientConfig) -> Harness {
    init_tracing();
    let source = MockSourceService::new();
    let sink = MockSinkService::new();
    let locator = MockServiceLocator::with_services(source.clone(), sink.clone());
    let client = DistributedInputClient::new(Arc::new(locator.clone()), config);
    Harness {
        locator,
        source,
        sink,
        client,
    }
}

fn harness() -> Harness {
    harness_with(ClientConfig::default())
}

fn dev(id: &str) -> DeviceId {
    DeviceId::new(id)
}

fn dh(id: &str) -> DhId {
    DhId::new(id)
}

#[tokio::test]
async fn duplicate_register_is_already_pending() {
    let h = harness();
    h.source.set_completion(Completion::Manual);
    let cb = Arc::new(Statuses::default());
    let params = EnableParams::default();

    h.client
        .register_distributed_hardware(&dev("dev1"), &dh("dh1"), &params, cb.clone())
        .await
        .unwrap();
    let err = h
        .client
        .register_distributed_hardware(&dev("dev1"), &dh("dh1"), &params, cb.clone())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyPending);
    assert_eq!(h.source.calls().len(), 1);

    assert_eq!(h.source.complete_pending(0), 1);
    assert_eq!(cb.get(), vec![0]);
    assert!(h.client.registry().register.is_empty());

    // The key is free again once the first request completed.
    h.client
        .register_distributed_hardware(&dev("dev1"), &dh("dh1"), &params, cb.clone())
        .await
        .unwrap();
    h.client.shutdown().await;
}

#[tokio::test]
async fn completion_status_reaches_the_caller() {
    let h = harness();
    h.source.set_completion(Completion::Auto(-42));
    let cb = Arc::new(Statuses::default());

    h.client
        .unregister_distributed_hardware(&dev("dev1"), &dh("dh1"), cb.clone())
        .await
        .unwrap();

    assert!(eventually(|| cb.get() == vec![-42]).await);
    assert!(h.client.registry().unregister.is_empty());
    h.client.shutdown().await;
}

#[tokio::test]
async fn empty_sink_is_a_precondition_failure() {
    let h = harness();
    let cb = Arc::new(Statuses::default());

    let err = h
        .client
        .prepare_remote_input(&dev(""), cb.clone())
        .await
        .unwrap_err();

    assert_eq!(err.code(), ErrorKind::PreconditionFailed.code());
    assert_eq!(h.locator.source_lookups(), 0);
    assert!(h.source.calls().is_empty());
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(cb.get().is_empty());
    h.client.shutdown().await;
}

#[tokio::test]
async fn missing_service_is_unavailable_and_never_calls_back() {
    init_tracing();
    let locator = MockServiceLocator::new();
    let client = DistributedInputClient::new(Arc::new(locator.clone()), ClientConfig::default());
    let cb = Arc::new(Statuses::default());

    let err = client
        .prepare_remote_input(&dev("dev1"), cb.clone())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ClientError::ServiceUnavailable(ServiceRole::Source)
    ));
    assert_eq!(err.code(), -1002);
    assert!(client.registry().prepare.is_empty());
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(cb.get().is_empty());
    client.shutdown().await;
}

#[tokio::test]
async fn slow_lookup_is_bounded_by_load_timeout() {
    let mut config = ClientConfig::default();
    config.service.load_timeout_ms = 50;
    let h = harness_with(config);
    h.locator.set_lookup_delay(Some(Duration::from_secs(2)));
    let cb = Arc::new(Statuses::default());

    let started = tokio::time::Instant::now();
    let err = h
        .client
        .start_remote_input(&dev("sink"), InputTypeMask::ALL, cb.clone())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ServiceUnavailable);
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(
        h.client.connections().state(ServiceRole::Source).await,
        ProxyState::Absent
    );
    h.client.shutdown().await;
}

#[tokio::test]
async fn transport_failure_abandons_the_entry() {
    let h = harness();
    h.source.set_completion(Completion::Manual);
    h.source.set_fail_transport(true);
    let cb = Arc::new(Statuses::default());
    let params = EnableParams::default();

    let err = h
        .client
        .register_distributed_hardware(&dev("dev1"), &dh("dh1"), &params, cb.clone())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TransportFailure);
    assert!(h.client.registry().register.is_empty());
    assert!(cb.get().is_empty());

    // An identical request is accepted afterwards.
    h.source.set_fail_transport(false);
    h.client
        .register_distributed_hardware(&dev("dev1"), &dh("dh1"), &params, cb.clone())
        .await
        .unwrap();
    assert_eq!(h.client.registry().register.len(), 1);
    h.client.shutdown().await;
}

#[tokio::test]
async fn dhid_requests_complete_through_the_registry() {
    let h = harness();
    let cb = Arc::new(Statuses::default());
    let dh_ids = [dh("Input_1"), dh("Input_2")];

    h.client
        .start_remote_input_relay_dhids(&dev("src"), &dev("sink"), &dh_ids, cb.clone())
        .await
        .unwrap();
    h.client
        .stop_remote_input_dhids(&dev("sink"), &dh_ids, cb.clone())
        .await
        .unwrap();

    assert!(eventually(|| cb.get() == vec![0, 0]).await);
    assert!(h.client.registry().start_dhids.is_empty());
    assert!(h.client.registry().stop_dhids.is_empty());
    assert!(h.source.calls().contains(&SourceCall::StartDhIds {
        peer: SessionPeer::relay(dev("src"), dev("sink")),
        dh_ids: dh_ids.to_vec(),
    }));
    h.client.shutdown().await;
}

#[tokio::test]
async fn service_death_fails_pending_and_drops_late_completions() {
    let h = harness();
    h.source.set_completion(Completion::Manual);
    let cb = Arc::new(Statuses::default());

    h.client
        .prepare_remote_input(&dev("sink"), cb.clone())
        .await
        .unwrap();
    h.locator.crash_source();

    assert!(eventually(|| cb.get() == vec![ErrorKind::TransportFailure.code()]).await);
    assert_eq!(h.client.registry().pending_count(), 0);

    // The dead service's completion arrives late and goes nowhere.
    assert_eq!(h.source.complete_pending(0), 1);
    assert_eq!(cb.get(), vec![ErrorKind::TransportFailure.code()]);
    h.client.shutdown().await;
}

#[tokio::test]
async fn dead_proxy_found_by_a_caller_still_fails_its_requests() {
    let h = harness();
    h.source.set_completion(Completion::Manual);
    let cb = Arc::new(Statuses::default());
    h.client
        .prepare_remote_input(&dev("sink"), cb.clone())
        .await
        .unwrap();

    // The next caller finds the proxy dead, possibly before the death
    // notice is handled.
    h.locator.crash_source();
    let err = h
        .client
        .prepare_remote_input(&dev("other"), cb.clone())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ServiceUnavailable);

    assert!(eventually(|| cb.get() == vec![ErrorKind::TransportFailure.code()]).await);
    assert_eq!(h.client.registry().pending_count(), 0);

    // The key is free again once a new service is up, and leftover notices
    // about the old proxy leave the new request alone.
    let restarted = MockSourceService::new();
    restarted.set_completion(Completion::Manual);
    h.locator.publish_source(restarted.clone());
    h.client
        .prepare_remote_input(&dev("sink"), cb.clone())
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(h
        .client
        .registry()
        .prepare
        .is_pending(&SessionPeer::local(dev("sink"))));
    assert_eq!(cb.get(), vec![ErrorKind::TransportFailure.code()]);

    assert_eq!(restarted.complete_pending(0), 1);
    assert!(eventually(|| cb.get() == vec![ErrorKind::TransportFailure.code(), 0]).await);
    h.client.shutdown().await;
}

#[tokio::test]
async fn death_during_a_call_reports_only_the_callback_status() {
    let h = harness();
    let gate = h.source.hold_replies();
    let cb = Arc::new(Statuses::default());

    let call = {
        let client = Arc::clone(&h.client);
        let cb = cb.clone();
        tokio::spawn(async move {
            client
                .start_remote_input(&dev("sink"), InputTypeMask::ALL, cb)
                .await
        })
    };
    assert!(eventually(|| !h.source.calls().is_empty()).await);

    h.locator.crash_source();
    assert!(eventually(|| cb.get() == vec![ErrorKind::TransportFailure.code()]).await);
    gate.notify_one();

    assert!(call.await.unwrap().is_ok());
    assert_eq!(cb.get(), vec![ErrorKind::TransportFailure.code()]);
    assert_eq!(h.client.registry().pending_count(), 0);
    h.client.shutdown().await;
}

#[tokio::test]
async fn registering_the_same_listener_twice_is_one_registration() {
    let h = harness();
    let events = Arc::new(Events::default());
    let first = h
        .client
        .register_simulation_event_listener(events.clone())
        .await
        .unwrap();
    let again = h
        .client
        .register_simulation_event_listener(events.clone())
        .await
        .unwrap();
    assert_eq!(first, again);
    assert_eq!(h.source.simulation_listener_ids(), vec![first]);
    assert_eq!(h.source.emit_simulation_event(1, 2, 3), 1);
    assert_eq!(*events.0.lock().unwrap(), vec![(1, 2, 3)]);

    let states = Arc::new(States::default());
    let state_cb = h
        .client
        .register_session_state_cb(states.clone())
        .await
        .unwrap();
    let state_again = h
        .client
        .register_session_state_cb(states.clone())
        .await
        .unwrap();
    assert_eq!(state_cb, state_again);
    assert_eq!(h.source.session_state_ids(), vec![state_cb]);

    // A different listener gets its own id.
    let other = h
        .client
        .register_simulation_event_listener(Arc::new(Events::default()))
        .await
        .unwrap();
    assert_ne!(other, first);
    assert_eq!(h.source.simulation_listener_ids().len(), 2);
    h.client.shutdown().await;
}

#[tokio::test]
async fn listeners_are_replayed_after_restart() {
    let h = harness();
    h.client.init_source().await.unwrap();
    let events = Arc::new(Events::default());
    let states = Arc::new(States::default());
    let listener = h
        .client
        .register_simulation_event_listener(events.clone())
        .await
        .unwrap();
    let state_cb = h
        .client
        .register_session_state_cb(states.clone())
        .await
        .unwrap();

    h.locator.crash_source();
    let restarted = MockSourceService::new();
    h.locator.publish_source(restarted.clone());

    assert!(eventually(|| restarted.simulation_listener_ids() == vec![listener]).await);
    assert!(eventually(|| restarted.session_state_ids() == vec![state_cb]).await);
    let calls = restarted.calls();
    assert_eq!(calls.first(), Some(&SourceCall::Init));
    assert!(calls.contains(&SourceCall::RegisterAddWhiteList));
    assert!(calls.contains(&SourceCall::RegisterDelWhiteList));

    assert_eq!(restarted.emit_simulation_event(1, 2, 3), 1);
    assert_eq!(*events.0.lock().unwrap(), vec![(1, 2, 3)]);
    assert_eq!(restarted.emit_session_state(&dev("sink"), 2), 1);
    assert_eq!(*states.0.lock().unwrap(), vec![(dev("sink"), 2)]);
    h.client.shutdown().await;
}

#[tokio::test]
async fn unregistered_listener_is_not_replayed() {
    let h = harness();
    let events = Arc::new(Events::default());
    let id = h
        .client
        .register_simulation_event_listener(events.clone())
        .await
        .unwrap();
    h.client
        .unregister_simulation_event_listener(id)
        .await
        .unwrap();
    assert!(h.source.simulation_listener_ids().is_empty());

    let err = h
        .client
        .unregister_simulation_event_listener(id)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PreconditionFailed);

    h.locator.crash_source();
    let restarted = MockSourceService::new();
    h.locator.publish_source(restarted.clone());
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(restarted.simulation_listener_ids().is_empty());
    h.client.shutdown().await;
}

#[tokio::test]
async fn pushed_whitelist_drives_key_filter() {
    let h = harness();
    h.client.init_source().await.unwrap();
    let sink = dev("sink");
    let key = |held: &[i32], code| BusinessEvent {
        pressed_keys: held.to_vec(),
        key_code: code,
        key_action: 2,
    };

    assert!(!h.client.is_need_filter_out(&sink, &key(&[], 2017)));

    assert!(h.source.push_white_list(&sink, "[[[2072],2017,2]]"));
    assert!(!h.client.is_need_filter_out(&sink, &key(&[2072], 2017)));
    assert!(h.client.is_need_filter_out(&sink, &key(&[], 2017)));

    assert!(h.source.withdraw_white_list(&sink));
    assert!(!h.client.is_need_filter_out(&sink, &key(&[], 2017)));
    h.client.shutdown().await;
}

#[tokio::test]
async fn pushed_screen_infos_drive_touch_filter() {
    let h = harness();
    h.client.init_sink().await.unwrap();
    assert_eq!(
        h.sink.calls(),
        vec![
            SinkCall::Init,
            SinkCall::RegisterSharingListener,
            SinkCall::RegisterScreenInfoCallback,
        ]
    );

    assert!(h.sink.push_screen_infos("[[10,10,100,100]]"));
    assert!(h.client.is_touch_event_need_filter_out(&TouchEvent::new(10, 10)));
    assert!(h.client.is_touch_event_need_filter_out(&TouchEvent::new(100, 100)));
    assert!(h.client.is_touch_event_need_filter_out(&TouchEvent::new(109, 109)));
    assert!(!h.client.is_touch_event_need_filter_out(&TouchEvent::new(110, 110)));
    assert!(!h.client.is_touch_event_need_filter_out(&TouchEvent::new(110, 50)));
    assert!(!h.client.is_touch_event_need_filter_out(&TouchEvent::new(50, 110)));
    assert!(!h.client.is_touch_event_need_filter_out(&TouchEvent::new(9, 50)));

    // A malformed push keeps the last good geometry.
    assert!(h.sink.push_screen_infos("[[10,10]]"));
    assert!(h.client.is_touch_event_need_filter_out(&TouchEvent::new(50, 50)));
    assert!(h.client.update_sink_screen_infos("nope").is_err());
    assert!(h.client.is_touch_event_need_filter_out(&TouchEvent::new(50, 50)));
    h.client.shutdown().await;
}

#[tokio::test]
async fn sharing_listener_mirrors_sink_reports() {
    let h = harness();
    h.client.init_sink().await.unwrap();
    let input = dh("Input_1");

    assert!(h.sink.set_sharing(&input, true));
    assert!(h.client.is_start_distributed_input(&input));
    assert!(h.sink.set_sharing(&input, false));
    assert!(!h.client.is_start_distributed_input(&input));
    h.client.shutdown().await;
}

#[tokio::test]
async fn sink_callbacks_are_restored_after_restart() {
    let h = harness();
    h.client.init_sink().await.unwrap();

    h.locator.crash_sink();
    let restarted = MockSinkService::new();
    h.locator.publish_sink(restarted.clone());

    assert!(
        eventually(|| restarted.calls()
            == vec![
                SinkCall::Init,
                SinkCall::RegisterSharingListener,
                SinkCall::RegisterScreenInfoCallback,
            ])
        .await
    );
    assert!(restarted.push_screen_infos("[[0,0,10,10]]"));
    assert!(h.client.is_touch_event_need_filter_out(&TouchEvent::new(5, 5)));
    h.client.shutdown().await;
}

#[tokio::test]
async fn failed_sink_init_leaves_role_unset() {
    let h = harness();
    h.sink.set_fail_transport(true);

    let err = h.client.init_sink().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TransportFailure);
    assert_eq!(h.client.server_role(), dinput_types::ServerRole::None);
    h.client.shutdown().await;
}

#[tokio::test]
async fn shutdown_purges_without_callbacks() {
    let h = harness();
    h.source.set_completion(Completion::Manual);
    let cb = Arc::new(Statuses::default());

    h.client
        .start_remote_input(&dev("sink"), InputTypeMask::MOUSE, cb.clone())
        .await
        .unwrap();
    h.client.shutdown().await;

    assert_eq!(h.client.registry().pending_count(), 0);
    assert_eq!(h.source.complete_pending(0), 1);
    assert!(cb.get().is_empty());
    assert!(!h.source.has_death_recipient());
}

#[tokio::test]
async fn health_check_rebinds_when_notifications_are_missed() {
    use dinput_ipc::RemoteObject;

    let mut config = ClientConfig::default();
    config.service.health_check_interval_ms = 20;
    let h = harness_with(config);
    h.client.init_source().await.unwrap();

    // Neither the death notice nor the availability events reach the client.
    h.source.remove_death_recipient();
    h.locator.set_muted(true);
    h.locator.crash_source();
    let restarted = MockSourceService::new();
    h.locator.publish_source(restarted.clone());

    assert!(eventually(|| restarted.calls().contains(&SourceCall::RegisterAddWhiteList)).await);
    assert_eq!(restarted.calls().first(), Some(&SourceCall::Init));
    h.client.shutdown().await;
}
