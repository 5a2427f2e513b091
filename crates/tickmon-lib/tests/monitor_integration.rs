//! Integration tests driving the monitor through its collaborators

use std::sync::mpsc;
use std::sync::Arc;
use std::thread;

use tickmon_lib::gc::{MAJOR_GC_ACTION, MINOR_GC_ACTION};
use tickmon_lib::{
    CollectingSink, GcEvent, GcEventBus, InlineDispatcher, ManualClock, MessageLevel,
    MonitorEvent, MonitorPhase, ReportPredicate, TickHook, TickMonitor, TokioDispatcher,
    CALIBRATION_TICKS,
};

fn build_monitor(
    predicate: ReportPredicate,
    hook: &Arc<TickHook>,
    clock: &Arc<ManualClock>,
    sink: &Arc<CollectingSink>,
    bus: &GcEventBus,
    dispatcher: Arc<dyn tickmon_lib::Dispatcher>,
) -> Arc<TickMonitor> {
    let monitor = TickMonitor::builder()
        .session("integration")
        .tick_source(hook.clone())
        .predicate(predicate)
        .dispatcher(dispatcher)
        .sink(sink.clone())
        .clock(clock.clone())
        .gc_source(Arc::new(bus.clone()))
        .build()
        .expect("monitor should build");
    hook.add_callback(monitor.clone());
    monitor
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_reports_flow_through_tokio_dispatcher() {
    let hook = Arc::new(TickHook::new());
    let clock = Arc::new(ManualClock::new(0.0));
    let sink = Arc::new(CollectingSink::new());
    let bus = GcEventBus::new();
    let (dispatcher, worker) = TokioDispatcher::spawn_current();

    let monitor = build_monitor(
        ReportPredicate::relative(50.0).unwrap(),
        &hook,
        &clock,
        &sink,
        &bus,
        Arc::new(dispatcher),
    );

    // The measured loop runs on its own thread
    let loop_hook = hook.clone();
    let loop_clock = clock.clone();
    thread::spawn(move || {
        loop_hook.tick();
        for _ in 0..CALIBRATION_TICKS {
            loop_clock.advance(50.0);
            loop_hook.tick();
        }
        loop_clock.advance(80.0);
        loop_hook.tick();
        loop_clock.advance(40.0);
        loop_hook.tick();
    })
    .join()
    .unwrap();

    bus.publish(&GcEvent::new(7.5, MAJOR_GC_ACTION));

    // Dropping every dispatcher handle lets the worker drain and exit
    monitor.close();
    hook.remove_callback(0);
    drop(monitor);
    worker.await.unwrap();

    let messages = sink.messages();
    assert_eq!(messages[0].event, MonitorEvent::Started);
    assert_eq!(
        sink.of_event(MonitorEvent::CalibrationComplete).len(),
        1,
        "calibration completes exactly once"
    );
    assert_eq!(sink.of_event(MonitorEvent::CalibrationStat).len(), 3);

    let slow = sink.of_event(MonitorEvent::SlowTick);
    assert_eq!(slow.len(), 1);
    assert_eq!(slow[0].level, MessageLevel::Alert);
    assert!(slow[0].text().contains("lasted 80 ms"));
    assert!(slow[0].text().contains("60%"));

    let gc = sink.of_event(MonitorEvent::GcPause);
    assert_eq!(gc.len(), 1);
    assert!(gc[0].text().ends_with("(type = Old Gen)"));
}

#[test]
fn test_gc_from_another_thread_poisons_the_interval() {
    let hook = Arc::new(TickHook::new());
    let clock = Arc::new(ManualClock::new(0.0));
    let sink = Arc::new(CollectingSink::new());
    let bus = GcEventBus::new();
    let monitor = build_monitor(
        ReportPredicate::absolute(100.0).unwrap(),
        &hook,
        &clock,
        &sink,
        &bus,
        Arc::new(InlineDispatcher),
    );

    // GC thread publishes whenever asked and acknowledges
    let (request_tx, request_rx) = mpsc::channel::<f64>();
    let (ack_tx, ack_rx) = mpsc::channel::<()>();
    let gc_bus = bus.clone();
    let gc_thread = thread::spawn(move || {
        while let Ok(duration) = request_rx.recv() {
            gc_bus.publish(&GcEvent::new(duration, MINOR_GC_ACTION));
            ack_tx.send(()).unwrap();
        }
    });

    hook.tick();
    let mut expected_samples = 0;
    for i in 0..60u64 {
        if i % 3 == 0 {
            request_tx.send(100.0).unwrap();
            ack_rx.recv().unwrap();
            clock.advance(500.0);
        } else {
            clock.advance(20.0);
            expected_samples += 1;
        }
        hook.tick();
        assert_eq!(monitor.calibration().count(), expected_samples);
    }

    assert_eq!(monitor.phase(), MonitorPhase::Setup);
    // Only clean 20ms intervals made it into the statistics
    assert_eq!(monitor.calibration().max(), Some(20.0));
    assert!(sink.of_event(MonitorEvent::GcPause).is_empty());

    drop(request_tx);
    gc_thread.join().unwrap();
}

#[test]
fn test_session_without_enough_samples_stays_in_setup() {
    let hook = Arc::new(TickHook::new());
    let clock = Arc::new(ManualClock::new(0.0));
    let sink = Arc::new(CollectingSink::new());
    let bus = GcEventBus::new();
    let monitor = build_monitor(
        ReportPredicate::relative(10.0).unwrap(),
        &hook,
        &clock,
        &sink,
        &bus,
        Arc::new(InlineDispatcher),
    );

    hook.tick();
    for _ in 0..CALIBRATION_TICKS - 1 {
        clock.advance(1000.0);
        hook.tick();
    }

    assert_eq!(monitor.phase(), MonitorPhase::Setup);
    assert_eq!(monitor.baseline(), None);
    assert_eq!(sink.len(), 1);
}

#[test]
fn test_dropped_monitor_stops_receiving_gc_events() {
    let hook = Arc::new(TickHook::new());
    let clock = Arc::new(ManualClock::new(0.0));
    let sink = Arc::new(CollectingSink::new());
    let bus = GcEventBus::new();

    let monitor = TickMonitor::builder()
        .tick_source(hook.clone())
        .predicate(ReportPredicate::relative(10.0).unwrap())
        .dispatcher(Arc::new(InlineDispatcher))
        .sink(sink.clone())
        .clock(clock.clone())
        .gc_source(Arc::new(bus.clone()))
        .build()
        .unwrap();
    assert_eq!(bus.listener_count(), 1);

    drop(monitor);
    bus.publish(&GcEvent::new(5.0, MINOR_GC_ACTION));

    assert_eq!(bus.listener_count(), 0);
    assert!(sink.is_empty());
}
