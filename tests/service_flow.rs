//! End-to-end flows: service calls, saver writes and broker delivery.

use request_pipeline::config::ServiceConfig;
use request_pipeline::events::{codec, Event, EventKind, EventProducer, InMemoryBroker};
use request_pipeline::saver::{DeadLetterQueue, Saver};
use request_pipeline::service::{CallContext, NewRequest, RequestService};
use request_pipeline::storage::{InMemoryRepo, Request, RequestRepo};
use request_pipeline::telemetry::{CompositeMetrics, InMemoryMetrics, Operation};
use request_pipeline::{Error, PipelineState};
use std::sync::Arc;
use std::time::Duration;

fn test_config() -> ServiceConfig {
    let yaml = r#"
general:
  write_batch_size: 3
producer:
  topic: test_events
  capacity: 32
  flush_size: 4
  flush_interval_ms: 3600000
saver:
  capacity: 32
  chunk_size: 2
  flush_interval_ms: 3600000
"#;
    let config = ServiceConfig::from_yaml_str(yaml).unwrap();
    config.validate().unwrap();
    config
}

fn decoded(broker: &InMemoryBroker) -> Vec<Event> {
    broker
        .messages()
        .iter()
        .map(|m| codec::decode(&m.payload).unwrap())
        .collect()
}

#[tokio::test]
async fn test_crud_session_reports_events_and_metrics() {
    let config = test_config();
    let repo = Arc::new(InMemoryRepo::new());
    let broker = Arc::new(InMemoryBroker::new());
    let producer = Arc::new(EventProducer::start(config.producer.clone(), broker.clone()).unwrap());
    let counters = Arc::new(InMemoryMetrics::new());
    let metrics = Arc::new(CompositeMetrics::new().add_reporter(counters.clone()));
    let service = RequestService::new(
        repo.clone(),
        producer.clone(),
        metrics,
        config.general.write_batch_size,
    )
    .unwrap();
    let ctx = CallContext::new().with_trace_header("uber-trace-id", "1:1:0:1");

    let first = service.create(&ctx, 10, 1, "first").await.unwrap();
    let bulk = (1..=7).map(|u| NewRequest::new(u, 2, "bulk")).collect();
    let ids = service.multi_create(&ctx, bulk).await.unwrap();
    assert_eq!(ids, (2..=8).collect::<Vec<u64>>());

    service
        .update(&ctx, Request::new(first, 10, 5, "edited"))
        .await
        .unwrap();
    service.remove(&ctx, 8).await.unwrap();
    let rows = service.list(&ctx, 3, 0).await.unwrap();
    assert_eq!(rows[0].text, "edited");

    producer.close().await.unwrap();
    assert_eq!(producer.state(), PipelineState::Closed);

    let events = decoded(&broker);
    let count = |kind: EventKind| events.iter().filter(|e| e.kind == kind).count();
    assert_eq!(count(EventKind::Create), 8);
    assert_eq!(count(EventKind::Update), 1);
    assert_eq!(count(EventKind::Delete), 1);
    assert_eq!(count(EventKind::Read), 3);
    assert!(events.iter().all(|e| !e.is_failure()));
    assert!(events.iter().all(|e| e.trace_context.contains_key("uber-trace-id")));
    assert!(broker.batches().iter().all(|b| b.len() <= 4));
    assert!(broker.messages().iter().all(|m| m.topic == "test_events"));

    assert_eq!(counters.get(Operation::Create, "create"), 1);
    assert_eq!(counters.get(Operation::Create, "multi_create"), 7);
    assert_eq!(counters.total(Operation::List), 1);
}

#[tokio::test]
async fn test_saver_failure_lands_in_dead_letter_queue() {
    let config = test_config();
    let repo = Arc::new(InMemoryRepo::new());
    repo.fail_writes_after(2);
    let dlq: Arc<DeadLetterQueue<Request>> = Arc::new(DeadLetterQueue::new(100));

    let saver =
        Saver::with_unflushed_handler(config.saver.clone(), repo.clone(), dlq.clone()).unwrap();
    saver.init().unwrap();
    for u in 1..=7 {
        saver.save(Request::new(0, u, 1, format!("r{u}"))).await.unwrap();
    }
    saver.close().await.unwrap();

    // two chunks of two made it, the third chunk failed
    assert_eq!(repo.len(), 4);
    let leftover = dlq.drain();
    assert_eq!(
        leftover.iter().map(|r| r.user_id).collect::<Vec<_>>(),
        vec![5, 6, 7]
    );
    assert!(dlq.last_error().is_some());

    // resubmit once storage is back
    repo.restore();
    let retry = Saver::start(config.saver.clone(), repo.clone()).unwrap();
    for r in leftover {
        retry.save(r).await.unwrap();
    }
    retry.close().await.unwrap();

    let stored: Vec<u64> = repo
        .list(100, 0)
        .await
        .unwrap()
        .iter()
        .map(|r| r.user_id)
        .collect();
    assert_eq!(stored, (1..=7).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_saver_rejects_use_after_close() {
    let saver = Saver::start(test_config().saver, Arc::new(InMemoryRepo::new())).unwrap();
    saver.close().await.unwrap();
    saver.close().await.unwrap();

    let err = saver.save(Request::new(0, 1, 1, "late")).await.unwrap_err();
    assert!(err.is_usage_error());
    assert!(matches!(err, Error::Lifecycle(_)));
}

#[tokio::test(start_paused = true)]
async fn test_producer_timer_delivers_without_close() {
    let mut config = test_config();
    config.producer.flush_interval_ms = 500;
    let broker = Arc::new(InMemoryBroker::new());
    let producer = EventProducer::start(config.producer, broker.clone()).unwrap();

    producer.send(Event::new(1, EventKind::Create)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(broker.message_count(), 0);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(broker.message_count(), 1);

    producer.close().await.unwrap();
    assert_eq!(broker.attempts(), 1);
}

#[tokio::test]
async fn test_broker_outage_does_not_break_service() {
    let config = test_config();
    let repo = Arc::new(InMemoryRepo::new());
    let broker = Arc::new(InMemoryBroker::new());
    broker.fail_next(1);
    let producer = Arc::new(EventProducer::start(config.producer.clone(), broker.clone()).unwrap());
    let service = RequestService::new(
        repo.clone(),
        producer.clone(),
        Arc::new(InMemoryMetrics::new()),
        config.general.write_batch_size,
    )
    .unwrap();

    for u in 1..=6 {
        service.create(&CallContext::new(), u, 1, "x").await.unwrap();
    }
    producer.close().await.unwrap();

    assert_eq!(repo.len(), 6);
    // first batch of four was rejected and dropped
    let ids: Vec<u64> = decoded(&broker).iter().map(|e| e.request_id).collect();
    assert_eq!(ids, vec![5, 6]);
}
