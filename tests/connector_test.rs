//! Integration tests for the queue control connector against the in-memory
//! broker.

use queue_connector::broker::{
    BrokerEndpoint, BrokerError, Connection, FailurePoint, InMemoryBroker, Subscriber,
};
use queue_connector::connector::{
    ConnectorConfig, FixedHostResolver, HostResolver, QueueConnector, SystemHostResolver,
};
use queue_connector::error::Error;
use queue_connector::model::{ConsumerCommand, QueueBean, Queueable, Status};
use std::time::Duration;

const URI: &str = "memory://connector-test";
const QUEUE: &str = "scan.submit";
const STATUS_TOPIC: &str = "scan.status";
const COMMAND_TOPIC: &str = "scan.command";

fn setup() -> (InMemoryBroker, QueueConnector<InMemoryBroker>) {
    let broker = InMemoryBroker::new(URI);
    let config = ConnectorConfig::new(BrokerEndpoint::new(URI).unwrap());
    let connector = QueueConnector::new(broker.clone(), config)
        .with_host_resolver(FixedHostResolver::new("beamline-ws01"));
    (broker, connector)
}

// ---------------------------------------------------------------------------
// Submit
// ---------------------------------------------------------------------------

#[test]
fn submit_sets_status_and_local_host() {
    let (broker, connector) = setup();
    let mut bean = QueueBean::new("I1");

    connector.submit(&mut bean, QUEUE).unwrap();

    assert_eq!(bean.status(), Status::Submitted);
    assert_eq!(bean.host_name(), Some("beamline-ws01"));
    assert_eq!(broker.queue_ids(QUEUE), vec![bean.id]);

    // The broker received the stamped bean.
    let queued: Vec<QueueBean> = broker.queue_contents(QUEUE).unwrap();
    assert_eq!(queued[0].status, Status::Submitted);
    assert_eq!(queued[0].host_name.as_deref(), Some("beamline-ws01"));
}

#[test]
fn submit_never_overwrites_preset_host() {
    let (broker, connector) = setup();
    let mut bean = QueueBean::new("I1").host("remote-client");

    connector.submit(&mut bean, QUEUE).unwrap();

    assert_eq!(bean.host_name(), Some("remote-client"));
    let queued: Vec<QueueBean> = broker.queue_contents(QUEUE).unwrap();
    assert_eq!(queued[0].host_name.as_deref(), Some("remote-client"));
}

#[test]
fn host_resolution_failure_has_no_side_effects() {
    let broker = InMemoryBroker::new(URI);
    let config = ConnectorConfig::new(BrokerEndpoint::new(URI).unwrap());
    let connector = QueueConnector::new(broker.clone(), config).with_host_resolver(
        || -> queue_connector::Result<String> {
            Err(Error::HostResolution("no network".to_string()))
        },
    );
    let mut bean = QueueBean::new("I1");

    let err = connector.submit(&mut bean, QUEUE).unwrap_err();

    assert!(matches!(err, Error::HostResolution(_)));
    assert_eq!(bean.status(), Status::None);
    assert!(bean.host_name().is_none());
    assert_eq!(broker.queue_len(QUEUE), 0);
    assert_eq!(broker.connection_stats().submitters_opened, 0);
}

#[test]
fn preset_host_skips_resolution() {
    let broker = InMemoryBroker::new(URI);
    let config = ConnectorConfig::new(BrokerEndpoint::new(URI).unwrap());
    let connector = QueueConnector::new(broker.clone(), config).with_host_resolver(
        || -> queue_connector::Result<String> { panic!("resolver must not be called") },
    );
    let mut bean = QueueBean::new("I1").host("preset");

    connector.submit(&mut bean, QUEUE).unwrap();
    assert_eq!(broker.queue_len(QUEUE), 1);
}

#[test]
fn default_resolver_stamps_the_os_host_name() {
    let broker = InMemoryBroker::new(URI);
    let config = ConnectorConfig::new(BrokerEndpoint::new(URI).unwrap());
    let connector = QueueConnector::new(broker.clone(), config);
    let mut bean = QueueBean::new("I1");

    connector.submit(&mut bean, QUEUE).unwrap();

    let expected = SystemHostResolver.local_host_name().unwrap();
    assert!(!expected.is_empty());
    assert_eq!(bean.host_name(), Some(expected.as_str()));
    let queued: Vec<QueueBean> = broker.queue_contents(QUEUE).unwrap();
    assert_eq!(queued[0].host_name.as_deref(), Some(expected.as_str()));
}

#[test]
fn rejected_submit_is_a_submission_error() {
    let (broker, connector) = setup();
    broker.inject_failure(FailurePoint::Submit);
    let mut bean = QueueBean::new("I1");

    let err = connector.submit(&mut bean, QUEUE).unwrap_err();

    match err {
        Error::Submission { queue, source } => {
            assert_eq!(queue, QUEUE);
            assert!(matches!(source, BrokerError::Rejected(_)));
        }
        other => panic!("expected Submission, got {other:?}"),
    }
    // The bean was stamped before the broker refused it, and stays stamped.
    assert_eq!(bean.status(), Status::Submitted);
    assert_eq!(bean.host_name(), Some("beamline-ws01"));
    assert_eq!(broker.queue_len(QUEUE), 0);
    assert!(broker.connection_stats().is_balanced());
}

// ---------------------------------------------------------------------------
// Remove
// ---------------------------------------------------------------------------

#[test]
fn remove_twice_returns_true_then_false() {
    let (broker, connector) = setup();
    let mut bean = QueueBean::new("I1");
    connector.submit(&mut bean, QUEUE).unwrap();

    assert!(connector.remove(&bean, QUEUE).unwrap());
    assert_eq!(broker.queue_len(QUEUE), 0);
    assert!(!connector.remove(&bean, QUEUE).unwrap());
}

#[test]
fn remove_matches_identity_not_contents() {
    let (broker, connector) = setup();
    let mut bean = QueueBean::new("I1");
    connector.submit(&mut bean, QUEUE).unwrap();

    // Same identity, different contents.
    let mut stale = bean.clone();
    stale.name = "renamed".to_string();
    stale.status = Status::Running;

    assert!(connector.remove(&stale, QUEUE).unwrap());
    assert_eq!(broker.queue_len(QUEUE), 0);
}

// ---------------------------------------------------------------------------
// Reorder
// ---------------------------------------------------------------------------

fn submit_three(connector: &QueueConnector<InMemoryBroker>) -> Vec<QueueBean> {
    let mut beans: Vec<QueueBean> = ["I1", "I2", "I3"].into_iter().map(QueueBean::new).collect();
    for bean in &mut beans {
        connector.submit(bean, QUEUE).unwrap();
    }
    beans
}

#[test]
fn reorder_moves_toward_front_on_negative() {
    let (broker, connector) = setup();
    let beans = submit_three(&connector);

    assert!(connector.reorder(&beans[2], -2, QUEUE).unwrap());

    assert_eq!(
        broker.queue_ids(QUEUE),
        vec![beans[2].id, beans[0].id, beans[1].id]
    );
}

#[test]
fn reorder_moves_toward_back_on_positive() {
    let (broker, connector) = setup();
    let beans = submit_three(&connector);

    assert!(connector.reorder(&beans[0], 1, QUEUE).unwrap());

    assert_eq!(
        broker.queue_ids(QUEUE),
        vec![beans[1].id, beans[0].id, beans[2].id]
    );
}

#[test]
fn reorder_missing_bean_returns_false() {
    let (_broker, connector) = setup();
    submit_three(&connector);

    let ghost = QueueBean::new("ghost");
    assert!(!connector.reorder(&ghost, -1, QUEUE).unwrap());
}

#[test]
fn reorder_noop_at_boundary_returns_false() {
    let (broker, connector) = setup();
    let beans = submit_three(&connector);

    assert!(!connector.reorder(&beans[0], -1, QUEUE).unwrap());
    assert!(!connector.reorder(&beans[2], 5, QUEUE).unwrap());
    assert_eq!(
        broker.queue_ids(QUEUE),
        vec![beans[0].id, beans[1].id, beans[2].id]
    );
}

// ---------------------------------------------------------------------------
// Publish / subscribe
// ---------------------------------------------------------------------------

#[test]
fn publish_bean_broadcasts_current_state_unchanged() {
    let (broker, connector) = setup();
    let mut subscriber = connector
        .create_queue_subscriber::<QueueBean>(STATUS_TOPIC)
        .unwrap();

    let mut bean = QueueBean::new("I1").host("elsewhere");
    bean.status = Status::Running;
    bean.percent_complete = 42.0;
    let before = bean.clone();

    connector.publish_bean(&bean, STATUS_TOPIC).unwrap();

    assert_eq!(bean, before);
    let received = subscriber
        .poll(Duration::from_millis(100))
        .unwrap()
        .expect("subscriber should receive the bean");
    assert_eq!(received.status, Status::Running);
    assert_eq!(received.host_name.as_deref(), Some("elsewhere"));
    assert_eq!(received.percent_complete, 42.0);

    subscriber.disconnect().unwrap();
    assert_eq!(broker.queue_len(STATUS_TOPIC), 0);
}

#[test]
fn command_reaches_every_subscriber_exactly_once() {
    let (broker, connector) = setup();
    let mut bean = QueueBean::new("I1");
    connector.submit(&mut bean, QUEUE).unwrap();

    let mut first = connector
        .create_queue_subscriber::<ConsumerCommand>(COMMAND_TOPIC)
        .unwrap();
    let mut second = connector
        .create_queue_subscriber::<ConsumerCommand>(COMMAND_TOPIC)
        .unwrap();

    let pause = ConsumerCommand::pause().for_queue(QUEUE);
    connector.publish_command_bean(&pause, COMMAND_TOPIC).unwrap();

    for subscriber in [&mut first, &mut second] {
        let received = subscriber.drain().unwrap();
        assert_eq!(received, vec![pause.clone()]);
    }

    // Commands never touch queue contents.
    assert_eq!(broker.queue_ids(QUEUE), vec![bean.id]);

    first.disconnect().unwrap();
    second.disconnect().unwrap();
}

#[test]
fn subscriber_outlives_connector_and_is_caller_closed() {
    let (broker, connector) = setup();
    let mut subscriber = connector
        .create_queue_subscriber::<ConsumerCommand>(COMMAND_TOPIC)
        .unwrap();
    let publisher_side = connector.clone();
    drop(connector);

    publisher_side
        .publish_command_bean(&ConsumerCommand::resume(), COMMAND_TOPIC)
        .unwrap();
    assert_eq!(subscriber.drain().unwrap().len(), 1);
    assert_eq!(broker.connection_stats().live_subscribers, 1);

    subscriber.disconnect().unwrap();
    assert_eq!(broker.connection_stats().live_subscribers, 0);
}

#[test]
fn broadcasts_without_subscribers_are_dropped() {
    let (broker, connector) = setup();

    for _ in 0..10_000 {
        connector
            .publish_command_bean(&ConsumerCommand::pause(), COMMAND_TOPIC)
            .unwrap();
    }

    assert!(broker.published(COMMAND_TOPIC).is_empty());
    assert_eq!(broker.subscriber_count(COMMAND_TOPIC), 0);
    assert!(broker.connection_stats().is_balanced());
}

#[test]
fn failed_broadcast_is_a_publication_error() {
    let broker = InMemoryBroker::new(URI).with_history(16);
    let config = ConnectorConfig::new(BrokerEndpoint::new(URI).unwrap());
    let connector = QueueConnector::new(broker.clone(), config);
    broker.inject_failure(FailurePoint::Broadcast);

    let err = connector
        .publish_command_bean(&ConsumerCommand::terminate(), COMMAND_TOPIC)
        .unwrap_err();

    assert!(matches!(err, Error::Publication { ref topic, .. } if topic == COMMAND_TOPIC));
    assert!(broker.published(COMMAND_TOPIC).is_empty());

    // The failure was one-shot; the next broadcast goes through.
    connector
        .publish_command_bean(&ConsumerCommand::terminate(), COMMAND_TOPIC)
        .unwrap();
    assert_eq!(broker.published(COMMAND_TOPIC).len(), 1);
    assert!(broker.connection_stats().is_balanced());
}

#[test]
fn subscriber_on_unreachable_broker_fails() {
    let broker = InMemoryBroker::new(URI);
    let config = ConnectorConfig::new(BrokerEndpoint::new("memory://nowhere").unwrap());
    let connector = QueueConnector::new(broker, config);

    let result = connector.create_queue_subscriber::<ConsumerCommand>(COMMAND_TOPIC);
    assert!(matches!(
        result,
        Err(Error::Subscription {
            source: BrokerError::ConnectionFailed(_),
            ..
        })
    ));
}

// ---------------------------------------------------------------------------
// Handle discipline
// ---------------------------------------------------------------------------

#[test]
fn every_operation_balances_handles() {
    let (broker, connector) = setup();
    let mut bean = QueueBean::new("I1");

    connector.submit(&mut bean, QUEUE).unwrap();
    assert!(broker.connection_stats().is_balanced());
    connector.reorder(&bean, 1, QUEUE).unwrap();
    assert!(broker.connection_stats().is_balanced());
    connector.publish_bean(&bean, STATUS_TOPIC).unwrap();
    assert!(broker.connection_stats().is_balanced());
    connector.remove(&bean, QUEUE).unwrap();
    assert!(broker.connection_stats().is_balanced());

    let stats = broker.connection_stats();
    assert_eq!(stats.submitters_opened, 3);
    assert_eq!(stats.publishers_opened, 1);
}

#[test]
fn failing_operations_still_balance_handles() {
    let (broker, connector) = setup();
    let mut bean = QueueBean::new("I1");

    for point in [
        FailurePoint::Submit,
        FailurePoint::Remove,
        FailurePoint::Reorder,
        FailurePoint::Broadcast,
    ] {
        broker.inject_failure(point);
        let result = match point {
            FailurePoint::Submit => connector.submit(&mut bean, QUEUE),
            FailurePoint::Remove => connector.remove(&bean, QUEUE).map(drop),
            FailurePoint::Reorder => connector.reorder(&bean, -1, QUEUE).map(drop),
            _ => connector.publish_bean(&bean, STATUS_TOPIC),
        };
        assert!(result.is_err(), "{point:?} should fail");
        assert!(
            broker.connection_stats().is_balanced(),
            "{point:?} leaked a handle"
        );
    }
}

#[test]
fn release_failure_after_success_still_reports_success() {
    let (broker, connector) = setup();
    broker.inject_failure(FailurePoint::Disconnect);
    let mut bean = QueueBean::new("I1");

    connector.submit(&mut bean, QUEUE).unwrap();

    assert_eq!(broker.queue_len(QUEUE), 1);
    assert!(broker.connection_stats().is_balanced());
}

#[test]
fn concurrent_submits_each_use_their_own_handle() {
    let (broker, connector) = setup();

    std::thread::scope(|scope| {
        for worker in 0..8 {
            let connector = connector.clone();
            scope.spawn(move || {
                for n in 0..10 {
                    let mut bean = QueueBean::new(format!("w{worker}-{n}"));
                    connector.submit(&mut bean, QUEUE).unwrap();
                }
            });
        }
    });

    assert_eq!(broker.queue_len(QUEUE), 80);
    let stats = broker.connection_stats();
    assert_eq!(stats.submitters_opened, 80);
    assert!(stats.is_balanced());
}

#[test]
fn blank_topic_is_rejected() {
    let (broker, connector) = setup();
    let err = connector
        .publish_bean(&QueueBean::new("I1"), "")
        .unwrap_err();
    assert!(matches!(err, Error::InvalidChannel));
    assert_eq!(broker.connection_stats().publishers_opened, 0);
}
