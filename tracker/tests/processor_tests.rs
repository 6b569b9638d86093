#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::{collections::BTreeSet, sync::Arc, time::Duration};

use chrono::Utc;
use pretty_assertions::assert_eq;
use tokio::sync::broadcast;
use tracker::{MailError, MailOutcome, MailProcessor};
use tracker_common::{TrackerConfig, verp};
use tracker_control::ControlOutcome;
use tracker_dispatch::{
    BounceOutcome, DispatchError, Dispatcher, ForwardOutcome, RoutingError,
    forward::bounce_address, transport::MemoryTransport,
};
use tracker_queue::{MailQueue, MessageHandler, QueueConfig, TaskError};
use tracker_store::{
    MemoryStore, PackageKind, Subscription, SubscriberStore, Team, TeamMembership,
};

const FQDN: &str = "tracker.example.org";

struct Fixture {
    processor: MailProcessor,
    store: Arc<MemoryStore>,
    transport: Arc<MemoryTransport>,
}

fn fixture() -> Fixture {
    let config = Arc::new(TrackerConfig::new(FQDN).unwrap());
    let store = Arc::new(MemoryStore::new());
    let transport = Arc::new(MemoryTransport::new());

    store.add_package("dpkg", PackageKind::Source);
    for email in ["jane@example.com", "john@example.com"] {
        store.insert_subscription(Subscription {
            email: email.to_string(),
            package: "dpkg".to_string(),
            active: true,
            keywords: None,
        });
    }
    store.add_team(Team {
        slug: "qa".to_string(),
        name: "Quality Assurance".to_string(),
        public: true,
        owner_email: "lead@example.com".to_string(),
        packages: BTreeSet::from(["dpkg".to_string()]),
        members: vec![TeamMembership::new("lead@example.com")],
    });

    Fixture {
        processor: MailProcessor::new(Dispatcher::new(config, store.clone(), transport.clone())),
        store,
        transport,
    }
}

fn message(delivered_to: &str, body: &str) -> String {
    format!(
        "Delivered-To: {delivered_to}\r\n\
         From: Jane Doe <jane@example.com>\r\n\
         Subject: dpkg news\r\n\
         Message-ID: <news-1@example.com>\r\n\
         \r\n\
         {body}\r\n"
    )
}

#[test]
fn package_mail_reaches_subscribers() {
    let Fixture {
        processor,
        transport,
        ..
    } = fixture();

    let outcome = processor
        .process(message(&format!("dispatch+dpkg_bts@{FQDN}"), "A new bug"))
        .unwrap();

    assert_eq!(
        outcome,
        MailOutcome::Dispatch(ForwardOutcome::Forwarded {
            delivered: 3,
            failed: 0
        })
    );
    let mut recipients = transport
        .sent()
        .into_iter()
        .flat_map(|message| message.recipients)
        .collect::<Vec<_>>();
    recipients.sort();
    assert_eq!(
        recipients,
        ["jane@example.com", "john@example.com", "lead@example.com"]
    );
}

#[test]
fn control_mail_is_answered() {
    let Fixture {
        processor,
        store,
        transport,
    } = fixture();

    let outcome = processor
        .process(message(&format!("control@{FQDN}"), "subscribe dpkg carol@example.com"))
        .unwrap();

    assert!(matches!(
        outcome,
        MailOutcome::Control(ControlOutcome::Replied { confirmations: 1 })
    ));
    assert!(!transport.sent().is_empty());
    let pending = store.subscription("carol@example.com", "dpkg").unwrap().unwrap();
    assert!(!pending.active);
}

#[test]
fn bounce_is_recorded_for_its_user() {
    let Fixture {
        processor, store, ..
    } = fixture();
    let config = TrackerConfig::new(FQDN).unwrap();
    let today = Utc::now().date_naive();
    let address = verp::encode(&bounce_address(&config, today), "jane@example.com").unwrap();

    let outcome = processor.process(message(&address, "Undeliverable")).unwrap();

    assert_eq!(outcome, MailOutcome::Bounces(BounceOutcome::Recorded));
    let stats = store.bounce_stats("jane@example.com").unwrap();
    assert_eq!(stats.len(), 1);
    assert_eq!(stats[0].date, today);
    assert_eq!(stats[0].bounced, 1);
}

#[test]
fn team_mail_reaches_members() {
    let Fixture {
        processor,
        transport,
        ..
    } = fixture();

    let outcome = processor
        .process(message(&format!("team+qa@{FQDN}"), "Team meeting"))
        .unwrap();

    assert_eq!(
        outcome,
        MailOutcome::Team(ForwardOutcome::Forwarded {
            delivered: 1,
            failed: 0
        })
    );
    assert_eq!(transport.sent()[0].recipients, ["lead@example.com"]);
}

#[test]
fn delivery_problems_are_classified() {
    let Fixture {
        processor,
        transport,
        ..
    } = fixture();

    let missing = processor.process(message("someone@example.com", "hi"));
    assert!(matches!(
        missing,
        Err(MailError::Routing(RoutingError::MissingDeliveryAddress))
    ));

    let conflicting = processor.process(format!(
        "Delivered-To: control@{FQDN}\r\n{}",
        message(&format!("dispatch+dpkg@{FQDN}"), "hi")
    ));
    assert!(matches!(
        conflicting,
        Err(MailError::Routing(
            RoutingError::ConflictingDeliveryAddresses(_, _)
        ))
    ));

    let invalid = processor.process(message(&format!("nonsense@{FQDN}"), "hi"));
    assert!(matches!(
        invalid,
        Err(MailError::Routing(RoutingError::InvalidDeliveryAddress(_)))
    ));

    let malformed = processor.process(Vec::new());
    assert!(matches!(
        malformed,
        Err(MailError::Routing(RoutingError::MalformedMessage(_)))
    ));

    for error in [missing, conflicting, invalid, malformed] {
        assert!(error.unwrap_err().is_classified());
    }
    assert!(transport.sent().is_empty());
}

#[test]
fn unreachable_transport_is_not_classified() {
    let Fixture {
        processor,
        transport,
        ..
    } = fixture();
    transport.set_unreachable(true);

    let error = processor
        .process(message(&format!("dispatch+dpkg_bts@{FQDN}"), "A new bug"))
        .unwrap_err();

    assert!(matches!(
        error,
        MailError::Dispatch(DispatchError::Transport(_))
    ));
    assert!(!error.is_classified());
}

#[test]
fn handler_reports_failures_to_the_queue() {
    let Fixture {
        processor,
        transport,
        ..
    } = fixture();
    let dir = tempfile::tempdir().unwrap();

    let good = dir.path().join("good");
    std::fs::write(&good, message(&format!("dispatch+dpkg_bts@{FQDN}"), "ok")).unwrap();
    assert_eq!(processor.handle(&good, false), Ok(()));

    let bad = dir.path().join("bad");
    std::fs::write(&bad, message("someone@example.com", "lost")).unwrap();
    assert!(matches!(
        processor.handle(&bad, false),
        Err(TaskError::Classified(_))
    ));

    assert!(matches!(
        processor.handle(&dir.path().join("missing"), true),
        Err(TaskError::Unclassified(_))
    ));

    transport.set_unreachable(true);
    assert!(matches!(
        processor.handle(&good, true),
        Err(TaskError::Unclassified(_))
    ));
}

#[tokio::test]
async fn queue_routes_messages_end_to_end() {
    let Fixture {
        processor,
        transport,
        ..
    } = fixture();
    let dir = tempfile::tempdir().unwrap();

    let mut queue = MailQueue::new(
        QueueConfig {
            retry_delays_secs: vec![0; 6],
            idle_timeout_secs: 1,
            ..QueueConfig::with_maildir(dir.path())
        },
        Arc::new(processor),
    )
    .unwrap();

    queue
        .maildir()
        .deliver(message(&format!("dispatch+dpkg_bts@{FQDN}"), "A new bug").as_bytes())
        .unwrap();
    let lost = queue
        .maildir()
        .deliver(message("someone@example.com", "lost").as_bytes())
        .unwrap();

    let (_shutdown, receiver) = broadcast::channel(1);
    tokio::time::timeout(Duration::from_secs(20), queue.process_loop(Some(2), receiver))
        .await
        .expect("queue settled in time")
        .unwrap();

    assert_eq!(transport.sent().len(), 3);
    assert_eq!(std::fs::read_dir(queue.maildir().new_dir()).unwrap().count(), 0);
    assert!(queue.maildir().failed().join(lost.file_name().unwrap()).exists());
}
