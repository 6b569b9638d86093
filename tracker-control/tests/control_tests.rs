#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::{collections::BTreeSet, sync::Arc};

use chrono::{Duration, Utc};
use pretty_assertions::assert_eq;
use tracker_common::{Email, TrackerConfig};
use tracker_control::{CommandProcessor, ControlHandler, ControlOutcome};
use tracker_dispatch::{Dispatcher, OutgoingMessage, transport::MemoryTransport};
use tracker_store::{
    CommandConfirmation, MemoryStore, PackageKind, Subscription, SubscriberStore, Team,
    TeamMembership,
};

const FQDN: &str = "tracker.example.org";
const JANE: &str = "jane@example.com";

struct Fixture {
    handler: ControlHandler,
    dispatcher: Dispatcher,
    store: Arc<MemoryStore>,
    transport: Arc<MemoryTransport>,
}

fn fixture() -> Fixture {
    let store = Arc::new(MemoryStore::new());
    let transport = Arc::new(MemoryTransport::new());

    store.add_package("dpkg", PackageKind::Source);
    store.add_package(
        "dpkg-dev",
        PackageKind::Binary {
            source: "dpkg".to_string(),
        },
    );
    store.add_package("qa.debian.org", PackageKind::Pseudo);

    let dispatcher = Dispatcher::new(
        Arc::new(TrackerConfig::new(FQDN).unwrap()),
        store.clone(),
        transport.clone(),
    );

    Fixture {
        handler: ControlHandler::new(dispatcher.clone()),
        dispatcher,
        store,
        transport,
    }
}

fn control_mail(subject: &str, body: &str) -> Email {
    Email::parse(format!(
        "From: Jane Doe <{JANE}>\r\n\
         To: control@{FQDN}\r\n\
         Subject: {subject}\r\n\
         Message-ID: <cmd-1@example.com>\r\n\
         \r\n\
         {body}"
    ))
    .unwrap()
}

fn text(message: &OutgoingMessage) -> String {
    String::from_utf8_lossy(&message.data).into_owned()
}

fn confirmation_key(messages: &[OutgoingMessage]) -> String {
    messages
        .iter()
        .find_map(|message| {
            text(message)
                .lines()
                .find_map(|line| line.strip_prefix("Subject: CONFIRM "))
                .map(|key| key.trim().to_string())
        })
        .expect("a confirmation request")
}

fn subscribe(store: &MemoryStore, email: &str, package: &str) {
    store.insert_subscription(Subscription {
        email: email.to_string(),
        package: package.to_string(),
        active: true,
        keywords: None,
    });
}

#[test]
fn subscription_waits_for_confirmation() {
    let f = fixture();

    let outcome = f
        .handler
        .handle(&control_mail("hello", "subscribe dpkg\r\nthanks\r\n"))
        .unwrap();
    assert_eq!(outcome, ControlOutcome::Replied { confirmations: 1 });

    let subscription = f.store.subscription(JANE, "dpkg").unwrap().unwrap();
    assert!(!subscription.active);

    let sent = f.transport.take();
    assert_eq!(sent.len(), 2);

    let key = confirmation_key(&sent);
    let stored = f.store.confirmation(&key).unwrap().unwrap();
    assert_eq!(stored.commands, ["subscribe dpkg jane@example.com"]);

    let reply = sent
        .iter()
        .find(|message| text(message).contains("Subject: Re: hello"))
        .unwrap();
    let body = text(reply);
    assert!(body.contains("> subscribe dpkg"));
    assert!(body.contains("A confirmation mail has been sent to jane@example.com"));
    assert!(body.contains("Stopping processing here."));
    assert!(body.contains("In-Reply-To: <cmd-1@example.com>"));
    assert!(body.contains(&format!("X-Loop: control@{FQDN}")));
}

#[test]
fn confirming_by_reply_subject_activates_subscription() {
    let f = fixture();

    f.handler
        .handle(&control_mail("subscribe dpkg", ""))
        .unwrap();
    let key = confirmation_key(&f.transport.take());

    let outcome = f
        .handler
        .handle(&control_mail(&format!("Re: CONFIRM {key}"), ""))
        .unwrap();
    assert_eq!(outcome, ControlOutcome::Replied { confirmations: 0 });

    assert!(f.store.is_subscribed(JANE, "dpkg").unwrap());
    assert!(f.store.confirmation(&key).unwrap().is_none());

    let sent = f.transport.take();
    assert_eq!(sent.len(), 1);
    let body = text(&sent[0]);
    assert!(body.contains("Successfully confirmed commands:"));
    assert!(body.contains("jane@example.com has been subscribed to dpkg"));
}

#[test]
fn refused_confirmation_request_does_not_hold_back_the_rest() {
    let f = fixture();
    f.transport.reject("gone@example.com");

    let outcome = f
        .handler
        .handle(&control_mail(
            "hello",
            "subscribe dpkg gone@example.com\r\nsubscribe dpkg john@example.com\r\n",
        ))
        .unwrap();
    assert_eq!(outcome, ControlOutcome::Replied { confirmations: 1 });

    let sent = f.transport.take();
    assert_eq!(sent.len(), 2);
    assert!(sent.iter().all(|message| {
        !message.recipients.iter().any(|recipient| recipient == "gone@example.com")
    }));

    let key = confirmation_key(&sent);
    assert_eq!(
        f.store.confirmation(&key).unwrap().unwrap().commands,
        ["subscribe dpkg john@example.com"]
    );
    // Only the request that went out keeps a key.
    assert_eq!(
        f.store
            .purge_confirmations(Utc::now() + Duration::days(1))
            .unwrap(),
        1
    );
}

#[test]
fn address_arguments_must_be_addresses() {
    let f = fixture();
    let mut processor = CommandProcessor::new(&f.dispatcher, Some(JANE));

    processor
        .process(["subscribe dpkg localonly", "join-team qa nobody"])
        .unwrap();

    assert!(!processor.is_success());
    assert!(processor.confirmations().is_empty());
    assert!(f.store.subscription("localonly", "dpkg").unwrap().is_none());
}

#[test]
fn binary_packages_map_to_their_source() {
    let f = fixture();
    let mut processor = CommandProcessor::new(&f.dispatcher, Some(JANE));

    processor.process(["subscribe dpkg-dev"]).unwrap();

    assert_eq!(
        processor.confirmations().commands_for(JANE),
        ["subscribe dpkg jane@example.com"]
    );
    let output = processor.output();
    assert!(output.contains("Warning: dpkg-dev is not a source package."));
    assert!(output.contains("dpkg is the source package for the dpkg-dev binary package"));
}

#[test]
fn unknown_packages_are_refused() {
    let f = fixture();
    let mut processor = CommandProcessor::new(&f.dispatcher, Some(JANE));

    processor
        .process(["subscribe nosuchpkg", "subscribe qa.debian.org"])
        .unwrap();

    let output = processor.output();
    assert!(output.contains("Warning: Package nosuchpkg is not even a pseudo package."));
    assert!(output.contains("Warning: Package nosuchpkg does not exist"));
    assert!(output.contains("Warning: Package qa.debian.org is a pseudo package."));
    assert!(!output.contains("Package qa.debian.org does not exist"));
    assert_eq!(
        processor.confirmations().commands_for(JANE),
        ["subscribe qa.debian.org jane@example.com"]
    );
}

#[test]
fn already_subscribed_is_a_warning() {
    let f = fixture();
    subscribe(&f.store, JANE, "dpkg");
    let mut processor = CommandProcessor::new(&f.dispatcher, Some(JANE));

    processor.process(["subscribe dpkg"]).unwrap();

    assert!(processor.confirmations().is_empty());
    assert!(
        processor
            .output()
            .contains("Warning: jane@example.com is already subscribed to dpkg")
    );
}

#[test]
fn unknown_and_expired_keys_fail() {
    let f = fixture();
    f.store.insert_confirmation(CommandConfirmation {
        key: "OLDKEY".to_string(),
        commands: vec!["subscribe dpkg jane@example.com".to_string()],
        created: Utc::now() - Duration::days(4),
    });

    let mut processor = CommandProcessor::new(&f.dispatcher, Some(JANE));
    processor
        .process(["confirm NOSUCHKEY", "confirm OLDKEY"])
        .unwrap();

    assert_eq!(
        processor
            .output()
            .matches("Error: Confirmation failed: unknown key.")
            .count(),
        2
    );
    assert!(f.store.confirmation("OLDKEY").unwrap().is_none());
    assert!(!f.store.is_subscribed(JANE, "dpkg").unwrap());
}

#[test]
fn unsubscribeall_lists_every_package() {
    let f = fixture();
    f.store.add_package("apt", PackageKind::Source);
    subscribe(&f.store, JANE, "dpkg");
    subscribe(&f.store, JANE, "apt");

    f.handler
        .handle(&control_mail("unsubscribeall", ""))
        .unwrap();
    let key = confirmation_key(&f.transport.take());

    let mut processor = CommandProcessor::new(&f.dispatcher, None);
    processor.process([format!("confirm {key}").as_str()]).unwrap();

    let output = processor.output();
    assert!(output.contains("All your subscriptions have been terminated:"));
    assert!(output.contains(&format!(
        "* jane@example.com has been unsubscribed from apt@{FQDN}\n\
         * jane@example.com has been unsubscribed from dpkg@{FQDN}"
    )));
    assert!(f.store.subscriptions_of(JANE).unwrap().is_empty());
}

#[test]
fn who_obfuscates_subscribers() {
    let f = fixture();
    subscribe(&f.store, JANE, "dpkg");
    let mut processor = CommandProcessor::new(&f.dispatcher, Some(JANE));

    processor.process(["who dpkg", "who nosuchpkg"]).unwrap();

    let output = processor.output();
    assert!(output.contains("Here's the list of subscribers to package dpkg:\n* jane@e.......c.."));
    assert!(output.contains("Error: Package nosuchpkg does not exist"));
}

#[test]
fn package_keywords_start_from_defaults() {
    let f = fixture();
    subscribe(&f.store, JANE, "dpkg");
    let mut processor = CommandProcessor::new(&f.dispatcher, Some(JANE));

    processor
        .process(["keyword dpkg + vcs, nonsense", "keyword dpkg - bts"])
        .unwrap();

    let keywords = f
        .store
        .subscription(JANE, "dpkg")
        .unwrap()
        .unwrap()
        .keywords
        .unwrap();
    assert!(keywords.contains("vcs"));
    assert!(keywords.contains("summary"));
    assert!(!keywords.contains("bts"));
    assert!(!keywords.contains("nonsense"));
    assert!(
        processor
            .output()
            .contains("Warning: nonsense is not a valid keyword")
    );

    let mut processor = CommandProcessor::new(&f.dispatcher, Some(JANE));
    processor.process(["keyword apt = vcs"]).unwrap();
    assert!(
        processor
            .output()
            .contains("Error: Package apt does not exist")
    );
}

#[test]
fn default_keywords_can_be_replaced() {
    let f = fixture();
    let mut processor = CommandProcessor::new(&f.dispatcher, Some(JANE));

    processor.process(["keyword = bts summary"]).unwrap();

    assert_eq!(
        f.store.default_keywords(JANE).unwrap(),
        BTreeSet::from(["bts".to_string(), "summary".to_string()])
    );
    assert!(processor.output().contains(
        "Here's the new default list of accepted keywords for jane@example.com :\n* bts\n* summary"
    ));
}

fn team(slug: &str, public: bool, members: &[&str]) -> Team {
    Team {
        slug: slug.to_string(),
        name: format!("The {slug} team"),
        public,
        owner_email: "owner@example.com".to_string(),
        packages: BTreeSet::from(["dpkg".to_string()]),
        members: members.iter().map(|email| TeamMembership::new(*email)).collect(),
    }
}

#[test]
fn joining_teams() {
    let f = fixture();
    f.store.add_team(team("qa", true, &[]));
    f.store.add_team(team("secret", false, &[]));

    let mut processor = CommandProcessor::new(&f.dispatcher, Some(JANE));
    processor
        .process(["join-team secret", "join-team nope", "join-team qa"])
        .unwrap();

    let output = processor.output();
    assert!(output.contains(
        "Error: The given team is not public. Please contact owner@example.com if you wish to join"
    ));
    assert!(output.contains("Error: Team with the slug \"nope\" does not exist."));
    assert_eq!(
        processor.confirmations().commands_for(JANE),
        ["join-team qa jane@example.com"]
    );

    let mut confirmed = CommandProcessor::new(&f.dispatcher, None).confirmed();
    confirmed.process(["join-team qa jane@example.com"]).unwrap();
    assert!(
        confirmed
            .output()
            .contains("You have successfully joined the team \"The qa team\"")
    );
    assert!(f.store.team("qa").unwrap().unwrap().is_member(JANE));
}

#[test]
fn private_team_packages_need_membership() {
    let f = fixture();
    f.store.add_team(team("secret", false, &["john@example.com"]));

    let mut outsider = CommandProcessor::new(&f.dispatcher, Some(JANE));
    outsider.process(["list-team-packages secret"]).unwrap();
    assert!(
        outsider
            .output()
            .contains("Error: The team is private. Only team members can see its packages.")
    );

    let mut member = CommandProcessor::new(&f.dispatcher, Some("john@example.com"));
    member
        .process(["list-team-packages secret", "which-teams", "leave-team secret"])
        .unwrap();
    let output = member.output();
    assert!(output.contains("Packages found in team The secret team:\n* dpkg"));
    assert!(output.contains("Teams that john@example.com is a member of:\n* secret"));
    assert_eq!(
        member.confirmations().commands_for("john@example.com"),
        ["leave-team secret john@example.com"]
    );
}

#[test]
fn loops_and_empty_mail_get_no_reply() {
    let f = fixture();

    let looped = Email::parse(format!(
        "From: {JANE}\r\nX-Loop: control@{FQDN}\r\nSubject: help\r\n\r\nhelp\r\n"
    ))
    .unwrap();
    assert_eq!(f.handler.handle(&looped).unwrap(), ControlOutcome::Looped);

    let chatter = Email::parse(format!("From: {JANE}\r\n\r\nhello there\r\n")).unwrap();
    assert_eq!(
        f.handler.handle(&chatter).unwrap(),
        ControlOutcome::NoCommands
    );

    assert!(f.transport.sent().is_empty());
}

#[test]
fn html_only_mail_gets_a_warning() {
    let f = fixture();
    let html = Email::parse(format!(
        "From: {JANE}\r\n\
         Subject: help\r\n\
         Content-Type: text/html\r\n\
         \r\n\
         <p>help</p>\r\n"
    ))
    .unwrap();

    assert_eq!(
        f.handler.handle(&html).unwrap(),
        ControlOutcome::NotPlainText
    );

    let sent = f.transport.take();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].recipients, [JANE]);
    assert!(text(&sent[0]).contains("text/plain part"));
}
