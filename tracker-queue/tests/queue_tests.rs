#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::{
    fs,
    path::Path,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use tokio::sync::broadcast;
use tracker_common::Signal;
use tracker_queue::{MailQueue, QueueConfig, TaskError};

fn config(dir: &Path, retries: usize) -> QueueConfig {
    QueueConfig {
        maildir: dir.to_path_buf(),
        workers: 2,
        max_tasks_per_worker: 3,
        retry_delays_secs: vec![0; retries],
        idle_timeout_secs: 1,
    }
}

type Calls = Arc<Mutex<Vec<bool>>>;

/// A queue whose handler records the `log_failure` flag of every call and
/// answers with `outcome(call_number)`.
fn queue<F>(dir: &Path, retries: usize, outcome: F) -> (MailQueue, Calls)
where
    F: Fn(usize) -> Result<(), TaskError> + Send + Sync + 'static,
{
    let calls = Calls::default();
    let recorded = Arc::clone(&calls);
    let handler = move |_: &Path, log_failure: bool| {
        let call = {
            let mut calls = recorded.lock();
            calls.push(log_failure);
            calls.len()
        };
        outcome(call)
    };

    (
        MailQueue::new(config(dir, retries), Arc::new(handler)).unwrap(),
        calls,
    )
}

async fn run(queue: &mut MailQueue, stop_after: usize) {
    let (_shutdown, receiver) = broadcast::channel(1);
    tokio::time::timeout(
        Duration::from_secs(20),
        queue.process_loop(Some(stop_after), receiver),
    )
    .await
    .expect("queue settled in time")
    .unwrap();
}

fn count(dir: &Path) -> usize {
    fs::read_dir(dir).unwrap().count()
}

#[tokio::test]
async fn processed_messages_are_removed() {
    let dir = tempfile::tempdir().unwrap();
    let (mut queue, calls) = queue(dir.path(), 6, |_| Ok(()));

    for i in 0..5 {
        queue.maildir().deliver(format!("message {i}").as_bytes()).unwrap();
    }
    run(&mut queue, 5).await;

    assert_eq!(calls.lock().len(), 5);
    assert_eq!(queue.processed(), 5);
    assert!(queue.is_empty());
    assert_eq!(count(&queue.maildir().new_dir()), 0);
    assert_eq!(count(&queue.maildir().failed()), 0);
    assert_eq!(count(&queue.maildir().broken()), 0);
}

#[tokio::test]
async fn classified_failures_go_to_failed_at_once() {
    let dir = tempfile::tempdir().unwrap();
    let (mut queue, calls) = queue(dir.path(), 6, |_| {
        Err(TaskError::Classified("no delivery address".to_string()))
    });

    let path = queue.maildir().deliver(b"bad").unwrap();
    run(&mut queue, 1).await;

    assert_eq!(*calls.lock(), [false]);
    assert!(!path.exists());
    assert!(queue.maildir().failed().join(path.file_name().unwrap()).exists());
}

#[tokio::test]
async fn transient_failures_exhaust_the_retry_table() {
    let dir = tempfile::tempdir().unwrap();
    let (mut queue, calls) = queue(dir.path(), 6, |_| {
        Err(TaskError::Unclassified("store unavailable".to_string()))
    });

    let path = queue.maildir().deliver(b"unlucky").unwrap();
    run(&mut queue, 1).await;

    assert_eq!(
        *calls.lock(),
        [false, false, false, false, false, false, true]
    );
    assert!(queue.maildir().broken().join(path.file_name().unwrap()).exists());
    assert_eq!(count(&queue.maildir().new_dir()), 0);
    assert_eq!(count(&queue.maildir().failed()), 0);
}

#[tokio::test]
async fn panicking_handler_is_retried_then_broken() {
    let dir = tempfile::tempdir().unwrap();
    let (mut queue, calls) = queue(dir.path(), 1, |_| panic!("handler bug"));

    queue.maildir().deliver(b"boom").unwrap();
    run(&mut queue, 1).await;

    assert_eq!(*calls.lock(), [false, true]);
    assert_eq!(count(&queue.maildir().broken()), 1);
}

#[tokio::test]
async fn retry_can_succeed() {
    let dir = tempfile::tempdir().unwrap();
    let (mut queue, calls) = queue(dir.path(), 6, |call| {
        if call == 1 {
            Err(TaskError::Unclassified("temporary".to_string()))
        } else {
            Ok(())
        }
    });

    queue.maildir().deliver(b"flaky").unwrap();
    run(&mut queue, 1).await;

    assert_eq!(calls.lock().len(), 2);
    assert_eq!(count(&queue.maildir().new_dir()), 0);
    assert_eq!(count(&queue.maildir().broken()), 0);
}

#[tokio::test]
async fn messages_delivered_while_running_are_picked_up() {
    let dir = tempfile::tempdir().unwrap();
    let (mut queue, calls) = queue(dir.path(), 6, |_| Ok(()));
    let maildir = queue.maildir().clone();

    let (_shutdown, receiver) = broadcast::channel(1);
    let running = tokio::spawn(async move {
        queue.process_loop(Some(2), receiver).await.map(|()| queue)
    });

    tokio::time::sleep(Duration::from_millis(100)).await;
    maildir.deliver(b"late one").unwrap();
    maildir.deliver(b"late two").unwrap();

    let queue = tokio::time::timeout(Duration::from_secs(20), running)
        .await
        .expect("queue settled in time")
        .unwrap()
        .unwrap();

    assert_eq!(calls.lock().len(), 2);
    assert_eq!(queue.processed(), 2);
    assert_eq!(count(&maildir.new_dir()), 0);
}

#[tokio::test]
async fn shutdown_stops_the_loop() {
    let dir = tempfile::tempdir().unwrap();
    let (mut queue, _calls) = queue(dir.path(), 6, |_| Ok(()));

    let (shutdown, receiver) = broadcast::channel(1);
    let running = tokio::spawn(async move { queue.serve(receiver).await });

    tokio::time::sleep(Duration::from_millis(50)).await;
    shutdown.send(Signal::Shutdown).unwrap();

    tokio::time::timeout(Duration::from_secs(10), running)
        .await
        .expect("queue stopped in time")
        .unwrap()
        .unwrap();
}

#[test]
fn vanished_files_are_withdrawn() {
    let dir = tempfile::tempdir().unwrap();
    let (mut queue, _calls) = queue(dir.path(), 6, |_| Ok(()));

    let kept = queue.maildir().deliver(b"kept").unwrap();
    let gone = queue.maildir().deliver(b"gone").unwrap();
    assert_eq!(queue.scan().unwrap(), 2);
    assert_eq!(queue.scan().unwrap(), 0);

    fs::remove_file(&gone).unwrap();
    queue.scan().unwrap();

    assert_eq!(queue.len(), 1);
    assert!(
        queue
            .entry(kept.file_name().unwrap().to_str().unwrap())
            .is_some()
    );
}

#[test]
fn failed_attempt_waits_for_its_retry() {
    let dir = tempfile::tempdir().unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let counted = Arc::clone(&calls);
    let handler = move |_: &Path, _: bool| {
        counted.fetch_add(1, Ordering::SeqCst);
        Err(TaskError::Unclassified("later".to_string()))
    };
    let mut queue = MailQueue::new(
        QueueConfig {
            retry_delays_secs: vec![3600],
            idle_timeout_secs: 60,
            ..config(dir.path(), 0)
        },
        Arc::new(handler),
    )
    .unwrap();

    let path = queue.maildir().deliver(b"later").unwrap();
    let identifier = path.file_name().unwrap().to_str().unwrap().to_string();
    queue.scan().unwrap();

    let mut sleep = queue.tick().unwrap();
    for _ in 0..2000 {
        if queue.entry(&identifier).is_some_and(|entry| entry.tries == 1) {
            break;
        }
        std::thread::sleep(Duration::from_millis(5));
        sleep = queue.tick().unwrap();
    }

    let entry = queue.entry(&identifier).unwrap();
    assert_eq!(entry.tries, 1);
    assert!(entry.log_failure);
    assert!(!entry.is_running());
    assert_eq!(sleep, Duration::from_secs(60));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(path.exists());
}
