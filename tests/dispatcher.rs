//! End-to-end behaviour of a single dispatcher: ordering, execution-count,
//! abort and wait semantics as seen by producer and waiter threads.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use task_dispatch::Dispatcher;

fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn tasks_run_in_enqueue_order_within_one_drain() {
    init_logs();
    let dispatcher = Dispatcher::new();
    let output = Arc::new(Mutex::new(Vec::new()));

    // Dispatch a, b, c from one producer thread; a single drain on the
    // owning thread must yield exactly [a, b, c].
    {
        let producer = dispatcher.clone();
        let output = output.clone();
        thread::spawn(move || {
            for id in ["a", "b", "c"] {
                let output = output.clone();
                producer
                    .dispatch(move || output.lock().unwrap().push(id))
                    .unwrap();
            }
        })
        .join()
        .unwrap();
    }

    dispatcher.process_tasks();
    assert_eq!(*output.lock().unwrap(), vec!["a", "b", "c"]);
}

#[test]
fn long_sequences_stay_in_order() {
    init_logs();
    let dispatcher = Dispatcher::new();
    let output = Arc::new(Mutex::new(Vec::new()));

    let producer = dispatcher.clone();
    let record = output.clone();
    thread::spawn(move || {
        for index in 0..200 {
            let record = record.clone();
            producer
                .dispatch(move || record.lock().unwrap().push(index))
                .unwrap();
        }
    })
    .join()
    .unwrap();

    dispatcher.process_tasks();
    let output = output.lock().unwrap();
    assert_eq!(output.len(), 200);
    assert!(output.windows(2).all(|pair| pair[0] < pair[1]));
}

#[test]
fn each_task_runs_at_most_once_across_repeated_drains() {
    init_logs();
    let dispatcher = Dispatcher::new();
    let runs = Arc::new(AtomicUsize::new(0));

    let producer = dispatcher.clone();
    let counter = runs.clone();
    thread::spawn(move || {
        for _ in 0..10 {
            let counter = counter.clone();
            producer
                .dispatch(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap();
        }
    })
    .join()
    .unwrap();

    dispatcher.process_tasks();
    dispatcher.process_tasks();
    while dispatcher.process_next_task() {}
    assert_eq!(runs.load(Ordering::SeqCst), 10);
}

#[test]
fn abort_before_processing_skips_the_body() {
    init_logs();
    let dispatcher = Dispatcher::new();
    let ran = Arc::new(AtomicUsize::new(0));

    let producer = dispatcher.clone();
    let counter = ran.clone();
    let task = thread::spawn(move || {
        producer
            .dispatch(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap()
    })
    .join()
    .unwrap();

    task.abort();
    dispatcher.process_tasks();

    assert_eq!(ran.load(Ordering::SeqCst), 0);
    assert!(task.has_ended());
    assert!(task.is_failed());
    assert!(!task.is_succeeded());
}

#[test]
fn every_waiter_unblocks_once_the_task_ends() {
    init_logs();
    let dispatcher = Dispatcher::new();

    let producer = dispatcher.clone();
    let task = thread::spawn(move || producer.dispatch(|| ()).unwrap())
        .join()
        .unwrap();

    let waiters: Vec<_> = (0..4)
        .map(|_| {
            let task = task.clone();
            thread::spawn(move || {
                task.wait();
                // The wait contract: returning implies the task has ended.
                task.has_ended()
            })
        })
        .collect();

    thread::sleep(Duration::from_millis(30));
    dispatcher.process_tasks();

    for waiter in waiters {
        assert!(waiter.join().unwrap());
    }
}

#[test]
fn wait_timeout_expires_then_wait_sees_completion() {
    init_logs();
    let (tx, rx) = std::sync::mpsc::channel();

    // The consumer thread owns the dispatcher and drains it as soon as work
    // arrives; the task body sleeps for twice the waiter's patience.
    let consumer = thread::spawn(move || {
        let dispatcher = Dispatcher::new();
        tx.send(dispatcher.clone()).unwrap();
        let never_exit = task_dispatch::ManualResetEvent::new(false);
        assert!(dispatcher.process_tasks_blocking(&never_exit));
    });

    let dispatcher = rx.recv().unwrap();
    let task = dispatcher
        .dispatch(|| thread::sleep(Duration::from_millis(120)))
        .unwrap();

    let waited = Instant::now();
    assert!(!task.wait_timeout(Duration::from_millis(60)));
    assert!(waited.elapsed() >= Duration::from_millis(60));
    assert!(!task.has_ended());

    task.wait();
    assert!(task.has_ended());
    assert!(task.is_succeeded());
    consumer.join().unwrap();
}
