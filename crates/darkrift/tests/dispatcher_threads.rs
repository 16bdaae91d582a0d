//! Cross-thread dispatcher behaviour: queued execution, ordering and
//! failure reporting.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use darkrift::{
    CacheSettings, Dispatcher, DispatcherError, DispatcherTask, DispatcherTaskState, ObjectCache,
    TaskPanicked,
};
use parking_lot::Mutex;

fn setup() -> (ObjectCache, Arc<Dispatcher>) {
    let cache = ObjectCache::new(CacheSettings::default()).expect("default settings are valid");
    let dispatcher = Arc::new(Dispatcher::new(&cache));
    (cache, dispatcher)
}

#[test]
fn test_queued_tasks_run_in_fifo_order() {
    let (_cache, dispatcher) = setup();
    let order = Arc::new(Mutex::new(Vec::new()));

    let remote = dispatcher.clone();
    let log = order.clone();
    let tasks = thread::spawn(move || {
        (0..10)
            .map(|i| {
                let log = log.clone();
                remote.invoke_async(move || {
                    log.lock().push(i);
                    Ok(())
                })
            })
            .collect::<Vec<_>>()
    })
    .join()
    .unwrap();

    assert_eq!(dispatcher.count(), 10);
    assert!(order.lock().is_empty());
    assert!(tasks.iter().all(|task| task.state() == DispatcherTaskState::Queued));

    assert_eq!(dispatcher.execute_dispatcher_tasks().unwrap(), 10);
    assert_eq!(*order.lock(), (0..10).collect::<Vec<_>>());
    assert!(tasks
        .iter()
        .all(|task| task.state() == DispatcherTaskState::CompletedQueued));
}

#[test]
fn test_partial_failure_runs_every_task() {
    let (_cache, dispatcher) = setup();
    let ran = Arc::new(Mutex::new(Vec::new()));

    let remote = dispatcher.clone();
    let log = ran.clone();
    let tasks = thread::spawn(move || {
        let first_log = log.clone();
        let first = remote.invoke_async(move || {
            first_log.lock().push("first");
            Ok(())
        });
        let failing = remote.invoke_async(|| anyhow::bail!("second task failed"));
        let third = remote.invoke_async(move || {
            log.lock().push("third");
            Ok(())
        });
        [first, failing, third]
    })
    .join()
    .unwrap();

    let error = dispatcher.execute_dispatcher_tasks().unwrap_err();
    match &error {
        DispatcherError::TaskFailed { source, failed } => {
            assert_eq!(*failed, 1);
            assert_eq!(source.to_string(), "second task failed");
        }
        other => panic!("unexpected error: {other}"),
    }

    assert_eq!(*ran.lock(), vec!["first", "third"]);
    assert_eq!(tasks[0].state(), DispatcherTaskState::CompletedQueued);
    assert_eq!(tasks[1].state(), DispatcherTaskState::Failed);
    assert_eq!(tasks[2].state(), DispatcherTaskState::CompletedQueued);
    assert_eq!(dispatcher.count(), 0);
}

#[test]
fn test_panicking_task_is_captured() {
    let (_cache, dispatcher) = setup();
    let remote = dispatcher.clone();
    let task = thread::spawn(move || remote.invoke_async(|| panic!("handler exploded")))
        .join()
        .unwrap();

    let error = dispatcher.execute_dispatcher_tasks().unwrap_err();
    let failure = error.task_failure().unwrap();
    assert_eq!(
        failure.downcast_ref::<TaskPanicked>().unwrap().message,
        "handler exploded"
    );
    assert_eq!(task.state(), DispatcherTaskState::Failed);
}

#[test]
fn test_suppressed_failures_only_mark_tasks() {
    let cache = ObjectCache::new(CacheSettings::default()).unwrap();
    let dispatcher = Arc::new(Dispatcher::new(&cache).report_failures(false));

    let remote = dispatcher.clone();
    let task = thread::spawn(move || remote.invoke_async(|| anyhow::bail!("ignored")))
        .join()
        .unwrap();

    assert_eq!(dispatcher.execute_dispatcher_tasks().unwrap(), 1);
    assert_eq!(task.state(), DispatcherTaskState::Failed);
}

#[test]
fn test_tasks_queued_during_drain_wait_for_next_pump() {
    let (_cache, dispatcher) = setup();
    let remote = dispatcher.clone();
    let nested = dispatcher.clone();

    // The queued task enqueues another one from a helper thread while the
    // executor is draining.
    let _outer = thread::spawn(move || {
        remote.invoke_async(move || {
            let inner = nested.clone();
            thread::spawn(move || drop(inner.invoke_async(|| Ok(()))))
                .join()
                .map_err(|_| anyhow::anyhow!("helper thread panicked"))?;
            Ok(())
        })
    })
    .join()
    .unwrap();

    assert_eq!(dispatcher.execute_dispatcher_tasks().unwrap(), 1);
    assert_eq!(dispatcher.count(), 1);
    assert_eq!(dispatcher.execute_dispatcher_tasks().unwrap(), 1);
    assert_eq!(dispatcher.count(), 0);
}

#[test]
fn test_invoke_wait_blocks_until_pumped() {
    let (_cache, dispatcher) = setup();
    let remote = dispatcher.clone();

    let waiter = thread::spawn(move || remote.invoke_wait_fn(|| Ok(thread::current().id())));

    while !dispatcher.wait_for_tasks(Duration::from_millis(50)) {}
    assert_eq!(dispatcher.execute_dispatcher_tasks().unwrap(), 1);

    let ran_on = waiter.join().unwrap().unwrap();
    assert_eq!(ran_on, thread::current().id());
}

#[test]
fn test_many_producers_all_delivered() {
    let (_cache, dispatcher) = setup();
    let total = Arc::new(Mutex::new(0usize));

    let producers: Vec<_> = (0..4)
        .map(|_| {
            let remote = dispatcher.clone();
            let total = total.clone();
            thread::spawn(move || {
                for _ in 0..250 {
                    let total = total.clone();
                    drop(remote.invoke_async(move || {
                        *total.lock() += 1;
                        Ok(())
                    }));
                }
            })
        })
        .collect();

    let mut executed = 0;
    while producers.iter().any(|producer| !producer.is_finished()) || dispatcher.count() > 0 {
        executed += dispatcher.execute_dispatcher_tasks().unwrap();
        thread::yield_now();
    }
    for producer in producers {
        producer.join().unwrap();
    }
    executed += dispatcher.execute_dispatcher_tasks().unwrap();

    assert_eq!(executed, 1000);
    assert_eq!(*total.lock(), 1000);
}

#[test]
fn test_dropped_handles_recycle_cores_after_drain() {
    let (cache, dispatcher) = setup();

    let remote = dispatcher.clone();
    thread::spawn(move || {
        for _ in 0..100 {
            drop(remote.invoke_async(|| Ok(())));
        }
    })
    .join()
    .unwrap();

    assert_eq!(dispatcher.execute_dispatcher_tasks().unwrap(), 100);
    let cores = cache.statistics().action_dispatcher_tasks;
    assert_eq!(cores.misses, 100);
    assert_eq!(cores.returned, 16);
    assert_eq!(cores.discarded, 84);
    assert_eq!(cores.available, 16);

    // The next burst from another thread is served from the pool
    let remote = dispatcher.clone();
    let tasks = thread::spawn(move || {
        (0..4)
            .map(|_| remote.invoke_async(|| Ok(())))
            .collect::<Vec<_>>()
    })
    .join()
    .unwrap();
    assert_eq!(cache.statistics().action_dispatcher_tasks.hits, 4);
    assert!(tasks.iter().all(|task| task.state() == DispatcherTaskState::Queued));

    // Handles still held when the drain runs recycle on their own drop
    dispatcher.execute_dispatcher_tasks().unwrap();
    assert_eq!(cache.statistics().action_dispatcher_tasks.available, 12);
    drop(tasks);
    assert_eq!(cache.statistics().action_dispatcher_tasks.available, 16);
}
