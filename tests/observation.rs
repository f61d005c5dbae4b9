//! Integration tests for the observation engine.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use prefstore::{Key, ObservationOptions, PropagationScope, Suite};

fn counting<T: Send + 'static>(
) -> (Arc<AtomicUsize>, impl Fn(prefstore::ChangeRecord<T>) + Send + Sync + 'static) {
    let calls = Arc::new(AtomicUsize::new(0));
    let sink = calls.clone();
    (calls, move |_| {
        sink.fetch_add(1, Ordering::SeqCst);
    })
}

// --- Delivery Basics ---

#[test]
fn test_observer_sees_old_and_new() {
    let suite = Suite::in_memory();
    let volume = Key::new("volume", &suite, 50i64).unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let _obs = volume.observe(ObservationOptions::default(), move |change| {
        sink.lock().unwrap().push((change.old_value, change.new_value));
    });

    volume.set(80);
    volume.set(20);
    volume.reset();

    assert_eq!(
        *seen.lock().unwrap(),
        vec![(50, 80), (80, 20), (20, 50)]
    );
}

#[test]
fn test_initial_option_synthesizes_current_value() {
    let suite = Suite::in_memory();
    let volume = Key::new("volume", &suite, 50i64).unwrap();
    volume.set(70);

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let _obs = volume.observe(ObservationOptions::initial(), move |change| {
        sink.lock().unwrap().push((change.old_value, change.new_value));
    });

    assert_eq!(*seen.lock().unwrap(), vec![(70, 70)]);
}

#[test]
fn test_prior_option_straddles_the_write() {
    let suite = Suite::in_memory();
    let volume = Key::new("volume", &suite, 50i64).unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let key = volume.clone();
    let _obs = volume.observe(ObservationOptions::prior(), move |change| {
        // before the write the store still holds the old value
        let stored = key.suite().contains("volume");
        sink.lock()
            .unwrap()
            .push((change.is_prior, change.new_value, stored));
    });

    volume.set(80);

    let records = seen.lock().unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0], (true, 80, false));
    assert_eq!(records[1], (false, 80, true));
}

#[test]
fn test_mutations_to_other_keys_not_delivered() {
    let suite = Suite::in_memory();
    let volume = Key::new("volume", &suite, 0i64).unwrap();
    let other = Key::new("other", &suite, 0i64).unwrap();

    let (calls, handler) = counting();
    let _obs = volume.observe(ObservationOptions::default(), handler);

    other.set(1);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    volume.set(1);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_multi_key_fires_once_per_mutation() {
    let suite = Suite::in_memory();
    let a = Key::new("a", &suite, 0i64).unwrap();
    let b = Key::new("b", &suite, 0i64).unwrap();
    a.set(1);
    b.set(1);

    let calls = Arc::new(AtomicUsize::new(0));
    let sink = calls.clone();
    let _obs = suite.observe_keys(&["a", "b"], ObservationOptions::default(), move || {
        sink.fetch_add(1, Ordering::SeqCst);
    });

    a.set(2);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // both keys vanish in one mutation: one delivery
    suite.remove_all();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

// --- Propagation Suppression ---

#[test]
fn test_clamping_handler_does_not_loop() {
    let suite = Suite::in_memory();
    let volume = Key::new("volume", &suite, 50i64).unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let sink = calls.clone();
    let writer = volume.clone();
    let _obs = volume.observe(ObservationOptions::default(), move |change| {
        sink.fetch_add(1, Ordering::SeqCst);
        if change.new_value > 100 {
            writer.set(100);
        }
    });

    volume.set(150);

    // one delivery, but the clamped value landed
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(volume.get(), 100);
}

#[test]
fn test_suppressed_write_still_reaches_other_observers() {
    let suite = Suite::in_memory();
    let volume = Key::new("volume", &suite, 50i64).unwrap();

    let writer = volume.clone();
    let _clamp = volume.observe(ObservationOptions::default(), move |change| {
        if change.new_value > 100 {
            writer.set(100);
        }
    });

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let _watcher = volume.observe(ObservationOptions::default(), move |change| {
        sink.lock().unwrap().push(change.new_value);
    });

    volume.set(150);

    // the watcher saw both the overshoot and the clamp; relative order
    // depends on which observer the overshoot reached first
    let mut values = seen.lock().unwrap().clone();
    values.sort();
    assert_eq!(values, vec![100, 150]);
    assert_eq!(volume.get(), 100);
}

#[test]
fn test_suppression_carries_across_threads() {
    let suite = Suite::in_memory();
    let volume = Key::new("volume", &suite, 50i64).unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let sink = calls.clone();
    let writer = volume.clone();
    let _obs = volume.observe(ObservationOptions::default(), move |change| {
        sink.fetch_add(1, Ordering::SeqCst);
        if change.new_value > 100 {
            let scope = PropagationScope::current();
            let key = writer.clone();
            std::thread::spawn(move || {
                scope.enter(|| key.set(100));
            })
            .join()
            .unwrap();
        }
    });

    volume.set(150);

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(volume.get(), 100);
}

#[test]
fn test_unrelated_writes_inside_handler_are_delivered() {
    let suite = Suite::in_memory();
    let volume = Key::new("volume", &suite, 0i64).unwrap();
    let log = Key::new("log", &suite, 0i64).unwrap();

    let log_writer = log.clone();
    let _obs = volume.observe(ObservationOptions::default(), move |change| {
        log_writer.set(change.new_value);
    });

    let (log_calls, handler) = counting();
    let _log_obs = log.observe(ObservationOptions::default(), handler);

    volume.set(7);
    assert_eq!(log.get(), 7);
    assert_eq!(log_calls.load(Ordering::SeqCst), 1);
}

// --- Cancellation and Lifetimes ---

#[test]
fn test_invalidate_stops_delivery() {
    let suite = Suite::in_memory();
    let volume = Key::new("volume", &suite, 0i64).unwrap();

    let (calls, handler) = counting();
    let obs = volume.observe(ObservationOptions::default(), handler);

    volume.set(1);
    obs.invalidate();
    obs.invalidate();
    volume.set(2);

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(!obs.is_active());
    assert_eq!(suite.observation_count(), 0);
}

#[test]
fn test_invalidate_from_inside_handler() {
    let suite = Suite::in_memory();
    let volume = Key::new("volume", &suite, 0i64).unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let sink = calls.clone();
    let slot: Arc<Mutex<Option<prefstore::Observation>>> = Arc::new(Mutex::new(None));
    let slot_in_handler = slot.clone();
    let obs = volume.observe(ObservationOptions::default(), move |_| {
        sink.fetch_add(1, Ordering::SeqCst);
        if let Some(obs) = slot_in_handler.lock().unwrap().as_ref() {
            obs.invalidate();
        }
    });
    *slot.lock().unwrap() = Some(obs);

    volume.set(1);
    volume.set(2);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_lifetime_tie_auto_invalidates() {
    let suite = Suite::in_memory();
    let volume = Key::new("volume", &suite, 0i64).unwrap();

    let (calls, handler) = counting();
    let obs = volume.observe(ObservationOptions::default(), handler);

    let owner = Arc::new("controller".to_string());
    obs.tie_to_lifetime(&owner);

    volume.set(1);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    drop(owner);
    volume.set(2);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(suite.observation_count(), 0);
}

#[test]
fn test_removing_lifetime_tie_restores_delivery() {
    let suite = Suite::in_memory();
    let volume = Key::new("volume", &suite, 0i64).unwrap();

    let (calls, handler) = counting();
    let obs = volume.observe(ObservationOptions::default(), handler);

    let owner = Arc::new(0u8);
    obs.tie_to_lifetime(&owner);
    obs.remove_lifetime_tie();
    drop(owner);

    volume.set(1);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

// --- Streams ---

#[test]
fn test_change_stream_receives_in_order() {
    let suite = Suite::in_memory();
    let volume = Key::new("volume", &suite, 0i64).unwrap();

    let stream = volume.updates(ObservationOptions::default());
    volume.set(1);
    volume.set(2);

    assert_eq!(stream.recv_timeout(Duration::from_secs(1)).unwrap().new_value, 1);
    assert_eq!(stream.recv_timeout(Duration::from_secs(1)).unwrap().new_value, 2);
    assert!(stream.try_recv().is_err());
}

#[test]
fn test_deduped_stream_collapses_repeats() {
    let suite = Suite::in_memory();
    let volume = Key::new("volume", &suite, 0i64).unwrap();

    let mut stream = volume.updates(ObservationOptions::default()).deduped();
    volume.set(1);
    volume.set(1);
    volume.set(2);

    assert_eq!(stream.recv_timeout(Duration::from_secs(1)).unwrap().new_value, 1);
    assert_eq!(stream.recv_timeout(Duration::from_secs(1)).unwrap().new_value, 2);
    assert!(stream.try_recv().is_err());
}

#[test]
fn test_dropping_stream_ends_observation() {
    let suite = Suite::in_memory();
    let volume = Key::new("volume", &suite, 0i64).unwrap();

    let stream = volume.updates(ObservationOptions::default());
    assert_eq!(suite.observation_count(), 1);
    drop(stream);
    assert_eq!(suite.observation_count(), 0);
}

// --- Concurrency ---

#[test]
fn test_concurrent_writers_all_delivered() {
    let suite = Suite::in_memory();
    let volume = Key::new("volume", &suite, 0i64).unwrap();

    let (calls, handler) = counting();
    let _obs = volume.observe(ObservationOptions::default(), handler);

    let mut handles = Vec::new();
    for t in 0..4 {
        let key = volume.clone();
        handles.push(std::thread::spawn(move || {
            for i in 0..25 {
                key.set(t * 100 + i);
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(calls.load(Ordering::SeqCst), 100);
}

#[test]
fn test_concurrent_writers_report_chained_old_values() {
    let suite = Suite::in_memory();
    let seq = Key::new("seq", &suite, 0i64).unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let _obs = seq.observe(ObservationOptions::default(), move |change| {
        sink.lock().unwrap().push((change.old_value, change.new_value));
    });

    // distinct nonzero values per thread; 0 stands for "no entry yet"
    let mut handles = Vec::new();
    for t in 1..=4i64 {
        let key = seq.clone();
        handles.push(std::thread::spawn(move || {
            for i in 1..=50 {
                key.set(t * 1000 + i);
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    let records = seen.lock().unwrap().clone();
    assert_eq!(records.len(), 200);

    // Every record's old value must be some other record's new value (or
    // the default for the first write). Equivalently, the old values are
    // exactly the new values minus the final one, plus the default.
    let last = seq.get();
    let mut olds: Vec<i64> = records.iter().map(|(old, _)| *old).collect();
    let mut expected: Vec<i64> = records
        .iter()
        .map(|(_, new)| *new)
        .filter(|new| *new != last)
        .collect();
    expected.push(0);
    olds.sort_unstable();
    expected.sort_unstable();
    assert_eq!(olds, expected);
}
