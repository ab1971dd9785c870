//! Integration tests for rxflow
//!
//! Exercises operator chains end to end: the async bridge policies, the
//! epoch-guarded timer operators and the multi-producer joins, including
//! producers pushing from several threads.

use std::{
  convert::Infallible,
  sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
  },
  thread,
};

use rxflow::prelude::*;

fn sleep_ms(ms: u64) -> tokio::time::Sleep { tokio::time::sleep(Duration::from_millis(ms)) }

#[rxflow_macro::test(paused)]
async fn test_sequential_bridge_end_to_end() {
  let (input, source) = observable::push_source::<i32, ()>();
  let recorder = Recorder::new();
  source
    .map_async(
      |x: i32, _| async move {
        sleep_ms(5).await;
        Ok(x * 10)
      },
      AwaitConfig::new(AwaitOperation::Sequential),
    )
    .subscribe_observer(recorder.clone());

  for x in [1, 2, 3] {
    input.next(x);
  }
  sleep_ms(50).await;
  input.complete(Ok(()));

  assert_eq!(
    recorder.notifications(),
    vec![
      Notification::Next(10),
      Notification::Next(20),
      Notification::Next(30),
      Notification::Completed(Ok(()))
    ]
  );
}

#[rxflow_macro::test(paused)]
async fn test_drop_bridge_runs_fewer_callbacks_than_items() {
  let (input, source) = observable::push_source::<usize, ()>();
  let calls = Arc::new(AtomicUsize::new(0));
  let c_calls = calls.clone();
  let recorder = Recorder::new();
  source
    .map_async(
      move |x: usize, _| {
        c_calls.fetch_add(1, Ordering::SeqCst);
        async move {
          // Slower than the producer.
          sleep_ms(25).await;
          Ok(x)
        }
      },
      AwaitConfig::new(AwaitOperation::Drop),
    )
    .subscribe_observer(recorder.clone());

  let n = 10;
  for x in 0..n {
    input.next(x);
    sleep_ms(10).await;
  }
  sleep_ms(100).await;

  let calls = calls.load(Ordering::SeqCst);
  assert!(calls < n);
  assert_eq!(recorder.values().len(), calls);
}

#[rxflow_macro::test(paused)]
async fn test_switch_bridge_honours_only_last_item() {
  let (input, source) = observable::push_source::<i32, ()>();
  let tokens = Arc::new(Mutex::new(vec![]));
  let c_tokens = tokens.clone();
  let recorder = Recorder::new();
  source
    .map_async(
      move |x: i32, token: CancellationToken| {
        c_tokens.lock().unwrap().push(token.clone());
        async move {
          // Ignores its token on purpose: the bridge must still drop the result.
          sleep_ms(30).await;
          Ok(x)
        }
      },
      AwaitConfig::new(AwaitOperation::Switch),
    )
    .subscribe_observer(recorder.clone());

  for x in 1..=5 {
    input.next(x);
    sleep_ms(5).await;
  }
  sleep_ms(100).await;

  assert_eq!(recorder.values(), vec![5]);
  let tokens = tokens.lock().unwrap();
  assert_eq!(tokens.len(), 5);
  assert!(tokens[..4].iter().all(CancellationToken::is_cancelled));
}

#[rxflow_macro::test]
fn test_zip_latest_completes_after_first_pair() {
  let (a, source_a) = observable::push_source::<i32, ()>();
  let (b, source_b) = observable::push_source::<i32, ()>();
  let recorder = Recorder::new();
  source_a
    .zip_latest_with(source_b, |a: i32, b: i32| a + b)
    .subscribe_observer(recorder.clone());

  a.next(1);
  b.next(10);
  b.complete(Ok(()));
  a.next(2);

  assert_eq!(recorder.notifications(), vec![Notification::Next(11), Notification::Completed(Ok(()))]);
}

#[rxflow_macro::test]
fn test_zip_latest_ends_when_partner_never_emitted() {
  let (a, source_a) = observable::push_source::<i32, ()>();
  let (_b, source_b) = observable::push_source::<i32, ()>();
  let recorder = Recorder::new();
  source_a.zip_latest(source_b).subscribe_observer(recorder.clone());

  a.next(1);
  a.complete(Ok(()));

  assert_eq!(recorder.notifications(), vec![Notification::Completed(Ok(()))]);
}

#[rxflow_macro::test]
fn test_zip_counts_across_threads() {
  for (n1, n2) in [(3usize, 8usize), (8, 3), (0, 5)] {
    let (a, source_a) = observable::push_source::<usize, ()>();
    let (b, source_b) = observable::push_source::<usize, ()>();
    let recorder = Recorder::new();
    source_a.zip(source_b).subscribe_observer(recorder.clone());

    let ta = thread::spawn(move || {
      (0..n1).for_each(|i| a.next(i));
      a.complete(Ok(()));
    });
    let tb = thread::spawn(move || {
      (0..n2).for_each(|i| b.next(i));
      b.complete(Ok(()));
    });
    ta.join().unwrap();
    tb.join().unwrap();

    let values = recorder.values();
    assert_eq!(values.len(), n1.min(n2));
    assert!(values.iter().all(|(x, y)| x == y));
    assert_eq!(recorder.completion(), Some(Ok(())));
  }
}

#[rxflow_macro::test]
fn test_debounced_sources_merged() {
  let scheduler = TestScheduler::new();
  let (fast, fast_source) = observable::push_source::<&str, ()>();
  let (slow, slow_source) = observable::push_source::<&str, ()>();
  let recorder = Recorder::new();
  observable::merge(vec![
    fast_source.debounce(Duration::from_millis(10), scheduler.clone()),
    slow_source.debounce(Duration::from_millis(50), scheduler.clone()),
  ])
  .subscribe_observer(recorder.clone());

  fast.next("f1");
  slow.next("s1");
  fast.next("f2");
  scheduler.advance_by(Duration::from_millis(10));
  assert_eq!(recorder.values(), vec!["f2"]);

  scheduler.advance_by(Duration::from_millis(40));
  assert_eq!(recorder.values(), vec!["f2", "s1"]);

  fast.complete(Ok(()));
  assert!(!recorder.is_completed());
  slow.complete(Ok(()));
  assert_eq!(recorder.completion(), Some(Ok(())));
}

#[rxflow_macro::test]
fn test_switch_map_flushes_debounced_inners() {
  let scheduler = TestScheduler::new();
  let (queries, source) = observable::push_source::<u64, Infallible>();
  let recorder = Recorder::new();
  let c_scheduler = scheduler.clone();
  source
    .switch_map(move |q| {
      observable::of(q).debounce(Duration::from_millis(q), c_scheduler.clone())
    })
    .subscribe_observer(recorder.clone());

  // Each inner completes right away, flushing its value on completion.
  queries.next(30);
  queries.next(20);
  assert_eq!(recorder.values(), vec![30, 20]);
  assert!(scheduler.is_empty());
}

#[rxflow_macro::test(shared)]
async fn test_threads_feeding_parallel_bridge() {
  let (input, source) = observable::push_source::<usize, Infallible>();
  let recorder = Recorder::new();
  source
    .map_async(
      |x: usize, _| async move { Ok(x * 2) },
      AwaitConfig::new(AwaitOperation::Parallel)
        .max_concurrent(3)
        .cancel_on_completed(false),
    )
    .subscribe_observer(recorder.clone());

  let producers: Vec<_> = (0..4)
    .map(|t| {
      let input = input.clone();
      thread::spawn(move || (0..25).for_each(|i| input.next(t * 25 + i)))
    })
    .collect();
  for producer in producers {
    producer.join().unwrap();
  }
  input.complete(Ok(()));

  for _ in 0..200 {
    if recorder.is_completed() {
      break;
    }
    sleep_ms(5).await;
  }

  let mut values = recorder.values();
  values.sort_unstable();
  assert_eq!(values, (0..100).map(|x| x * 2).collect::<Vec<_>>());
  assert_eq!(recorder.completion(), Some(Ok(())));
}

#[rxflow_macro::test]
fn test_first_of_join_tells_empty_from_failure() {
  let (a, source_a) = observable::push_source::<i32, RxError>();
  let (_b, source_b) = observable::push_source::<i32, RxError>();
  let empty = Recorder::new();
  source_a.zip_latest(source_b).first().subscribe_observer(empty.clone());
  a.next(1);
  a.complete(Ok(()));
  assert_eq!(empty.completion(), Some(Err(RxError::SequenceEmpty)));

  let (a, source_a) = observable::push_source::<i32, RxError>();
  let (b, source_b) = observable::push_source::<i32, RxError>();
  let failed = Recorder::new();
  source_a.zip_latest(source_b).first().subscribe_observer(failed.clone());
  b.complete(Err(RxError::from("sensor offline")));
  assert_eq!(failed.completion(), Some(Err(RxError::from("sensor offline"))));
  assert!(a.is_closed());
}
