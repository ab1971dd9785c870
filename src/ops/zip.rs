//! Strict zip: combine values positionally across producers.
//!
//! Every producer has a FIFO queue; one value is taken from each queue per
//! emission, so the n-th output is built from the n-th value of every
//! producer. Once a completed producer has nothing left queued no further
//! combination is possible and the zip completes. A failure of any producer
//! completes the zip with that failure and disposes the other producers.

use crate::{
  observable::ObservableExt,
  ops::join::{Collect, JoinMode, JoinOp, Tuple3, ZipItem3},
};

/// Zip any number of sources of the same type into `Vec`s.
///
/// ```
/// use rxflow::prelude::*;
///
/// let recorder = Recorder::new();
/// observable::zip(vec![observable::from_iter(0..3), observable::from_iter(10..12)])
///   .subscribe_observer(recorder.clone());
///
/// assert_eq!(recorder.values(), vec![vec![0, 10], vec![1, 11]]);
/// ```
pub fn zip<S, Item, Err>(sources: Vec<S>) -> JoinOp<Vec<S>, Collect, Item>
where
  S: ObservableExt<Item, Err>,
{
  JoinOp::new(sources, Collect, JoinMode::Strict)
}

/// Zip three sources into tuples.
pub fn zip3<A, B, C, ItemA, ItemB, ItemC, Err>(
  a: A, b: B, c: C,
) -> JoinOp<(A, B, C), Tuple3, ZipItem3<ItemA, ItemB, ItemC>>
where
  A: ObservableExt<ItemA, Err>,
  B: ObservableExt<ItemB, Err>,
  C: ObservableExt<ItemC, Err>,
{
  JoinOp::new((a, b, c), Tuple3, JoinMode::Strict)
}

#[cfg(test)]
mod tests {
  use std::{
    convert::Infallible,
    sync::{Arc, Mutex},
  };

  use crate::{observable::ObservableIter, prelude::*};

  #[rxflow_macro::test]
  fn smoke() {
    let recorder = Recorder::new();
    observable::from_iter(0..3)
      .zip(observable::from_iter(10..14))
      .subscribe_observer(recorder.clone());

    assert_eq!(recorder.values(), vec![(0, 10), (1, 11), (2, 12)]);
    assert_eq!(recorder.completion(), Some(Ok(())));
  }

  #[rxflow_macro::test]
  fn emits_min_of_both_counts() {
    for (n1, n2) in [(0usize, 3usize), (1, 5), (4, 2), (7, 7), (10, 1)] {
      let recorder = Recorder::new();
      observable::from_iter(0..n1)
        .zip(observable::from_iter(0..n2))
        .subscribe_observer(recorder.clone());

      assert_eq!(recorder.values().len(), n1.min(n2), "n1 = {n1}, n2 = {n2}");
      assert_eq!(recorder.completion(), Some(Ok(())));
    }
  }

  #[rxflow_macro::test]
  fn interleaved_pushes_pair_in_order() {
    let (a, source_a) = observable::push_source::<i32, ()>();
    let (b, source_b) = observable::push_source::<&str, ()>();
    let recorder = Recorder::new();
    source_a.zip(source_b).subscribe_observer(recorder.clone());

    a.next(1);
    a.next(2);
    b.next("x");
    a.next(3);
    b.next("y");
    assert_eq!(recorder.values(), vec![(1, "x"), (2, "y")]);
    assert!(!recorder.is_completed());
  }

  #[rxflow_macro::test]
  fn completed_side_with_backlog_keeps_pairing() {
    let (a, source_a) = observable::push_source::<i32, ()>();
    let (b, source_b) = observable::push_source::<i32, ()>();
    let recorder = Recorder::new();
    source_a.zip(source_b).subscribe_observer(recorder.clone());

    a.next(1);
    a.next(2);
    a.complete(Ok(()));
    assert!(!recorder.is_completed());

    b.next(10);
    assert!(!recorder.is_completed());
    b.next(20);
    assert_eq!(recorder.values(), vec![(1, 10), (2, 20)]);
    assert_eq!(recorder.completion(), Some(Ok(())));
    assert!(b.is_closed());
  }

  #[rxflow_macro::test]
  fn completed_side_without_backlog_completes() {
    let (a, source_a) = observable::push_source::<i32, ()>();
    let (b, source_b) = observable::push_source::<i32, ()>();
    let recorder = Recorder::new();
    source_a.zip(source_b).subscribe_observer(recorder.clone());

    a.next(1);
    b.complete(Ok(()));
    assert_eq!(recorder.notifications(), vec![Notification::Completed(Ok(()))]);
    assert!(a.is_closed());
  }

  #[rxflow_macro::test]
  fn failure_completes_and_disposes_others() {
    let (a, source_a) = observable::push_source::<i32, &str>();
    let (b, source_b) = observable::push_source::<i32, &str>();
    let recorder = Recorder::new();
    source_a.zip(source_b).subscribe_observer(recorder.clone());

    a.next(1);
    b.error_resume("flaky");
    b.complete(Err("broken"));
    a.next(2);

    assert_eq!(
      recorder.notifications(),
      vec![Notification::ErrorResume("flaky"), Notification::Completed(Err("broken"))]
    );
    assert!(a.is_closed());
  }

  #[rxflow_macro::test]
  fn unsubscribe_inside_next_suppresses_completion() {
    let (a, source_a) = observable::push_source::<i32, ()>();
    let (b, source_b) = observable::push_source::<i32, ()>();
    let slot: Arc<Mutex<Option<BoxedSubscription>>> = Arc::new(Mutex::new(None));
    let log = Arc::new(Mutex::new(vec![]));

    let (c_slot, c_log, d_log) = (slot.clone(), log.clone(), log.clone());
    let subscription = source_a.zip(source_b).subscribe_with(
      move |v: (i32, i32)| {
        c_log.lock().unwrap().push(format!("next {v:?}"));
        if let Some(s) = c_slot.lock().unwrap().take() {
          s.unsubscribe();
        }
      },
      |_| {},
      move |r: Result<(), ()>| d_log.lock().unwrap().push(format!("complete {r:?}")),
    );
    *slot.lock().unwrap() = Some(BoxedSubscription::new(subscription));

    a.next(1);
    a.complete(Ok(()));
    b.next(10);

    assert_eq!(*log.lock().unwrap(), vec!["next (1, 10)"]);
    assert!(b.is_closed());
  }

  #[rxflow_macro::test]
  fn zip_with_combiner() {
    let recorder = Recorder::new();
    observable::from_iter(1..4)
      .zip_with(observable::from_iter(vec![10, 20, 30]), |a: i32, b: i32| a * b)
      .subscribe_observer(recorder.clone());

    assert_eq!(recorder.values(), vec![10, 40, 90]);
  }

  #[rxflow_macro::test]
  fn zip_vec_of_sources() {
    let (a, source_a) = observable::push_source::<i32, ()>();
    let (b, source_b) = observable::push_source::<i32, ()>();
    let (c, source_c) = observable::push_source::<i32, ()>();
    let recorder = Recorder::new();
    observable::zip(vec![source_a, source_b, source_c]).subscribe_observer(recorder.clone());

    a.next(1);
    b.next(2);
    assert!(recorder.is_empty());
    c.next(3);
    assert_eq!(recorder.values(), vec![vec![1, 2, 3]]);
  }

  #[rxflow_macro::test]
  fn zip_nothing_completes_at_once() {
    let recorder = Recorder::<Vec<i32>, Infallible>::new();
    observable::zip(Vec::<ObservableIter<Vec<i32>>>::new()).subscribe_observer(recorder.clone());
    assert_eq!(recorder.notifications(), vec![Notification::Completed(Ok(()))]);
  }

  #[rxflow_macro::test]
  fn zip3_mixed_types() {
    let recorder = Recorder::new();
    observable::zip3(
      observable::from_iter(vec![1, 2]),
      observable::from_iter(vec!["a", "b", "c"]),
      observable::from_iter(vec![true, false]),
    )
    .subscribe_observer(recorder.clone());

    assert_eq!(recorder.values(), vec![(1, "a", true), (2, "b", false)]);
    assert_eq!(recorder.completion(), Some(Ok(())));
  }

  #[rxflow_macro::test(shared)]
  async fn concurrent_producers() {
    let (a, source_a) = observable::push_source::<usize, ()>();
    let (b, source_b) = observable::push_source::<usize, ()>();
    let recorder = Recorder::new();
    source_a.zip(source_b).subscribe_observer(recorder.clone());

    let ta = tokio::spawn(async move {
      for i in 0..100 {
        a.next(i);
        tokio::task::yield_now().await;
      }
    });
    let tb = tokio::spawn(async move {
      for i in 0..100 {
        b.next(i);
        tokio::task::yield_now().await;
      }
    });
    ta.await.unwrap();
    tb.await.unwrap();

    let values = recorder.values();
    assert_eq!(values.len(), 100);
    assert!(values.iter().all(|(x, y)| x == y));
  }
}
