//! Latest-value zip.
//!
//! Each producer keeps only its newest value. When every producer holds one
//! they are combined and all slots are cleared, so a value is never used
//! twice. The first producer to complete completes the zip.

use crate::{
  observable::ObservableExt,
  ops::join::{Collect, JoinMode, JoinOp, Tuple3, ZipItem3},
};

/// Latest-value zip over any number of sources of the same type.
pub fn zip_latest<S, Item, Err>(sources: Vec<S>) -> JoinOp<Vec<S>, Collect, Item>
where
  S: ObservableExt<Item, Err>,
{
  JoinOp::new(sources, Collect, JoinMode::Latest)
}

/// Latest-value zip of three sources into tuples.
pub fn zip_latest3<A, B, C, ItemA, ItemB, ItemC, Err>(
  a: A, b: B, c: C,
) -> JoinOp<(A, B, C), Tuple3, ZipItem3<ItemA, ItemB, ItemC>>
where
  A: ObservableExt<ItemA, Err>,
  B: ObservableExt<ItemB, Err>,
  C: ObservableExt<ItemC, Err>,
{
  JoinOp::new((a, b, c), Tuple3, JoinMode::Latest)
}
