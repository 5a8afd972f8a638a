//! Ordering primitives shared by the store and the drag resolver.
//!
//! Positions are plain dense indices. A reorder is expressed as a complete
//! list of ids, validated as a permutation of current membership, and then
//! renumbered `0..n-1`.

use crate::types::{Column, Task};
use std::collections::HashSet;
use std::fmt::Display;
use std::hash::Hash;

/// Relocate the element at `from` to `to`, shifting everything in between.
///
/// This is a single-element move, not a swap: moving `A` onto `C` in
/// `[A, B, C, D]` gives `[B, C, A, D]`. A `to` past the end appends.
/// Out-of-range `from` leaves the slice untouched.
pub fn array_move<T>(items: &mut Vec<T>, from: usize, to: usize) {
    if from >= items.len() || from == to {
        return;
    }
    let item = items.remove(from);
    let to = to.min(items.len());
    items.insert(to, item);
}

/// Copying variant of [`array_move`]
pub fn moved<T: Clone>(items: &[T], from: usize, to: usize) -> Vec<T> {
    let mut out = items.to_vec();
    array_move(&mut out, from, to);
    out
}

/// Check that `proposed` names exactly the members of `current`, each once.
///
/// Returns a human readable reason on mismatch.
pub fn check_permutation<T>(current: &[T], proposed: &[T]) -> Result<(), String>
where
    T: Eq + Hash + Display,
{
    let mut seen = HashSet::with_capacity(proposed.len());
    for id in proposed {
        if !seen.insert(id) {
            return Err(format!("'{}' appears more than once", id));
        }
    }

    let members: HashSet<&T> = current.iter().collect();
    if let Some(extra) = proposed.iter().find(|id| !members.contains(id)) {
        return Err(format!("'{}' is not a member", extra));
    }
    if let Some(missing) = current.iter().find(|id| !seen.contains(id)) {
        return Err(format!("'{}' is missing", missing));
    }
    Ok(())
}

/// Rewrite task positions to `0..n-1` in slice order
pub fn renumber_tasks(tasks: &mut [Task]) {
    for (i, task) in tasks.iter_mut().enumerate() {
        task.position = i;
    }
}

/// Rewrite column order values to `0..n-1` in slice order
pub fn renumber_columns(columns: &mut [Column]) {
    for (i, column) in columns.iter_mut().enumerate() {
        column.order = i;
    }
}

/// True when positions are exactly `0..n-1` in slice order
pub fn tasks_are_dense(tasks: &[Task]) -> bool {
    tasks.iter().enumerate().all(|(i, t)| t.position == i)
}

/// True when order values are exactly `0..n-1` in slice order
pub fn columns_are_dense(columns: &[Column]) -> bool {
    columns.iter().enumerate().all(|(i, c)| c.order == i)
}
