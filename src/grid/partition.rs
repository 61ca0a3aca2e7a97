//! Grid partitioning
//!
//! Splits a grid among a fixed number of participants. Both modes share one
//! rule: `units` are divided as evenly as possible, the first
//! `units % workers` participants getting one extra unit. Participants that
//! would receive nothing get no tile at all, and the returned sequence is
//! padded with `None` so that it always has exactly `workers` entries.

use super::tile::Tile;
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// How the grid is split into tiles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decomposition {
    /// Whole rows per participant (rectangular tiles)
    #[default]
    Rows,
    /// Runs of cells of the row-major flattened grid (linear tiles)
    Cells,
}

/// Decompose a `width × height` grid for `workers` participants
///
/// Entry `i` is the tile for participant `i`, or `None` when there are more
/// participants than partitionable units.
pub fn decompose(
    width: usize,
    height: usize,
    workers: usize,
    mode: Decomposition,
) -> Vec<Option<Tile>> {
    match mode {
        Decomposition::Rows => decompose_by_rows(width, height, workers),
        Decomposition::Cells => decompose_by_cells(width, height, workers),
    }
}

/// Decompose the grid into tiles of whole rows
pub fn decompose_by_rows(width: usize, height: usize, workers: usize) -> Vec<Option<Tile>> {
    let tiles = intervals(height, workers)
        .enumerate()
        .map(|(id, rows)| Tile::rectangular(id, 0..width, rows));
    pad(tiles, workers)
}

/// Decompose the grid into linear tiles of consecutive cells
///
/// A grid with more than `usize::MAX` cells is clamped to that many;
/// validated configurations never reach the clamp.
pub fn decompose_by_cells(width: usize, height: usize, workers: usize) -> Vec<Option<Tile>> {
    let tiles = intervals(width.saturating_mul(height), workers)
        .enumerate()
        .map(|(id, cells)| Tile::linear(id, cells, width));
    pad(tiles, workers)
}

/// Number of units each participant receives, zero counts removed
fn split_counts(units: usize, workers: usize) -> Vec<usize> {
    if workers == 0 {
        return Vec::new();
    }
    let base = units / workers;
    let extra = units % workers;
    (0..workers)
        .map(|n| if n < extra { base + 1 } else { base })
        .filter(|&count| count != 0)
        .collect()
}

/// Contiguous ascending intervals covering `[0, units)`
fn intervals(units: usize, workers: usize) -> impl Iterator<Item = Range<usize>> {
    split_counts(units, workers)
        .into_iter()
        .scan(0, |start, count| {
            let range = *start..*start + count;
            *start = range.end;
            Some(range)
        })
}

fn pad(tiles: impl Iterator<Item = Tile>, workers: usize) -> Vec<Option<Tile>> {
    let mut padded: Vec<Option<Tile>> = tiles.map(Some).collect();
    padded.resize(workers, None);
    padded
}
