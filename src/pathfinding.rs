//! A* routing over the 8-connected lattice.
//!
//! Stepping onto a preferred-path cell costs 1, any other free cell costs 2,
//! obstacle cells are impassable. The heuristic is the Manhattan distance to
//! the goal. Equal priorities pop in insertion order, so with the fixed
//! neighbour order of [`moore_neighbors`] the result is deterministic.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use evacuation_common::Cell;

use crate::grid::moore_neighbors;
use crate::terrain::Mask;

const PREFERRED_STEP_COST: u32 = 1;
const DEFAULT_STEP_COST: u32 = 2;

/// Lowest-cost route from `start` to `goal`, both included, or `None` when the goal is unreachable.
///
/// Elevation plays no part in the cost; slope only affects how fast an evacuee walks the route.
pub fn find_path(start: Cell, goal: Cell, paths: &Mask, obstacles: &Mask) -> Option<Vec<Cell>> {
    let (width, height) = obstacles.dimensions();
    if !obstacles.in_bounds(start) || !obstacles.in_bounds(goal) {
        return None;
    }
    if start == goal {
        return Some(vec![start]);
    }

    let index = |cell: Cell| cell.y as usize * width as usize + cell.x as usize;
    let node_count = width as usize * height as usize;
    let mut cost_so_far = vec![u32::MAX; node_count];
    let mut came_from: Vec<Option<Cell>> = vec![None; node_count];

    // (priority, insertion sequence, cell): the sequence breaks ties first-in-first-out
    let mut frontier: BinaryHeap<Reverse<(u32, u64, Cell)>> = BinaryHeap::new();
    let mut sequence: u64 = 0;

    cost_so_far[index(start)] = 0;
    frontier.push(Reverse((start.manhattan_distance(goal), sequence, start)));

    let mut reached = false;
    while let Some(Reverse((priority, _, current))) = frontier.pop() {
        if current == goal {
            reached = true;
            break;
        }
        let current_cost = cost_so_far[index(current)];
        if priority > current_cost.saturating_add(current.manhattan_distance(goal)) {
            continue; // stale entry
        }

        for next in moore_neighbors(current, 1, width, height) {
            if obstacles.is_set(next) {
                continue;
            }
            let step_cost = if paths.is_set(next) { PREFERRED_STEP_COST } else { DEFAULT_STEP_COST };
            let new_cost = current_cost + step_cost;
            let slot = index(next);
            if new_cost < cost_so_far[slot] {
                cost_so_far[slot] = new_cost;
                came_from[slot] = Some(current);
                sequence += 1;
                frontier.push(Reverse((new_cost + next.manhattan_distance(goal), sequence, next)));
            }
        }
    }

    if !reached {
        return None;
    }

    let mut path = vec![goal];
    let mut cursor = goal;
    while let Some(previous) = came_from[index(cursor)] {
        path.push(previous);
        cursor = previous;
    }
    path.reverse();
    debug_assert_eq!(path.first(), Some(&start));
    Some(path)
}
