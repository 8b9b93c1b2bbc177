use std::collections::HashSet;

use ulid::Ulid;

use crate::model::Table;

/// Tables chosen for a party: one table, or the best pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    Single(Table),
    /// Smaller table first.
    Pair(Table, Table),
}

impl Selection {
    pub fn table_ids(&self) -> Vec<Ulid> {
        match self {
            Selection::Single(t) => vec![t.id],
            Selection::Pair(a, b) => vec![a.id, b.id],
        }
    }

    pub fn capacity(&self) -> u32 {
        match self {
            Selection::Single(t) => t.capacity,
            Selection::Pair(a, b) => a.capacity + b.capacity,
        }
    }

    pub fn table_count(&self) -> u8 {
        match self {
            Selection::Single(_) => 1,
            Selection::Pair(..) => 2,
        }
    }

    pub fn into_tables(self) -> Vec<Table> {
        match self {
            Selection::Single(t) => vec![t],
            Selection::Pair(a, b) => vec![a, b],
        }
    }
}

/// Active tables not in the conflict set.
pub fn free_tables(tables: Vec<Table>, booked: &HashSet<Ulid>) -> Vec<Table> {
    tables
        .into_iter()
        .filter(|t| t.active && !booked.contains(&t.id))
        .collect()
}

/// Best-fit selection over free tables.
///
/// Phase 1 picks the smallest single table that seats the party. Phase 2
/// picks the pair with the least combined capacity, then the smallest larger
/// member, so big tables stay free for big parties. Ties fall back to table
/// ids, keeping the choice deterministic. Never more than two tables.
pub fn select_tables(free: &[Table], guests: u32) -> Option<Selection> {
    if let Some(t) = best_single(free, guests) {
        return Some(Selection::Single(t.clone()));
    }
    best_pair(free, guests).map(|(a, b)| Selection::Pair(a.clone(), b.clone()))
}

fn best_single(free: &[Table], guests: u32) -> Option<&Table> {
    free.iter()
        .filter(|t| t.capacity >= guests)
        .min_by_key(|t| (t.capacity, t.id))
}

fn best_pair(free: &[Table], guests: u32) -> Option<(&Table, &Table)> {
    let mut best: Option<((u32, u32, Ulid, Ulid), (&Table, &Table))> = None;
    for (i, a) in free.iter().enumerate() {
        for b in &free[i + 1..] {
            let total = a.capacity + b.capacity;
            if total < guests {
                continue;
            }
            let (small, large) = if (a.capacity, a.id) <= (b.capacity, b.id) { (a, b) } else { (b, a) };
            let key = (total, large.capacity, small.id, large.id);
            if best.as_ref().is_none_or(|(k, _)| key < *k) {
                best = Some((key, (small, large)));
            }
        }
    }
    best.map(|(_, pair)| pair)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Tables with strictly increasing ids, in the given order.
    fn tables(capacities: &[u32]) -> Vec<Table> {
        let restaurant_id = Ulid::new();
        let base = Ulid::new();
        capacities
            .iter()
            .enumerate()
            .map(|(i, &capacity)| Table {
                id: Ulid::from_parts(base.timestamp_ms(), i as u128),
                restaurant_id,
                label: format!("T{}", i + 1),
                capacity,
                grid_row: 0,
                grid_col: i as u32,
                active: true,
            })
            .collect()
    }

    fn labels(sel: &Selection) -> Vec<String> {
        sel.clone().into_tables().into_iter().map(|t| t.label).collect()
    }

    #[test]
    fn smallest_single_table_that_fits() {
        let t = tables(&[2, 2, 4, 6]);
        let sel = select_tables(&t, 3).unwrap();
        assert_eq!(labels(&sel), vec!["T3"]);
        assert_eq!(sel.capacity(), 4);
        assert_eq!(sel.table_count(), 1);
    }

    #[test]
    fn exact_fit_preferred() {
        let t = tables(&[6, 4, 2]);
        assert_eq!(labels(&select_tables(&t, 2).unwrap()), vec!["T3"]);
        assert_eq!(labels(&select_tables(&t, 4).unwrap()), vec!["T2"]);
        assert_eq!(labels(&select_tables(&t, 5).unwrap()), vec!["T1"]);
    }

    #[test]
    fn single_ties_broken_by_id() {
        let t = tables(&[4, 4, 4]);
        assert_eq!(labels(&select_tables(&t, 4).unwrap()), vec!["T1"]);
        let reversed: Vec<Table> = t.into_iter().rev().collect();
        assert_eq!(labels(&select_tables(&reversed, 4).unwrap()), vec!["T1"]);
    }

    #[test]
    fn pair_when_no_single_fits() {
        let mut t = tables(&[2, 2, 6]);
        let booked = HashSet::from([t[2].id]);
        t = free_tables(t, &booked);
        let sel = select_tables(&t, 4).unwrap();
        assert_eq!(labels(&sel), vec!["T1", "T2"]);
        assert_eq!(sel.capacity(), 4);
        assert_eq!(sel.table_count(), 2);
    }

    #[test]
    fn pair_minimizes_total_then_largest_member() {
        // 8 guests: candidates 2+6=8, 4+4=8, 4+6=10, 6+6=12 → total 8 wins,
        // and among those 4+4 keeps the six-top free.
        let t = tables(&[2, 4, 4, 6]);
        let sel = select_tables(&t, 7).unwrap();
        assert_eq!(labels(&sel), vec!["T2", "T3"]);

        let t = tables(&[6, 2, 4, 4]);
        let sel = select_tables(&t, 8).unwrap();
        assert_eq!(labels(&sel), vec!["T3", "T4"]);
    }

    #[test]
    fn pair_ordered_smaller_first() {
        let t = tables(&[6, 6, 4]);
        let sel = select_tables(&t, 10).unwrap();
        assert_eq!(labels(&sel), vec!["T3", "T1"]);
    }

    #[test]
    fn never_more_than_two_tables() {
        let t = tables(&[2, 2, 2, 2]);
        assert!(select_tables(&t, 5).is_none());
        assert!(select_tables(&t, 4).is_some());
    }

    #[test]
    fn nothing_free() {
        assert!(select_tables(&[], 1).is_none());
        let t = tables(&[2]);
        assert!(select_tables(&t, 3).is_none());
    }

    #[test]
    fn booked_small_table_skipped() {
        let t = tables(&[2, 4]);
        let booked = HashSet::from([t[0].id]);
        let free = free_tables(t, &booked);
        assert_eq!(labels(&select_tables(&free, 2).unwrap()), vec!["T2"]);
    }

    #[test]
    fn inactive_tables_never_free() {
        let mut t = tables(&[2, 4]);
        t[0].active = false;
        let free = free_tables(t, &HashSet::new());
        assert_eq!(free.len(), 1);
        assert_eq!(labels(&select_tables(&free, 1).unwrap()), vec!["T2"]);
    }
}
