//! Bit-packed weekly availability.
//!
//! A week is 7 days of 48 half-hour slots (336 slots), stored as six `u64`
//! words with slot `day * 48 + slot` at bit `index % 64` of word `index / 64`.
//! Common availability between two members is `popcount(a & b)`, which is the
//! inner loop of preference building and runs in a fixed six words.
//!
//! On the wire and in the database the matrix is a 7×48 JSON array of
//! booleans, the same shape the member-facing scheduler edits.

use serde::{Deserialize, Serialize};

use crate::defaults::{AVAILABILITY_DAYS, AVAILABILITY_SLOTS, AVAILABILITY_SLOTS_PER_DAY};
use crate::error::{Error, Result};

const WORDS: usize = AVAILABILITY_SLOTS.div_ceil(64);

/// One member's weekly availability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "Vec<Vec<bool>>", into = "Vec<Vec<bool>>")]
pub struct AvailabilityMatrix {
    words: [u64; WORDS],
}

impl AvailabilityMatrix {
    /// No slots available.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Every slot available.
    pub fn full() -> Self {
        let mut matrix = Self::default();
        for index in 0..AVAILABILITY_SLOTS {
            matrix.words[index / 64] |= 1 << (index % 64);
        }
        matrix
    }

    /// Build from a 7×48 grid, rejecting any other shape.
    pub fn from_grid<D: AsRef<[bool]>>(grid: &[D]) -> Result<Self> {
        if grid.len() != AVAILABILITY_DAYS {
            return Err(Error::InvalidAvailability(format!(
                "expected {} days, got {}",
                AVAILABILITY_DAYS,
                grid.len()
            )));
        }

        let mut matrix = Self::default();
        for (day, slots) in grid.iter().enumerate() {
            let slots = slots.as_ref();
            if slots.len() != AVAILABILITY_SLOTS_PER_DAY {
                return Err(Error::InvalidAvailability(format!(
                    "day {} has {} slots, expected {}",
                    day,
                    slots.len(),
                    AVAILABILITY_SLOTS_PER_DAY
                )));
            }
            for (slot, available) in slots.iter().enumerate() {
                if *available {
                    matrix.set_index(day * AVAILABILITY_SLOTS_PER_DAY + slot);
                }
            }
        }
        Ok(matrix)
    }

    /// Expand back into a 7×48 grid.
    pub fn to_grid(&self) -> Vec<Vec<bool>> {
        (0..AVAILABILITY_DAYS)
            .map(|day| {
                (0..AVAILABILITY_SLOTS_PER_DAY)
                    .map(|slot| self.is_index_set(day * AVAILABILITY_SLOTS_PER_DAY + slot))
                    .collect()
            })
            .collect()
    }

    /// Mark `(day, slot)` available.
    pub fn set(&mut self, day: usize, slot: usize) -> Result<()> {
        let index = Self::index(day, slot)?;
        self.set_index(index);
        Ok(())
    }

    /// Whether `(day, slot)` is available. Out-of-range positions are not.
    pub fn is_available(&self, day: usize, slot: usize) -> bool {
        Self::index(day, slot)
            .map(|index| self.is_index_set(index))
            .unwrap_or(false)
    }

    /// Number of available slots.
    pub fn slot_count(&self) -> u32 {
        self.words.iter().map(|w| w.count_ones()).sum()
    }

    /// Number of slots both members are available.
    pub fn common_slots(&self, other: &Self) -> u32 {
        self.words
            .iter()
            .zip(other.words.iter())
            .map(|(a, b)| (a & b).count_ones())
            .sum()
    }

    fn index(day: usize, slot: usize) -> Result<usize> {
        if day >= AVAILABILITY_DAYS || slot >= AVAILABILITY_SLOTS_PER_DAY {
            return Err(Error::InvalidAvailability(format!(
                "slot ({}, {}) outside {}x{} week",
                day, slot, AVAILABILITY_DAYS, AVAILABILITY_SLOTS_PER_DAY
            )));
        }
        Ok(day * AVAILABILITY_SLOTS_PER_DAY + slot)
    }

    fn set_index(&mut self, index: usize) {
        self.words[index / 64] |= 1 << (index % 64);
    }

    fn is_index_set(&self, index: usize) -> bool {
        self.words[index / 64] & (1 << (index % 64)) != 0
    }
}

impl TryFrom<Vec<Vec<bool>>> for AvailabilityMatrix {
    type Error = Error;

    fn try_from(grid: Vec<Vec<bool>>) -> Result<Self> {
        Self::from_grid(&grid)
    }
}

impl From<AvailabilityMatrix> for Vec<Vec<bool>> {
    fn from(matrix: AvailabilityMatrix) -> Self {
        matrix.to_grid()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};

    fn grid_with(mut f: impl FnMut(usize, usize) -> bool) -> Vec<Vec<bool>> {
        (0..7)
            .map(|day| (0..48).map(|slot| f(day, slot)).collect())
            .collect()
    }

    fn naive_common(a: &[Vec<bool>], b: &[Vec<bool>]) -> u32 {
        a.iter()
            .zip(b)
            .flat_map(|(da, db)| da.iter().zip(db))
            .filter(|(x, y)| **x && **y)
            .count() as u32
    }

    #[test]
    fn test_empty_and_full() {
        assert_eq!(AvailabilityMatrix::empty().slot_count(), 0);
        assert_eq!(AvailabilityMatrix::full().slot_count(), 336);
        assert_eq!(
            AvailabilityMatrix::full().common_slots(&AvailabilityMatrix::empty()),
            0
        );
        assert_eq!(
            AvailabilityMatrix::full().common_slots(&AvailabilityMatrix::full()),
            336
        );
    }

    #[test]
    fn test_half_days_overlap() {
        let a = AvailabilityMatrix::from_grid(&grid_with(|_, slot| slot < 24)).unwrap();
        let b = AvailabilityMatrix::from_grid(&grid_with(|_, slot| slot < 12)).unwrap();
        assert_eq!(a.common_slots(&b), 7 * 12);
    }

    #[test]
    fn test_six_full_days_overlap() {
        let a = AvailabilityMatrix::full();
        let b = AvailabilityMatrix::from_grid(&grid_with(|day, _| day < 6)).unwrap();
        assert_eq!(a.common_slots(&b), 6 * 48);
    }

    #[test]
    fn test_disjoint_halves() {
        let morning = AvailabilityMatrix::from_grid(&grid_with(|_, slot| slot < 24)).unwrap();
        let evening = AvailabilityMatrix::from_grid(&grid_with(|_, slot| slot >= 24)).unwrap();
        assert_eq!(morning.common_slots(&evening), 0);
    }

    #[test]
    fn test_rejects_wrong_day_count() {
        let grid = vec![vec![false; 48]; 6];
        assert!(matches!(
            AvailabilityMatrix::from_grid(&grid),
            Err(Error::InvalidAvailability(_))
        ));
    }

    #[test]
    fn test_rejects_wrong_slot_count() {
        let mut grid = vec![vec![false; 48]; 7];
        grid[3] = vec![true; 47];
        assert!(matches!(
            AvailabilityMatrix::from_grid(&grid),
            Err(Error::InvalidAvailability(_))
        ));
    }

    #[test]
    fn test_set_and_query() {
        let mut matrix = AvailabilityMatrix::empty();
        matrix.set(6, 47).unwrap();
        matrix.set(0, 0).unwrap();
        assert!(matrix.is_available(6, 47));
        assert!(matrix.is_available(0, 0));
        assert!(!matrix.is_available(3, 10));
        assert!(!matrix.is_available(7, 0));
        assert!(matrix.set(0, 48).is_err());
        assert_eq!(matrix.slot_count(), 2);
    }

    #[test]
    fn test_grid_round_trip_preserves_slots() {
        let grid = grid_with(|day, slot| (day + slot) % 3 == 0);
        let matrix = AvailabilityMatrix::from_grid(&grid).unwrap();
        assert_eq!(matrix.to_grid(), grid);
    }

    #[test]
    fn test_serde_uses_grid_shape() {
        let mut matrix = AvailabilityMatrix::empty();
        matrix.set(1, 2).unwrap();
        let json = serde_json::to_value(matrix).unwrap();
        assert_eq!(json.as_array().unwrap().len(), 7);
        assert_eq!(json[1][2], true);
        assert_eq!(json[1][3], false);

        let decoded: AvailabilityMatrix = serde_json::from_value(json).unwrap();
        assert_eq!(decoded, matrix);

        let bad = serde_json::json!([[true, false]]);
        assert!(serde_json::from_value::<AvailabilityMatrix>(bad).is_err());
    }

    #[test]
    fn test_intersection_matches_naive_reference() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let a = grid_with(|_, _| rng.gen_bool(0.5));
            let b = grid_with(|_, _| rng.gen_bool(0.3));
            let ma = AvailabilityMatrix::from_grid(&a).unwrap();
            let mb = AvailabilityMatrix::from_grid(&b).unwrap();
            assert_eq!(ma.common_slots(&mb), naive_common(&a, &b));
            assert_eq!(mb.common_slots(&ma), naive_common(&a, &b));
        }
    }
}
