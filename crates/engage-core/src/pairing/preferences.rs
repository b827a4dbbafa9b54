//! Ranked preference lists from common availability.
//!
//! Members are addressed by their index in the input slice. Every member ranks
//! every other member by the number of slots they share, best first; equal
//! scores fall back to the lower index so the same input always yields the
//! same lists.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::availability::AvailabilityMatrix;
use crate::error::{Error, Result};
use crate::models::MemberId;

/// Symmetric `n × n` matrix of common-slot counts. The diagonal is unused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommonSlots {
    n: usize,
    cells: Vec<u32>,
}

impl CommonSlots {
    /// Pairwise intersections of the given availabilities.
    pub fn from_availability(matrices: &[AvailabilityMatrix]) -> Self {
        let n = matrices.len();
        let mut cells = vec![0; n * n];
        for i in 0..n {
            for j in (i + 1)..n {
                let common = matrices[i].common_slots(&matrices[j]);
                cells[i * n + j] = common;
                cells[j * n + i] = common;
            }
        }
        Self { n, cells }
    }

    /// Use precomputed scores. Rows must form a symmetric square matrix;
    /// diagonal entries are ignored.
    pub fn from_rows(rows: &[Vec<u32>]) -> Result<Self> {
        let n = rows.len();
        let mut cells = vec![0; n * n];
        for (i, row) in rows.iter().enumerate() {
            if row.len() != n {
                return Err(Error::InvalidInput(format!(
                    "row {} has {} columns, expected {}",
                    i,
                    row.len(),
                    n
                )));
            }
            for (j, score) in row.iter().enumerate() {
                if i != j {
                    cells[i * n + j] = *score;
                }
            }
        }
        for i in 0..n {
            for j in (i + 1)..n {
                if cells[i * n + j] != cells[j * n + i] {
                    return Err(Error::InvalidInput(format!(
                        "common slots are not symmetric at ({}, {})",
                        i, j
                    )));
                }
            }
        }
        Ok(Self { n, cells })
    }

    pub fn len(&self) -> usize {
        self.n
    }

    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    pub fn get(&self, i: usize, j: usize) -> u32 {
        self.cells[i * self.n + j]
    }
}

/// One candidate on a member's preference list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreferenceEntry {
    /// Index of the candidate member.
    pub partner: usize,
    /// Common slots with that candidate.
    pub score: u32,
}

/// Preference list per member, best candidate first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preferences {
    lists: Vec<Vec<PreferenceEntry>>,
}

impl Preferences {
    /// Wrap explicit lists. Validation happens in the matcher.
    pub fn new(lists: Vec<Vec<PreferenceEntry>>) -> Self {
        Self { lists }
    }

    /// Rank every other member by descending score, ties by ascending index.
    pub fn from_common_slots(common: &CommonSlots) -> Self {
        let n = common.len();
        let lists = (0..n)
            .map(|i| {
                let mut list: Vec<PreferenceEntry> = (0..n)
                    .filter(|&j| j != i)
                    .map(|j| PreferenceEntry {
                        partner: j,
                        score: common.get(i, j),
                    })
                    .collect();
                list.sort_by(|a, b| b.score.cmp(&a.score).then(a.partner.cmp(&b.partner)));
                list
            })
            .collect();
        Self { lists }
    }

    pub fn len(&self) -> usize {
        self.lists.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lists.is_empty()
    }

    pub fn list(&self, member: usize) -> &[PreferenceEntry] {
        &self.lists[member]
    }

    pub fn lists(&self) -> &[Vec<PreferenceEntry>] {
        &self.lists
    }
}

/// Builds the common-slot matrix and preference lists for a member list.
pub struct PreferenceBuilder;

impl PreferenceBuilder {
    /// `availability_of` returns `None` for members without a stored
    /// availability; they count as never available.
    pub fn build<F>(members: &[MemberId], availability_of: F) -> Result<(CommonSlots, Preferences)>
    where
        F: Fn(MemberId) -> Option<AvailabilityMatrix>,
    {
        let mut seen = HashSet::with_capacity(members.len());
        for member in members {
            if !seen.insert(*member) {
                return Err(Error::InvalidInput(format!(
                    "duplicate member id {} in pairing input",
                    member
                )));
            }
        }

        let matrices: Vec<AvailabilityMatrix> = members
            .iter()
            .map(|m| availability_of(*m).unwrap_or_default())
            .collect();
        let common = CommonSlots::from_availability(&matrices);
        let preferences = Preferences::from_common_slots(&common);
        Ok((common, preferences))
    }
}
