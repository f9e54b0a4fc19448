//! Amplitude storage for one sector solve
//!
//! Amplitudes are addressed by typed keys instead of names: a [`Rank`]
//! (singles, doubles, triples) and a [`Role`] (the committed "current" value or
//! the "working" update being assembled in this iteration). [`AmplitudeSet`]
//! is the in-memory [`TensorStore`]; a rank is either tracked with both roles
//! or not tracked at all.

use crate::tensor::AmplitudeTensor;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Excitation rank of an amplitude tensor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rank {
    Singles,
    Doubles,
    Triples,
}

impl Rank {
    pub const ALL: [Rank; 3] = [Rank::Singles, Rank::Doubles, Rank::Triples];

    /// Slot position, 0 for singles
    pub fn index(self) -> usize {
        match self {
            Rank::Singles => 0,
            Rank::Doubles => 1,
            Rank::Triples => 2,
        }
    }

    /// Number of hole (and particle) indices carried by the amplitude
    pub fn excitation_level(self) -> usize {
        self.index() + 1
    }

    pub fn label(self) -> &'static str {
        match self {
            Rank::Singles => "T1",
            Rank::Doubles => "T2",
            Rank::Triples => "T3",
        }
    }
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One optional value per rank
#[derive(Debug, Clone, PartialEq)]
pub struct RankSlots<V>([Option<V>; 3]);

impl<V> Default for RankSlots<V> {
    fn default() -> Self {
        RankSlots([None, None, None])
    }
}

impl<V> RankSlots<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, rank: Rank) -> Option<&V> {
        self.0[rank.index()].as_ref()
    }

    pub fn get_mut(&mut self, rank: Rank) -> Option<&mut V> {
        self.0[rank.index()].as_mut()
    }

    pub fn insert(&mut self, rank: Rank, value: V) -> Option<V> {
        self.0[rank.index()].replace(value)
    }

    pub fn remove(&mut self, rank: Rank) -> Option<V> {
        self.0[rank.index()].take()
    }

    pub fn contains(&self, rank: Rank) -> bool {
        self.0[rank.index()].is_some()
    }

    /// Occupied ranks in ascending order
    pub fn ranks(&self) -> Vec<Rank> {
        Rank::ALL
            .into_iter()
            .filter(|&r| self.contains(r))
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Rank, &V)> {
        Rank::ALL
            .into_iter()
            .filter_map(move |r| self.get(r).map(|v| (r, v)))
    }

    pub fn len(&self) -> usize {
        self.0.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<V> FromIterator<(Rank, V)> for RankSlots<V> {
    fn from_iter<I: IntoIterator<Item = (Rank, V)>>(iter: I) -> Self {
        let mut slots = RankSlots::new();
        for (rank, value) in iter {
            slots.insert(rank, value);
        }
        slots
    }
}

/// Which copy of a rank's amplitude a key refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Committed value from the previous iteration
    Current,
    /// Update being assembled in the current iteration
    Working,
}

/// Typed address of an amplitude tensor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TensorKey {
    pub rank: Rank,
    pub role: Role,
}

impl TensorKey {
    pub fn current(rank: Rank) -> Self {
        TensorKey {
            rank,
            role: Role::Current,
        }
    }

    pub fn working(rank: Rank) -> Self {
        TensorKey {
            rank,
            role: Role::Working,
        }
    }
}

/// Explicit tensor store handed to the solver and its collaborators
pub trait TensorStore<T> {
    fn get(&self, key: TensorKey) -> Option<&T>;
    fn get_mut(&mut self, key: TensorKey) -> Option<&mut T>;
    /// Store a tensor, returning the one it replaces
    fn put(&mut self, key: TensorKey, value: T) -> Option<T>;
    /// Remove a tensor, returning it
    fn erase(&mut self, key: TensorKey) -> Option<T>;

    fn current(&self, rank: Rank) -> Option<&T> {
        self.get(TensorKey::current(rank))
    }

    fn working(&self, rank: Rank) -> Option<&T> {
        self.get(TensorKey::working(rank))
    }
}

/// Amplitudes of one sector: current and working tensors per tracked rank,
/// plus the optional effective-operator tensor saved with checkpoints.
#[derive(Debug, Clone)]
pub struct AmplitudeSet<T> {
    current: RankSlots<T>,
    working: RankSlots<T>,
    effective_operator: Option<T>,
}

impl<T> Default for AmplitudeSet<T> {
    fn default() -> Self {
        AmplitudeSet {
            current: RankSlots::new(),
            working: RankSlots::new(),
            effective_operator: None,
        }
    }
}

impl<T: AmplitudeTensor> AmplitudeSet<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`AmplitudeSet::enable`]
    pub fn with_rank(mut self, rank: Rank, initial: T) -> Self {
        self.enable(rank, initial);
        self
    }

    /// Track a rank starting from `initial`
    pub fn enable(&mut self, rank: Rank, initial: T) {
        self.working.insert(rank, initial.clone());
        self.current.insert(rank, initial);
    }

    pub fn is_active(&self, rank: Rank) -> bool {
        self.current.contains(rank)
    }

    pub fn active_ranks(&self) -> Vec<Rank> {
        self.current.ranks()
    }

    pub fn current(&self, rank: Rank) -> Option<&T> {
        self.current.get(rank)
    }

    pub fn working(&self, rank: Rank) -> Option<&T> {
        self.working.get(rank)
    }

    pub fn working_mut(&mut self, rank: Rank) -> Option<&mut T> {
        self.working.get_mut(rank)
    }

    /// Current and working tensors of one rank
    pub fn pair(&self, rank: Rank) -> Option<(&T, &T)> {
        Some((self.current.get(rank)?, self.working.get(rank)?))
    }

    /// Current (read) and working (write) tensors of one rank
    pub fn pair_mut(&mut self, rank: Rank) -> Option<(&T, &mut T)> {
        Some((self.current.get(rank)?, self.working.get_mut(rank)?))
    }

    /// Replace the working tensor of an active rank; ignored for inactive ranks
    pub fn set_working(&mut self, rank: Rank, value: T) {
        if let Some(slot) = self.working.get_mut(rank) {
            *slot = value;
        }
    }

    /// current := working for one rank
    pub fn commit(&mut self, rank: Rank) {
        if let (Some(current), Some(working)) = (self.current.get_mut(rank), self.working.get(rank))
        {
            current.copy_from(working);
        }
    }

    /// current := working for every tracked rank
    pub fn commit_all(&mut self) {
        for rank in self.active_ranks() {
            self.commit(rank);
        }
    }

    pub fn effective_operator(&self) -> Option<&T> {
        self.effective_operator.as_ref()
    }

    pub fn set_effective_operator(&mut self, value: T) {
        self.effective_operator = Some(value);
    }

    /// Bytes held by current and working tensors
    pub fn size_in_bytes(&self) -> usize {
        self.current
            .iter()
            .chain(self.working.iter())
            .map(|(_, t)| t.size_in_bytes())
            .sum::<usize>()
            + self
                .effective_operator
                .as_ref()
                .map_or(0, |t| t.size_in_bytes())
    }
}

impl<T: AmplitudeTensor> TensorStore<T> for AmplitudeSet<T> {
    fn get(&self, key: TensorKey) -> Option<&T> {
        match key.role {
            Role::Current => self.current.get(key.rank),
            Role::Working => self.working.get(key.rank),
        }
    }

    fn get_mut(&mut self, key: TensorKey) -> Option<&mut T> {
        match key.role {
            Role::Current => self.current.get_mut(key.rank),
            Role::Working => self.working.get_mut(key.rank),
        }
    }

    /// Putting either role of an untracked rank starts tracking it with both
    /// roles set to the same value.
    fn put(&mut self, key: TensorKey, value: T) -> Option<T> {
        if !self.is_active(key.rank) {
            self.enable(key.rank, value);
            return None;
        }
        match key.role {
            Role::Current => self.current.insert(key.rank, value),
            Role::Working => self.working.insert(key.rank, value),
        }
    }

    /// Erasing either role drops the whole rank.
    fn erase(&mut self, key: TensorKey) -> Option<T> {
        let current = self.current.remove(key.rank);
        let working = self.working.remove(key.rank);
        match key.role {
            Role::Current => current,
            Role::Working => working,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::DenseTensor;

    fn vector(values: &[f64]) -> DenseTensor<f64> {
        DenseTensor::from_vec(&[values.len()], values.to_vec()).unwrap()
    }

    #[test]
    fn test_rank_slots_order_and_len() {
        let slots: RankSlots<u8> = [(Rank::Triples, 3), (Rank::Singles, 1)].into_iter().collect();
        assert_eq!(slots.ranks(), vec![Rank::Singles, Rank::Triples]);
        assert_eq!(slots.len(), 2);
        assert!(!slots.contains(Rank::Doubles));
    }

    #[test]
    fn test_enable_tracks_both_roles() {
        let amps = AmplitudeSet::new().with_rank(Rank::Doubles, vector(&[1.0, 2.0]));
        assert!(amps.is_active(Rank::Doubles));
        assert!(!amps.is_active(Rank::Singles));
        assert_eq!(amps.current(Rank::Doubles), amps.working(Rank::Doubles));
        assert_eq!(amps.active_ranks(), vec![Rank::Doubles]);
    }

    #[test]
    fn test_commit_copies_working() {
        let mut amps = AmplitudeSet::new().with_rank(Rank::Singles, vector(&[0.0, 0.0]));
        amps.set_working(Rank::Singles, vector(&[0.5, -0.5]));
        assert_ne!(amps.current(Rank::Singles), amps.working(Rank::Singles));
        amps.commit_all();
        assert_eq!(amps.current(Rank::Singles).unwrap().as_slice(), &[0.5, -0.5]);
    }

    #[test]
    fn test_store_put_on_untracked_rank_enables_it() {
        let mut amps = AmplitudeSet::<DenseTensor<f64>>::new();
        assert!(amps.put(TensorKey::working(Rank::Triples), vector(&[1.0])).is_none());
        assert!(amps.get(TensorKey::current(Rank::Triples)).is_some());
        assert!(amps.get(TensorKey::working(Rank::Triples)).is_some());
    }

    #[test]
    fn test_store_erase_drops_rank() {
        let mut amps = AmplitudeSet::new().with_rank(Rank::Singles, vector(&[1.0]));
        let erased = amps.erase(TensorKey::working(Rank::Singles));
        assert!(erased.is_some());
        assert!(!amps.is_active(Rank::Singles));
        assert!(amps.get(TensorKey::current(Rank::Singles)).is_none());
    }

    #[test]
    fn test_size_in_bytes_counts_both_roles() {
        let mut amps = AmplitudeSet::new().with_rank(Rank::Singles, vector(&[1.0, 2.0]));
        assert_eq!(amps.size_in_bytes(), 32);
        amps.set_effective_operator(vector(&[0.0]));
        assert_eq!(amps.size_in_bytes(), 40);
    }
}
