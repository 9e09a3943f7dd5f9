//! Bit sets over a fixed universe, used by the dominance analyses where
//! the same few hundred statements are intersected over and over.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::rc::Rc;

#[derive(Debug)]
struct Universe<T> {
    items: Vec<T>,
    index: HashMap<T, usize>,
}

/// Creates sets that share one element universe.
#[derive(Clone, Debug)]
pub struct FastFixedSetFactory<T> {
    universe: Rc<Universe<T>>,
}

impl<T: Copy + Eq + Hash> FastFixedSetFactory<T> {
    pub fn new(items: impl IntoIterator<Item = T>) -> Self {
        let mut list = Vec::new();
        let mut index = HashMap::new();
        for item in items {
            if let std::collections::hash_map::Entry::Vacant(e) = index.entry(item) {
                e.insert(list.len());
                list.push(item);
            }
        }
        FastFixedSetFactory {
            universe: Rc::new(Universe { items: list, index }),
        }
    }

    pub fn spawn_empty_set(&self) -> FastFixedSet<T> {
        let words = (self.universe.items.len() + 63) / 64;
        FastFixedSet {
            universe: Rc::clone(&self.universe),
            words: vec![0; words],
        }
    }

    pub fn spawn_full_set(&self) -> FastFixedSet<T> {
        let mut set = self.spawn_empty_set();
        set.set_all_elements();
        set
    }

    pub fn universe_len(&self) -> usize {
        self.universe.items.len()
    }
}

/// A subset of the factory's universe. Elements outside the universe are
/// ignored by `add` and never contained.
#[derive(Clone)]
pub struct FastFixedSet<T> {
    universe: Rc<Universe<T>>,
    words: Vec<u64>,
}

impl<T: Copy + Eq + Hash> FastFixedSet<T> {
    fn position(&self, item: &T) -> Option<(usize, u64)> {
        self.universe.index.get(item).map(|&i| (i / 64, 1u64 << (i % 64)))
    }

    pub fn add(&mut self, item: T) {
        if let Some((word, bit)) = self.position(&item) {
            self.words[word] |= bit;
        }
    }

    pub fn add_all(&mut self, items: impl IntoIterator<Item = T>) {
        for item in items {
            self.add(item);
        }
    }

    pub fn remove(&mut self, item: &T) {
        if let Some((word, bit)) = self.position(item) {
            self.words[word] &= !bit;
        }
    }

    pub fn contains(&self, item: &T) -> bool {
        self.position(item)
            .map_or(false, |(word, bit)| self.words[word] & bit != 0)
    }

    /// Whether every element of `other` is in this set.
    pub fn contains_all(&self, other: &FastFixedSet<T>) -> bool {
        self.words.iter().zip(&other.words).all(|(a, b)| b & !a == 0)
    }

    pub fn union(&mut self, other: &FastFixedSet<T>) {
        for (a, b) in self.words.iter_mut().zip(&other.words) {
            *a |= b;
        }
    }

    pub fn intersection(&mut self, other: &FastFixedSet<T>) {
        for (a, b) in self.words.iter_mut().zip(&other.words) {
            *a &= b;
        }
    }

    /// Removes every element of `other`.
    pub fn complement(&mut self, other: &FastFixedSet<T>) {
        for (a, b) in self.words.iter_mut().zip(&other.words) {
            *a &= !b;
        }
    }

    pub fn set_all_elements(&mut self) {
        let len = self.universe.items.len();
        for (i, word) in self.words.iter_mut().enumerate() {
            let remaining = len - i * 64;
            *word = if remaining >= 64 { u64::MAX } else { (1u64 << remaining) - 1 };
        }
    }

    pub fn clear(&mut self) {
        self.words.iter_mut().for_each(|w| *w = 0);
    }

    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|&w| w == 0)
    }

    pub fn len(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Members in universe order.
    pub fn iter(&self) -> impl Iterator<Item = T> + '_ {
        self.universe
            .items
            .iter()
            .enumerate()
            .filter(move |(i, _)| self.words[i / 64] & (1u64 << (i % 64)) != 0)
            .map(|(_, &item)| item)
    }

    pub fn to_vec(&self) -> Vec<T> {
        self.iter().collect()
    }
}

impl<T> PartialEq for FastFixedSet<T> {
    fn eq(&self, other: &Self) -> bool {
        self.words == other.words
    }
}

impl<T: Copy + Eq + Hash + fmt::Debug> fmt::Debug for FastFixedSet<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_algebra() {
        let factory = FastFixedSetFactory::new(0..130usize);
        let mut a = factory.spawn_empty_set();
        a.add_all([1, 64, 129]);
        let mut b = factory.spawn_empty_set();
        b.add_all([64, 2]);

        let mut u = a.clone();
        u.union(&b);
        assert_eq!(u.to_vec(), vec![1, 2, 64, 129]);

        let mut i = a.clone();
        i.intersection(&b);
        assert_eq!(i.to_vec(), vec![64]);

        let mut c = a.clone();
        c.complement(&b);
        assert_eq!(c.to_vec(), vec![1, 129]);
        assert!(u.contains_all(&a));
        assert!(!a.contains_all(&u));
    }

    #[test]
    fn full_set_and_foreign_items() {
        let factory = FastFixedSetFactory::new([7usize, 3, 9]);
        let mut full = factory.spawn_full_set();
        assert_eq!(full.len(), 3);
        assert_eq!(full.to_vec(), vec![7, 3, 9]);
        full.add(100);
        assert!(!full.contains(&100));
        full.remove(&3);
        assert_eq!(full.len(), 2);
    }
}
