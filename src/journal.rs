// 10.0 journal.rs: undo logs behind the engine's all-or-nothing operations.
// while recording, a journaled collection keeps the prior value of every entry it
// overwrites. rollback replays the log backwards down to a checkpoint mark, so undoing
// an operation costs what the operation wrote and nothing more.
// 10.1 Transactional is implemented by every component the engine checkpoints.

use std::collections::{BTreeSet, HashMap};
use std::hash::Hash;
use std::ops::Bound;

/// State that can be rewound to a checkpoint taken by [`Transactional::begin`].
pub trait Transactional {
    type Checkpoint;

    /// Start recording if not already. Nested calls hand out marks on the same log.
    fn begin(&mut self) -> Self::Checkpoint;

    /// Undo every write made since `checkpoint` was taken.
    fn rollback(&mut self, checkpoint: Self::Checkpoint);

    /// Stop recording and drop the log. Returns the number of writes it held.
    fn commit(&mut self) -> usize;
}

/** 10.0.1: hash map with an undo log */
#[derive(Debug, Clone)]
pub struct JournaledMap<K, V> {
    entries: HashMap<K, V>,
    undo: Vec<(K, Option<V>)>,
    recording: bool,
}

impl<K, V> Default for JournaledMap<K, V> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            undo: Vec::new(),
            recording: false,
        }
    }
}

impl<K: Eq + Hash + Clone, V: Clone> JournaledMap<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.entries.get(key)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.entries.keys()
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.entries.values()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.entries.iter()
    }

    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        let prior = self.entries.insert(key.clone(), value);
        self.record(key, prior.clone());
        prior
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        let prior = self.entries.remove(key);
        if prior.is_some() {
            self.record(key.clone(), prior.clone());
        }
        prior
    }

    /// Mutable access. The entry's current value is logged first.
    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        if self.recording {
            if let Some(value) = self.entries.get(key) {
                self.undo.push((key.clone(), Some(value.clone())));
            }
        }
        self.entries.get_mut(key)
    }

    fn record(&mut self, key: K, prior: Option<V>) {
        if self.recording {
            self.undo.push((key, prior));
        }
    }
}

impl<K: Eq + Hash + Clone, V: Clone> Transactional for JournaledMap<K, V> {
    type Checkpoint = usize;

    fn begin(&mut self) -> usize {
        self.recording = true;
        self.undo.len()
    }

    fn rollback(&mut self, mark: usize) {
        while self.undo.len() > mark {
            let Some((key, prior)) = self.undo.pop() else {
                break;
            };
            match prior {
                Some(value) => {
                    self.entries.insert(key, value);
                }
                None => {
                    self.entries.remove(&key);
                }
            }
        }
    }

    fn commit(&mut self) -> usize {
        self.recording = false;
        let writes = self.undo.len();
        self.undo.clear();
        writes
    }
}

/** 10.0.2: ordered set with an undo log */
#[derive(Debug, Clone)]
pub struct JournaledSet<T> {
    items: BTreeSet<T>,
    // item and whether it was present before the write
    undo: Vec<(T, bool)>,
    recording: bool,
}

impl<T> Default for JournaledSet<T> {
    fn default() -> Self {
        Self {
            items: BTreeSet::new(),
            undo: Vec::new(),
            recording: false,
        }
    }
}

impl<T: Ord + Clone> JournaledSet<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn contains(&self, item: &T) -> bool {
        self.items.contains(item)
    }

    pub fn first(&self) -> Option<&T> {
        self.items.first()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    /// First item strictly after `item`.
    pub fn next_after(&self, item: &T) -> Option<&T> {
        self.items.range((Bound::Excluded(item), Bound::Unbounded)).next()
    }

    pub fn insert(&mut self, item: T) -> bool {
        let added = self.items.insert(item.clone());
        if added && self.recording {
            self.undo.push((item, false));
        }
        added
    }

    pub fn remove(&mut self, item: &T) -> bool {
        let removed = self.items.remove(item);
        if removed && self.recording {
            self.undo.push((item.clone(), true));
        }
        removed
    }
}

impl<T: Ord + Clone> Transactional for JournaledSet<T> {
    type Checkpoint = usize;

    fn begin(&mut self) -> usize {
        self.recording = true;
        self.undo.len()
    }

    fn rollback(&mut self, mark: usize) {
        while self.undo.len() > mark {
            let Some((item, was_present)) = self.undo.pop() else {
                break;
            };
            if was_present {
                self.items.insert(item);
            } else {
                self.items.remove(&item);
            }
        }
    }

    fn commit(&mut self) -> usize {
        self.recording = false;
        let writes = self.undo.len();
        self.undo.clear();
        writes
    }
}
