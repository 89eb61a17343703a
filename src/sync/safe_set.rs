use std::hash::Hash;
use std::sync::{Arc, Mutex};

use super::node::Node;
use super::safe_map::{Emptiable, SafeMap};

/// A thread-safe set with order-preserving lazy iteration.
///
/// Membership is answered by the backing [`SafeMap`]; iteration walks a
/// doubly-linked node chain, yielding each value under the node's read
/// lock. Iteration is safe against concurrent add/remove and terminates
/// when the chain is exhausted or the consumer abandons the iterator.
pub struct SafeSet<T> {
    // serializes structural chain mutation; readers take no part in it
    write_lock: Mutex<()>,
    map: SafeMap<T, Arc<Node<T>>>,
    head: Arc<Node<T>>,
}

impl<T: Eq + Hash + Clone> SafeSet<T> {
    pub fn new() -> Self {
        Self {
            write_lock: Mutex::new(()),
            map: SafeMap::new(),
            head: Node::sentinel(),
        }
    }

    /// Insert `value`; a no-op if it is already present.
    pub fn add(&self, value: T) {
        let _guard = self.write_lock.lock().unwrap();
        if self.map.get(&value).is_some() {
            return;
        }
        let node = self.head.insert_after(value.clone());
        self.map.set(value, node);
    }

    /// Remove `value`; a no-op if it is absent.
    pub fn remove(&self, value: &T) {
        let _guard = self.write_lock.lock().unwrap();
        if let Some(node) = self.map.pop(value) {
            node.unlink();
        }
    }

    pub fn contains(&self, value: &T) -> bool {
        self.map.get(value).is_some()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Lazy walk over the current chain.
    pub fn iter(&self) -> SetIter<T> {
        SetIter {
            cursor: Arc::clone(&self.head),
        }
    }
}

impl<T: Eq + Hash + Clone> Default for SafeSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Eq + Hash + Clone> Emptiable for SafeSet<T> {
    fn is_empty(&self) -> bool {
        SafeSet::is_empty(self)
    }
}

pub struct SetIter<T> {
    cursor: Arc<Node<T>>,
}

impl<T: Clone> Iterator for SetIter<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        loop {
            let node = self.cursor.next_node()?;
            self.cursor = Arc::clone(&node);
            // a concurrently unlinked node has no value; skip past it
            if let Some(value) = node.value() {
                return Some(value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn add_remove_contains() {
        let set = SafeSet::new();
        set.add("a");
        set.add("b");
        set.add("a");
        assert_eq!(set.len(), 2);
        assert!(set.contains(&"a"));

        set.remove(&"a");
        assert!(!set.contains(&"a"));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn iteration_sees_all_members() {
        let set = SafeSet::new();
        for i in 0..50 {
            set.add(i);
        }
        let mut seen: Vec<i32> = set.iter().collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..50).collect::<Vec<_>>());
    }

    #[test]
    fn iteration_survives_concurrent_mutation() {
        let set = Arc::new(SafeSet::new());
        for i in 0..100 {
            set.add(i);
        }

        let mutator = {
            let set = Arc::clone(&set);
            thread::spawn(move || {
                for i in 0..100 {
                    if i % 2 == 0 {
                        set.remove(&i);
                    } else {
                        set.add(i + 1000);
                    }
                }
            })
        };

        // Must terminate and only yield values that were members at some point.
        for v in set.iter() {
            assert!((0..100).contains(&v) || (1000..1100).contains(&v));
        }
        mutator.join().unwrap();
    }
}
