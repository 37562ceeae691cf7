//! Sparse id-addressed collection with a secondary name-hash index
//!
//! Catalogs address groups (and groups address files) by small integer ids
//! that are mostly dense from 0, with the occasional hole. Entries may also
//! carry a name hash, which must be unique among live entries so that lookups
//! by name are unambiguous.
//!
//! An entry's id and name hash live in [`Entry`] and can only be changed
//! through the collection, which keeps the name index consistent.
//!
//! # Examples
//!
//! ```
//! use jagcache_formats::collection::NamedEntryCollection;
//!
//! let mut names: NamedEntryCollection<()> = NamedEntryCollection::new();
//! names.create_or_get(0);
//! names.create_or_get(1);
//! names.remove(0);
//!
//! assert_eq!(names.capacity(), 2);
//! assert!(names.contains(1));
//! assert!(!names.contains(0));
//! ```

mod error;

pub use error::{CollectionError, CollectionResult};

use jagcache_crypto::name_hash;
use std::collections::{BTreeMap, HashMap, btree_map};
use std::ops::{Deref, DerefMut};

/// Wire value meaning "no name"
pub const UNNAMED: i32 = -1;

/// An entry owned by a [`NamedEntryCollection`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry<T> {
    id: u32,
    name_hash: Option<i32>,
    value: T,
}

impl<T> Entry<T> {
    /// Position of the entry in its collection
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Name hash, if the entry is named
    pub fn name_hash(&self) -> Option<i32> {
        self.name_hash
    }

    /// The entry's payload
    pub fn value(&self) -> &T {
        &self.value
    }

    /// The entry's payload, mutably
    pub fn value_mut(&mut self) -> &mut T {
        &mut self.value
    }

    /// Consume the entry, returning its payload
    pub fn into_value(self) -> T {
        self.value
    }
}

impl<T> Deref for Entry<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T> DerefMut for Entry<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.value
    }
}

/// Collection of entries addressed by id or by name hash
#[derive(Debug, Clone)]
pub struct NamedEntryCollection<T> {
    entries: BTreeMap<u32, Entry<T>>,
    names: HashMap<i32, u32>,
}

impl<T> Default for NamedEntryCollection<T> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
            names: HashMap::new(),
        }
    }
}

impl<T> NamedEntryCollection<T> {
    /// Create an empty collection
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the collection has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// One past the highest live id, or 0 when empty
    pub fn capacity(&self) -> u64 {
        self.entries
            .last_key_value()
            .map_or(0, |(&id, _)| u64::from(id) + 1)
    }

    /// Whether an entry with `id` exists
    pub fn contains(&self, id: u32) -> bool {
        self.entries.contains_key(&id)
    }

    /// Whether an entry named `name_hash` exists
    pub fn contains_named(&self, name_hash: i32) -> bool {
        self.names.contains_key(&name_hash)
    }

    /// Whether an entry named `name` exists
    pub fn contains_named_str(&self, name: &str) -> bool {
        self.contains_named(name_hash(name))
    }

    /// Look up an entry by id
    pub fn get(&self, id: u32) -> Option<&Entry<T>> {
        self.entries.get(&id)
    }

    /// Look up an entry by id, mutably
    pub fn get_mut(&mut self, id: u32) -> Option<&mut Entry<T>> {
        self.entries.get_mut(&id)
    }

    /// Look up an entry by name hash
    pub fn get_named(&self, name_hash: i32) -> Option<&Entry<T>> {
        let id = self.names.get(&name_hash)?;
        self.entries.get(id)
    }

    /// Look up an entry by name hash, mutably
    pub fn get_named_mut(&mut self, name_hash: i32) -> Option<&mut Entry<T>> {
        let id = self.names.get(&name_hash)?;
        self.entries.get_mut(id)
    }

    /// Look up an entry by name
    pub fn get_named_str(&self, name: &str) -> Option<&Entry<T>> {
        self.get_named(name_hash(name))
    }

    /// Remove the entry with `id`
    ///
    /// Removing the highest id shrinks [`capacity`](Self::capacity) to one
    /// past the next-highest live id; removing any other id leaves a hole.
    pub fn remove(&mut self, id: u32) -> Option<Entry<T>> {
        let entry = self.entries.remove(&id)?;
        if let Some(hash) = entry.name_hash {
            self.names.remove(&hash);
        }
        Some(entry)
    }

    /// Remove the entry named `name_hash`
    pub fn remove_named(&mut self, name_hash: i32) -> Option<Entry<T>> {
        let id = *self.names.get(&name_hash)?;
        self.remove(id)
    }

    /// Remove the entry named `name`
    pub fn remove_named_str(&mut self, name: &str) -> Option<Entry<T>> {
        self.remove_named(name_hash(name))
    }

    /// Rename the entry with `id`
    ///
    /// Fails without changing anything if another entry owns the new name.
    pub fn set_name_hash(&mut self, id: u32, name_hash: Option<i32>) -> CollectionResult<()> {
        let entry = self
            .entries
            .get_mut(&id)
            .ok_or(CollectionError::NotFound(id))?;

        if let Some(hash) = name_hash {
            if hash == UNNAMED {
                return Err(CollectionError::ReservedNameHash);
            }
            match self.names.get(&hash) {
                Some(&owner) if owner != id => {
                    return Err(CollectionError::NameCollision {
                        name_hash: hash,
                        owner,
                    });
                }
                _ => {}
            }
        }

        if entry.name_hash == name_hash {
            return Ok(());
        }

        if let Some(previous) = entry.name_hash {
            self.names.remove(&previous);
        }
        if let Some(hash) = name_hash {
            self.names.insert(hash, id);
        }
        entry.name_hash = name_hash;
        Ok(())
    }

    /// Rename the entry with `id` to `name`
    pub fn set_name(&mut self, id: u32, name: &str) -> CollectionResult<()> {
        self.set_name_hash(id, Some(name_hash(name)))
    }

    /// Entries in ascending id order
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            inner: self.entries.values(),
        }
    }

    /// Entries in ascending id order, mutably
    pub fn iter_mut(&mut self) -> IterMut<'_, T> {
        IterMut {
            inner: self.entries.values_mut(),
        }
    }

    /// Live ids in ascending order
    pub fn ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.entries.keys().copied()
    }

    /// Walk entries in ascending id order, removing those for which `f`
    /// returns false
    pub fn retain<F>(&mut self, mut f: F)
    where
        F: FnMut(&mut Entry<T>) -> bool,
    {
        let names = &mut self.names;
        self.entries.retain(|_, entry| {
            let keep = f(entry);
            if !keep {
                if let Some(hash) = entry.name_hash {
                    names.remove(&hash);
                }
            }
            keep
        });
    }

    /// Remove every entry
    pub fn clear(&mut self) {
        self.entries.clear();
        self.names.clear();
    }
}

impl<T: Default> NamedEntryCollection<T> {
    /// Get the entry with `id`, creating an empty one if absent
    pub fn create_or_get(&mut self, id: u32) -> &mut Entry<T> {
        self.entries.entry(id).or_insert_with(|| Entry {
            id,
            name_hash: None,
            value: T::default(),
        })
    }

    /// Get the entry named `name_hash`, creating one at id
    /// [`capacity`](Self::capacity) if absent
    pub fn create_or_get_named(&mut self, name_hash: i32) -> CollectionResult<&mut Entry<T>> {
        if name_hash == UNNAMED {
            return Err(CollectionError::ReservedNameHash);
        }

        let id = match self.names.get(&name_hash) {
            Some(&id) => id,
            None => {
                let id = self.allocate_id()?;
                self.names.insert(name_hash, id);
                self.entries.insert(
                    id,
                    Entry {
                        id,
                        name_hash: Some(name_hash),
                        value: T::default(),
                    },
                );
                id
            }
        };

        self.entries.get_mut(&id).ok_or(CollectionError::NotFound(id))
    }

    /// Get the entry named `name`, creating one if absent
    pub fn create_or_get_named_str(&mut self, name: &str) -> CollectionResult<&mut Entry<T>> {
        self.create_or_get_named(name_hash(name))
    }

    fn allocate_id(&self) -> CollectionResult<u32> {
        u32::try_from(self.capacity()).map_err(|_| CollectionError::IdsExhausted)
    }
}

impl<T: PartialEq> PartialEq for NamedEntryCollection<T> {
    fn eq(&self, other: &Self) -> bool {
        // the name index is derived from the entries
        self.entries == other.entries
    }
}

impl<T: Eq> Eq for NamedEntryCollection<T> {}

/// Iterator over collection entries in id order
#[derive(Debug, Clone)]
pub struct Iter<'a, T> {
    inner: btree_map::Values<'a, u32, Entry<T>>,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a Entry<T>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<T> DoubleEndedIterator for Iter<'_, T> {
    fn next_back(&mut self) -> Option<Self::Item> {
        self.inner.next_back()
    }
}

impl<T> ExactSizeIterator for Iter<'_, T> {}

/// Mutable iterator over collection entries in id order
#[derive(Debug)]
pub struct IterMut<'a, T> {
    inner: btree_map::ValuesMut<'a, u32, Entry<T>>,
}

impl<'a, T> Iterator for IterMut<'a, T> {
    type Item = &'a mut Entry<T>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<T> ExactSizeIterator for IterMut<'_, T> {}

impl<'a, T> IntoIterator for &'a NamedEntryCollection<T> {
    type Item = &'a Entry<T>;
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'a, T> IntoIterator for &'a mut NamedEntryCollection<T> {
    type Item = &'a mut Entry<T>;
    type IntoIter = IterMut<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter_mut()
    }
}
