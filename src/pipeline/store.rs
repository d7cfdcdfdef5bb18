//! Shared state store: the named values every part reads and writes.
//!
//! Keys are partitioned into key groups, normally one group per binding's
//! output keys. Each group sits behind its own `RwLock`, so publishes of
//! unrelated parts never serialize on a global lock, while a multi-key
//! publish or read takes every involved group lock (in ascending group order)
//! and can never observe a torn tuple.

use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::id::KeySlot;
use crate::pipeline::value::{Value, ValueKind};
use std::collections::{BTreeMap, HashMap};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug, Clone, Default)]
struct Cell {
    value: Value,
    /// Kind fixed by the first non-absent publish.
    kind: Option<ValueKind>,
}

#[derive(Debug)]
struct KeyGroup {
    keys: Vec<String>,
    cells: RwLock<Vec<Cell>>,
}

impl KeyGroup {
    fn read(&self) -> RwLockReadGuard<'_, Vec<Cell>> {
        self.cells.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<Cell>> {
        self.cells.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Builder describing how keys are grouped before the store is created.
#[derive(Debug, Default)]
pub struct StoreLayout {
    groups: Vec<Vec<String>>,
    index: HashMap<String, KeySlot>,
}

impl StoreLayout {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a key group. Keys already placed in an earlier group are skipped.
    pub fn group<S: AsRef<str>>(&mut self, keys: &[S]) -> &mut Self {
        let group_id = self.groups.len() as u32;
        let mut members = Vec::with_capacity(keys.len());
        for key in keys {
            let key = key.as_ref();
            if self.index.contains_key(key) {
                continue;
            }
            let slot = KeySlot::new(group_id, members.len() as u16);
            self.index.insert(key.to_string(), slot);
            members.push(key.to_string());
        }
        if !members.is_empty() {
            self.groups.push(members);
        }
        self
    }

    /// Add a key in its own single-key group if it is not placed yet.
    pub fn key(&mut self, key: &str) -> &mut Self {
        self.group(&[key])
    }

    pub fn slot(&self, key: &str) -> Option<KeySlot> {
        self.index.get(key).copied()
    }

    pub fn build(self) -> SharedStore {
        let groups = self
            .groups
            .into_iter()
            .map(|keys| {
                let cells = vec![Cell::default(); keys.len()];
                KeyGroup {
                    keys,
                    cells: RwLock::new(cells),
                }
            })
            .collect();
        SharedStore {
            index: self.index,
            groups,
        }
    }
}

/// Mapping of string keys to [`Value`]s, shared between the tick thread and
/// any observers. Every declared key starts out `Absent`.
#[derive(Debug)]
pub struct SharedStore {
    index: HashMap<String, KeySlot>,
    groups: Vec<KeyGroup>,
}

impl SharedStore {
    /// Create a store where every key sits in its own group.
    pub fn with_keys<S: AsRef<str>>(keys: &[S]) -> Self {
        let mut layout = StoreLayout::new();
        for key in keys {
            layout.key(key.as_ref());
        }
        layout.build()
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    pub fn slot(&self, key: &str) -> Option<KeySlot> {
        self.index.get(key).copied()
    }

    /// Number of independent lock units.
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Read the values of `keys` in order. Never fails; unknown keys yield `Absent`.
    pub fn get<S: AsRef<str>>(&self, keys: &[S]) -> Vec<Value> {
        let slots: Vec<Option<KeySlot>> = keys.iter().map(|k| self.slot(k.as_ref())).collect();
        self.get_slots(&slots)
    }

    /// Read a single key.
    pub fn get_one(&self, key: &str) -> Value {
        match self.slot(key) {
            Some(slot) => self.groups[slot.group()].read()[slot.position()]
                .value
                .clone(),
            None => Value::Absent,
        }
    }

    /// Read pre-resolved slots. Each involved group is locked once, so keys from
    /// the same group always come from the same publish.
    pub fn get_slots(&self, slots: &[Option<KeySlot>]) -> Vec<Value> {
        let groups = Self::involved_groups(slots.iter().flatten());
        let guards: Vec<_> = groups.iter().map(|&g| self.groups[g].read()).collect();

        slots
            .iter()
            .map(|slot| match slot {
                Some(slot) => {
                    let guard = &guards[Self::guard_index(&groups, slot.group())];
                    guard[slot.position()].value.clone()
                }
                None => Value::Absent,
            })
            .collect()
    }

    /// Atomically publish `values` to `keys`.
    ///
    /// Fails without writing anything if a key is unknown, the lengths differ,
    /// or a value would change the established kind of its key.
    pub fn set<S: AsRef<str>>(&self, keys: &[S], values: Vec<Value>) -> PipelineResult<()> {
        let slots = keys
            .iter()
            .map(|k| {
                self.slot(k.as_ref())
                    .ok_or_else(|| PipelineError::UnknownKey(k.as_ref().to_string()))
            })
            .collect::<PipelineResult<Vec<_>>>()?;
        self.set_slots(&slots, values)
    }

    /// Publish to pre-resolved slots. All-or-nothing, see [`SharedStore::set`].
    pub fn set_slots(&self, slots: &[KeySlot], values: Vec<Value>) -> PipelineResult<()> {
        if slots.len() != values.len() {
            return Err(PipelineError::LengthMismatch {
                keys: slots.len(),
                values: values.len(),
            });
        }

        let groups = Self::involved_groups(slots.iter());
        let mut guards: Vec<_> = groups.iter().map(|&g| self.groups[g].write()).collect();

        // Validate everything before the first write so a rejected publish leaves no trace.
        for (slot, value) in slots.iter().zip(&values) {
            let cell = &guards[Self::guard_index(&groups, slot.group())][slot.position()];
            if let (false, Some(kind)) = (value.fits(cell.kind), cell.kind) {
                return Err(PipelineError::TypeMismatch {
                    binding: None,
                    key: self.groups[slot.group()].keys[slot.position()].clone(),
                    expected: kind,
                    found: value.kind(),
                });
            }
        }

        for (slot, value) in slots.iter().zip(values) {
            let cell = &mut guards[Self::guard_index(&groups, slot.group())][slot.position()];
            if !value.is_absent() && cell.kind.is_none() {
                cell.kind = Some(value.kind());
            }
            cell.value = value;
        }
        Ok(())
    }

    /// Established kind of a key, if a non-absent value has been published.
    #[cfg(test)]
    fn kind_of(&self, key: &str) -> Option<ValueKind> {
        let slot = self.slot(key)?;
        self.groups[slot.group()].read()[slot.position()].kind
    }

    /// Ordered copy of every key. Consistent per key group.
    pub fn snapshot(&self) -> BTreeMap<String, Value> {
        let mut snapshot = BTreeMap::new();
        for group in &self.groups {
            let cells = group.read();
            for (key, cell) in group.keys.iter().zip(cells.iter()) {
                snapshot.insert(key.clone(), cell.value.clone());
            }
        }
        snapshot
    }

    /// All keys, sorted.
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.index.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }

    fn involved_groups<'a>(slots: impl Iterator<Item = &'a KeySlot>) -> Vec<usize> {
        let mut groups: Vec<usize> = slots.map(|s| s.group()).collect();
        groups.sort_unstable();
        groups.dedup();
        groups
    }

    #[inline]
    fn guard_index(groups: &[usize], group: usize) -> usize {
        // `groups` is sorted and always contains `group`.
        groups.binary_search(&group).unwrap_or_default()
    }
}
