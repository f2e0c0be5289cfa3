use uuid::Uuid;

use super::accounts::Shard;
use super::address::AccountAddress;

impl Shard {
    /// An empty shard with `capacity` slots.
    pub fn allocate(vault: AccountAddress, index: u8, capacity: u16, now: i64) -> Self {
        Self {
            vault,
            index,
            count: 0,
            slots: vec![None; capacity as usize],
            created_at: now,
            updated_at: now,
        }
    }

    pub fn capacity(&self) -> u16 {
        self.slots.len() as u16
    }

    pub fn has_capacity(&self) -> bool {
        self.slots.iter().any(Option::is_none)
    }

    /// Place `file_id` in the first free slot.
    pub fn insert(&mut self, file_id: Uuid, now: i64) -> Option<u16> {
        let slot = self.slots.iter().position(Option::is_none)?;
        self.slots[slot] = Some(file_id);
        self.count = self.count.saturating_add(1);
        self.updated_at = now;
        Some(slot as u16)
    }

    pub fn remove(&mut self, file_id: &Uuid, now: i64) -> Option<u16> {
        let slot = self.slots.iter().position(|s| s.as_ref() == Some(file_id))?;
        self.slots[slot] = None;
        self.count = self.count.saturating_sub(1);
        self.updated_at = now;
        Some(slot as u16)
    }

    pub fn file_ids(&self) -> impl Iterator<Item = &Uuid> {
        self.slots.iter().flatten()
    }

    /// Occupied slots, which is authoritative over `count`.
    pub fn occupied(&self) -> u16 {
        self.file_ids().count() as u16
    }
}

/// Index of the first shard with a free slot.
pub fn first_fit(shards: &[Shard]) -> Option<usize> {
    shards.iter().position(Shard::has_capacity)
}
