// Loot tables: static drop entries with chance and quantity, plus rolling.

use std::collections::HashMap;
use std::path::Path;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// `item_id` 0 is the currency drop.
pub const CURRENCY_ITEM_ID: u32 = 0;

/// One possible drop: `chance` is a percentage in `1..=100`, quantity is
/// rolled uniformly in `min..=max`.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct LootEntry {
    pub item_id: u32,
    pub chance: u32,
    pub min: u32,
    pub max: u32,
}

/// An item stack produced by a roll.
#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
pub struct LootDrop {
    pub item_id: u32,
    pub quantity: u32,
}

/// An ordered sequence of drop entries; entries roll independently.
#[derive(Clone, Debug, Deserialize)]
pub struct LootTable {
    pub id: u32,
    pub entries: Vec<LootEntry>,
}

impl LootTable {
    /// Roll every entry once.
    pub fn roll(&self, rng: &mut impl Rng) -> Vec<LootDrop> {
        let mut drops = Vec::new();
        for entry in &self.entries {
            if rng.gen_range(1..=100) > entry.chance {
                continue;
            }
            let quantity = if entry.min >= entry.max {
                entry.min
            } else {
                rng.gen_range(entry.min..=entry.max)
            };
            if quantity > 0 {
                drops.push(LootDrop {
                    item_id: entry.item_id,
                    quantity,
                });
            }
        }
        drops
    }
}

/// All loot tables, keyed by table id.
#[derive(Default)]
pub struct LootTableStore {
    tables: HashMap<u32, LootTable>,
}

impl LootTableStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(json: &str) -> Result<Self, String> {
        let tables: Vec<LootTable> =
            serde_json::from_str(json).map_err(|e| format!("invalid loot table data: {e}"))?;
        let mut store = Self::new();
        for t in tables {
            store.insert(t);
        }
        Ok(store)
    }

    pub fn load(path: &Path) -> Result<Self, String> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("failed to read {}: {e}", path.display()))?;
        Self::from_json(&contents)
    }

    pub fn insert(&mut self, table: LootTable) {
        self.tables.insert(table.id, table);
    }

    pub fn get(&self, id: u32) -> Option<&LootTable> {
        self.tables.get(&id)
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    use super::*;

    fn table(entries: Vec<LootEntry>) -> LootTable {
        LootTable { id: 1, entries }
    }

    #[test]
    fn test_guaranteed_entry_always_drops() {
        let t = table(vec![LootEntry {
            item_id: 77,
            chance: 100,
            min: 2,
            max: 2,
        }]);
        let mut rng = SmallRng::seed_from_u64(1);
        for _ in 0..50 {
            let drops = t.roll(&mut rng);
            assert_eq!(drops.len(), 1);
            assert_eq!(drops[0], LootDrop { item_id: 77, quantity: 2 });
        }
    }

    #[test]
    fn test_impossible_entry_never_drops() {
        // chance 0 never beats a 1..=100 roll
        let t = table(vec![LootEntry {
            item_id: 5,
            chance: 0,
            min: 1,
            max: 1,
        }]);
        let mut rng = SmallRng::seed_from_u64(2);
        for _ in 0..50 {
            assert!(t.roll(&mut rng).is_empty());
        }
    }

    #[test]
    fn test_quantity_within_bounds() {
        let t = table(vec![LootEntry {
            item_id: 9,
            chance: 100,
            min: 3,
            max: 7,
        }]);
        let mut rng = SmallRng::seed_from_u64(3);
        for _ in 0..100 {
            let drops = t.roll(&mut rng);
            assert!(drops[0].quantity >= 3 && drops[0].quantity <= 7);
        }
    }

    #[test]
    fn test_chance_roughly_respected() {
        let t = table(vec![LootEntry {
            item_id: 1,
            chance: 50,
            min: 1,
            max: 1,
        }]);
        let mut rng = SmallRng::seed_from_u64(4);
        let hits = (0..1_000).filter(|_| !t.roll(&mut rng).is_empty()).count();
        assert!((350..=650).contains(&hits), "50% chance produced {hits}/1000");
    }

    #[test]
    fn test_store_from_json() {
        let json = r#"[
            {"id": 10, "entries": [
                {"item_id": 0, "chance": 100, "min": 5, "max": 12},
                {"item_id": 2001, "chance": 25, "min": 1, "max": 1}
            ]}
        ]"#;
        let store = LootTableStore::from_json(json).unwrap();
        let t = store.get(10).unwrap();
        assert_eq!(t.entries.len(), 2);
        assert_eq!(t.entries[0].item_id, CURRENCY_ITEM_ID);
        assert!(store.get(11).is_none());
    }
}
