//! Item templates, dropped items, and player inventories.
//!
//! Templates are immutable content definitions delivered by an external
//! collaborator as JSON; the simulation only copies display metadata out of
//! them when an item instance is spawned into the world.

use std::collections::HashMap;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::math::Vec3;

/// Item type id. Indexes the template catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemId(pub i32);

/// Immutable per-type item definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemTemplate {
    pub id: ItemId,
    /// Stable content key, also sent in `ITEM_UPDATE` records.
    pub entry_name: String,
    pub display_name: String,
}

/// The full template table, keyed by entry name in its JSON form.
#[derive(Debug, Clone, Default)]
pub struct ItemCatalog {
    by_id: HashMap<ItemId, ItemTemplate>,
    json: String,
}

impl ItemCatalog {
    /// Parses the catalog from its JSON document. The original document is
    /// retained verbatim for the `SAVE_ITEM_LIST` handshake packet.
    pub fn from_json_str(json: &str) -> anyhow::Result<Self> {
        let entries: HashMap<String, ItemTemplate> =
            serde_json::from_str(json).context("parse item catalog")?;
        let mut by_id = HashMap::new();
        for (entry_name, mut template) in entries {
            template.entry_name = entry_name;
            if let Some(prev) = by_id.insert(template.id, template) {
                anyhow::bail!("duplicate item id {:?} ({})", prev.id, prev.entry_name);
            }
        }
        Ok(Self {
            by_id,
            json: json.to_string(),
        })
    }

    /// Built-in catalog used when no external item list is supplied.
    pub fn builtin() -> Self {
        let json = r#"{
            "apple":         { "id": 0, "entry_name": "", "display_name": "Apple" },
            "assault_rifle": { "id": 1, "entry_name": "", "display_name": "Assault Rifle" },
            "heavy_axe":     { "id": 2, "entry_name": "", "display_name": "Heavy Axe" }
        }"#;
        Self::from_json_str(json).expect("builtin catalog is valid")
    }

    pub fn get(&self, id: ItemId) -> Option<&ItemTemplate> {
        self.by_id.get(&id)
    }

    pub fn json(&self) -> &str {
        &self.json
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

/// A live item lying in the world, owned by the item registry.
#[derive(Debug, Clone)]
pub struct DroppedItem {
    /// Unique among currently dropped items.
    pub uuid: i32,
    pub item_id: ItemId,
    pub pos: Vec3,
    /// Display metadata copied from the template at spawn time.
    pub entry_name: String,
    pub display_name: String,
}

impl DroppedItem {
    pub fn from_template(template: &ItemTemplate, uuid: i32, pos: Vec3) -> Self {
        Self {
            uuid,
            item_id: template.id,
            pos,
            entry_name: template.entry_name.clone(),
            display_name: template.display_name.clone(),
        }
    }
}

/// Fixed-size 2D slot grid.
#[derive(Debug, Clone)]
pub struct Inventory {
    slots: Vec<Option<ItemTemplate>>,
    slots_x: u8,
    slots_y: u8,
}

impl Inventory {
    pub fn new(slots_x: u8, slots_y: u8) -> Self {
        let slots_x = slots_x.max(1);
        let slots_y = slots_y.max(1);
        Self {
            slots: vec![None; slots_x as usize * slots_y as usize],
            slots_x,
            slots_y,
        }
    }

    pub fn size(&self) -> (u8, u8) {
        (self.slots_x, self.slots_y)
    }

    /// Stores an item in the first empty slot. Returns false when full.
    pub fn add(&mut self, item: ItemTemplate) -> bool {
        match self.slots.iter_mut().find(|slot| slot.is_none()) {
            Some(slot) => {
                *slot = Some(item);
                true
            }
            None => false,
        }
    }

    pub fn get_xy(&self, x: u8, y: u8) -> Option<&ItemTemplate> {
        self.get_index(y as usize * self.slots_x as usize + x as usize)
    }

    pub fn get_index(&self, index: usize) -> Option<&ItemTemplate> {
        self.slots.get(index).and_then(|slot| slot.as_ref())
    }

    pub fn remove_index(&mut self, index: usize) -> Option<ItemTemplate> {
        self.slots.get_mut(index).and_then(|slot| slot.take())
    }

    pub fn occupied(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_entry_names_come_from_keys() {
        let catalog = ItemCatalog::builtin();
        assert_eq!(catalog.len(), 3);
        let apple = catalog.get(ItemId(0)).unwrap();
        assert_eq!(apple.entry_name, "apple");
        assert_eq!(apple.display_name, "Apple");
    }

    #[test]
    fn catalog_rejects_duplicate_ids() {
        let json = r#"{
            "a": { "id": 1, "entry_name": "", "display_name": "A" },
            "b": { "id": 1, "entry_name": "", "display_name": "B" }
        }"#;
        assert!(ItemCatalog::from_json_str(json).is_err());
    }

    #[test]
    fn inventory_fills_first_empty_slot() {
        let catalog = ItemCatalog::builtin();
        let apple = catalog.get(ItemId(0)).unwrap().clone();
        let axe = catalog.get(ItemId(2)).unwrap().clone();

        let mut inv = Inventory::new(2, 2);
        assert!(inv.add(apple.clone()));
        assert!(inv.add(axe.clone()));
        assert_eq!(inv.get_xy(0, 0), Some(&apple));
        assert_eq!(inv.get_xy(1, 0), Some(&axe));

        inv.remove_index(0);
        assert!(inv.add(apple.clone()));
        assert_eq!(inv.get_xy(0, 0), Some(&apple));
        assert_eq!(inv.occupied(), 2);
    }

    #[test]
    fn inventory_reports_full() {
        let catalog = ItemCatalog::builtin();
        let apple = catalog.get(ItemId(0)).unwrap().clone();
        let mut inv = Inventory::new(1, 2);
        assert!(inv.add(apple.clone()));
        assert!(inv.add(apple.clone()));
        assert!(!inv.add(apple));
    }
}
