//! In-memory game data catalog
//!
//! Read-only after construction. Lookups never panic on a missing id: names
//! fall back to `Item #42` style labels so a result can be shown before the
//! catalog is fully loaded.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::models::{Item, ItemId, Machine, MachineCategory, MachineId, Recipe, RecipeId};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GameData {
    items: BTreeMap<ItemId, Item>,
    machines: BTreeMap<MachineId, Machine>,
    recipes: BTreeMap<RecipeId, Recipe>,
}

impl GameData {
    pub fn new(items: Vec<Item>, machines: Vec<Machine>, recipes: Vec<Recipe>) -> Self {
        Self {
            items: items.into_iter().map(|i| (i.id, i)).collect(),
            machines: machines.into_iter().map(|m| (m.id, m)).collect(),
            recipes: recipes.into_iter().map(|r| (r.id, r)).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.recipes.is_empty()
    }

    pub fn item(&self, id: ItemId) -> Option<&Item> {
        self.items.get(&id)
    }

    pub fn recipe(&self, id: RecipeId) -> Option<&Recipe> {
        self.recipes.get(&id)
    }

    pub fn items(&self) -> impl Iterator<Item = &Item> {
        self.items.values()
    }

    pub fn machines(&self) -> impl Iterator<Item = &Machine> {
        self.machines.values()
    }

    pub fn recipes(&self) -> impl Iterator<Item = &Recipe> {
        self.recipes.values()
    }

    pub fn item_name(&self, id: ItemId) -> String {
        self.item(id)
            .map_or_else(|| format!("Item #{id}"), |i| i.name.clone())
    }

    pub fn recipe_name(&self, id: RecipeId) -> String {
        self.recipe(id)
            .map_or_else(|| format!("Recipe #{id}"), |r| r.name.clone())
    }

    /// The machine of `category` at `rank`. Without an exact match the best
    /// rank below it is used, then the lowest rank above it.
    pub fn machine_for(&self, category: MachineCategory, rank: u8) -> Option<&Machine> {
        let mut candidates: Vec<&Machine> = self
            .machines
            .values()
            .filter(|m| m.category == category)
            .collect();
        candidates.sort_by_key(|m| m.rank);

        candidates
            .iter()
            .rev()
            .find(|m| m.rank <= rank)
            .or_else(|| candidates.first())
            .copied()
    }

    /// Every recipe that outputs `item`, lowest id first.
    pub fn producers(&self, item: ItemId) -> Vec<&Recipe> {
        self.recipes
            .values()
            .filter(|r| r.output_count(item).is_some())
            .collect()
    }

    /// The recipe used for `item`: the caller's choice if it makes the item,
    /// otherwise the first producer.
    pub fn producer_for(
        &self,
        item: ItemId,
        choices: &BTreeMap<ItemId, RecipeId>,
    ) -> Option<&Recipe> {
        choices
            .get(&item)
            .and_then(|id| self.recipe(*id))
            .filter(|r| r.output_count(item).is_some())
            .or_else(|| self.producers(item).into_iter().next())
    }
}
