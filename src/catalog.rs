use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::models::{
    is_combo_week, is_valid_week, Rarity, StickerDefinition, StickerFields, WEEK_COUNT,
};

/// Sticker definitions keyed by week.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<StickerDefinition>", into = "Vec<StickerDefinition>")]
pub struct Catalog {
    slots: BTreeMap<u8, StickerDefinition>,
}

impl Catalog {
    pub fn initial() -> Self {
        let slots = (1..=WEEK_COUNT)
            .map(|week| (week, default_definition(week)))
            .collect();
        Self { slots }
    }

    pub fn get(&self, week: u8) -> Option<&StickerDefinition> {
        self.slots.get(&week)
    }

    pub fn rarity_of(&self, week: u8) -> Option<Rarity> {
        self.get(week).map(|definition| definition.rarity)
    }

    pub fn iter(&self) -> impl Iterator<Item = &StickerDefinition> {
        self.slots.values()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Returns a catalog with `week` replaced or inserted, or `None` when the
    /// week is outside the album.
    pub fn upsert(&self, week: u8, fields: StickerFields) -> Option<Self> {
        if !is_valid_week(week) {
            return None;
        }

        let id = self
            .get(week)
            .map(|existing| existing.id.clone())
            .unwrap_or_else(|| sticker_id(week));
        let mut slots = self.slots.clone();
        slots.insert(
            week,
            StickerDefinition {
                id,
                week,
                name: fields.name,
                image_ref: fields.image_ref,
                rarity: fields.rarity,
            },
        );
        Some(Self { slots })
    }

    /// Fills any empty week with its default definition.
    pub fn with_missing_filled(mut self) -> Self {
        for week in 1..=WEEK_COUNT {
            self.slots
                .entry(week)
                .or_insert_with(|| default_definition(week));
        }
        self
    }
}

impl From<Vec<StickerDefinition>> for Catalog {
    fn from(definitions: Vec<StickerDefinition>) -> Self {
        let slots = definitions
            .into_iter()
            .filter(|definition| is_valid_week(definition.week))
            .map(|definition| (definition.week, definition))
            .collect();
        Self { slots }
    }
}

impl From<Catalog> for Vec<StickerDefinition> {
    fn from(catalog: Catalog) -> Self {
        catalog.slots.into_values().collect()
    }
}

pub fn sticker_id(week: u8) -> String {
    format!("sticker-{week}")
}

pub fn default_name(week: u8) -> String {
    if is_combo_week(week) {
        format!("Supreme Link - Part {}", week - 41)
    } else {
        format!("Week {week}")
    }
}

fn default_definition(week: u8) -> StickerDefinition {
    StickerDefinition {
        id: sticker_id(week),
        week,
        name: default_name(week),
        image_ref: String::new(),
        rarity: Rarity::Normal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(name: &str, rarity: Rarity) -> StickerFields {
        StickerFields {
            name: name.to_string(),
            image_ref: "https://cdn.example.com/owl.png".to_string(),
            rarity,
        }
    }

    #[test]
    fn initial_catalog_has_one_slot_per_week() {
        let catalog = Catalog::initial();
        assert_eq!(catalog.len(), 45);
        assert_eq!(catalog.get(1).map(|d| d.name.as_str()), Some("Week 1"));
        assert_eq!(
            catalog.get(42).map(|d| d.name.as_str()),
            Some("Supreme Link - Part 1")
        );
        assert_eq!(
            catalog.get(45).map(|d| d.name.as_str()),
            Some("Supreme Link - Part 4")
        );
        assert!(catalog.get(0).is_none());
        assert!(catalog.get(46).is_none());
    }

    #[test]
    fn upsert_replaces_existing_slot_and_keeps_id() {
        let catalog = Catalog::initial();
        let updated = catalog
            .upsert(7, fields("Night Owl", Rarity::Diamond))
            .expect("week 7 is valid");

        let definition = updated.get(7).expect("slot exists");
        assert_eq!(definition.id, "sticker-7");
        assert_eq!(definition.name, "Night Owl");
        assert_eq!(definition.rarity, Rarity::Diamond);
        assert_eq!(updated.len(), 45);
        assert_eq!(catalog.get(7).map(|d| d.rarity), Some(Rarity::Normal));
    }

    #[test]
    fn upsert_inserts_into_sparse_catalog() {
        let catalog = Catalog::default();
        let updated = catalog
            .upsert(3, fields("Comet", Rarity::Ruby))
            .expect("week 3 is valid");
        assert_eq!(updated.len(), 1);
        assert_eq!(updated.rarity_of(3), Some(Rarity::Ruby));
    }

    #[test]
    fn upsert_rejects_weeks_outside_album() {
        let catalog = Catalog::initial();
        assert!(catalog.upsert(0, fields("x", Rarity::Gold)).is_none());
        assert!(catalog.upsert(46, fields("x", Rarity::Gold)).is_none());
    }

    #[test]
    fn missing_weeks_are_filled_with_defaults() {
        let catalog = Catalog::from(vec![StickerDefinition {
            id: "custom".to_string(),
            week: 10,
            name: "Custom".to_string(),
            image_ref: String::new(),
            rarity: Rarity::Obsidian,
        }])
        .with_missing_filled();

        assert_eq!(catalog.len(), 45);
        assert_eq!(catalog.get(10).map(|d| d.id.as_str()), Some("custom"));
        assert_eq!(catalog.get(11).map(|d| d.name.as_str()), Some("Week 11"));
    }
}
