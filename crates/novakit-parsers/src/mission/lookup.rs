//! Item name resolution for mission entities
//!
//! Mission files only store numeric item type ids. Callers that know the
//! game's item definitions pass an `ItemLookup` in; the codec never holds
//! one itself.

use std::collections::HashMap;

/// Resolves an entity `type_id` to a display name
pub trait ItemLookup {
    fn item_name(&self, type_id: i32) -> Option<String>;
}

/// Lookup that knows no items
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLookup;

impl ItemLookup for NoLookup {
    fn item_name(&self, _type_id: i32) -> Option<String> {
        None
    }
}

impl ItemLookup for HashMap<i32, String> {
    fn item_name(&self, type_id: i32) -> Option<String> {
        self.get(&type_id).cloned()
    }
}

impl<F> ItemLookup for F
where
    F: Fn(i32) -> Option<String>,
{
    fn item_name(&self, type_id: i32) -> Option<String> {
        self(type_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_lookup() {
        let mut items = HashMap::new();
        items.insert(12, "Humvee".to_string());
        assert_eq!(items.item_name(12).as_deref(), Some("Humvee"));
        assert_eq!(items.item_name(13), None);
        assert_eq!(NoLookup.item_name(12), None);
    }

    #[test]
    fn test_closure_lookup() {
        let lookup = |id: i32| (id == 7).then(|| "Crate".to_string());
        assert_eq!(lookup.item_name(7).as_deref(), Some("Crate"));
    }
}
