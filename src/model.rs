use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Value stored for a field whose every locator came up empty.
pub const UNKNOWN: &str = "Unknown";

/// One scraped entity, before persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub key: String,
    pub fields: BTreeMap<String, String>,
    /// Ordered multi-valued fields, persisted as child rows.
    #[serde(default)]
    pub lists: BTreeMap<String, Vec<String>>,
    pub page: usize,
    pub extracted_at: DateTime<Utc>,
}

impl Item {
    pub fn new(key: impl Into<String>, page: usize) -> Self {
        Self {
            key: key.into(),
            fields: BTreeMap::new(),
            lists: BTreeMap::new(),
            page,
            extracted_at: Utc::now(),
        }
    }

    pub fn with_field(mut self, name: &str, value: impl Into<String>) -> Self {
        self.fields.insert(name.to_string(), value.into());
        self
    }

    pub fn with_list<I, S>(mut self, name: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.lists
            .insert(name.to_string(), values.into_iter().map(Into::into).collect());
        self
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    pub fn title(&self) -> &str {
        self.field("title").unwrap_or(UNKNOWN)
    }

    pub fn child_count(&self) -> usize {
        self.lists.values().map(Vec::len).sum()
    }
}

/// Ordered, key-deduplicated items gathered from one source in one run.
#[derive(Debug, Clone, Default)]
pub struct Collection {
    items: Vec<Item>,
    seen: HashSet<String>,
}

impl Collection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `item` unless its key is already present. Returns whether it was added.
    pub fn push(&mut self, item: Item) -> bool {
        if self.seen.contains(&item.key) {
            return false;
        }
        self.seen.insert(item.key.clone());
        self.items.push(item);
        true
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    /// Items can be enriched in place; keys must not change.
    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Item> {
        self.items.iter_mut()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Item> {
        self.items.iter()
    }
}

impl FromIterator<Item> for Collection {
    fn from_iter<T: IntoIterator<Item = Item>>(iter: T) -> Self {
        let mut collection = Collection::new();
        for item in iter {
            collection.push(item);
        }
        collection
    }
}

impl<'a> IntoIterator for &'a Collection {
    type Item = &'a Item;
    type IntoIter = std::slice::Iter<'a, Item>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collection_keeps_first_occurrence_of_a_key() {
        let mut collection = Collection::new();
        assert!(collection.push(Item::new("/bundle/a", 1).with_field("title", "A")));
        assert!(!collection.push(Item::new("/bundle/a", 2).with_field("title", "A2")));
        assert!(collection.push(Item::new("/bundle/b", 2)));
        assert_eq!(collection.len(), 2);
        assert_eq!(collection.items()[0].title(), "A");
    }

    #[test]
    fn missing_title_reads_as_unknown() {
        assert_eq!(Item::new("k", 1).title(), UNKNOWN);
    }
}
