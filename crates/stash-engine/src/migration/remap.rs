use std::collections::{HashMap, HashSet};

use stash_core::{BlobId, ItemRecord, LocationRecord};
use stash_storage::BlobStore;

use crate::error::Result;

/// Archive id to freshly minted destination id, one entry per distinct
/// archive id across the whole import.
#[derive(Debug, Default)]
pub struct RemapTable {
    entries: Vec<(BlobId, BlobId)>,
    index: HashMap<BlobId, usize>,
}

impl RemapTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, source: &BlobId) -> Option<&BlobId> {
        self.index.get(source).map(|&i| &self.entries[i].1)
    }

    /// `(archive id, destination id)` pairs in the order they were added
    pub fn iter(&self) -> impl Iterator<Item = (&BlobId, &BlobId)> {
        self.entries.iter().map(|(source, dest)| (source, dest))
    }

    pub fn destinations(&self) -> Vec<BlobId> {
        self.entries.iter().map(|(_, dest)| dest.clone()).collect()
    }

    /// Distinct ids from `ids` that have no mapping yet, first occurrence first
    pub fn unmapped<'a>(&self, ids: impl IntoIterator<Item = &'a BlobId>) -> Vec<BlobId> {
        let mut seen = HashSet::new();
        ids.into_iter()
            .filter(|id| !self.index.contains_key(*id) && seen.insert(*id))
            .cloned()
            .collect()
    }

    /// Pair each source with the destination at the same position. Sources
    /// already mapped keep their first destination.
    pub fn insert_all(&mut self, sources: Vec<BlobId>, destinations: Vec<BlobId>) {
        for (source, dest) in sources.into_iter().zip(destinations) {
            if self.index.contains_key(&source) {
                continue;
            }
            self.index.insert(source.clone(), self.entries.len());
            self.entries.push((source, dest));
        }
    }

    /// Mint destinations for every id in `ids` not seen before
    pub async fn extend(&mut self, store: &BlobStore, ids: &[BlobId]) -> Result<()> {
        let sources = self.unmapped(ids);
        if sources.is_empty() {
            return Ok(());
        }
        let destinations = store.mint_ids(sources.len()).await?;
        self.insert_all(sources, destinations);
        Ok(())
    }

    pub fn rewrite_item(&self, record: &mut ItemRecord) {
        record.map_image_ids(|id| self.resolve(id));
    }

    pub fn rewrite_location(&self, record: &mut LocationRecord) {
        for storage_box in &mut record.boxes {
            storage_box.image_uuid = storage_box.image_uuid.as_ref().map(|id| self.resolve(id));
            for item in &mut storage_box.items {
                self.rewrite_item(item);
            }
        }
    }

    // Every id was registered through `extend` before records are rewritten.
    fn resolve(&self, id: &BlobId) -> BlobId {
        self.get(id).cloned().unwrap_or_else(|| id.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stash_core::BoxRecord;

    fn id(c: char) -> BlobId {
        BlobId::from(std::iter::repeat_n(c, BlobId::LEN).collect::<String>())
    }

    #[test]
    fn test_unmapped_skips_known_and_duplicates() {
        let mut table = RemapTable::new();
        table.insert_all(vec![id('A')], vec![id('1')]);

        let ids = [id('A'), id('B'), id('B'), id('C')];
        assert_eq!(table.unmapped(&ids), vec![id('B'), id('C')]);
    }

    #[test]
    fn test_first_mapping_wins() {
        let mut table = RemapTable::new();
        table.insert_all(vec![id('A')], vec![id('1')]);
        table.insert_all(vec![id('A'), id('B')], vec![id('2'), id('3')]);

        assert_eq!(table.get(&id('A')), Some(&id('1')));
        assert_eq!(table.get(&id('B')), Some(&id('3')));
        assert_eq!(table.len(), 2);
        assert_eq!(table.destinations(), vec![id('1'), id('3')]);
    }

    #[test]
    fn test_rewrite_location_uses_shared_mapping() {
        let mut table = RemapTable::new();
        table.insert_all(vec![id('A'), id('B')], vec![id('1'), id('2')]);

        let mut item = ItemRecord {
            name: "Lamp".to_string(),
            comment: None,
            keywords: None,
            barcode: None,
            image_uuids: None,
        };
        item.set_image_ids(&[id('A'), id('B')]);

        let mut location = LocationRecord {
            name: "Hall".to_string(),
            boxes: vec![BoxRecord {
                name: "Box".to_string(),
                code: 1,
                comment: None,
                image_uuid: Some(id('B')),
                items: vec![item],
            }],
        };

        table.rewrite_location(&mut location);

        assert_eq!(location.boxes[0].image_uuid, Some(id('2')));
        assert_eq!(location.boxes[0].items[0].image_ids(), vec![id('1'), id('2')]);
    }
}
