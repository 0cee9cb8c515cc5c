use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use log::info;
use parking_lot::RwLock;

use crate::common::{Result, ShaleError, TableId};
use crate::storage::heap::HeapFile;
use crate::tuple::Schema;

#[derive(Default)]
struct CatalogState {
    files: HashMap<TableId, Arc<HeapFile>>,
    names: HashMap<String, TableId>,
    next_table_id: u32,
}

/// Table registry mapping table ids and names to the heap file of each table.
/// The buffer pool resolves a `PageId` to its file through here.
///
/// Not persisted: tables are re-registered on startup.
#[derive(Default)]
pub struct Catalog {
    state: RwLock<CatalogState>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens (or creates) the table file at `path` and registers it as `name`.
    pub fn create_table<P: AsRef<Path>>(
        &self,
        name: &str,
        path: P,
        schema: Arc<Schema>,
    ) -> Result<Arc<HeapFile>> {
        let mut state = self.state.write();
        if state.names.contains_key(name) {
            return Err(ShaleError::TableAlreadyExists(name.to_string()));
        }

        let table_id = TableId::new(state.next_table_id);
        let file = Arc::new(HeapFile::open(table_id, path, schema)?);
        state.next_table_id += 1;
        state.files.insert(table_id, Arc::clone(&file));
        state.names.insert(name.to_string(), table_id);

        info!(
            "registered table {} as {} ({} pages)",
            name,
            table_id,
            file.num_pages()?
        );
        Ok(file)
    }

    /// Returns the heap file of a table.
    pub fn table(&self, table_id: TableId) -> Result<Arc<HeapFile>> {
        self.state
            .read()
            .files
            .get(&table_id)
            .cloned()
            .ok_or(ShaleError::TableNotFound(table_id))
    }

    pub fn table_id(&self, name: &str) -> Result<TableId> {
        self.state
            .read()
            .names
            .get(name)
            .copied()
            .ok_or_else(|| ShaleError::TableNameNotFound(name.to_string()))
    }

    pub fn table_name(&self, table_id: TableId) -> Result<String> {
        self.state
            .read()
            .names
            .iter()
            .find(|(_, id)| **id == table_id)
            .map(|(name, _)| name.clone())
            .ok_or(ShaleError::TableNotFound(table_id))
    }

    pub fn schema(&self, table_id: TableId) -> Result<Arc<Schema>> {
        Ok(Arc::clone(self.table(table_id)?.schema()))
    }

    /// Returns the ids of every registered table in ascending order.
    pub fn table_ids(&self) -> Vec<TableId> {
        let mut ids: Vec<_> = self.state.read().files.keys().copied().collect();
        ids.sort();
        ids
    }
}
