//! Name/oid-indexed registry of tables and indexes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::RwLock;

use log::info;

use crate::common::{Oid, PageId, INVALID_OID};
use crate::error::{DbResult, Status};
use crate::tuple::Schema;

#[derive(Debug, Clone)]
pub struct TableInfo {
    pub oid: Oid,
    pub name: String,
    pub schema: Schema,
    pub first_page_id: PageId,
}

#[derive(Debug, Clone)]
pub struct IndexInfo {
    pub oid: Oid,
    pub name: String,
    pub table_oid: Oid,
    /// Index of the indexed column within the owning table's schema.
    /// The index is single-column (spec §4.9 Non-goals: no composite keys).
    pub key_column: usize,
    pub root_page_id: PageId,
}

#[derive(Default)]
struct CatalogState {
    tables_by_oid: HashMap<Oid, TableInfo>,
    tables_by_name: HashMap<String, Oid>,
    indexes_by_oid: HashMap<Oid, IndexInfo>,
    indexes_by_name: HashMap<String, Oid>,
    /// Indexes defined on a given table, keyed by table oid.
    indexes_by_table: HashMap<Oid, Vec<Oid>>,
}

/// In-memory registry mapping table/index names to their storage
/// location. Persisted as ordinary rows in the system tables by the
/// owning `Database` (spec §4.9); this type itself holds no disk state.
pub struct Catalog {
    state: RwLock<CatalogState>,
    next_oid: AtomicU32,
}

impl Catalog {
    pub fn new() -> Catalog {
        Catalog {
            state: RwLock::new(CatalogState::default()),
            next_oid: AtomicU32::new(1),
        }
    }

    fn next_oid(&self) -> Oid {
        self.next_oid.fetch_add(1, Ordering::SeqCst)
    }

    pub fn create_table(&self, name: &str, schema: Schema, first_page_id: PageId) -> DbResult<Oid> {
        let mut state = self.state.write().unwrap();
        if state.tables_by_name.contains_key(name) {
            return Err(Status::already_exists(format!("table {} already exists", name)));
        }
        let oid = self.next_oid();
        state.tables_by_name.insert(name.to_string(), oid);
        state.tables_by_oid.insert(
            oid,
            TableInfo {
                oid,
                name: name.to_string(),
                schema,
                first_page_id,
            },
        );
        info!("catalog: created table '{}' oid={}", name, oid);
        Ok(oid)
    }

    pub fn get_table(&self, oid: Oid) -> Option<TableInfo> {
        self.state.read().unwrap().tables_by_oid.get(&oid).cloned()
    }

    pub fn get_table_by_name(&self, name: &str) -> Option<TableInfo> {
        let state = self.state.read().unwrap();
        let oid = *state.tables_by_name.get(name)?;
        state.tables_by_oid.get(&oid).cloned()
    }

    pub fn table_names(&self) -> Vec<String> {
        let state = self.state.read().unwrap();
        let mut names: Vec<String> = state.tables_by_name.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn drop_table(&self, name: &str) -> DbResult<()> {
        let mut state = self.state.write().unwrap();
        let oid = state
            .tables_by_name
            .remove(name)
            .ok_or_else(|| Status::not_found(format!("table {} does not exist", name)))?;
        state.tables_by_oid.remove(&oid);
        if let Some(index_oids) = state.indexes_by_table.remove(&oid) {
            for index_oid in index_oids {
                if let Some(info) = state.indexes_by_oid.remove(&index_oid) {
                    state.indexes_by_name.remove(&info.name);
                }
            }
        }
        Ok(())
    }

    pub fn create_index(
        &self,
        name: &str,
        table_oid: Oid,
        key_column: usize,
        root_page_id: PageId,
    ) -> DbResult<Oid> {
        let mut state = self.state.write().unwrap();
        if !state.tables_by_oid.contains_key(&table_oid) {
            return Err(Status::not_found(format!("table oid {} does not exist", table_oid)));
        }
        if state.indexes_by_name.contains_key(name) {
            return Err(Status::already_exists(format!("index {} already exists", name)));
        }
        let oid = self.next_oid();
        state.indexes_by_name.insert(name.to_string(), oid);
        state.indexes_by_oid.insert(
            oid,
            IndexInfo {
                oid,
                name: name.to_string(),
                table_oid,
                key_column,
                root_page_id,
            },
        );
        state.indexes_by_table.entry(table_oid).or_default().push(oid);
        info!("catalog: created index '{}' on table oid={}", name, table_oid);
        Ok(oid)
    }

    pub fn get_index(&self, oid: Oid) -> Option<IndexInfo> {
        self.state.read().unwrap().indexes_by_oid.get(&oid).cloned()
    }

    pub fn get_index_by_name(&self, name: &str) -> Option<IndexInfo> {
        let state = self.state.read().unwrap();
        let oid = *state.indexes_by_name.get(name)?;
        state.indexes_by_oid.get(&oid).cloned()
    }

    /// Indexes defined on `table_oid`, for planner consideration.
    pub fn indexes_for_table(&self, table_oid: Oid) -> Vec<IndexInfo> {
        let state = self.state.read().unwrap();
        state
            .indexes_by_table
            .get(&table_oid)
            .map(|oids| oids.iter().filter_map(|o| state.indexes_by_oid.get(o).cloned()).collect())
            .unwrap_or_default()
    }

    /// An index on `table_oid` whose key column is `column`, if any
    /// (used by the planner's access-method selector).
    pub fn index_on_column(&self, table_oid: Oid, column: usize) -> Option<IndexInfo> {
        self.indexes_for_table(table_oid)
            .into_iter()
            .find(|i| i.key_column == column)
    }

    pub fn record_table_first_page(&self, oid: Oid, first_page_id: PageId) {
        let mut state = self.state.write().unwrap();
        if let Some(info) = state.tables_by_oid.get_mut(&oid) {
            info.first_page_id = first_page_id;
        }
    }

    /// Updates an index's root page after a structural change (first
    /// insert into an empty tree allocates its root lazily).
    pub fn update_index_root(&self, oid: Oid, root_page_id: PageId) {
        let mut state = self.state.write().unwrap();
        if let Some(info) = state.indexes_by_oid.get_mut(&oid) {
            info.root_page_id = root_page_id;
        }
    }

    pub fn drop_index(&self, name: &str) -> DbResult<()> {
        let mut state = self.state.write().unwrap();
        let oid = state
            .indexes_by_name
            .remove(name)
            .ok_or_else(|| Status::not_found(format!("index {} does not exist", name)))?;
        if let Some(info) = state.indexes_by_oid.remove(&oid) {
            if let Some(list) = state.indexes_by_table.get_mut(&info.table_oid) {
                list.retain(|&o| o != oid);
            }
        }
        Ok(())
    }
}

impl Default for Catalog {
    fn default() -> Catalog {
        Catalog::new()
    }
}

pub const INVALID_TABLE_OID: Oid = INVALID_OID;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tuple::{Column, TypeId};

    fn schema() -> Schema {
        Schema::new(vec![Column::new("id", TypeId::Integer)])
    }

    #[test]
    fn create_and_lookup_table() {
        let cat = Catalog::new();
        let oid = cat.create_table("users", schema(), 1).unwrap();
        assert_eq!(cat.get_table_by_name("users").unwrap().oid, oid);
        assert_eq!(cat.get_table(oid).unwrap().name, "users");
    }

    #[test]
    fn duplicate_table_name_rejected() {
        let cat = Catalog::new();
        cat.create_table("users", schema(), 1).unwrap();
        assert!(cat.create_table("users", schema(), 2).is_err());
    }

    #[test]
    fn index_lookup_by_column() {
        let cat = Catalog::new();
        let table_oid = cat.create_table("users", schema(), 1).unwrap();
        cat.create_index("users_id_idx", table_oid, 0, 2).unwrap();
        let found = cat.index_on_column(table_oid, 0).unwrap();
        assert_eq!(found.name, "users_id_idx");
        assert!(cat.index_on_column(table_oid, 1).is_none());
    }

    #[test]
    fn drop_table_removes_its_indexes() {
        let cat = Catalog::new();
        let table_oid = cat.create_table("users", schema(), 1).unwrap();
        cat.create_index("users_id_idx", table_oid, 0, 2).unwrap();
        cat.drop_table("users").unwrap();
        assert!(cat.get_table_by_name("users").is_none());
        assert!(cat.get_index_by_name("users_id_idx").is_none());
    }
}
