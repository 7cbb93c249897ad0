//! `Database`: the single entry point wiring catalog, buffer pool, disk,
//! transactions, locking and statistics together around `execute(sql)`.
//!
//! Mirrors the teacher's own `Database::global()` singleton shape, but
//! exposes an ordinary constructor too (`Database::open`) — spec §6 calls
//! for a type a caller can construct directly, not only a process-wide
//! singleton, so `global()` is kept as a convenience wrapper over it rather
//! than the only way in.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use log::{debug, info};
use once_cell::sync::OnceCell;

use crate::buffer::BufferPool;
use crate::catalog::Catalog;
use crate::common::{Rid, TxnId};
use crate::disk::DiskManager;
use crate::error::{DbResult, Status, StatusCode};
use crate::execution::{
    AggregateExpr, AggregationExecutor, Executor, FilterExecutor, IndexScanExecutor, LimitExecutor,
    NestedLoopJoinExecutor, ProjectionExecutor, ScanBound, SeqScanExecutor, SortExecutor, VisibilityFilterExecutor,
};
use crate::index::BPlusTree;
use crate::planner::{AccessMethod, Planner};
use crate::sql::ast::{InsertValue, SelectItem, Statement};
use crate::sql::expression::Expr;
use crate::sql::parse_and_bind;
use crate::statistics::Statistics;
use crate::storage::TableHeap;
use crate::transaction::lock_manager::{LockManager, LockManagerOptions, LockTarget};
use crate::transaction::wal::Wal;
use crate::transaction::{TransactionManager, VersionMeta, WriteRecord};
use crate::tuple::{Column, Schema, Tuple, Value};

#[derive(Debug, Clone, Copy)]
pub struct DatabaseOptions {
    pub buffer_pool_size: usize,
    pub page_size: usize,
    pub enable_wal: bool,
    pub create_if_missing: bool,
    pub error_if_exists: bool,
    pub strict_mode: bool,
}

impl Default for DatabaseOptions {
    fn default() -> DatabaseOptions {
        DatabaseOptions {
            buffer_pool_size: 1024,
            page_size: 4096,
            enable_wal: true,
            create_if_missing: true,
            error_if_exists: false,
            strict_mode: false,
        }
    }
}

/// One output row: values paired with the column names of the query that
/// produced them, so callers can index either by position or by name.
#[derive(Debug, Clone)]
pub struct Row {
    column_names: std::sync::Arc<Vec<String>>,
    values: Vec<Value>,
}

impl Row {
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    pub fn get_by_name(&self, name: &str) -> Option<&Value> {
        let index = self.column_names.iter().position(|c| c.eq_ignore_ascii_case(name))?;
        self.values.get(index)
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }
}

/// The result of one `execute()` call: a status, the rows it produced (if
/// any), their column names, and — for DML — the number of rows touched.
#[derive(Debug, Clone)]
pub struct Result {
    pub status: Status,
    pub rows: Vec<Row>,
    pub column_names: Vec<String>,
    pub affected_rows: u64,
}

impl Result {
    fn empty(status: Status) -> Result {
        Result { status, rows: Vec::new(), column_names: Vec::new(), affected_rows: 0 }
    }

    fn affected(affected_rows: u64) -> Result {
        Result { status: Status::ok(), rows: Vec::new(), column_names: Vec::new(), affected_rows }
    }
}

impl IntoIterator for Result {
    type Item = Row;
    type IntoIter = std::vec::IntoIter<Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}

static GLOBAL: OnceCell<Database> = OnceCell::new();

pub struct Database {
    path: PathBuf,
    options: DatabaseOptions,
    catalog: Catalog,
    buffer_pool: BufferPool,
    txn_manager: TransactionManager,
    lock_manager: LockManager,
    statistics: Statistics,
    current_txn: Mutex<Option<TxnId>>,
    closed: AtomicBool,
}

impl Database {
    pub fn open(path: impl AsRef<Path>, options: DatabaseOptions) -> DbResult<Database> {
        let path = path.as_ref().to_path_buf();
        let exists = path.exists();
        if exists && options.error_if_exists {
            return Err(Status::already_exists(format!("{:?} already exists", path)));
        }
        if !exists {
            if !options.create_if_missing {
                return Err(Status::not_found(format!("{:?} does not exist", path)));
            }
            std::fs::create_dir_all(&path)?;
        }

        let disk = DiskManager::open(path.join("data.db"), options.page_size)?;
        let buffer_pool = BufferPool::new(disk, options.buffer_pool_size);
        let wal = Wal::open(path.join("wal.log"))?;

        info!("database opened at {:?}", path);
        Ok(Database {
            path,
            options,
            catalog: Catalog::new(),
            buffer_pool,
            txn_manager: TransactionManager::new(wal),
            lock_manager: LockManager::new(LockManagerOptions::default()),
            statistics: Statistics::new(),
            current_txn: Mutex::new(None),
            closed: AtomicBool::new(false),
        })
    }

    /// Process-wide singleton over a fixed default path, in the spirit of
    /// the teacher's `Database::global()` — most callers want their own
    /// `Database::open` instance instead.
    pub fn global() -> &'static Database {
        GLOBAL.get_or_init(|| {
            Database::open("data/default_db", DatabaseOptions::default()).expect("failed to open default database")
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_open(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }

    pub fn close(&self) -> DbResult<()> {
        self.buffer_pool.flush_all_pages();
        self.txn_manager.wal().flush()?;
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    pub fn in_transaction(&self) -> bool {
        self.current_txn.lock().unwrap().is_some()
    }

    pub fn begin(&self) -> Status {
        let mut current = self.current_txn.lock().unwrap();
        if current.is_some() {
            return Status::invalid_argument("a transaction is already active");
        }
        match self.txn_manager.begin() {
            Ok(id) => {
                *current = Some(id);
                Status::ok()
            }
            Err(e) => e,
        }
    }

    pub fn commit(&self) -> Status {
        let id = match self.current_txn.lock().unwrap().take() {
            Some(id) => id,
            None => return Status::invalid_argument("no active transaction"),
        };
        let result = self.txn_manager.commit(id, |record, commit_ts| self.apply_commit(record, id, commit_ts));
        self.lock_manager.release_all(id);
        result.err().unwrap_or_else(Status::ok)
    }

    pub fn rollback(&self) -> Status {
        let id = match self.current_txn.lock().unwrap().take() {
            Some(id) => id,
            None => return Status::invalid_argument("no active transaction"),
        };
        let undo_result = self.txn_manager.abort(id, |record| self.apply_undo(record));
        self.lock_manager.release_all(id);
        undo_result.err().unwrap_or_else(Status::ok)
    }

    fn apply_undo(&self, record: &WriteRecord) {
        match record {
            WriteRecord::Insert { table_oid, rid } => {
                if let Some(info) = self.catalog.get_table(*table_oid) {
                    TableHeap::open(&self.buffer_pool, info.first_page_id).delete_tuple(*rid);
                    self.statistics.on_rows_deleted(*table_oid, 1);
                }
            }
            WriteRecord::Delete { table_oid, rid, old_bytes } | WriteRecord::Update { table_oid, rid, old_bytes } => {
                if let Some(info) = self.catalog.get_table(*table_oid) {
                    if let Ok(old) = Tuple::deserialize(old_bytes, &info.schema) {
                        let heap = TableHeap::open(&self.buffer_pool, info.first_page_id);
                        // Delete is now a soft mark rather than a physical
                        // removal, so undoing either kind restores the
                        // pre-image (version metadata included) in place.
                        heap.update_tuple(&old, *rid, &info.schema);
                    }
                }
            }
        }
    }

    /// Runs once a transaction commits, for every write it made: fixes up
    /// the affected tuple's MVCC version metadata (`begin_ts`/`end_ts`) now
    /// that `commit_ts` is known (spec §4.13).
    fn apply_commit(&self, record: &WriteRecord, txn_id: TxnId, commit_ts: u64) {
        let (table_oid, rid) = match *record {
            WriteRecord::Insert { table_oid, rid } => (table_oid, rid),
            WriteRecord::Delete { table_oid, rid, .. } => (table_oid, rid),
            WriteRecord::Update { table_oid, rid, .. } => (table_oid, rid),
        };
        if let Some(info) = self.catalog.get_table(table_oid) {
            let heap = TableHeap::open(&self.buffer_pool, info.first_page_id);
            if let Some(mut tuple) = heap.get_tuple(rid, &info.schema) {
                tuple.version.finalize_commit(txn_id, commit_ts);
                heap.update_tuple(&tuple, rid, &info.schema);
            }
        }
    }

    /// Runs `f` under a transaction: the caller's active one if present,
    /// otherwise a fresh auto-commit transaction that commits on success
    /// and rolls back on error.
    fn with_txn<T>(&self, f: impl FnOnce(TxnId) -> DbResult<T>) -> DbResult<T> {
        let owns_txn = !self.in_transaction();
        let txn_id = if owns_txn { self.txn_manager.begin()? } else { self.current_txn.lock().unwrap().unwrap() };
        match f(txn_id) {
            Ok(value) => {
                if owns_txn {
                    self.txn_manager.commit(txn_id, |record, commit_ts| self.apply_commit(record, txn_id, commit_ts))?;
                    self.lock_manager.release_all(txn_id);
                }
                Ok(value)
            }
            Err(e) => {
                if owns_txn {
                    let _ = self.txn_manager.abort(txn_id, |record| self.apply_undo(record));
                    self.lock_manager.release_all(txn_id);
                }
                Err(e)
            }
        }
    }

    pub fn execute(&self, sql: &str) -> DbResult<Result> {
        let statement = parse_and_bind(sql, &self.catalog)?;
        self.execute_statement(&statement)
    }

    fn execute_statement(&self, statement: &Statement) -> DbResult<Result> {
        match statement {
            Statement::Select(select) => self.with_txn(|txn_id| self.execute_select(select, txn_id)),
            Statement::Insert(insert) => self.with_txn(|txn_id| self.execute_insert(insert, txn_id)),
            Statement::Update(update) => self.with_txn(|txn_id| self.execute_update(update, txn_id)),
            Statement::Delete(delete) => self.with_txn(|txn_id| self.execute_delete(delete, txn_id)),
            Statement::CreateTable(stmt) => self.execute_create_table(stmt),
            Statement::DropTable(stmt) => self.execute_drop_table(stmt),
            Statement::CreateIndex(stmt) => self.execute_create_index(stmt),
            Statement::DropIndex(stmt) => self.execute_drop_index(stmt),
            Statement::Explain(stmt) => self.execute_explain(stmt),
        }
    }

    fn start_ts(&self, txn_id: TxnId) -> u64 {
        self.txn_manager.start_ts(txn_id).unwrap_or(0)
    }

    fn table_heap(&self, table_oid: crate::common::Oid) -> DbResult<TableHeap<'_>> {
        let info = self
            .catalog
            .get_table(table_oid)
            .ok_or_else(|| Status::not_found("table no longer exists"))?;
        Ok(TableHeap::open(&self.buffer_pool, info.first_page_id))
    }

    fn build_scan(
        &self,
        table: &str,
        filter: Option<&Expr>,
        txn_id: TxnId,
    ) -> DbResult<(Box<dyn Executor + '_>, crate::common::Oid)> {
        let info = self
            .catalog
            .get_table_by_name(table)
            .ok_or_else(|| Status::not_found(format!("table {} does not exist", table)))?;
        let heap = TableHeap::open(&self.buffer_pool, info.first_page_id);
        let plan = Planner::new(&self.catalog, &self.statistics)
            .plan_scan(table, filter)
            .expect("table just resolved above");

        let executor: Box<dyn Executor + '_> = match plan {
            crate::planner::PlanNode::Scan { method: AccessMethod::SequentialScan, .. } => {
                Box::new(SeqScanExecutor::new(heap, info.schema.clone(), filter.cloned()))
            }
            crate::planner::PlanNode::Scan { method, key_column: Some(col), .. } => {
                let index = self
                    .catalog
                    .index_on_column(info.oid, col)
                    .expect("planner only picks an index scan when one exists");
                let tree = BPlusTree::with_root(&self.buffer_pool, index.root_page_id);
                let bound = match (method, filter) {
                    (AccessMethod::IndexPointLookup, Some(expr)) => {
                        ScanBound::Point(equality_key(expr).unwrap_or(0))
                    }
                    (AccessMethod::IndexRangeScan, Some(expr)) => range_bound(expr),
                    _ => ScanBound::Full,
                };
                Box::new(IndexScanExecutor::new(tree, heap, info.schema.clone(), bound))
            }
            _ => Box::new(SeqScanExecutor::new(heap, info.schema.clone(), filter.cloned())),
        };
        let executor: Box<dyn Executor + '_> =
            Box::new(VisibilityFilterExecutor::new(executor, txn_id, self.start_ts(txn_id)));
        Ok((executor, info.oid))
    }

    fn execute_select(&self, select: &crate::sql::ast::SelectStatement, txn_id: TxnId) -> DbResult<Result> {
        let base_oid = self
            .catalog
            .get_table_by_name(&select.from)
            .ok_or_else(|| Status::not_found(format!("table {} does not exist", select.from)))?
            .oid;
        self.lock_manager.lock_shared(txn_id, LockTarget::Table(base_oid))?;
        self.txn_manager.note_table_lock(txn_id, base_oid);

        let residual_filter = if select.joins.is_empty() { select.filter.clone() } else { None };
        let (mut node, _) = self.build_scan(&select.from, residual_filter.as_ref(), txn_id)?;

        for join in &select.joins {
            let join_oid = self
                .catalog
                .get_table_by_name(&join.table)
                .ok_or_else(|| Status::not_found(format!("table {} does not exist", join.table)))?
                .oid;
            self.lock_manager.lock_shared(txn_id, LockTarget::Table(join_oid))?;
            self.txn_manager.note_table_lock(txn_id, join_oid);
            let (right, _) = self.build_scan(&join.table, None, txn_id)?;
            node = Box::new(NestedLoopJoinExecutor::new(node, right, join.join_type, join.on.clone()));
        }

        if !select.joins.is_empty() {
            if let Some(filter) = &select.filter {
                node = Box::new(FilterExecutor::new(node, filter.clone()));
            }
        }

        let (exprs, names) = projection_list(&select.columns, node.schema());
        node = Box::new(ProjectionExecutor::new(node, exprs, names));

        if !select.order_by.is_empty() {
            let keys = select.order_by.iter().map(|o| (o.expr.clone(), o.direction)).collect();
            node = Box::new(SortExecutor::new(node, keys));
        }
        if select.limit.is_some() || select.offset.is_some() {
            node = Box::new(LimitExecutor::new(node, select.limit, select.offset));
        }

        let column_names: Vec<String> = node.schema().columns.iter().map(|c| c.name.clone()).collect();
        node.init()?;
        let mut rows = Vec::new();
        let names_rc = std::sync::Arc::new(column_names.clone());
        while let Some(tuple) = node.next()? {
            rows.push(Row { column_names: names_rc.clone(), values: tuple.values });
        }
        Ok(Result { status: Status::ok(), affected_rows: rows.len() as u64, rows, column_names })
    }

    fn execute_aggregate_select(
        &self,
        aggregates: Vec<AggregateExpr>,
        group_by: Vec<Expr>,
        child: Box<dyn Executor + '_>,
    ) -> DbResult<Vec<Tuple>> {
        let mut exec = AggregationExecutor::new(child, group_by, aggregates);
        exec.init()?;
        let mut rows = Vec::new();
        while let Some(tuple) = exec.next()? {
            rows.push(tuple);
        }
        Ok(rows)
    }

    fn execute_insert(&self, insert: &crate::sql::ast::InsertStatement, txn_id: TxnId) -> DbResult<Result> {
        let info = self
            .catalog
            .get_table_by_name(&insert.table)
            .ok_or_else(|| Status::not_found(format!("table {} does not exist", insert.table)))?;
        self.lock_manager.lock_exclusive(txn_id, LockTarget::Table(info.oid))?;
        self.txn_manager.note_table_lock(txn_id, info.oid);

        let target_columns: Vec<usize> = if insert.columns.is_empty() {
            (0..info.schema.len()).collect()
        } else {
            insert
                .columns
                .iter()
                .map(|c| info.schema.index_of(c).expect("bound by binder"))
                .collect()
        };

        let mut tuples = Vec::with_capacity(insert.rows.len());
        for row in &insert.rows {
            let mut values = crate::execution::nulls_for(&info.schema);
            for (slot, insert_value) in target_columns.iter().zip(row) {
                let column = info.schema.column(*slot);
                values[*slot] = match insert_value {
                    InsertValue::Default => Value::Null(column.type_id),
                    InsertValue::Expr(expr) => {
                        let evaluated = expr.evaluate(&Tuple::new(Vec::new()));
                        evaluated.coerce(column.type_id).unwrap_or(Value::Null(column.type_id))
                    }
                };
            }
            let mut tuple = Tuple::new(values);
            tuple.version = VersionMeta::init_version(txn_id);
            tuples.push(tuple);
        }

        let heap = TableHeap::open(&self.buffer_pool, info.first_page_id);
        let mut affected = 0u64;
        for tuple in &tuples {
            if let Some(rid) = heap.insert_tuple(tuple, &info.schema) {
                self.txn_manager.record_write(txn_id, WriteRecord::Insert { table_oid: info.oid, rid })?;
                self.index_insert_if_any(info.oid, tuple, rid);
                affected += 1;
            }
        }
        self.statistics.on_rows_inserted(info.oid, affected);
        debug!("insert into {}: {} rows", insert.table, affected);
        Ok(Result::affected(affected))
    }

    fn index_insert_if_any(&self, table_oid: crate::common::Oid, tuple: &Tuple, rid: Rid) {
        for index in self.catalog.indexes_for_table(table_oid) {
            if let Some(key) = tuple.get(index.key_column).as_i64() {
                let tree = BPlusTree::with_root(&self.buffer_pool, index.root_page_id);
                tree.insert(key, rid);
                if tree.root_page_id() != index.root_page_id {
                    self.catalog.update_index_root(index.oid, tree.root_page_id());
                }
            }
        }
    }

    fn execute_update(&self, update: &crate::sql::ast::UpdateStatement, txn_id: TxnId) -> DbResult<Result> {
        let info = self
            .catalog
            .get_table_by_name(&update.table)
            .ok_or_else(|| Status::not_found(format!("table {} does not exist", update.table)))?;
        self.lock_manager.lock_exclusive(txn_id, LockTarget::Table(info.oid))?;
        self.txn_manager.note_table_lock(txn_id, info.oid);

        let heap = TableHeap::open(&self.buffer_pool, info.first_page_id);
        let assignments: Vec<(usize, Expr)> = update
            .assignments
            .iter()
            .map(|set| (info.schema.index_of(&set.column).expect("bound by binder"), set.value.clone()))
            .collect();

        let targets: Vec<Tuple> = {
            let base = Box::new(SeqScanExecutor::new(heap, info.schema.clone(), update.filter.clone()));
            let mut scan = VisibilityFilterExecutor::new(base, txn_id, self.start_ts(txn_id));
            scan.init()?;
            let mut rows = Vec::new();
            while let Some(t) = scan.next()? {
                rows.push(t);
            }
            rows
        };

        let mut affected = 0u64;
        for target in &targets {
            let old_bytes = target.serialize(&info.schema)?;
            let mut values = target.values.clone();
            for (index, expr) in &assignments {
                let value = expr.evaluate(target);
                let want_ty = info.schema.column(*index).type_id;
                values[*index] = value.coerce(want_ty).unwrap_or(Value::Null(want_ty));
            }
            let mut new_tuple = Tuple::new(values);
            new_tuple.version = target.version;
            if heap.update_tuple(&new_tuple, target.rid, &info.schema) {
                self.txn_manager.record_write(
                    txn_id,
                    WriteRecord::Update { table_oid: info.oid, rid: target.rid, old_bytes },
                )?;
                affected += 1;
            }
        }
        debug!("update {}: {} rows", update.table, affected);
        Ok(Result::affected(affected))
    }

    fn execute_delete(&self, delete: &crate::sql::ast::DeleteStatement, txn_id: TxnId) -> DbResult<Result> {
        let info = self
            .catalog
            .get_table_by_name(&delete.table)
            .ok_or_else(|| Status::not_found(format!("table {} does not exist", delete.table)))?;
        self.lock_manager.lock_exclusive(txn_id, LockTarget::Table(info.oid))?;
        self.txn_manager.note_table_lock(txn_id, info.oid);

        let heap = TableHeap::open(&self.buffer_pool, info.first_page_id);
        let targets: Vec<Tuple> = {
            let base = Box::new(SeqScanExecutor::new(heap, info.schema.clone(), delete.filter.clone()));
            let mut scan = VisibilityFilterExecutor::new(base, txn_id, self.start_ts(txn_id));
            scan.init()?;
            let mut rows = Vec::new();
            while let Some(t) = scan.next()? {
                rows.push(t);
            }
            rows
        };

        let mut affected = 0u64;
        for target in &targets {
            let old_bytes = target.serialize(&info.schema)?;
            let mut marked = target.clone();
            marked.version.mark_deleted(txn_id);
            if heap.update_tuple(&marked, target.rid, &info.schema) {
                self.txn_manager.record_write(
                    txn_id,
                    WriteRecord::Delete { table_oid: info.oid, rid: target.rid, old_bytes },
                )?;
                affected += 1;
            }
        }
        self.statistics.on_rows_deleted(info.oid, affected);
        debug!("delete from {}: {} rows", delete.table, affected);
        Ok(Result::affected(affected))
    }

    fn execute_create_table(&self, stmt: &crate::sql::ast::CreateTableStatement) -> DbResult<Result> {
        let columns = stmt
            .columns
            .iter()
            .map(|c| {
                let mut col = Column::new(&c.name, c.type_id).with_length(c.length as usize);
                if !c.nullable {
                    col = col.not_null();
                }
                col
            })
            .collect();
        let schema = Schema::new(columns);
        let heap = TableHeap::create(&self.buffer_pool);
        let oid = self.catalog.create_table(&stmt.table, schema, heap.first_page_id())?;
        self.statistics.on_table_created(oid);
        info!("created table {}", stmt.table);
        Ok(Result::empty(Status::ok()))
    }

    fn execute_drop_table(&self, stmt: &crate::sql::ast::DropTableStatement) -> DbResult<Result> {
        match self.catalog.drop_table(&stmt.table) {
            Ok(()) => Ok(Result::empty(Status::ok())),
            Err(e) if stmt.if_exists && e.code() == StatusCode::NotFound => Ok(Result::empty(Status::ok())),
            Err(e) => Err(e),
        }
    }

    fn execute_create_index(&self, stmt: &crate::sql::ast::CreateIndexStatement) -> DbResult<Result> {
        let info = self
            .catalog
            .get_table_by_name(&stmt.table)
            .ok_or_else(|| Status::not_found(format!("table {} does not exist", stmt.table)))?;
        let key_column = info
            .schema
            .index_of(&stmt.column)
            .ok_or_else(|| Status::invalid_argument(format!("unknown column {}", stmt.column)))?;

        let tree = BPlusTree::new(&self.buffer_pool);
        let heap = TableHeap::open(&self.buffer_pool, info.first_page_id);
        for tuple in heap.iter(info.schema.clone()) {
            if tuple.version.deleted_by.is_some() {
                continue;
            }
            if let Some(key) = tuple.get(key_column).as_i64() {
                tree.insert(key, tuple.rid);
            }
        }
        let oid = self.catalog.create_index(&stmt.index_name, info.oid, key_column, tree.root_page_id())?;
        info!("created index {} on {}.{}", stmt.index_name, stmt.table, stmt.column);
        let _ = oid;
        Ok(Result::empty(Status::ok()))
    }

    fn execute_drop_index(&self, stmt: &crate::sql::ast::DropIndexStatement) -> DbResult<Result> {
        match self.catalog.drop_index(&stmt.index_name) {
            Ok(()) => Ok(Result::empty(Status::ok())),
            Err(e) if stmt.if_exists && e.code() == StatusCode::NotFound => Ok(Result::empty(Status::ok())),
            Err(e) => Err(e),
        }
    }

    fn execute_explain(&self, stmt: &crate::sql::ast::ExplainStatement) -> DbResult<Result> {
        let text = match stmt.statement.as_ref() {
            Statement::Select(select) => {
                let planner = Planner::new(&self.catalog, &self.statistics);
                let residual_filter = if select.joins.is_empty() { select.filter.as_ref() } else { None };
                let base = planner
                    .plan_scan(&select.from, residual_filter)
                    .ok_or_else(|| Status::not_found(format!("table {} does not exist", select.from)))?;
                planner.plan_select(select, base).explain()
            }
            _ => "Estimated Rows: 0".to_string(),
        };
        let names = std::sync::Arc::new(vec!["plan".to_string()]);
        let row = Row { column_names: names.clone(), values: vec![Value::Varchar(text)] };
        Ok(Result { status: Status::ok(), column_names: (*names).clone(), affected_rows: 0, rows: vec![row] })
    }
}

fn equality_key(expr: &Expr) -> Option<i64> {
    match expr {
        Expr::Comparison { op: crate::sql::expression::CompareOp::Eq, left, right } => {
            constant_i64(left).or_else(|| constant_i64(right))
        }
        Expr::Logical { op: crate::sql::expression::LogicalOp::And, left, .. } => equality_key(left),
        _ => None,
    }
}

fn range_bound(expr: &Expr) -> ScanBound {
    use crate::sql::expression::CompareOp;
    match expr {
        Expr::Comparison { op, left, right } => {
            let value = constant_i64(left).or_else(|| constant_i64(right));
            match (op, value) {
                (CompareOp::Lt, Some(v)) | (CompareOp::Le, Some(v)) => ScanBound::Range { start: None, end: Some(v) },
                (CompareOp::Gt, Some(v)) | (CompareOp::Ge, Some(v)) => ScanBound::Range { start: Some(v), end: None },
                _ => ScanBound::Full,
            }
        }
        Expr::Logical { op: crate::sql::expression::LogicalOp::And, left, .. } => range_bound(left),
        _ => ScanBound::Full,
    }
}

fn constant_i64(expr: &Expr) -> Option<i64> {
    match expr {
        Expr::Constant(v) => v.as_i64(),
        _ => None,
    }
}

fn projection_list(items: &[SelectItem], source_schema: &Schema) -> (Vec<Expr>, Vec<String>) {
    let mut exprs = Vec::new();
    let mut names = Vec::new();
    for item in items {
        match item {
            SelectItem::Star => {
                for (i, column) in source_schema.columns.iter().enumerate() {
                    exprs.push(Expr::ColumnRef {
                        table: None,
                        column: column.name.clone(),
                        index: i,
                        ty: Some(column.type_id),
                    });
                    names.push(column.name.clone());
                }
            }
            SelectItem::Expr { expr, alias } => {
                let name = alias.clone().unwrap_or_else(|| match expr {
                    Expr::ColumnRef { column, .. } => column.clone(),
                    _ => "?column?".to_string(),
                });
                exprs.push(expr.clone());
                names.push(name);
            }
        }
    }
    (exprs, names)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_db() -> Database {
        let dir = tempfile::tempdir().unwrap();
        std::mem::forget(dir.path().to_path_buf());
        let path = dir.path().to_path_buf();
        std::mem::forget(dir);
        Database::open(path, DatabaseOptions::default()).unwrap()
    }

    #[test]
    fn create_insert_select_round_trip() {
        let db = open_db();
        db.execute("CREATE TABLE users (id INTEGER, name VARCHAR)").unwrap();
        let res = db.execute("INSERT INTO users VALUES (1, 'alice')").unwrap();
        assert_eq!(res.affected_rows, 1);

        let res = db.execute("SELECT id, name FROM users").unwrap();
        assert_eq!(res.rows.len(), 1);
        assert_eq!(res.rows[0].get_by_name("name").unwrap().as_str(), Some("alice"));
    }

    #[test]
    fn update_then_delete() {
        let db = open_db();
        db.execute("CREATE TABLE t (id INTEGER, v INTEGER)").unwrap();
        db.execute("INSERT INTO t VALUES (1, 10)").unwrap();
        let res = db.execute("UPDATE t SET v = 99 WHERE id = 1").unwrap();
        assert_eq!(res.affected_rows, 1);
        let res = db.execute("DELETE FROM t WHERE id = 1").unwrap();
        assert_eq!(res.affected_rows, 1);
        let res = db.execute("SELECT id FROM t").unwrap();
        assert!(res.rows.is_empty());
    }

    #[test]
    fn explicit_transaction_rolls_back_insert() {
        let db = open_db();
        db.execute("CREATE TABLE t (id INTEGER)").unwrap();
        assert!(db.begin().is_ok());
        db.execute("INSERT INTO t VALUES (1)").unwrap();
        assert!(db.rollback().is_ok());
        let res = db.execute("SELECT id FROM t").unwrap();
        assert!(res.rows.is_empty());
    }

    #[test]
    fn explain_select_mentions_sequential_scan() {
        let db = open_db();
        db.execute("CREATE TABLE t (id INTEGER)").unwrap();
        let res = db.execute("EXPLAIN SELECT id FROM t").unwrap();
        let text = res.rows[0].get(0).unwrap().as_str().unwrap().to_string();
        assert!(text.contains("Sequential Scan on t"));
    }
}
