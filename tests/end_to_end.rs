//! End-to-end scenarios against the public `Database` surface.

use relstore::{Database, DatabaseOptions};

fn open_db() -> Database {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().to_path_buf();
    std::mem::forget(dir);
    Database::open(path, DatabaseOptions::default()).unwrap()
}

#[test]
fn insert_and_scan_preserves_insertion_order() {
    let db = open_db();
    db.execute("CREATE TABLE t (id INTEGER, name VARCHAR(100))").unwrap();
    db.execute("INSERT INTO t VALUES (1, 'Alice'), (2, 'Bob'), (3, 'Charlie')").unwrap();

    let res = db.execute("SELECT * FROM t").unwrap();
    assert_eq!(res.column_names, vec!["id".to_string(), "name".to_string()]);
    assert_eq!(res.rows.len(), 3);
    let ids: Vec<i64> = res.rows.iter().map(|r| r.get_by_name("id").unwrap().as_i64().unwrap()).collect();
    assert_eq!(ids, vec![1, 2, 3]);
}

#[test]
fn predicate_filter_selects_matching_rows() {
    let db = open_db();
    db.execute("CREATE TABLE t (id INTEGER, name VARCHAR(100))").unwrap();
    db.execute("INSERT INTO t VALUES (1, 'Alice'), (2, 'Bob'), (3, 'Charlie')").unwrap();
    db.execute("INSERT INTO t VALUES (4, 'Dave')").unwrap();

    let res = db.execute("SELECT * FROM t WHERE id > 2").unwrap();
    let mut ids: Vec<i64> = res.rows.iter().map(|r| r.get_by_name("id").unwrap().as_i64().unwrap()).collect();
    ids.sort();
    assert_eq!(ids, vec![3, 4]);
}

#[test]
fn update_reports_affected_rows_and_persists() {
    let db = open_db();
    db.execute("CREATE TABLE u (id INTEGER, age INTEGER)").unwrap();
    db.execute("INSERT INTO u VALUES (1, 25), (2, 30)").unwrap();

    let res = db.execute("UPDATE u SET age = 99 WHERE id = 1").unwrap();
    assert_eq!(res.affected_rows, 1);

    let res = db.execute("SELECT age FROM u WHERE id = 1").unwrap();
    assert_eq!(res.rows.len(), 1);
    assert_eq!(res.rows[0].get(0).unwrap().as_i64(), Some(99));
}

#[test]
fn explicit_transaction_commits_across_statements() {
    let db = open_db();
    db.execute("CREATE TABLE t (id INTEGER)").unwrap();
    assert!(db.begin().is_ok());
    db.execute("INSERT INTO t VALUES (1)").unwrap();
    db.execute("INSERT INTO t VALUES (2)").unwrap();
    assert!(db.commit().is_ok());

    let res = db.execute("SELECT id FROM t").unwrap();
    assert_eq!(res.rows.len(), 2);
}

#[test]
fn index_backed_point_lookup_matches_seq_scan_result() {
    let db = open_db();
    db.execute("CREATE TABLE t (id INTEGER, v INTEGER)").unwrap();
    for i in 0..50 {
        db.execute(&format!("INSERT INTO t VALUES ({}, {})", i, i * 10)).unwrap();
    }
    db.execute("CREATE INDEX t_id_idx ON t (id)").unwrap();

    let res = db.execute("SELECT v FROM t WHERE id = 17").unwrap();
    assert_eq!(res.rows.len(), 1);
    assert_eq!(res.rows[0].get(0).unwrap().as_i64(), Some(170));
}

#[test]
fn join_combines_matching_rows_from_both_tables() {
    let db = open_db();
    db.execute("CREATE TABLE orders (id INTEGER, customer_id INTEGER)").unwrap();
    db.execute("CREATE TABLE customers (id INTEGER, name VARCHAR(50))").unwrap();
    db.execute("INSERT INTO customers VALUES (1, 'Alice'), (2, 'Bob')").unwrap();
    db.execute("INSERT INTO orders VALUES (100, 1), (101, 2), (102, 1)").unwrap();

    let res = db
        .execute("SELECT orders.id FROM orders JOIN customers ON orders.customer_id = customers.id WHERE customers.id = 1")
        .unwrap();
    let mut ids: Vec<i64> = res.rows.iter().map(|r| r.get(0).unwrap().as_i64().unwrap()).collect();
    ids.sort();
    assert_eq!(ids, vec![100, 102]);
}

#[test]
fn explain_reports_index_scan_once_index_exists() {
    let db = open_db();
    db.execute("CREATE TABLE t (id INTEGER)").unwrap();
    for i in 0..200 {
        db.execute(&format!("INSERT INTO t VALUES ({})", i)).unwrap();
    }
    db.execute("CREATE INDEX t_id_idx ON t (id)").unwrap();

    let res = db.execute("EXPLAIN SELECT id FROM t WHERE id = 42").unwrap();
    let plan = res.rows[0].get(0).unwrap().as_str().unwrap().to_string();
    assert!(plan.contains("Index Scan (Point Lookup)"), "plan was: {}", plan);
}
