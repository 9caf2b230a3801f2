//! Full-Stack Integration Tests
//!
//! Drives `Session` -> `QueryExecutor` -> `SchemaCatalog` against real `SQLite`
//! files shaped like a slice of an ERP schema. Validates:
//! - Catalog load and foreign-key grouping from the engine's own catalog
//! - Resolution, search and join paths over the loaded graph
//! - Column descriptions and primary-key-ordered samples
//! - Row caps and read-only enforcement on ad-hoc queries

#![cfg(feature = "sqlite")]

use pretty_assertions::assert_eq;
use serde_json::json;
use std::path::PathBuf;

use sqlscout::{Direction, ScoutError, Session, Settings, SqlParam, SqliteConnector, TableKind};

// ============================================================================
// Test Helpers
// ============================================================================

const ERP_SCHEMA: &str = "
    CREATE TABLE CustomerType (CustType TEXT PRIMARY KEY, Description TEXT);
    CREATE TABLE Customer (
        CustNum INTEGER PRIMARY KEY,
        Name TEXT NOT NULL,
        CustType TEXT REFERENCES CustomerType(CustType)
    );
    CREATE TABLE Part (PartNum TEXT PRIMARY KEY, Description TEXT);
    CREATE TABLE OrderHed (
        Company TEXT NOT NULL,
        OrderNum INTEGER NOT NULL,
        CustNum INTEGER REFERENCES Customer(CustNum),
        PRIMARY KEY (Company, OrderNum)
    );
    CREATE TABLE OrderDtl (
        Company TEXT NOT NULL,
        OrderNum INTEGER NOT NULL,
        OrderLine INTEGER NOT NULL,
        PartNum TEXT REFERENCES Part(PartNum),
        FOREIGN KEY (Company, OrderNum) REFERENCES OrderHed(Company, OrderNum)
    );
    CREATE TABLE Miscellaneous (Id INTEGER PRIMARY KEY);
    CREATE VIEW OpenOrders AS SELECT * FROM OrderHed;

    INSERT INTO CustomerType VALUES ('DIST', 'Distributor');
    INSERT INTO Customer VALUES (1, 'Acme', 'DIST'), (2, 'Globex', 'DIST'), (3, 'Initech', NULL),
                                (4, 'Umbrella', NULL), (5, 'Hooli', 'DIST');
    INSERT INTO Part VALUES ('P-100', 'Widget');
    INSERT INTO OrderHed VALUES ('EPIC06', 1001, 1);
    INSERT INTO OrderDtl VALUES ('EPIC06', 1001, 1, 'P-100');
";

/// Create a seeded `SQLite` database unique to this test
fn create_erp_db(tag: &str) -> PathBuf {
    use std::sync::atomic::{AtomicU64, Ordering};
    static COUNTER: AtomicU64 = AtomicU64::new(0);

    let id = COUNTER.fetch_add(1, Ordering::SeqCst);
    let temp_file =
        std::env::temp_dir().join(format!("sqlscout_it_{tag}_{}_{id}.db", std::process::id()));
    let _ = std::fs::remove_file(&temp_file);

    let conn = rusqlite::Connection::open(&temp_file).expect("Failed to create temp database");
    conn.execute_batch(ERP_SCHEMA).expect("Failed to seed temp database");
    temp_file
}

fn session(path: &PathBuf) -> Session<SqliteConnector> {
    let settings = Settings::default();
    Session::new(SqliteConnector::new(path, &settings), &settings)
}

// ============================================================================
// Catalog Load
// ============================================================================

#[tokio::test]
async fn test_catalog_load_indexes_tables_and_views() {
    let path = create_erp_db("catalog");
    let session = session(&path);

    let cache = session.metadata().await.unwrap();

    assert_eq!(cache.schemas(), vec![("main", 7)]);
    let view = cache.resolve("OpenOrders", None).unwrap();
    assert_eq!(view.kind, TableKind::View);
    assert_eq!(cache.resolve("Customer", None).unwrap().full(), "main.Customer");
    assert_eq!(session.catalog().load_count(), 1);

    let _ = std::fs::remove_file(&path);
}

#[tokio::test]
async fn test_composite_foreign_key_is_one_edge_in_column_order() {
    let path = create_erp_db("composite");
    let session = session(&path);
    let cache = session.metadata().await.unwrap();

    let dtl = cache.resolve("OrderDtl", None).unwrap();
    let hed = cache.resolve("OrderHed", None).unwrap();
    let edges = cache.edges_between(dtl, hed);

    assert_eq!(edges.len(), 1);
    assert_eq!(
        edges[0].column_pairs,
        vec![
            ("Company".to_string(), "Company".to_string()),
            ("OrderNum".to_string(), "OrderNum".to_string()),
        ]
    );
    assert_eq!(
        edges[0].join_clause(),
        "OrderDtl.Company = OrderHed.Company AND OrderDtl.OrderNum = OrderHed.OrderNum"
    );
    assert_eq!(cache.edges().len(), 4);

    let _ = std::fs::remove_file(&path);
}

#[tokio::test]
async fn test_relationships_of_customer() {
    let path = create_erp_db("relationships");
    let session = session(&path);

    let customer = session.require_table("Customer", None).await.unwrap();
    let cache = session.metadata().await.unwrap();

    let parent: Vec<String> = cache
        .relationships_of(&customer, Direction::Parent)
        .iter()
        .map(|e| e.child.full().to_string())
        .collect();
    let child: Vec<String> = cache
        .relationships_of(&customer, Direction::Child)
        .iter()
        .map(|e| e.parent.full().to_string())
        .collect();

    assert_eq!(parent, vec!["main.CustomerType"]);
    assert_eq!(child, vec!["main.OrderHed"]);
    assert_eq!(cache.relationships_of(&customer, Direction::Both).len(), 2);

    let _ = std::fs::remove_file(&path);
}

// ============================================================================
// Join Paths
// ============================================================================

#[tokio::test]
async fn test_join_path_from_part_to_customer() {
    let path = create_erp_db("joinpath");
    let session = session(&path);

    let part = session.require_table("Part", None).await.unwrap();
    let customer = session.require_table("Customer", None).await.unwrap();
    let cache = session.metadata().await.unwrap();

    let paths = cache.join_path(&part, &customer, 3);
    assert_eq!(paths.len(), 1);
    assert_eq!(
        paths[0].describe(),
        "main.Part -> main.OrderDtl -> main.OrderHed -> main.Customer"
    );

    let hops = cache.hops(&paths[0]);
    assert!(hops.iter().all(|hop| hop.edges.len() == 1));

    assert!(cache.join_path(&part, &customer, 2).is_empty());
    assert_eq!(cache.join_path(&part, &part, 0).len(), 1);

    let _ = std::fs::remove_file(&path);
}

#[tokio::test]
async fn test_isolated_table_has_no_path() {
    let path = create_erp_db("isolated");
    let session = session(&path);

    let misc = session.require_table("Miscellaneous", None).await.unwrap();
    let customer = session.require_table("Customer", None).await.unwrap();
    let cache = session.metadata().await.unwrap();

    assert!(cache.join_path(&misc, &customer, 5).is_empty());

    let _ = std::fs::remove_file(&path);
}

// ============================================================================
// Search & Resolution
// ============================================================================

#[tokio::test]
async fn test_search_and_suggestions() {
    let path = create_erp_db("search");
    let session = session(&path);
    let cache = session.metadata().await.unwrap();

    let hits = cache.search("cust", None, 2);
    let names: Vec<&str> = hits.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["Customer", "CustomerType"]);

    let err = session.require_table("Custmer", None).await.unwrap_err();
    match err {
        ScoutError::TableNotFound { suggestions, .. } => {
            assert_eq!(suggestions[0], "main.Customer");
        }
        other => panic!("expected TableNotFound, got {other:?}"),
    }

    let _ = std::fs::remove_file(&path);
}

// ============================================================================
// Describe and Sample
// ============================================================================

#[tokio::test]
async fn test_describe_composite_key_table() {
    let path = create_erp_db("describe");
    let session = session(&path);

    let description = session.describe("OrderHed", None).await.unwrap();
    assert_eq!(description.table.full(), "main.OrderHed");
    assert_eq!(description.row_count, Some(1));
    assert_eq!(description.primary_key(), vec!["Company", "OrderNum"]);
    assert_eq!(description.references, 1);
    assert_eq!(description.referenced_by, 1);

    let columns: Vec<(&str, String, bool)> = description
        .columns
        .iter()
        .map(|c| (c.name.as_str(), c.type_display(), c.nullable))
        .collect();
    assert_eq!(
        columns,
        vec![
            ("Company", "TEXT".to_string(), false),
            ("OrderNum", "INTEGER".to_string(), false),
            ("CustNum", "INTEGER".to_string(), true),
        ]
    );

    // Rowid-aliased keys are reported as not nullable
    let customer = session.describe("Customer", None).await.unwrap();
    assert!(!customer.columns[0].nullable);
    assert_eq!(customer.row_count, Some(5));

    let err = session.describe("OrderHead", None).await.unwrap_err();
    assert_eq!(err.error_code(), "TABLE_NOT_FOUND");

    let _ = std::fs::remove_file(&path);
}

#[tokio::test]
async fn test_sample_skips_blobs_and_orders_by_key() {
    let path = create_erp_db("sample");
    let conn = rusqlite::Connection::open(&path).unwrap();
    conn.execute_batch(
        "CREATE TABLE Attachment (Company TEXT, DocId INTEGER, Body BLOB, Title TEXT,
                                  PRIMARY KEY (DocId, Company));
         INSERT INTO Attachment VALUES ('B', 2, X'00', 'second'), ('A', 2, X'01', 'first'),
                                       ('A', 1, X'02', 'zeroth');",
    )
    .unwrap();
    drop(conn);
    let session = session(&path);

    let result = session.sample("Attachment", None, None, None).await.unwrap();
    assert_eq!(result.columns, vec!["Company", "DocId", "Title"]);
    assert_eq!(
        result.rows,
        vec![
            vec![json!("A"), json!(1), json!("zeroth")],
            vec![json!("A"), json!(2), json!("first")],
            vec![json!("B"), json!(2), json!("second")],
        ]
    );

    let result =
        session.sample("Customer", None, Some(2), Some("CustType = 'DIST'")).await.unwrap();
    let names: Vec<&serde_json::Value> = result.rows.iter().map(|row| &row[1]).collect();
    assert_eq!(names, vec![&json!("Acme"), &json!("Globex")]);

    let err = session
        .sample("Customer", None, None, Some("1 = 1; DROP TABLE Customer"))
        .await
        .unwrap_err();
    assert!(matches!(err, ScoutError::UnsafeQuery { ref keyword } if keyword == "DROP"));

    let _ = std::fs::remove_file(&path);
}

// ============================================================================
// Ad-hoc Queries
// ============================================================================

#[tokio::test]
async fn test_row_cap_limits_results() {
    let path = create_erp_db("rowcap");
    let session = session(&path);

    let capped =
        session.execute("SELECT Name FROM Customer ORDER BY CustNum", &[], Some(2)).await.unwrap();
    assert_eq!(capped.rows, vec![vec![json!("Acme")], vec![json!("Globex")]]);

    let raw = session.execute_raw("SELECT Name FROM Customer", &[]).await.unwrap();
    assert_eq!(raw.row_count(), 5);

    let _ = std::fs::remove_file(&path);
}

#[tokio::test]
async fn test_positional_params() {
    let path = create_erp_db("params");
    let session = session(&path);

    let result = session
        .execute("SELECT Name FROM Customer WHERE CustNum = ?1", &[SqlParam::Int(3)], None)
        .await
        .unwrap();
    assert_eq!(result.columns, vec!["Name".to_string()]);
    assert_eq!(result.rows, vec![vec![json!("Initech")]]);

    let _ = std::fs::remove_file(&path);
}

#[tokio::test]
async fn test_unsafe_query_is_rejected_and_data_untouched() {
    let path = create_erp_db("unsafe");
    let session = session(&path);

    let err = session.execute("DELETE FROM Customer", &[], None).await.unwrap_err();
    assert_eq!(err.error_code(), "UNSAFE_QUERY");

    let err = session
        .execute("SELECT 1; /* harmless */ UPDATE Customer SET Name = 'x'", &[], None)
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "UNSAFE_QUERY");

    let count = session.execute_raw("SELECT COUNT(*) FROM Customer", &[]).await.unwrap();
    assert_eq!(count.rows, vec![vec![json!(5)]]);

    let _ = std::fs::remove_file(&path);
}

#[tokio::test]
async fn test_keyword_inside_comment_is_allowed() {
    let path = create_erp_db("comment");
    let session = session(&path);

    let sql = "SELECT CustNum -- drop this column later\n\
               FROM Customer /* DELETE me */ WHERE CustNum = 1";
    let result = session.execute(sql, &[], None).await.unwrap();
    assert_eq!(result.rows, vec![vec![json!(1)]]);

    let _ = std::fs::remove_file(&path);
}

#[tokio::test]
async fn test_database_errors_surface_as_query_failed() {
    let path = create_erp_db("badsql");
    let session = session(&path);

    let err = session.execute("SELECT Nope FROM Customer", &[], None).await.unwrap_err();
    assert_eq!(err.error_code(), "QUERY_FAILED");
    assert!(err.message().contains("Nope"));

    let _ = std::fs::remove_file(&path);
}

#[tokio::test]
async fn test_missing_database_file_is_connection_failure() {
    let path = std::env::temp_dir().join("sqlscout_it_missing_file.db");
    let session = session(&path);

    let err = session.warm_up().await.unwrap_err();
    assert_eq!(err.error_code(), "CONNECTION_FAILED");
}
