//! Cursor navigation, iteration and lifecycle through the public API.

mod common;

use std::collections::HashMap;

use gdsl::{
    CellAccess, Concurrency, CursorType, DataSource, DataSourceConfig, GdslError, Position,
    SqliteConnection, SqliteOptions, Table,
};

fn ids(table: &mut Table) -> Vec<i64> {
    table
        .rows()
        .map(|row| row.unwrap().get_long("id").unwrap())
        .collect()
}

// ===========================================================================
// 1. FORWARD-ONLY
// ===========================================================================

#[test]
fn forward_only_exhaustion() {
    let ds = common::forward_only();
    let mut table = ds.table("towns").unwrap();
    assert_eq!(table.cursor_options().cursor_type, CursorType::ForwardOnly);
    assert_eq!(table.fetch_size(), 2);

    let mut seen = 0;
    while table.next().unwrap() {
        seen += 1;
    }
    assert_eq!(seen, 3);
    for _ in 0..3 {
        assert!(!table.next().unwrap());
    }
    assert_eq!(table.position(), Position::AfterLast);
    assert!(matches!(table.get_long("id"), Err(GdslError::NoCurrentRow)));
}

#[test]
fn forward_only_pass_is_stable_under_writes() {
    let ds = common::forward_only();
    let mut table = ds.table("SELECT id FROM towns ORDER BY id").unwrap();
    let mut seen = Vec::new();
    while table.next().unwrap() {
        let id = table.get_long("id").unwrap();
        seen.push(id);
        ds.execute(format!("DELETE FROM towns WHERE id = {id}")).unwrap();
        ds.execute("INSERT INTO towns VALUES (0, 'Pontivy', 15000)").unwrap();
    }
    assert_eq!(seen, [1, 2, 3]);
    assert_eq!(ds.row_count("towns").unwrap(), 3);
}

#[test]
fn forward_only_rejects_random_access() {
    let ds = common::forward_only();
    let mut table = ds.table("towns").unwrap();
    assert!(table.next().unwrap());

    let unsupported = |result: gdsl::Result<bool>| {
        matches!(result, Err(GdslError::UnsupportedNavigation { .. }))
    };
    assert!(unsupported(table.previous()));
    assert!(unsupported(table.first()));
    assert!(unsupported(table.last()));
    assert!(unsupported(table.absolute(1)));
    assert!(unsupported(table.relative(1)));
    assert!(unsupported(table.is_before_first()));
    assert!(unsupported(table.is_after_last()));
    assert!(matches!(
        table.before_first(),
        Err(GdslError::UnsupportedNavigation { operation: "before_first" })
    ));
    assert!(matches!(
        table.after_last(),
        Err(GdslError::UnsupportedNavigation { .. })
    ));
    assert!(matches!(
        table.row_number(),
        Err(GdslError::UnsupportedNavigation { .. })
    ));

    // The failed calls did not move the cursor.
    assert_eq!(table.get_long("id").unwrap(), 1);
    assert!(table.next().unwrap());
    assert_eq!(table.get_long("id").unwrap(), 2);
}

#[test]
fn forward_only_iteration_continues_and_reopens() {
    let ds = common::forward_only();
    let mut table = ds.table("towns").unwrap();
    assert!(table.next().unwrap());
    assert_eq!(ids(&mut table), [2, 3]);
    assert!(ids(&mut table).is_empty());
    table.reopen().unwrap();
    assert_eq!(ids(&mut table), [1, 2, 3]);
}

// ===========================================================================
// 2. SCROLLABLE
// ===========================================================================

#[test]
fn scroll_navigation_follows_jdbc_semantics() {
    let ds = common::relational();
    let mut table = ds.table("towns").unwrap();
    assert_eq!(table.cursor_options().cursor_type, CursorType::ScrollSensitive);
    assert_eq!(table.cursor_options().concurrency, Concurrency::ReadOnly);

    assert!(table.is_before_first().unwrap());
    assert_eq!(table.row_number().unwrap(), 0);
    assert!(table.last().unwrap());
    assert_eq!(table.row_number().unwrap(), 3);
    assert!(!table.next().unwrap());
    assert!(table.is_after_last().unwrap());
    assert!(table.previous().unwrap());
    assert_eq!(table.get_long("id").unwrap(), 3);

    assert!(table.absolute(-3).unwrap());
    assert_eq!(table.get_long("id").unwrap(), 1);
    assert!(table.relative(1).unwrap());
    assert_eq!(table.row_number().unwrap(), 2);
    assert!(!table.relative(5).unwrap());
    assert!(table.is_after_last().unwrap());
    assert!(!table.absolute(0).unwrap());
    assert!(table.is_before_first().unwrap());
    assert!(!table.previous().unwrap());
    assert!(table.first().unwrap());
    assert_eq!(table.get_string("name").unwrap().as_deref(), Some("Vannes"));

    table.after_last().unwrap();
    assert!(table.is_after_last().unwrap());
    table.before_first().unwrap();
    assert!(table.next().unwrap());
    assert_eq!(table.row_number().unwrap(), 1);
}

#[test]
fn scroll_sensitive_sees_later_changes() {
    let ds = common::relational();
    let mut table = ds.table("towns").unwrap();
    assert!(table.first().unwrap());
    ds.execute("UPDATE towns SET name = 'Gwened' WHERE id = 1").unwrap();
    assert!(table.absolute(1).unwrap());
    assert_eq!(table.get_string("name").unwrap().as_deref(), Some("Gwened"));
}

#[test]
fn scroll_insensitive_keeps_its_snapshot() {
    let caps = gdsl::Capabilities {
        cursor_types: vec![CursorType::ForwardOnly, CursorType::ScrollInsensitive],
        updatable: false,
    };
    let ds = DataSource::new(common::connection(caps), DataSourceConfig::default()).unwrap();
    let mut table = ds.table("towns").unwrap();
    assert_eq!(table.cursor_options().cursor_type, CursorType::ScrollInsensitive);
    ds.execute("DELETE FROM towns").unwrap();
    assert!(table.last().unwrap());
    assert_eq!(table.row_number().unwrap(), 3);
    assert_eq!(table.row_count().unwrap(), 0);
    table.reopen().unwrap();
    assert!(!table.first().unwrap());
}

#[test]
fn scrollable_iteration_rewinds() {
    let ds = common::relational();
    let mut table = ds.table("towns").unwrap();
    assert!(table.last().unwrap());
    assert_eq!(ids(&mut table), [1, 2, 3]);
    assert_eq!(ids(&mut table), [1, 2, 3]);
}

// ===========================================================================
// 3. LIFECYCLE
// ===========================================================================

#[test]
fn closed_tables_refuse_access() {
    let ds = common::relational();
    let mut table = ds.table("towns").unwrap();
    assert!(table.next().unwrap());
    table.close();
    assert!(table.is_closed());
    assert!(matches!(table.next(), Err(GdslError::CursorClosed)));
    assert!(matches!(table.get_long("id"), Err(GdslError::CursorClosed)));
    assert!(matches!(table.first(), Err(GdslError::CursorClosed)));
    assert_eq!(table.position(), Position::Closed);
    table.close();
}

#[test]
fn each_row_visits_in_cursor_order() {
    let ds = common::relational();
    let mut table = ds
        .select(["id"])
        .from("towns")
        .order_by_dir("population", gdsl::Order::Desc)
        .table()
        .unwrap();
    let mut order = Vec::new();
    table
        .each_row(|row| order.push(row.get_long(0).unwrap()))
        .unwrap();
    assert_eq!(order, [2, 1, 3]);
}

#[test]
fn closing_the_source_from_a_row_callback() {
    let ds = common::relational();
    let mut visited = 0;
    ds.each_row("SELECT id FROM towns", |_| {
        visited += 1;
        ds.close().unwrap();
    })
    .unwrap();
    assert_eq!(visited, 1);
    assert!(ds.is_closed());
    assert!(matches!(
        ds.execute("SELECT 1"),
        Err(GdslError::ConnectionClosed)
    ));
}

#[test]
fn file_backed_database_survives_reconnect() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("towns.db");
    {
        let conn = SqliteConnection::open(&SqliteOptions::file(&path)).unwrap();
        let ds = DataSource::new(conn, DataSourceConfig::default()).unwrap();
        ds.execute(common::SCHEMA).unwrap();
        ds.close().unwrap();
    }
    let conn = SqliteConnection::open(&SqliteOptions::file(&path)).unwrap();
    let ds = DataSource::new(conn, DataSourceConfig::spatial().with_fetch_size(1)).unwrap();
    let mut table = ds.table("towns").unwrap();
    assert_eq!(ids(&mut table), [1, 2, 3]);
    assert!(ds.spatial_table("roads").unwrap().is_spatial());
}

#[test]
fn script_file_populates_a_source() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("harbours.sql");
    std::fs::write(
        &path,
        "-- harbours along the coast
         CREATE TABLE ${name} (id INTEGER, town TEXT, the_geom GEOMETRY(${srid}));
         INSERT INTO ${name} VALUES (1, 'Lorient', 'SRID=${srid};POINT(-3.37 47.75)');
",
    )
    .unwrap();
    let ds = common::spatial();
    let bindings = HashMap::from([
        ("name".to_owned(), "harbours".to_owned()),
        ("srid".to_owned(), "4326".to_owned()),
    ]);
    assert_eq!(ds.execute_script_file(&path, &bindings).unwrap(), 2);
    assert_eq!(ds.table_names().unwrap(), ["harbours", "roads", "towns"]);
    let harbours = ds.spatial_table("harbours").unwrap();
    assert_eq!(harbours.srid(), 4326);

    let err = ds
        .execute_script_file(dir.path().join("missing.sql"), &bindings)
        .unwrap_err();
    assert!(matches!(err, GdslError::ScriptRead { .. }));
}

#[test]
fn config_from_json_drives_the_source() {
    let config = DataSourceConfig::from_json(r#"{ "dialect": "spatial", "fetch_size": 1 }"#).unwrap();
    let ds = DataSource::new(
        common::connection(gdsl::Capabilities::forward_only()),
        config,
    )
    .unwrap();
    let mut table = ds.table("TOWNS").unwrap();
    assert_eq!(table.name(), "towns");
    assert_eq!(table.fetch_size(), 1);
    assert_eq!(ids(&mut table), [1, 2, 3]);
}
