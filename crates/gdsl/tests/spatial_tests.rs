//! Spatial tables, named attributes and plain-text rendering.

mod common;

use gdsl::display::{ascii, ascii_table};
use gdsl::{CellAccess, Envelope, GdslError, NamedAttributes, Value, UNKNOWN_SRID};

// ===========================================================================
// 1. REPROJECTION
// ===========================================================================

#[test]
fn reproject_wraps_a_transform_query() {
    let ds = common::spatial();
    let roads = ds.spatial_table("roads").unwrap();
    assert_eq!(roads.srid(), 4326);

    let mut lambert = roads.reproject(2154).unwrap();
    assert_eq!(
        lambert.name(),
        "(SELECT id, name, ST_Transform(the_geom, 2154) AS the_geom FROM roads) as foo"
    );
    assert_eq!(
        lambert.sql(),
        "SELECT * FROM (SELECT id, name, ST_Transform(the_geom, 2154) AS the_geom FROM roads) as foo"
    );
    assert_eq!(lambert.geometric_columns(), ["the_geom"]);
    assert_eq!(lambert.srid(), 2154);
    assert_eq!(lambert.cursor_options(), roads.cursor_options());

    assert!(lambert.next().unwrap());
    let geometry = lambert.geometry("the_geom").unwrap().unwrap();
    assert_eq!(geometry.srid(), 2154);
    assert_eq!(geometry.geometry_type(), "LINESTRING");

    // The source table is untouched.
    assert_eq!(roads.srid(), 4326);
    assert_eq!(roads.sql(), "SELECT * FROM roads");
}

#[test]
fn reproject_in_the_relational_dialect_keeps_other_columns_verbatim() {
    let ds = common::relational();
    let roads = ds.spatial_table("roads").unwrap();
    let lambert = roads.reproject(3857).unwrap();
    assert_eq!(
        lambert.name(),
        "(SELECT id, name, ST_Transform(\"the_geom\", 3857) AS \"the_geom\" FROM ROADS) as foo"
    );
    assert_eq!(lambert.row_count().unwrap(), 3);
}

// ===========================================================================
// 2. SRID AND EXTENT
// ===========================================================================

#[test]
fn srid_from_values_when_undeclared() {
    let ds = common::spatial();
    ds.execute(
        "CREATE TABLE spots (id INTEGER, pos GEOMETRY);
         INSERT INTO spots VALUES (1, NULL), (2, 'SRID=2154;POINT(1 2)');",
    )
    .unwrap();
    let spots = ds.spatial_table("spots").unwrap();
    assert_eq!(spots.srid(), 2154);

    ds.execute("CREATE TABLE empty_spots (id INTEGER, pos GEOMETRY)").unwrap();
    assert_eq!(ds.spatial_table("empty_spots").unwrap().srid(), UNKNOWN_SRID);
}

#[test]
fn exact_extent_skips_nulls() {
    let ds = common::spatial();
    let roads = ds.spatial_table("roads").unwrap();
    assert_eq!(
        roads.extent().unwrap(),
        Some(Envelope::new(-3.5, 47.0, -2.0, 48.0))
    );
    assert_eq!(
        ds.extent("SELECT the_geom FROM roads WHERE id = 1").unwrap(),
        Some(Envelope::new(-3.0, 47.0, -2.0, 48.0))
    );
    assert_eq!(
        ds.extent("SELECT the_geom FROM roads WHERE id = 3").unwrap(),
        None
    );
}

#[test]
fn estimated_extent_uses_statistics_then_falls_back() {
    let ds = common::spatial();
    let roads = ds.spatial_table("roads").unwrap();
    assert_eq!(
        roads.estimated_extent().unwrap(),
        Some(Envelope::new(-4.0, 46.0, -1.0, 49.0))
    );

    // No statistics for a query, nor for the relational dialect.
    let subset = ds
        .spatial_table("SELECT the_geom FROM roads WHERE id = 2")
        .unwrap();
    assert_eq!(
        subset.estimated_extent().unwrap(),
        Some(Envelope::new(-3.5, 47.5, -2.5, 47.8))
    );
    let relational = common::relational().spatial_table("roads").unwrap();
    assert_eq!(
        relational.estimated_extent().unwrap(),
        Some(Envelope::new(-3.5, 47.0, -2.0, 48.0))
    );
}

#[test]
fn geometry_types_and_first_geometry() {
    let ds = common::spatial();
    let mut roads = ds.spatial_table("roads").unwrap();
    assert_eq!(
        roads.geometry_types().get("the_geom").map(String::as_str),
        Some("GEOMETRY")
    );
    assert!(roads.raster_columns().is_empty());
    assert!(matches!(roads.first_geometry(), Err(GdslError::NoCurrentRow)));
    assert!(roads.last().unwrap());
    assert_eq!(roads.first_geometry().unwrap(), None);
    assert!(roads.was_null());
    assert!(roads.first().unwrap());
    assert!(roads.first_geometry().unwrap().is_some());
}

// ===========================================================================
// 3. TRANSACTIONS
// ===========================================================================

#[test]
fn resolution_inside_a_transaction_keeps_pending_work() {
    let ds = common::spatial();
    ds.set_autocommit(false).unwrap();
    assert!(!ds.is_autocommit());
    ds.execute("INSERT INTO towns VALUES (4, 'Quimper', 63000)").unwrap();

    assert!(ds.spatial_table("roads").unwrap().is_spatial());
    assert!(ds.table("missing_table").is_err());
    assert!(ds.spatial_table("towns").is_err());

    assert_eq!(ds.row_count("towns").unwrap(), 4);
    ds.rollback().unwrap();
    assert_eq!(ds.row_count("towns").unwrap(), 3);

    ds.execute("INSERT INTO towns VALUES (5, 'Brest', 139000)").unwrap();
    ds.commit().unwrap();
    ds.set_autocommit(true).unwrap();
    assert_eq!(ds.row_count("towns").unwrap(), 4);
}

// ===========================================================================
// 4. NAMED ATTRIBUTES
// ===========================================================================

#[test]
fn named_attributes_on_tables() {
    let ds = common::spatial();
    let mut towns = ds.table("towns").unwrap();
    assert_eq!(towns.attribute("name").unwrap(), Value::from("towns"));
    assert_eq!(towns.attribute("location").unwrap(), Value::from("towns"));
    assert_eq!(towns.attribute("row_count").unwrap(), Value::Integer(3));
    assert_eq!(towns.attribute("spatial").unwrap(), Value::Boolean(false));
    assert_eq!(
        towns.attribute("columns").unwrap(),
        Value::from(r#"["id","name","population"]"#)
    );
    assert!(matches!(
        towns.attribute("population"),
        Err(GdslError::NoCurrentRow)
    ));
    assert!(towns.next().unwrap());
    assert_eq!(towns.attribute("population").unwrap(), Value::Integer(53_000));
    // `name` is the table property, not the column.
    assert_eq!(towns.get_object("name").unwrap(), Value::from("Vannes"));

    towns.set_attribute("fetch_size", Value::Integer(7)).unwrap();
    assert_eq!(towns.attribute("fetch_size").unwrap(), Value::Integer(7));
    assert!(matches!(
        towns.set_attribute("fetch_size", Value::Integer(0)),
        Err(GdslError::TypeMismatch { .. })
    ));
    assert!(matches!(
        towns.set_attribute("name", Value::from("x")),
        Err(GdslError::UnknownAttribute { .. })
    ));
    assert!(matches!(
        towns.attribute("nonexistent"),
        Err(GdslError::UnknownAttribute { .. })
    ));
}

#[test]
fn named_attributes_on_spatial_tables() {
    let ds = common::spatial();
    let roads = ds.spatial_table("roads").unwrap();
    assert_eq!(roads.attribute("spatial").unwrap(), Value::Boolean(true));
    assert_eq!(roads.attribute("srid").unwrap(), Value::Integer(4326));
    assert_eq!(roads.attribute("row_count").unwrap(), Value::Integer(3));

    let query = ds.table("SELECT id FROM towns").unwrap();
    assert_eq!(query.attribute("location").unwrap(), Value::Null);
}

// ===========================================================================
// 5. DISPLAY
// ===========================================================================

#[test]
fn ascii_rendering_of_a_query() {
    let ds = common::spatial();
    let mut table = ds
        .select(["id", "name"])
        .from("roads")
        .order_by("id")
        .table()
        .unwrap();
    let text = ascii_table(&mut table, 6).unwrap();
    let expected = "\
+------+------+
|  id  | name |
+------+------+
|1     |N165  |
|2     |D767  |
|3     |unm...|
+------+------+
";
    assert_eq!(text, expected);
}

#[test]
fn ascii_rendering_uses_the_configured_width() {
    let ds = common::relational();
    let mut table = ds.table("SELECT name FROM towns WHERE id = 2").unwrap();
    let text = ascii(&mut table).unwrap();
    let border = format!("+{}+", "-".repeat(20));
    assert_eq!(text.lines().next(), Some(border.as_str()));
    assert!(text.contains(&format!("|Lorient{}|", " ".repeat(13))));
}
