//! Shared fixtures: in-memory SQLite sources with a couple of spatial SQL
//! functions registered.

#![allow(dead_code)]

use gdsl::{Capabilities, Connection, DataSource, DataSourceConfig, SqliteConnection, SqliteOptions};
use rusqlite::functions::FunctionFlags;

pub const SCHEMA: &str = "
    CREATE TABLE towns (id INTEGER, name TEXT, population INTEGER);
    INSERT INTO towns VALUES (1, 'Vannes', 53000), (2, 'Lorient', 57000), (3, 'Auray', 14000);
    CREATE TABLE roads (id INTEGER, name TEXT, the_geom GEOMETRY(4326));
    INSERT INTO roads VALUES (1, 'N165', 'SRID=4326;LINESTRING(-3 47,-2 48)');
    INSERT INTO roads VALUES (2, 'D767', 'SRID=4326;LINESTRING(-3.5 47.5,-2.5 47.8)');
    INSERT INTO roads VALUES (3, 'unmapped', NULL);
";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Register `ST_Transform(geom, srid)`, which relabels the EWKT SRID, and
/// `ST_EstimatedExtent([schema,] table, column)`, which answers for `roads`.
pub fn register_spatial_functions(conn: &SqliteConnection) {
    conn.with_inner(|db| {
        db.create_scalar_function(
            "ST_Transform",
            2,
            FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
            |ctx| {
                let geom: Option<String> = ctx.get(0)?;
                let srid: i64 = ctx.get(1)?;
                Ok(geom.map(|g| {
                    let body = g.split_once(';').map_or(g.as_str(), |(_, body)| body);
                    format!("SRID={srid};{body}")
                }))
            },
        )?;
        db.create_scalar_function(
            "ST_EstimatedExtent",
            -1,
            FunctionFlags::SQLITE_UTF8,
            |ctx| {
                let table: String = ctx.get(ctx.len() - 2)?;
                Ok((table == "roads").then(|| "BOX(-4 46,-1 49)".to_owned()))
            },
        )
    })
    .expect("register spatial functions");
}

pub fn connection(capabilities: Capabilities) -> SqliteConnection {
    init_tracing();
    let conn = SqliteConnection::open(&SqliteOptions::in_memory().with_capabilities(capabilities))
        .expect("open in-memory sqlite");
    conn.execute(SCHEMA, &[]).expect("load schema");
    register_spatial_functions(&conn);
    conn
}

pub fn relational() -> DataSource {
    DataSource::new(connection(Capabilities::default()), DataSourceConfig::default())
        .expect("relational source")
}

pub fn spatial() -> DataSource {
    DataSource::new(connection(Capabilities::default()), DataSourceConfig::spatial())
        .expect("spatial source")
}

pub fn forward_only() -> DataSource {
    DataSource::new(
        connection(Capabilities::forward_only()),
        DataSourceConfig::default().with_fetch_size(2),
    )
    .expect("forward-only source")
}
