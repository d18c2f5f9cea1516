use voxcall_db::{create_pool, run_migrations, DbRuntimeSettings};

#[test]
fn db_initialization_works() {
    let pool = create_pool(":memory:", DbRuntimeSettings::default()).expect("failed to create pool");
    let conn = pool.get().expect("failed to get connection");
    let applied = run_migrations(&conn).expect("failed to run migrations");
    assert_eq!(applied, 3);

    let mut stmt = conn
        .prepare(
            "SELECT name FROM sqlite_master
             WHERE type='table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .expect("failed to prepare table query");
    let tables: Vec<String> = stmt
        .query_map([], |row| row.get(0))
        .expect("failed to execute table query")
        .map(|r| r.expect("failed to read table name"))
        .collect();

    assert_eq!(
        tables,
        vec![
            "_voxcall_meta".to_string(),
            "_voxcall_migrations".to_string(),
            "call_sessions".to_string(),
            "credentials".to_string(),
        ]
    );
}

#[test]
fn file_pool_shares_schema_across_connections() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("voxcall.db");
    let pool = create_pool(path.to_str().expect("utf-8 path"), DbRuntimeSettings::default())
        .expect("failed to create pool");

    {
        let conn = pool.get().expect("failed to get connection");
        run_migrations(&conn).expect("failed to run migrations");
    }

    let a = pool.get().expect("first connection");
    let b = pool.get().expect("second connection");
    a.execute(
        "INSERT INTO credentials (key, value) VALUES ('OPENAI_API_KEY', 'sk-test')",
        [],
    )
    .expect("insert through first connection");
    let value: String = b
        .query_row(
            "SELECT value FROM credentials WHERE key = 'OPENAI_API_KEY'",
            [],
            |row| row.get(0),
        )
        .expect("read through second connection");
    assert_eq!(value, "sk-test");
}
