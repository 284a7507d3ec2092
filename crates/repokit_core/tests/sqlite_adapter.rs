mod common;

use common::{article, at, compiled_mapping, seed_articles, ArticleRepository, User, SCHEMA_SQL};
use repokit_core::repo::QueryBuilder;
use repokit_core::{Adapter, ModelError, PublicRepository, Repository, SqliteAdapter, Value};
use std::sync::Arc;

#[test]
fn file_database_keeps_records_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("repokit.sqlite3");
    let mapping = compiled_mapping();

    let created = {
        let adapter = SqliteAdapter::open(&path).unwrap();
        adapter.execute_batch(SCHEMA_SQL).unwrap();
        let repo: Repository<User> = Repository::new(Arc::clone(&mapping), Arc::new(adapter));
        repo.create(&User::new("Ada", 30)).unwrap()
    };

    let reopened: Repository<User> =
        Repository::new(mapping, Arc::new(SqliteAdapter::open(&path).unwrap()));
    assert_eq!(reopened.all().unwrap(), vec![created]);
}

#[test]
fn values_are_stored_in_primitive_form() {
    let adapter = Arc::new(common::sqlite_adapter());
    let repo = ArticleRepository::new(compiled_mapping(), adapter.clone());
    let stored = repo
        .records()
        .create(&article(7, "stamped", Some("published"), Some(2)))
        .unwrap();

    let (headline, published_at): (String, String) = adapter
        .with_connection(|conn| {
            conn.query_row(
                "SELECT headline, published_at FROM articles WHERE id = ?1",
                [stored.id.unwrap()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
        })
        .unwrap();

    assert_eq!(headline, "stamped");
    assert_eq!(published_at, "2024-03-02T12:00:00.000000000Z");
}

#[test]
fn statement_uses_mapped_columns_and_dumped_params() {
    let repo = ArticleRepository::new(compiled_mapping(), Arc::new(common::sqlite_adapter()));

    let statement = repo
        .scope()
        .unwrap()
        .where_gte("published_at", at(1))
        .desc("title")
        .limit(3)
        .to_statement()
        .unwrap();

    assert_eq!(
        statement.text,
        "SELECT \"id\", \"author_id\", \"headline\", \"status\", \"published_at\", \"comments_count\" \
         FROM \"articles\" WHERE \"published_at\" >= ? ORDER BY \"headline\" DESC, \"id\" ASC LIMIT ?"
    );
    assert_eq!(
        statement.params,
        vec![
            Value::from("2024-03-01T12:00:00.000000000Z"),
            Value::Integer(3)
        ]
    );
}

#[test]
fn aggregates_respect_the_query_window() {
    let repo = ArticleRepository::new(compiled_mapping(), Arc::new(common::sqlite_adapter()));
    seed_articles(&repo);

    let top_two = repo
        .published_query()
        .unwrap()
        .desc("comments_count")
        .limit(2);

    assert_eq!(top_two.count().unwrap(), 2);
    assert_eq!(top_two.sum("comments_count").unwrap(), Value::Integer(130));
    assert_eq!(top_two.min("published_at").unwrap(), Value::Timestamp(at(4)));
}

#[test]
fn explicit_ids_are_kept_on_insert() {
    let mapping = compiled_mapping();
    let adapter: Arc<dyn Adapter> = Arc::new(common::sqlite_adapter());
    let repo: Repository<User> = Repository::new(mapping, adapter);

    let imported = User {
        id: Some(500),
        ..User::new("Imported", 60)
    };
    let created = repo.create(&imported).unwrap();
    let next = repo.create(&User::new("Ada", 30)).unwrap();

    assert_eq!(created.id, Some(500));
    assert_eq!(next.id, Some(501));
    assert!(matches!(
        repo.create(&imported),
        Err(ModelError::DuplicateIdentity { id: 500, .. })
    ));
}

#[test]
fn missing_tables_surface_as_sqlite_errors() {
    let repo: Repository<User> = Repository::new(
        compiled_mapping(),
        Arc::new(SqliteAdapter::open_in_memory().unwrap()),
    );

    let err = repo.all().unwrap_err();
    assert_eq!(err.code(), "sqlite_error");
    assert!(repo.query(|q| q.where_eq("age", 1)).unwrap().count().is_err());
}
