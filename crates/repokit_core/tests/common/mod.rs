#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use repokit_core::repo::QueryBuilder;
use repokit_core::{
    Adapter, AttributeType, Attributes, Direction, Entity, EntityId, Mapping, MemoryAdapter,
    ModelResult, PublicRepository, Query, Repository, SqliteAdapter,
};
use std::sync::Arc;

pub const SCHEMA_SQL: &str = "
CREATE TABLE users (
    id INTEGER PRIMARY KEY,
    name TEXT,
    age INTEGER
);
CREATE TABLE articles (
    id INTEGER PRIMARY KEY,
    author_id INTEGER,
    headline TEXT,
    status TEXT,
    published_at TEXT,
    comments_count INTEGER
);";

#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: Option<EntityId>,
    pub name: String,
    pub age: Option<i64>,
}

impl User {
    pub fn new(name: &str, age: i64) -> Self {
        Self {
            id: None,
            name: name.to_string(),
            age: Some(age),
        }
    }
}

impl Entity for User {
    fn id(&self) -> Option<EntityId> {
        self.id
    }

    fn with_id(&self, id: EntityId) -> Self {
        Self {
            id: Some(id),
            ..self.clone()
        }
    }

    fn to_attributes(&self) -> Attributes {
        Attributes::new()
            .with("name", self.name.as_str())
            .with("age", self.age)
    }

    fn from_attributes(attributes: Attributes) -> ModelResult<Self> {
        Ok(Self {
            id: attributes.id()?,
            name: attributes.text("name")?.unwrap_or_default(),
            age: attributes.integer("age")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Article {
    pub id: Option<EntityId>,
    pub author_id: i64,
    pub title: String,
    pub status: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub comments_count: i64,
}

impl Entity for Article {
    fn id(&self) -> Option<EntityId> {
        self.id
    }

    fn with_id(&self, id: EntityId) -> Self {
        Self {
            id: Some(id),
            ..self.clone()
        }
    }

    fn to_attributes(&self) -> Attributes {
        Attributes::new()
            .with("author_id", self.author_id)
            .with("title", self.title.as_str())
            .with("status", self.status.clone())
            .with("published_at", self.published_at)
            .with("comments_count", self.comments_count)
    }

    fn from_attributes(attributes: Attributes) -> ModelResult<Self> {
        Ok(Self {
            id: attributes.id()?,
            author_id: attributes.integer("author_id")?.unwrap_or_default(),
            title: attributes.text("title")?.unwrap_or_default(),
            status: attributes.text("status")?,
            published_at: attributes.timestamp("published_at")?,
            comments_count: attributes.integer("comments_count")?.unwrap_or_default(),
        })
    }
}

pub fn declare(mapping: &Mapping) {
    mapping
        .collection("users", |c| {
            c.entity::<User>()
                .attribute("name", AttributeType::String)
                .attribute("age", AttributeType::Integer)
        })
        .expect("users declaration should succeed");
    mapping
        .collection("articles", |c| {
            c.entity::<Article>()
                .attribute("author_id", AttributeType::Integer)
                .attribute_column("title", AttributeType::String, "headline")
                .attribute("status", AttributeType::String)
                .attribute("published_at", AttributeType::DateTime)
                .attribute("comments_count", AttributeType::Integer)
        })
        .expect("articles declaration should succeed");
}

pub fn compiled_mapping() -> Arc<Mapping> {
    let mapping = Mapping::new();
    declare(&mapping);
    mapping.compile().expect("mapping should compile");
    Arc::new(mapping)
}

pub fn sqlite_adapter() -> SqliteAdapter {
    let adapter = SqliteAdapter::open_in_memory().expect("sqlite should open");
    adapter
        .execute_batch(SCHEMA_SQL)
        .expect("schema should apply");
    adapter
}

/// One instance of each bundled adapter, ready for the fixture schema.
pub fn adapters() -> Vec<Arc<dyn Adapter>> {
    vec![Arc::new(MemoryAdapter::new()), Arc::new(sqlite_adapter())]
}

pub fn at(day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, day, 12, 0, 0).unwrap()
}

pub fn article(author_id: i64, title: &str, status: Option<&str>, day: Option<u32>) -> Article {
    Article {
        id: None,
        author_id,
        title: title.to_string(),
        status: status.map(str::to_string),
        published_at: day.map(at),
        comments_count: i64::from(day.unwrap_or(0)) * 10,
    }
}

/// Domain repository exposing named finders only.
pub struct ArticleRepository {
    inner: Repository<Article>,
}

impl ArticleRepository {
    pub fn new(mapping: Arc<Mapping>, adapter: Arc<dyn Adapter>) -> Self {
        Self {
            inner: Repository::new(mapping, adapter),
        }
    }

    pub fn records(&self) -> &impl PublicRepository<Article> {
        &self.inner
    }

    pub fn published(&self) -> ModelResult<Vec<Article>> {
        self.published_query()?.to_vec()
    }

    /// Anything not published, including articles without a status.
    pub fn drafts(&self) -> ModelResult<Vec<Article>> {
        let unset = self.inner.query(|q| q.where_null("status"))?;
        self.inner
            .query(|q| q.where_not_eq("status", "published").or(&unset))?
            .asc("id")
            .to_vec()
    }

    /// Published articles, most commented first.
    pub fn rank(&self) -> ModelResult<Vec<Article>> {
        self.published_query()?.desc("comments_count").to_vec()
    }

    pub fn latest_by(&self, author_id: i64) -> ModelResult<Option<Article>> {
        self.inner
            .query(|q| {
                q.where_eq("author_id", author_id)
                    .order("published_at", Direction::Desc)
                    .limit(1)
            })?
            .to_vec()
            .map(|mut found| found.pop())
    }

    pub fn published_query(&self) -> ModelResult<Query<Article>> {
        self.inner.query(|q| q.where_eq("status", "published"))
    }

    pub fn scope(&self) -> ModelResult<Query<Article>> {
        self.inner.scope()
    }
}

pub fn seed_articles(repo: &ArticleRepository) -> Vec<Article> {
    [
        article(1, "first", Some("published"), Some(1)),
        article(1, "second", Some("published"), Some(4)),
        article(2, "other author", Some("published"), Some(9)),
        article(1, "draft", Some("draft"), None),
        article(3, "untitled", None, None),
    ]
    .iter()
    .map(|item| repo.records().create(item).expect("seed create should succeed"))
    .collect()
}
