mod common;

use common::{adapters, at, compiled_mapping, seed_articles, ArticleRepository, User};
use repokit_core::query::{Predicate, QueryOperation};
use repokit_core::repo::QueryBuilder;
use repokit_core::{Direction, MemoryAdapter, ModelError, PublicRepository, Repository, Value};
use std::sync::Arc;

fn article_repos() -> Vec<ArticleRepository> {
    let mapping = compiled_mapping();
    adapters()
        .into_iter()
        .map(|adapter| ArticleRepository::new(Arc::clone(&mapping), adapter))
        .collect()
}

fn user_repos() -> Vec<Repository<User>> {
    let mapping = compiled_mapping();
    adapters()
        .into_iter()
        .map(|adapter| Repository::new(Arc::clone(&mapping), adapter))
        .collect()
}

fn titles(articles: &[common::Article]) -> Vec<&str> {
    articles.iter().map(|item| item.title.as_str()).collect()
}

#[test]
fn latest_article_by_author_respects_filter_order_and_limit() {
    for repo in article_repos() {
        seed_articles(&repo);

        let latest = repo.latest_by(1).unwrap().unwrap();
        assert_eq!(latest.title, "second");
        assert_eq!(latest.published_at, Some(at(4)));

        assert!(repo.latest_by(42).unwrap().is_none());
    }
}

#[test]
fn exclude_is_the_exact_complement_including_nulls() {
    for repo in article_repos() {
        seed_articles(&repo);

        let published = repo.published_query().unwrap();
        let rest = repo
            .scope()
            .unwrap()
            .exclude(&published)
            .asc("id")
            .to_vec()
            .unwrap();

        assert_eq!(rest, repo.drafts().unwrap());
        assert_eq!(titles(&rest), vec!["draft", "untitled"]);
        assert_eq!(
            rest.len() + repo.published().unwrap().len(),
            repo.records().count().unwrap() as usize
        );
    }
}

#[test]
fn rank_orders_published_by_comment_count() {
    for repo in article_repos() {
        seed_articles(&repo);

        let ranked = repo.rank().unwrap();
        assert_eq!(titles(&ranked), vec!["other author", "second", "first"]);
    }
}

#[test]
fn earlier_ordering_keys_take_priority() {
    for repo in user_repos() {
        for (name, age) in [("Ada", 30), ("Grace", 30), ("Linus", 28), ("Alan", 41)] {
            repo.create(&User::new(name, age)).unwrap();
        }

        let by_age_then_name = repo
            .query(|q| q.asc("age").desc("name"))
            .unwrap()
            .pluck("name")
            .unwrap();
        assert_eq!(
            by_age_then_name,
            vec![
                Value::from("Linus"),
                Value::from("Grace"),
                Value::from("Ada"),
                Value::from("Alan"),
            ]
        );

        // Re-ordering an existing key flips its direction in place.
        let flipped = repo
            .query(|q| q.asc("age").desc("name").desc("age"))
            .unwrap()
            .pluck("name")
            .unwrap();
        assert_eq!(flipped.first(), Some(&Value::from("Alan")));
        assert_eq!(flipped.last(), Some(&Value::from("Linus")));
    }
}

#[test]
fn or_offset_and_in_compose() {
    for repo in user_repos() {
        for (name, age) in [("Ada", 30), ("Grace", 45), ("Linus", 28), ("Alan", 41)] {
            repo.create(&User::new(name, age)).unwrap();
        }

        let young = repo.query(|q| q.where_lt("age", 29)).unwrap();
        let either = repo
            .query(|q| q.where_eq("name", "Grace").or(&young).asc("age"))
            .unwrap()
            .pluck("name")
            .unwrap();
        assert_eq!(either, vec![Value::from("Linus"), Value::from("Grace")]);

        let paged = repo
            .query(|q| q.asc("id").offset(1).limit(2))
            .unwrap()
            .pluck("name")
            .unwrap();
        assert_eq!(paged, vec![Value::from("Grace"), Value::from("Linus")]);

        let skipped = repo.query(|q| q.asc("id").offset(3)).unwrap().to_vec().unwrap();
        assert_eq!(skipped.len(), 1);
        assert_eq!(skipped[0].name, "Alan");

        let picked = repo
            .query(|q| q.where_in("name", ["Ada", "Alan"]))
            .unwrap()
            .count()
            .unwrap();
        assert_eq!(picked, 2);

        let none = repo
            .query(|q| q.where_in("name", Vec::<&str>::new()))
            .unwrap()
            .count()
            .unwrap();
        assert_eq!(none, 0);
    }
}

#[test]
fn composing_a_query_does_not_touch_storage() {
    for repo in user_repos() {
        let pending = repo.query(|q| q.where_eq("name", "Ada")).unwrap();
        repo.create(&User::new("Ada", 30)).unwrap();

        assert_eq!(pending.count().unwrap(), 1);
        repo.create(&User::new("Ada", 31)).unwrap();
        assert_eq!(pending.count().unwrap(), 2);
    }
}

#[test]
fn aggregates_over_matching_records() {
    for repo in user_repos() {
        let everyone = repo.scope().unwrap();
        assert_eq!(everyone.count().unwrap(), 0);
        assert_eq!(everyone.sum("age").unwrap(), Value::Null);
        assert_eq!(everyone.max("age").unwrap(), Value::Null);

        for (name, age) in [("Ada", 30), ("Grace", 45), ("Linus", 28)] {
            repo.create(&User::new(name, age)).unwrap();
        }

        assert_eq!(everyone.sum("age").unwrap(), Value::Integer(103));
        assert_eq!(everyone.min("age").unwrap(), Value::Integer(28));
        assert_eq!(everyone.max("name").unwrap(), Value::from("Linus"));

        let over_29 = repo.query(|q| q.where_gt("age", 29)).unwrap();
        assert_eq!(over_29.count().unwrap(), 2);
        assert_eq!(over_29.average("age").unwrap(), Value::Float(37.5));
        assert!(over_29.exists().unwrap());
        assert!(!repo
            .query(|q| q.where_gt("age", 100))
            .unwrap()
            .exists()
            .unwrap());
    }
}

#[test]
fn last_of_a_windowed_query_stays_inside_the_window() {
    for repo in user_repos() {
        for (name, age) in [("Ada", 30), ("Grace", 45), ("Linus", 28)] {
            repo.create(&User::new(name, age)).unwrap();
        }

        let window = repo.query(|q| q.asc("age").limit(2)).unwrap();
        assert_eq!(window.last().unwrap().unwrap().name, "Ada");

        let ordered = repo.query(|q| q.desc("age")).unwrap();
        assert_eq!(ordered.first().unwrap().unwrap().name, "Grace");
        assert_eq!(ordered.last().unwrap().unwrap().name, "Linus");
    }
}

#[test]
fn ties_on_every_key_keep_insertion_order_at_both_ends() {
    for repo in user_repos() {
        for (name, age) in [("Ada", 30), ("Grace", 30), ("Linus", 28)] {
            repo.create(&User::new(name, age)).unwrap();
        }

        let by_age = repo.query(|q| q.asc("age")).unwrap();
        let names: Vec<String> = by_age
            .to_vec()
            .unwrap()
            .into_iter()
            .map(|user| user.name)
            .collect();
        assert_eq!(names, vec!["Linus", "Ada", "Grace"]);
        assert_eq!(
            by_age.last().unwrap(),
            by_age.to_vec().unwrap().pop()
        );

        let oldest_first = repo.query(|q| q.desc("age")).unwrap();
        assert_eq!(oldest_first.first().unwrap().unwrap().name, "Ada");
        assert_eq!(oldest_first.last().unwrap().unwrap().name, "Linus");
        assert_eq!(
            oldest_first.first().unwrap(),
            oldest_first.to_vec().unwrap().into_iter().next()
        );
    }
}

#[test]
fn timestamp_filters_compare_chronologically() {
    for repo in article_repos() {
        seed_articles(&repo);

        let recent = repo
            .scope()
            .unwrap()
            .where_gte("published_at", at(4))
            .asc("published_at")
            .to_vec()
            .unwrap();
        assert_eq!(titles(&recent), vec!["second", "other author"]);
    }
}

#[test]
fn like_is_reported_unsupported_by_the_memory_adapter() {
    let repo: Repository<User> =
        Repository::new(compiled_mapping(), Arc::new(MemoryAdapter::new()));
    repo.create(&User::new("Ada", 30)).unwrap();

    let err = repo
        .query(|q| q.where_like("name", "A%"))
        .unwrap()
        .to_vec()
        .unwrap_err();
    assert!(matches!(
        err,
        ModelError::UnsupportedQueryOperation {
            adapter: "memory",
            operation: QueryOperation::Like,
        }
    ));
}

#[test]
fn like_matches_patterns_on_sqlite() {
    let repo: Repository<User> =
        Repository::new(compiled_mapping(), Arc::new(common::sqlite_adapter()));
    for (name, age) in [("Ada", 30), ("Alan", 41), ("Grace", 45)] {
        repo.create(&User::new(name, age)).unwrap();
    }

    let names = repo
        .query(|q| q.where_like("name", "A%").asc("name"))
        .unwrap()
        .pluck("name")
        .unwrap();
    assert_eq!(names, vec![Value::from("Ada"), Value::from("Alan")]);
}

#[test]
fn unknown_attributes_fail_at_execution() {
    for repo in user_repos() {
        let query = repo.query(|q| q.where_eq("nickname", "ada")).unwrap();
        assert!(matches!(
            query.to_vec(),
            Err(ModelError::UnmappedAttribute { .. })
        ));

        let ordered = repo.query(|q| q.order("nickname", Direction::Asc)).unwrap();
        assert!(matches!(
            ordered.to_vec(),
            Err(ModelError::UnmappedAttribute { .. })
        ));
    }
}

#[test]
fn values_that_cannot_coerce_fail_before_storage() {
    for repo in user_repos() {
        let query = repo.query(|q| q.where_eq("age", "thirty")).unwrap();
        assert!(matches!(query.to_vec(), Err(ModelError::Coercion { .. })));
    }
}

#[test]
fn raw_predicates_compose_with_helpers() {
    for repo in article_repos() {
        let seeded = seed_articles(&repo);

        let unstamped = repo
            .scope()
            .unwrap()
            .filter(Predicate::IsNull {
                field: "published_at".to_string(),
            })
            .where_eq("author_id", 3)
            .to_vec()
            .unwrap();
        assert_eq!(unstamped, vec![seeded[4].clone()]);
    }
}
