mod common;

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use store::{
    NewResearchQuery, NewResearchResult, PoolSettings, QueryFilter, QueryStatus, StoreError,
};

use common::migrated;

#[tokio::test]
async fn entities_round_trip_through_separate_sessions() {
    let (_dir, db) = migrated(PoolSettings::default()).await;

    let new = NewResearchQuery::new("What is LangGraph?").unwrap();
    let (query, result) = db
        .session(|s| {
            Box::pin(async move {
                let query = s.create_query(&new).await?;
                let result = s
                    .add_result(
                        &NewResearchResult::new(query.id, "LangGraph overview", "A library for...")
                            .source_url("https://langchain-ai.github.io/langgraph/")
                            .relevance(0.95),
                    )
                    .await?;
                Ok((query, result))
            })
        })
        .await
        .unwrap();

    let query_id = query.id;
    let result_id = result.id;
    let (loaded_query, loaded_results, loaded_result) = db
        .session(move |s| {
            Box::pin(async move {
                Ok((
                    s.get_query(query_id).await?,
                    s.results_for_query(query_id).await?,
                    s.get_result(result_id).await?,
                ))
            })
        })
        .await
        .unwrap();

    assert_eq!(loaded_query, Some(query));
    assert_eq!(loaded_results, vec![result.clone()]);
    assert_eq!(loaded_result, Some(result));
}

#[tokio::test]
async fn failing_session_leaves_no_partial_writes() {
    let (_dir, db) = migrated(PoolSettings::default()).await;

    let new = NewResearchQuery::new("orphaned").unwrap();
    let err = db
        .session(|s| {
            Box::pin(async move {
                s.create_query(&new).await?;
                s.add_result(&NewResearchResult::new(9_999, "dangling", ""))
                    .await?;
                Ok(())
            })
        })
        .await
        .unwrap_err();
    assert!(err.is_foreign_key_violation(), "unexpected error: {err}");

    let remaining = db
        .session(|s| Box::pin(async move { s.list_queries(&QueryFilter::default()).await }))
        .await
        .unwrap();
    assert!(remaining.is_empty());
}

#[tokio::test]
async fn result_for_unknown_query_is_a_foreign_key_violation() {
    let (_dir, db) = migrated(PoolSettings::default()).await;

    let mut session = db.begin().await.unwrap();
    let err = session
        .add_result(&NewResearchResult::new(42, "nowhere", "content"))
        .await
        .unwrap_err();

    assert!(matches!(err, StoreError::ForeignKeyViolation(_)));
}

#[tokio::test]
async fn invalid_result_is_rejected_before_reaching_the_database() {
    let (_dir, db) = migrated(PoolSettings::default()).await;

    let mut session = db.begin().await.unwrap();
    let err = session
        .add_result(&NewResearchResult::new(1, "scored", "").relevance(2.0))
        .await
        .unwrap_err();

    assert!(matches!(err, StoreError::Validation(_)));
}

#[tokio::test]
async fn status_update_is_visible_to_later_sessions() {
    let (_dir, db) = migrated(PoolSettings::default()).await;

    let new = NewResearchQuery::new("What is LangGraph?").unwrap();
    let created = db
        .session(|s| Box::pin(async move { s.create_query(&new).await }))
        .await
        .unwrap();
    assert_eq!(created.status, QueryStatus::Pending);

    tokio::time::sleep(Duration::from_millis(10)).await;

    let id = created.id;
    db.session(move |s| {
        Box::pin(async move { s.set_query_status(id, QueryStatus::Completed).await })
    })
    .await
    .unwrap();

    let loaded = db
        .session(move |s| Box::pin(async move { s.get_query(id).await }))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(loaded.status, QueryStatus::Completed);
    assert!(loaded.updated_at > loaded.created_at);
    assert_eq!(loaded.created_at, created.created_at);
}

#[tokio::test]
async fn status_update_for_missing_query_is_not_found() {
    let (_dir, db) = migrated(PoolSettings::default()).await;

    let err = db
        .session(|s| Box::pin(async move { s.set_query_status(7, QueryStatus::Failed).await }))
        .await
        .unwrap_err();

    assert!(matches!(err, StoreError::NotFound { id: 7, .. }));
}

#[tokio::test]
async fn sessions_beyond_capacity_wait_for_a_release() {
    let pool = PoolSettings {
        pool_size: 1,
        max_overflow: 1,
        acquire_timeout_secs: 5,
        ..PoolSettings::default()
    };
    let (_dir, db) = migrated(pool).await;
    let db = Arc::new(db);

    let first = db.begin().await.unwrap();
    let _second = db.begin().await.unwrap();

    let waiting = {
        let db = Arc::clone(&db);
        tokio::spawn(async move { db.begin().await.map(|_| ()) })
    };

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!waiting.is_finished());

    first.rollback().await.unwrap();

    tokio::time::timeout(Duration::from_secs(2), waiting)
        .await
        .expect("third session should acquire the released connection")
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn list_filters_by_status_newest_first() {
    let (_dir, db) = migrated(PoolSettings::default()).await;

    let ids = db
        .session(|s| {
            Box::pin(async move {
                let mut ids = Vec::new();
                for text in ["first", "second", "third"] {
                    ids.push(s.create_query(&NewResearchQuery::new(text)?).await?.id);
                }
                s.set_query_status(ids[1], QueryStatus::Failed).await?;
                Ok(ids)
            })
        })
        .await
        .unwrap();

    let (all, failed, limited) = db
        .session(|s| {
            Box::pin(async move {
                let all = s.list_queries(&QueryFilter::default()).await?;
                let failed = s
                    .list_queries(&QueryFilter {
                        status: Some(QueryStatus::Failed),
                        limit: None,
                    })
                    .await?;
                let limited = s
                    .list_queries(&QueryFilter {
                        status: None,
                        limit: Some(1),
                    })
                    .await?;
                Ok((all, failed, limited))
            })
        })
        .await
        .unwrap();

    let all_ids: Vec<i64> = all.iter().map(|q| q.id).collect();
    assert_eq!(all_ids, vec![ids[2], ids[1], ids[0]]);
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].query, "second");
    assert_eq!(limited.len(), 1);
    assert_eq!(limited[0].id, ids[2]);
}

#[tokio::test]
async fn results_order_by_relevance_with_unscored_last() {
    let (_dir, db) = migrated(PoolSettings::default()).await;

    let titles = db
        .session(|s| {
            Box::pin(async move {
                let query = s.create_query(&NewResearchQuery::new("ordering")?).await?;
                s.add_results(&[
                    NewResearchResult::new(query.id, "report", "summary"),
                    NewResearchResult::new(query.id, "low", "").relevance(0.2),
                    NewResearchResult::new(query.id, "high", "").relevance(0.9),
                ])
                .await?;
                let results = s.results_for_query(query.id).await?;
                Ok(results.into_iter().map(|r| r.title).collect::<Vec<_>>())
            })
        })
        .await
        .unwrap();

    assert_eq!(titles, vec!["high", "low", "report"]);
}

#[tokio::test]
async fn delete_removes_query_and_results() {
    let (_dir, db) = migrated(PoolSettings::default()).await;

    let id = db
        .session(|s| {
            Box::pin(async move {
                let query = s.create_query(&NewResearchQuery::new("to delete")?).await?;
                s.add_result(&NewResearchResult::new(query.id, "hit", "")).await?;
                Ok(query.id)
            })
        })
        .await
        .unwrap();

    let (deleted, again, results) = db
        .session(move |s| {
            Box::pin(async move {
                let deleted = s.delete_query(id).await?;
                let again = s.delete_query(id).await?;
                let results = s.results_for_query(id).await?;
                Ok((deleted, again, results))
            })
        })
        .await
        .unwrap();

    assert!(deleted);
    assert!(!again);
    assert!(results.is_empty());
}

#[tokio::test]
async fn dropped_session_rolls_back() {
    let (_dir, db) = migrated(PoolSettings::default()).await;

    {
        let mut session = db.begin().await.unwrap();
        session
            .create_query(&NewResearchQuery::new("never committed").unwrap())
            .await
            .unwrap();
    }

    let all = db
        .session(|s| Box::pin(async move { s.list_queries(&QueryFilter::default()).await }))
        .await
        .unwrap();
    assert!(all.is_empty());
}
