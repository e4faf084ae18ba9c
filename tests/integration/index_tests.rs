use crate::common::*;
use crate::db_matrix_test;
use plp_bookstore::query::{FilterExpression, FindSpecification, IndexSpecification, SortDirection};
use plp_bookstore::{BookField, BookQueries, ExplainTarget, StoreError};
use serde_json::Value;
use std::sync::Arc;

/// Name of the index a reported plan uses, if any. Understands both the
/// memory report (`queryPlanner.winningPlan`) and an ArangoDB explain
/// (`plan.nodes[*]` of type `IndexNode`).
fn index_used(report: &Value) -> Option<String> {
    if let Some(plan) = report.pointer("/queryPlanner/winningPlan") {
        return match plan["stage"].as_str() {
            Some("IXSCAN") => plan["indexName"].as_str().map(str::to_string),
            _ => None,
        };
    }
    report
        .pointer("/plan/nodes")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter(|node| node["type"] == "IndexNode")
        .flat_map(|node| node["indexes"].as_array().cloned().unwrap_or_default())
        .filter_map(|index| index["name"].as_str().map(str::to_string))
        .next()
}

fn by_title(title: &str) -> ExplainTarget {
    ExplainTarget::Find(FindSpecification::new(
        FilterExpression::field(BookField::Title).eq(title),
    ))
}

db_matrix_test!(test_create_index_is_idempotent, |setup| {
    let store = setup();
    run_async(async {
        let queries = seeded(store, &catalogue_books()).await;

        let first = queries.title_index().await.unwrap();
        assert_eq!(first.name, "title_1");
        assert!(first.newly_created);

        let again = queries.title_index().await.unwrap();
        assert_eq!(again.name, "title_1");
        assert!(!again.newly_created);

        let compound = queries.author_year_index().await.unwrap();
        assert_eq!(compound.name, "author_1_published_year_-1");
        assert!(compound.newly_created);
    });
});

db_matrix_test!(test_explain_reports_index_once_declared, |setup| {
    let store = setup();
    run_async(async {
        let queries = seeded(store, &catalogue_books()).await;

        let before = queries.explain(by_title("1984")).await.unwrap();
        assert_eq!(index_used(&before), None, "report: {}", before);

        queries.title_index().await.unwrap();
        let after = queries.explain(by_title("1984")).await.unwrap();
        assert_eq!(index_used(&after).as_deref(), Some("title_1"), "report: {}", after);
    });
});

db_matrix_test!(test_explain_compound_index_for_author_and_year, |setup| {
    let store = setup();
    run_async(async {
        let queries = seeded(store, &catalogue_books()).await;
        queries.author_year_index().await.unwrap();
        let target = ExplainTarget::Find(FindSpecification::new(
            FilterExpression::field(BookField::Author)
                .eq("George Orwell")
                .and(FilterExpression::field(BookField::PublishedYear).eq(1949)),
        ));
        let report = queries.explain(target).await.unwrap();
        assert_eq!(
            index_used(&report).as_deref(),
            Some("author_1_published_year_-1"),
            "report: {}",
            report
        );
    });
});

db_matrix_test!(test_unique_index_rejects_duplicate_titles, |setup| {
    let store = setup();
    run_async(async {
        let queries = seeded(store, &scenario_books()).await;
        queries
            .create_index(
                IndexSpecification::on(BookField::Title, SortDirection::Ascending)
                    .named("unique_title")
                    .unique(),
            )
            .await
            .unwrap();
        let err = queries.insert_books(&scenario_books()[..1]).await.unwrap_err();
        assert!(matches!(err, StoreError::Store(_)), "got {:?}", err);
        assert_eq!(queries.count(FilterExpression::all()).await.unwrap(), 3);
    });
});

#[test]
fn test_explain_memory_report_counts_examined_documents() {
    let store = setup_backend(TestBackend::Memory);
    run_async(async {
        let queries = seeded(store, &catalogue_books()).await;
        let scan = queries.explain(by_title("1984")).await.unwrap();
        assert_eq!(scan["executionStats"]["totalDocsExamined"], 13);
        assert_eq!(scan["executionStats"]["nReturned"], 1);

        queries.title_index().await.unwrap();
        let seek = queries.explain(by_title("1984")).await.unwrap();
        assert_eq!(seek["executionStats"]["totalDocsExamined"], 1);
        assert_eq!(seek["executionStats"]["totalKeysExamined"], 1);
    });
}

#[test]
fn test_each_operation_is_one_store_call() {
    let counting = Arc::new(CountingStore::new(setup_backend(TestBackend::Memory)));
    let queries = BookQueries::new(counting.clone(), TEST_COLLECTION);
    run_async(async {
        queries.create_collection().await.unwrap();
        queries.insert_books(&scenario_books()).await.unwrap();
        assert_eq!(counting.calls(), 2);

        queries
            .sort_and_paginate(
                FilterExpression::all(),
                BookField::Price,
                SortDirection::Ascending,
                2,
                0,
            )
            .await
            .unwrap();
        queries.books_by_decade().await.unwrap();
        queries.title_index().await.unwrap();
        queries.explain(by_title("Dune")).await.unwrap();
        assert_eq!(counting.calls(), 6);

        // rejected before reaching the store
        let _ = queries
            .sort_and_paginate(
                FilterExpression::all(),
                BookField::Price,
                SortDirection::Ascending,
                0,
                0,
            )
            .await;
        assert_eq!(counting.calls(), 6);
    });
}
