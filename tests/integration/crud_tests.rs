use crate::common::*;
use crate::db_matrix_test;
use plp_bookstore::query::{Comparator, FieldCriterion, FilterExpression};
use plp_bookstore::{Book, BookField, BookQueries, StoreError};
use serde_json::json;

db_matrix_test!(test_update_then_delete_scenario, |setup| {
    let store = setup();
    run_async(async {
        // GIVEN 1984, Animal Farm and Dune
        let queries = seeded(store, &scenario_books()).await;

        // WHEN 1984 is repriced
        let outcome = queries
            .update_one_field(
                FilterExpression::field(BookField::Title).eq("1984"),
                BookField::Price,
                12.49,
            )
            .await
            .expect("update failed");
        assert_eq!(outcome.matched, 1);
        assert_eq!(outcome.modified, 1);

        // THEN the new price reads back
        let found = queries
            .find_by_field(BookField::Title, FieldCriterion::Equals(json!("1984")))
            .await
            .expect("find failed");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].price, Some(12.49));

        // WHEN Animal Farm is deleted
        let deleted = queries
            .delete_one(FilterExpression::field(BookField::Title).eq("Animal Farm"))
            .await
            .expect("delete failed");
        assert_eq!(deleted.deleted, 1);

        // THEN two books remain
        let remaining = queries.count(FilterExpression::all()).await.unwrap();
        assert_eq!(remaining, 2);
        let titles = titles(&queries.find(FilterExpression::all()).await.unwrap());
        assert_eq!(titles, vec!["1984".to_string(), "Dune".to_string()]);
    });
});

db_matrix_test!(test_find_by_field_equality_and_range, |setup| {
    let store = setup();
    run_async(async {
        let queries = seeded(store, &catalogue_books()).await;

        let fiction = queries
            .find_by_field(BookField::Genre, FieldCriterion::Equals(json!("Fiction")))
            .await
            .unwrap();
        assert_eq!(fiction.len(), 5);
        assert!(fiction.iter().all(|b| b.genre.as_deref() == Some("Fiction")));

        let recent = queries
            .find_by_field(
                BookField::PublishedYear,
                FieldCriterion::Compare(Comparator::Gt, json!(2000)),
            )
            .await
            .unwrap();
        assert_eq!(
            titles(&recent),
            vec!["Klara and the Sun", "Project Hail Mary", "The Midnight Library"]
        );

        let orwell = queries
            .find_by_field_name("author", FieldCriterion::Equals(json!("George Orwell")))
            .await
            .unwrap();
        assert_eq!(titles(&orwell), vec!["1984", "Animal Farm"]);

        let nothing = queries
            .find_by_field(BookField::Author, FieldCriterion::Equals(json!("Nobody")))
            .await
            .unwrap();
        assert!(nothing.is_empty());
    });
});

db_matrix_test!(test_every_filter_returns_exactly_matching_documents, |setup| {
    let store = setup();
    run_async(async {
        let books = catalogue_books();
        let queries = seeded(store, &books).await;

        let cases: Vec<(FilterExpression, Box<dyn Fn(&Book) -> bool>)> = vec![
            (
                FilterExpression::field(BookField::Price).lte(10.99),
                Box::new(|b: &Book| b.price.unwrap_or_default() <= 10.99),
            ),
            (
                FilterExpression::field(BookField::PublishedYear).lt(1940),
                Box::new(|b: &Book| b.published_year.unwrap_or_default() < 1940),
            ),
            (
                FilterExpression::field(BookField::InStock).ne(true),
                Box::new(|b: &Book| b.in_stock != Some(true)),
            ),
            (
                FilterExpression::field(BookField::PublishedYear).gte(1950),
                Box::new(|b: &Book| b.published_year.unwrap_or_default() >= 1950),
            ),
        ];
        for (filter, predicate) in cases {
            let found = queries.find(filter.clone()).await.unwrap();
            let expected: Vec<_> = books.iter().filter(|b| predicate(b)).cloned().collect();
            assert_eq!(titles(&found), titles(&expected), "filter {:?}", filter);
        }
    });
});

db_matrix_test!(test_delete_without_match_is_noop, |setup| {
    let store = setup();
    run_async(async {
        let queries = seeded(store, &scenario_books()).await;
        let outcome = queries
            .delete_one(FilterExpression::field(BookField::Title).eq("Missing Book"))
            .await
            .expect("a non-matching delete is not an error");
        assert_eq!(outcome.deleted, 0);
        assert_eq!(queries.count(FilterExpression::all()).await.unwrap(), 3);
    });
});

db_matrix_test!(test_delete_removes_only_one_of_many_matches, |setup| {
    let store = setup();
    run_async(async {
        let queries = seeded(store, &scenario_books()).await;
        let by_orwell = FilterExpression::field(BookField::Author).eq("George Orwell");
        let outcome = queries.delete_one(by_orwell.clone()).await.unwrap();
        assert_eq!(outcome.deleted, 1);
        assert_eq!(queries.count(by_orwell).await.unwrap(), 1);
    });
});

db_matrix_test!(test_update_without_match_is_not_found, |setup| {
    let store = setup();
    run_async(async {
        let queries = seeded(store, &scenario_books()).await;
        let err = queries
            .update_one_field(
                FilterExpression::field(BookField::Title).eq("Missing Book"),
                BookField::Price,
                1.0,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }), "got {:?}", err);
    });
});

db_matrix_test!(test_update_to_same_value_matches_without_modifying, |setup| {
    let store = setup();
    run_async(async {
        let queries = seeded(store, &scenario_books()).await;
        let outcome = queries
            .update_one_field(
                FilterExpression::field(BookField::Title).eq("Dune"),
                BookField::InStock,
                true,
            )
            .await
            .unwrap();
        assert_eq!(outcome.matched, 1);
        assert_eq!(outcome.modified, 0);
    });
});

db_matrix_test!(test_insert_returns_one_key_per_book, |setup| {
    let store = setup();
    run_async(async {
        let queries = seeded(store, &[]).await;
        let keys = queries.insert_books(&scenario_books()).await.unwrap();
        assert_eq!(keys.len(), 3);
        let found = queries
            .find(FilterExpression::key_eq(keys[2].clone()))
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].title.as_deref(), Some("Dune"));
        assert_eq!(found[0].key.as_deref(), Some(keys[2].as_str()));
    });
});

db_matrix_test!(test_create_collection_is_idempotent, |setup| {
    let store = setup();
    run_async(async {
        let queries = seeded(store, &scenario_books()).await;
        queries.create_collection().await.expect("second create failed");
        assert_eq!(queries.count(FilterExpression::all()).await.unwrap(), 3);
    });
});

db_matrix_test!(test_created_collection_is_listed, |setup| {
    let store = setup();
    run_async(async {
        let queries = BookQueries::new(store, TEST_COLLECTION);
        // GIVEN an empty database
        assert!(queries.list_collections().await.unwrap().is_empty());

        // WHEN the collection is created twice
        queries.create_collection().await.unwrap();
        queries.create_collection().await.unwrap();

        // THEN it is listed exactly once
        assert_eq!(queries.list_collections().await.unwrap(), vec![TEST_COLLECTION.to_string()]);
    });
});
