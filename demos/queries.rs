//! Runs every bookstore task end to end: seeding, CRUD, advanced queries,
//! aggregations, indexes and explain.
//!
//! ```text
//! PLP_BOOKSTORE_BACKEND=arango ARANGO_PASSWORD=... cargo run --example queries
//! ```

use anyhow::{Context, Result};
use plp_bookstore::prelude::*;
use serde_json::json;
use tracing::info;

fn seed_books() -> Vec<Book> {
    vec![
        Book::new("To Kill a Mockingbird", "Harper Lee", "Fiction", 1960, 12.99, true),
        Book::new("1984", "George Orwell", "Dystopian", 1949, 10.99, true),
        Book::new("The Great Gatsby", "F. Scott Fitzgerald", "Fiction", 1925, 9.99, true),
        Book::new("Brave New World", "Aldous Huxley", "Dystopian", 1932, 11.50, false),
        Book::new("The Hobbit", "J.R.R. Tolkien", "Fantasy", 1937, 14.99, true),
        Book::new("The Catcher in the Rye", "J.D. Salinger", "Fiction", 1951, 8.99, false),
        Book::new("Pride and Prejudice", "Jane Austen", "Romance", 1813, 7.99, true),
        Book::new("The Lord of the Rings", "J.R.R. Tolkien", "Fantasy", 1954, 19.99, true),
        Book::new("Animal Farm", "George Orwell", "Political Satire", 1945, 8.50, false),
        Book::new("The Alchemist", "Paulo Coelho", "Fiction", 1988, 10.99, true),
        Book::new("The Midnight Library", "Matt Haig", "Fiction", 2020, 13.99, true),
        Book::new("Project Hail Mary", "Andy Weir", "Science Fiction", 2021, 16.99, true),
    ]
}

fn titles(books: &[Book]) -> Vec<&str> {
    books.iter().filter_map(|b| b.title.as_deref()).collect()
}

async fn crud(queries: &BookQueries) -> Result<()> {
    let fiction = queries
        .find_by_field(BookField::Genre, FieldCriterion::Equals(json!("Fiction")))
        .await?;
    info!("fiction: {:?}", titles(&fiction));

    let recent = queries
        .find_by_field(
            BookField::PublishedYear,
            FieldCriterion::Compare(Comparator::Gt, json!(2000)),
        )
        .await?;
    info!("published after 2000: {:?}", titles(&recent));

    let orwell = queries
        .find_by_field_name("author", FieldCriterion::Equals(json!("George Orwell")))
        .await?;
    info!("by George Orwell: {:?}", titles(&orwell));

    let updated = queries
        .update_one_field(
            FilterExpression::field(BookField::Title).eq("1984"),
            BookField::Price,
            12.49,
        )
        .await?;
    info!("updated 1984: {:?}", updated);

    let deleted = queries
        .delete_one(FilterExpression::field(BookField::Title).eq("Animal Farm"))
        .await?;
    info!("deleted Animal Farm: {:?}", deleted);
    Ok(())
}

async fn advanced(queries: &BookQueries) -> Result<()> {
    let in_stock_recent = queries
        .find(
            FilterExpression::field(BookField::InStock)
                .eq(true)
                .and(FilterExpression::field(BookField::PublishedYear).gt(2010)),
        )
        .await?;
    info!("in stock and after 2010: {:?}", titles(&in_stock_recent));

    let projected = queries
        .project(
            FilterExpression::all(),
            &[BookField::Title, BookField::Author, BookField::Price],
        )
        .await?;
    info!("projection: {}", serde_json::to_string(&projected)?);

    for direction in [SortDirection::Ascending, SortDirection::Descending] {
        let sorted = queries
            .sorted(FilterExpression::all(), BookField::Price, direction)
            .await?;
        info!("by price {:?}: {:?}", direction, titles(&sorted));
    }

    for page in 0..2 {
        let books = queries
            .sort_and_paginate(
                FilterExpression::all(),
                BookField::Title,
                SortDirection::Ascending,
                5,
                page,
            )
            .await?;
        info!("page {}: {:?}", page + 1, titles(&books));
    }
    Ok(())
}

async fn aggregations(queries: &BookQueries) -> Result<()> {
    info!(
        "average price by genre: {}",
        serde_json::to_string(&queries.average_price_by_genre().await?)?
    );
    info!(
        "most prolific author: {}",
        serde_json::to_string(&queries.most_prolific_author().await?)?
    );
    info!(
        "books by decade: {}",
        serde_json::to_string(&queries.books_by_decade().await?)?
    );
    Ok(())
}

async fn indexes(queries: &BookQueries) -> Result<()> {
    let by_title = ExplainTarget::Find(FindSpecification::new(
        FilterExpression::field(BookField::Title).eq("1984"),
    ));
    let before = queries.explain(by_title.clone()).await?;
    info!("explain before indexes: {}", before);

    info!("title index: {:?}", queries.title_index().await?);
    info!("author/year index: {:?}", queries.author_year_index().await?);

    let by_author_year = ExplainTarget::Find(FindSpecification::new(
        FilterExpression::field(BookField::Author)
            .eq("George Orwell")
            .and(FilterExpression::field(BookField::PublishedYear).eq(1949)),
    ));
    let after = queries.explain(by_author_year).await?;
    info!("explain with compound index: {}", after);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info");
    }
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = BookstoreConfig::from_env().context("invalid bookstore configuration")?;
    let session = StoreSession::open(&config)
        .await
        .with_context(|| format!("failed to open {} store", config.backend))?;
    let queries = session.queries();

    queries.create_collection().await?;
    let collections = queries.list_collections().await?;
    anyhow::ensure!(
        collections.iter().any(|c| c == queries.collection()),
        "collection '{}' missing after creation (found {:?})",
        queries.collection(),
        collections
    );
    info!("collections: {:?}", collections);
    queries.clear_collection().await?;
    let keys = queries.insert_books(&seed_books()).await?;
    info!("seeded {} books into '{}'", keys.len(), queries.collection());

    crud(&queries).await.context("CRUD queries failed")?;
    advanced(&queries).await.context("advanced queries failed")?;
    aggregations(&queries).await.context("aggregations failed")?;
    indexes(&queries).await.context("index tasks failed")?;

    info!("{} books remain", queries.count(FilterExpression::all()).await?);
    Ok(())
}
