use super::TEST_COLLECTION;
use plp_bookstore::{Book, BookQueries, DocumentStore};
use std::sync::Arc;

/// The three books of the update/delete scenario.
pub fn scenario_books() -> Vec<Book> {
    vec![
        Book::new("1984", "George Orwell", "Dystopian", 1949, 10.99, true),
        Book::new("Animal Farm", "George Orwell", "Political Satire", 1945, 8.50, false),
        Book::new("Dune", "Frank Herbert", "Science Fiction", 1965, 15.99, true),
    ]
}

/// A wider catalogue: several genres, shared authors, equal prices and
/// years on both sides of 2000 and 2010.
pub fn catalogue_books() -> Vec<Book> {
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
        Book::new("Klara and the Sun", "Kazuo Ishiguro", "Science Fiction", 2005, 12.99, false),
    ]
}

/// A runner over `store`, with the collection created and `books` inserted.
pub async fn seeded(store: Arc<dyn DocumentStore>, books: &[Book]) -> BookQueries {
    let queries = BookQueries::new(store, TEST_COLLECTION);
    queries
        .create_collection()
        .await
        .expect("Failed to create collection");
    queries.insert_books(books).await.expect("Failed to seed books");
    queries
}

pub fn titles(books: &[Book]) -> Vec<String> {
    let mut out: Vec<String> = books.iter().filter_map(|b| b.title.clone()).collect();
    out.sort();
    out
}
