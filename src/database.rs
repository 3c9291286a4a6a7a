//! Database connection pool and the PostgreSQL catalog
//!
//! Provides a PostgreSQL connection pool with:
//! - Configurable pool sizes and timeouts
//! - Health checking
//! - Query instrumentation
//! - [`PgCatalogStore`], the production [`CatalogStore`]

use crate::config::DatabaseConfig;
use crate::error::{Error, Result};
use crate::recommendation::{
    Book, BookId, BookPopularity, CatalogStore, GenreSet, Rating, User, UserId,
};
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use sqlx::ConnectOptions;
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, instrument};

/// Database connection pool
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool
    #[instrument(skip(config))]
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        let pool = create_pool(config).await?;
        Ok(Self { pool })
    }

    /// Get reference to the underlying pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Check if database is healthy
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| Error::Database {
                message: format!("Health check failed: {}", e).into(),
                source: Some(e),
            })?;
        Ok(())
    }

    /// Get pool statistics
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            size: self.pool.size(),
            idle: self.pool.num_idle(),
        }
    }

    /// Close all connections gracefully
    pub async fn close(&self) {
        info!("Closing database connection pool...");
        self.pool.close().await;
        info!("Database connection pool closed");
    }
}

/// Pool statistics
#[derive(Debug, Clone)]
pub struct PoolStats {
    pub size: u32,
    pub idle: usize,
}

/// Create a connection pool with the given configuration
pub async fn create_pool(config: &DatabaseConfig) -> Result<PgPool> {
    info!("Creating database connection pool...");
    debug!(
        "Pool config: max={}, min={}, connect_timeout={:?}",
        config.max_connections, config.min_connections, config.connect_timeout
    );

    let connect_options = PgConnectOptions::from_str(&config.url)
        .map_err(|e| Error::config(format!("Invalid database URL: {}", e)))?
        .statement_cache_capacity(config.statement_cache_size)
        .log_statements(log::LevelFilter::Debug)
        .log_slow_statements(log::LevelFilter::Warn, Duration::from_secs(1));

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(config.connect_timeout)
        .idle_timeout(Some(config.idle_timeout))
        .max_lifetime(Some(config.max_lifetime))
        .after_connect(|_conn, _meta| {
            Box::pin(async move {
                debug!("New database connection established");
                Ok(())
            })
        })
        .connect_with(connect_options)
        .await
        .map_err(|e| Error::Database {
            message: format!("Failed to create connection pool: {}", e).into(),
            source: Some(e),
        })?;

    // Verify we can connect
    sqlx::query("SELECT 1").fetch_one(&pool).await.map_err(|e| {
        Error::Database {
            message: format!("Failed to verify database connection: {}", e).into(),
            source: Some(e),
        }
    })?;

    info!(
        "Database connection pool created (size: {}, idle: {})",
        pool.size(),
        pool.num_idle()
    );

    Ok(pool)
}

/// Run database migrations
#[instrument(skip(pool))]
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    info!("Running database migrations...");

    sqlx::migrate!("./migrations").run(pool).await?;

    info!("Database migrations completed successfully");
    Ok(())
}

// ============================================================================
// Catalog queries
// ============================================================================

#[derive(sqlx::FromRow)]
struct UserRow {
    id: i64,
    username: String,
    interests: Vec<String>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id: row.id,
            username: row.username,
            interests: GenreSet::from(row.interests),
        }
    }
}

#[derive(sqlx::FromRow)]
struct BookRow {
    id: i64,
    title: String,
    author: String,
    genres: Vec<String>,
}

impl From<BookRow> for Book {
    fn from(row: BookRow) -> Self {
        Book {
            id: row.id,
            title: row.title,
            author: row.author,
            genres: GenreSet::from(row.genres),
        }
    }
}

#[derive(sqlx::FromRow)]
struct PopularBookRow {
    id: i64,
    title: String,
    author: String,
    genres: Vec<String>,
    rating_count: i64,
    average_rating: Option<f64>,
}

impl From<PopularBookRow> for BookPopularity {
    fn from(row: PopularBookRow) -> Self {
        BookPopularity {
            book: Book::from(BookRow {
                id: row.id,
                title: row.title,
                author: row.author,
                genres: row.genres,
            }),
            rating_count: usize::try_from(row.rating_count).unwrap_or(0),
            average_rating: row.average_rating,
        }
    }
}

#[derive(sqlx::FromRow)]
struct RatingRow {
    user_id: i64,
    book_id: i64,
    rating: i16,
}

impl TryFrom<RatingRow> for Rating {
    type Error = Error;

    fn try_from(row: RatingRow) -> Result<Self> {
        let score = u8::try_from(row.rating).map_err(|_| {
            Error::invalid_input(
                "rating",
                format!(
                    "user {} rated book {} with {}",
                    row.user_id, row.book_id, row.rating
                ),
            )
        })?;
        Ok(Rating::new(row.user_id, row.book_id, score))
    }
}

fn into_ratings(rows: Vec<RatingRow>) -> Result<Vec<Rating>> {
    rows.into_iter().map(Rating::try_from).collect()
}

const USER_COLUMNS: &str = "SELECT id, username, COALESCE(interests, '{}') AS interests FROM users";
const BOOK_COLUMNS: &str =
    "SELECT id, title, author, COALESCE(genres, '{}') AS genres FROM books";
const RATING_COLUMNS: &str = "SELECT user_id, book_id, rating FROM ratings";
const POPULAR_BOOKS: &str = "SELECT b.id, b.title, b.author, COALESCE(b.genres, '{}') AS genres, \
     COUNT(r.id) AS rating_count, AVG(r.rating)::FLOAT8 AS average_rating \
     FROM books b LEFT JOIN ratings r ON r.book_id = b.id \
     GROUP BY b.id \
     ORDER BY rating_count DESC, average_rating DESC NULLS LAST, b.id \
     LIMIT $1";

fn sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

/// PostgreSQL-backed catalog
#[derive(Clone)]
pub struct PgCatalogStore {
    db: Database,
}

impl PgCatalogStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }
}

impl CatalogStore for PgCatalogStore {
    #[instrument(skip(self))]
    async fn fetch_user(&self, user_id: UserId) -> Result<Option<User>> {
        let row: Option<UserRow> = sqlx::query_as(&format!("{} WHERE id = $1", USER_COLUMNS))
            .bind(user_id)
            .fetch_optional(self.db.pool())
            .await?;
        Ok(row.map(User::from))
    }

    #[instrument(skip(self))]
    async fn fetch_users(&self) -> Result<Vec<User>> {
        let rows: Vec<UserRow> = sqlx::query_as(&format!("{} ORDER BY id", USER_COLUMNS))
            .fetch_all(self.db.pool())
            .await?;
        debug!("Loaded {} users", rows.len());
        Ok(rows.into_iter().map(User::from).collect())
    }

    #[instrument(skip(self))]
    async fn fetch_book(&self, book_id: BookId) -> Result<Option<Book>> {
        let row: Option<BookRow> = sqlx::query_as(&format!("{} WHERE id = $1", BOOK_COLUMNS))
            .bind(book_id)
            .fetch_optional(self.db.pool())
            .await?;
        Ok(row.map(Book::from))
    }

    #[instrument(skip(self))]
    async fn fetch_books(&self) -> Result<Vec<Book>> {
        let rows: Vec<BookRow> = sqlx::query_as(&format!("{} ORDER BY id", BOOK_COLUMNS))
            .fetch_all(self.db.pool())
            .await?;
        debug!("Loaded {} books", rows.len());
        Ok(rows.into_iter().map(Book::from).collect())
    }

    #[instrument(skip(self, user_ids), fields(users = user_ids.len()))]
    async fn fetch_ratings_for_users(
        &self,
        user_ids: &[UserId],
    ) -> Result<HashMap<UserId, Vec<Rating>>> {
        if user_ids.is_empty() {
            return Ok(HashMap::new());
        }
        // Oldest first: a later duplicate overrides an earlier one downstream
        let rows: Vec<RatingRow> = sqlx::query_as(&format!(
            "{} WHERE user_id = ANY($1) ORDER BY created_at, id",
            RATING_COLUMNS
        ))
        .bind(user_ids)
        .fetch_all(self.db.pool())
        .await?;

        let mut grouped: HashMap<UserId, Vec<Rating>> = HashMap::new();
        for rating in into_ratings(rows)? {
            grouped.entry(rating.user_id).or_default().push(rating);
        }
        Ok(grouped)
    }

    #[instrument(skip(self))]
    async fn fetch_user_ratings(&self, user_id: UserId) -> Result<Vec<Rating>> {
        let rows: Vec<RatingRow> = sqlx::query_as(&format!(
            "{} WHERE user_id = $1 ORDER BY created_at, id",
            RATING_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(self.db.pool())
        .await?;
        into_ratings(rows)
    }

    #[instrument(skip(self))]
    async fn fetch_book_ratings(&self, book_id: BookId) -> Result<Vec<Rating>> {
        let rows: Vec<RatingRow> = sqlx::query_as(&format!(
            "{} WHERE book_id = $1 ORDER BY created_at, id",
            RATING_COLUMNS
        ))
        .bind(book_id)
        .fetch_all(self.db.pool())
        .await?;
        into_ratings(rows)
    }

    #[instrument(skip(self))]
    async fn fetch_popular_books(&self, limit: usize) -> Result<Vec<BookPopularity>> {
        let rows: Vec<PopularBookRow> = sqlx::query_as(POPULAR_BOOKS)
            .bind(sql_limit(limit))
            .fetch_all(self.db.pool())
            .await?;
        Ok(rows.into_iter().map(BookPopularity::from).collect())
    }

    #[instrument(skip(self))]
    async fn fetch_recent_books(&self, limit: usize) -> Result<Vec<Book>> {
        let rows: Vec<BookRow> = sqlx::query_as(&format!(
            "{} ORDER BY created_at DESC, id DESC LIMIT $1",
            BOOK_COLUMNS
        ))
        .bind(sql_limit(limit))
        .fetch_all(self.db.pool())
        .await?;
        Ok(rows.into_iter().map(Book::from).collect())
    }

    async fn health_check(&self) -> Result<()> {
        self.db.health_check().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(url: String) -> DatabaseConfig {
        DatabaseConfig {
            url,
            max_connections: 5,
            min_connections: 1,
            connect_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(60),
            max_lifetime: Duration::from_secs(300),
            statement_cache_size: 10,
            run_migrations: true,
        }
    }

    #[test]
    fn test_rating_row_out_of_range_is_invalid_input() {
        let row = RatingRow {
            user_id: 1,
            book_id: 2,
            rating: -3,
        };
        assert!(matches!(
            Rating::try_from(row),
            Err(Error::InvalidInput { field: "rating", .. })
        ));
    }

    #[test]
    fn test_rows_normalize_genres() {
        let book = Book::from(BookRow {
            id: 1,
            title: "Dune".to_string(),
            author: "Herbert".to_string(),
            genres: vec!["Sci-Fi ".to_string(), "sci-fi".to_string()],
        });
        assert_eq!(book.genres.len(), 1);
        assert!(book.genres.contains("sci-fi"));
    }

    #[test]
    fn test_popular_row_keeps_counts() {
        let popular = BookPopularity::from(PopularBookRow {
            id: 4,
            title: "Emma".to_string(),
            author: "Austen".to_string(),
            genres: vec!["Romance".to_string()],
            rating_count: 3,
            average_rating: Some(4.5),
        });
        assert_eq!(popular.book.id, 4);
        assert!(popular.book.genres.contains("romance"));
        assert_eq!(popular.rating_count, 3);
        assert_eq!(popular.average_rating, Some(4.5));
    }

    #[tokio::test]
    async fn test_pool_stats() {
        // This test requires a running database
        // Skip in CI without database
        let Ok(url) = std::env::var("DATABASE_URL") else {
            return;
        };

        let db = Database::new(&test_config(url)).await.unwrap();
        let stats = db.stats();

        assert!(stats.size > 0);
        db.close().await;
    }

    #[tokio::test]
    async fn test_catalog_queries() {
        let Ok(url) = std::env::var("DATABASE_URL") else {
            return;
        };

        let db = Database::new(&test_config(url)).await.unwrap();
        run_migrations(db.pool()).await.unwrap();
        let store = PgCatalogStore::new(db.clone());

        store.health_check().await.unwrap();
        assert!(store.fetch_user(-1).await.unwrap().is_none());
        assert!(store.fetch_ratings_for_users(&[]).await.unwrap().is_empty());
        let _ = store.fetch_books().await.unwrap();
        assert!(store.fetch_popular_books(3).await.unwrap().len() <= 3);
        assert!(store.fetch_recent_books(3).await.unwrap().len() <= 3);

        db.close().await;
    }
}
