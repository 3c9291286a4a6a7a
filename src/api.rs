//! HTTP API Server for Recommendations
//!
//! Read-only REST endpoints over a [`RecommendationEngine`]. Every engine
//! knob can be overridden per request through query parameters; invalid
//! values are rejected with `400 INVALID_INPUT` rather than clamped.

use axum::{
    extract::{Path, Query, State},
    http::{HeaderName, HeaderValue, StatusCode},
    response::Json,
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use tower::limit::ConcurrencyLimitLayer;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::ApiConfig;
use crate::error::{Error, Result};
use crate::recommendation::{
    Aggregation, BookId, CatalogStore, EngineConfig, FallbackBook, GenreSet, PeerPopularity,
    RecommendationEngine, RecommendationExplanation, RecommendationStats, Recommendations,
    ScoredBook, UserId, UserSimilarity,
};

/// Upper bound on `limit` for any list endpoint
pub const MAX_LIMIT: usize = 100;

const REQUEST_ID_HEADER: &str = "x-request-id";

/// Shared application state
pub struct AppState<S> {
    pub engine: RecommendationEngine<S>,
}

/// Per-request overrides of the engine defaults
#[derive(Debug, Default, Deserialize)]
pub struct EngineQuery {
    pub limit: Option<usize>,
    pub content_weight: Option<f64>,
    pub collaborative_weight: Option<f64>,
    pub min_similarity: Option<f64>,
    pub max_similar_users: Option<usize>,
    pub rating_threshold: Option<u8>,
    pub aggregation: Option<Aggregation>,
}

impl EngineQuery {
    /// Merge onto `base`; the engine validates the result
    pub fn apply(&self, base: &EngineConfig) -> Result<EngineConfig> {
        let result_limit = check_limit(self.limit.unwrap_or(base.result_limit))?;
        Ok(EngineConfig {
            content_weight: self.content_weight.unwrap_or(base.content_weight),
            collaborative_weight: self.collaborative_weight.unwrap_or(base.collaborative_weight),
            min_similarity: self.min_similarity.unwrap_or(base.min_similarity),
            max_similar_users: self.max_similar_users.unwrap_or(base.max_similar_users),
            rating_threshold: self.rating_threshold.unwrap_or(base.rating_threshold),
            result_limit,
            aggregation: self.aggregation.unwrap_or(base.aggregation),
        })
    }
}

/// Query params for the similar-books endpoint
#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<usize>,
}

/// Query params for genre-list recommendations.
/// Both lists are comma separated: `?genres=fantasy,mystery&exclude=3,9`.
#[derive(Debug, Default, Deserialize)]
pub struct GenreQuery {
    pub genres: Option<String>,
    pub exclude: Option<String>,
    pub limit: Option<usize>,
}

impl GenreQuery {
    pub fn genre_set(&self) -> GenreSet {
        self.genres
            .as_deref()
            .map(|g| g.split(',').collect())
            .unwrap_or_default()
    }

    pub fn exclude_ids(&self) -> Result<HashSet<BookId>> {
        let Some(raw) = self.exclude.as_deref() else {
            return Ok(HashSet::new());
        };
        raw.split(',')
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(|id| {
                id.parse::<BookId>().map_err(|_| {
                    Error::invalid_input("exclude", format!("'{}' is not a book id", id))
                })
            })
            .collect()
    }
}

fn check_limit(limit: usize) -> Result<usize> {
    if limit > MAX_LIMIT {
        return Err(Error::invalid_input(
            "limit",
            format!("{} exceeds the maximum of {}", limit, MAX_LIMIT),
        ));
    }
    Ok(limit)
}

/// Response for the similar-users endpoint
#[derive(Debug, Serialize, Deserialize)]
pub struct SimilarUsersResponse {
    pub user_id: UserId,
    pub similar_users: Vec<UserSimilarity>,
}

/// Response for the similar-books endpoint
#[derive(Debug, Serialize, Deserialize)]
pub struct SimilarBooksResponse {
    pub book_id: BookId,
    pub items: Vec<ScoredBook>,
}

/// Response for genre-list recommendations
#[derive(Debug, Serialize, Deserialize)]
pub struct GenreRecommendationsResponse {
    pub genres: Vec<String>,
    pub items: Vec<ScoredBook>,
}

/// Response for the cold-start fallback endpoint
#[derive(Debug, Serialize, Deserialize)]
pub struct FallbackResponse {
    pub user_id: UserId,
    pub items: Vec<FallbackBook>,
}

/// Response for books popular among a reader's neighbors
#[derive(Debug, Serialize, Deserialize)]
pub struct PopularAmongSimilarResponse {
    pub user_id: UserId,
    pub items: Vec<PeerPopularity>,
}

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Build the router. Layers that depend on deployment settings are added
/// by [`start_server`].
pub fn router<S: CatalogStore>(engine: RecommendationEngine<S>) -> Router {
    let state = Arc::new(AppState { engine });

    Router::new()
        .route("/health", get(health_check::<S>))
        .route("/api/v1/recommendations/:user_id", get(get_recommendations::<S>))
        .route(
            "/api/v1/recommendations/:user_id/explain/:book_id",
            get(explain_recommendation::<S>),
        )
        .route(
            "/api/v1/recommendations/:user_id/stats",
            get(get_stats::<S>),
        )
        .route(
            "/api/v1/recommendations/:user_id/fallback",
            get(get_fallback::<S>),
        )
        .route(
            "/api/v1/genres/recommendations",
            get(get_genre_recommendations::<S>),
        )
        .route("/api/v1/users/:user_id/similar", get(get_similar_users::<S>))
        .route(
            "/api/v1/users/:user_id/similar/popular",
            get(get_popular_among_similar::<S>),
        )
        .route("/api/v1/books/:book_id/similar", get(get_similar_books::<S>))
        .with_state(state)
}

/// Start the API server and run until `shutdown` resolves
pub async fn start_server<S, F>(
    engine: RecommendationEngine<S>,
    config: &ApiConfig,
    shutdown: F,
) -> anyhow::Result<()>
where
    S: CatalogStore,
    F: Future<Output = ()> + Send + 'static,
{
    let request_id = HeaderName::from_static(REQUEST_ID_HEADER);
    let middleware = ServiceBuilder::new()
        .layer(SetRequestIdLayer::new(request_id.clone(), MakeRequestUuid))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::new(request_id))
        .layer(TimeoutLayer::new(config.request_timeout))
        .layer(ConcurrencyLimitLayer::new(config.max_concurrent_requests));

    let mut app = router(engine).layer(middleware);

    if config.cors_enabled {
        app = app.layer(cors_layer(&config.cors_origins));
    }

    let addr = format!("{}:{}", config.host, config.port);
    info!("🚀 Starting recommendation API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("API server stopped");
    Ok(())
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let base = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.iter().any(|o| o == "*") {
        return base.allow_origin(Any);
    }

    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {}", o);
                None
            }
        })
        .collect();
    base.allow_origin(parsed)
}

/// Health check endpoint
async fn health_check<S: CatalogStore>(
    State(state): State<Arc<AppState<S>>>,
) -> (StatusCode, Json<HealthResponse>) {
    let (code, status) = match state.engine.store().health_check().await {
        Ok(()) => (StatusCode::OK, "healthy"),
        Err(e) => {
            warn!("Health check failed: {}", e);
            (StatusCode::SERVICE_UNAVAILABLE, "unhealthy")
        }
    };
    (
        code,
        Json(HealthResponse {
            status: status.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }),
    )
}

/// Ranked recommendations for a user
async fn get_recommendations<S: CatalogStore>(
    State(state): State<Arc<AppState<S>>>,
    Path(user_id): Path<UserId>,
    Query(query): Query<EngineQuery>,
) -> Result<Json<Recommendations>> {
    let config = query.apply(state.engine.config())?;
    let recs = state.engine.recommend_with(user_id, &config).await?;
    Ok(Json(recs))
}

/// Readers with overlapping interests
async fn get_similar_users<S: CatalogStore>(
    State(state): State<Arc<AppState<S>>>,
    Path(user_id): Path<UserId>,
    Query(query): Query<EngineQuery>,
) -> Result<Json<SimilarUsersResponse>> {
    let mut config = query.apply(state.engine.config())?;
    if let Some(limit) = query.limit {
        config.max_similar_users = limit;
    }
    let similar_users = state.engine.similar_users(user_id, &config).await?;
    Ok(Json(SimilarUsersResponse {
        user_id,
        similar_users,
    }))
}

/// Books sharing genres with a book
async fn get_similar_books<S: CatalogStore>(
    State(state): State<Arc<AppState<S>>>,
    Path(book_id): Path<BookId>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<SimilarBooksResponse>> {
    let limit = check_limit(query.limit.unwrap_or(state.engine.config().result_limit))?;
    let items = state.engine.similar_books(book_id, limit).await?;
    Ok(Json(SimilarBooksResponse { book_id, items }))
}

/// Books matching an explicit genre list, no account needed
async fn get_genre_recommendations<S: CatalogStore>(
    State(state): State<Arc<AppState<S>>>,
    Query(query): Query<GenreQuery>,
) -> Result<Json<GenreRecommendationsResponse>> {
    let limit = check_limit(query.limit.unwrap_or(state.engine.config().result_limit))?;
    let genres = query.genre_set();
    let exclude = query.exclude_ids()?;
    let items = state
        .engine
        .recommend_for_genres(&genres, &exclude, limit)
        .await?;
    Ok(Json(GenreRecommendationsResponse {
        genres: genres.iter().map(str::to_string).collect(),
        items,
    }))
}

/// Popular and recent books for a reader with no usable signal
async fn get_fallback<S: CatalogStore>(
    State(state): State<Arc<AppState<S>>>,
    Path(user_id): Path<UserId>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<FallbackResponse>> {
    let limit = check_limit(query.limit.unwrap_or(state.engine.config().result_limit))?;
    let items = state.engine.fallback(user_id, limit).await?;
    Ok(Json(FallbackResponse { user_id, items }))
}

/// Books read by the most neighbors
async fn get_popular_among_similar<S: CatalogStore>(
    State(state): State<Arc<AppState<S>>>,
    Path(user_id): Path<UserId>,
    Query(query): Query<EngineQuery>,
) -> Result<Json<PopularAmongSimilarResponse>> {
    let config = query.apply(state.engine.config())?;
    let items = state
        .engine
        .popular_among_similar_users(user_id, &config, config.result_limit)
        .await?;
    Ok(Json(PopularAmongSimilarResponse { user_id, items }))
}

/// Why a book suits a user
async fn explain_recommendation<S: CatalogStore>(
    State(state): State<Arc<AppState<S>>>,
    Path((user_id, book_id)): Path<(UserId, BookId)>,
    Query(query): Query<EngineQuery>,
) -> Result<Json<RecommendationExplanation>> {
    let config = query.apply(state.engine.config())?;
    let explanation = state.engine.explain(user_id, book_id, &config).await?;
    Ok(Json(explanation))
}

/// Which recommendation sources are available for a user
async fn get_stats<S: CatalogStore>(
    State(state): State<Arc<AppState<S>>>,
    Path(user_id): Path<UserId>,
    Query(query): Query<EngineQuery>,
) -> Result<Json<RecommendationStats>> {
    let config = query.apply(state.engine.config())?;
    let stats = state.engine.stats(user_id, &config).await?;
    Ok(Json(stats))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_overrides_only_given_fields() {
        let base = EngineConfig::default();
        let query = EngineQuery {
            limit: Some(3),
            aggregation: Some(Aggregation::Mean),
            ..Default::default()
        };
        let merged = query.apply(&base).unwrap();
        assert_eq!(merged.result_limit, 3);
        assert_eq!(merged.aggregation, Aggregation::Mean);
        assert_eq!(merged.content_weight, base.content_weight);
        assert_eq!(merged.min_similarity, base.min_similarity);
    }

    #[test]
    fn test_genre_query_parsing() {
        let query = GenreQuery {
            genres: Some("Fantasy, mystery,,fantasy".to_string()),
            exclude: Some("3, 9,".to_string()),
            limit: None,
        };
        let genres = query.genre_set();
        assert_eq!(genres.iter().collect::<Vec<_>>(), vec!["fantasy", "mystery"]);
        assert_eq!(query.exclude_ids().unwrap(), [3, 9].into_iter().collect());

        let bad = GenreQuery {
            exclude: Some("3,abc".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            bad.exclude_ids(),
            Err(Error::InvalidInput { field: "exclude", .. })
        ));
        assert!(GenreQuery::default().genre_set().is_empty());
    }

    #[test]
    fn test_limit_above_maximum_rejected() {
        let query = EngineQuery {
            limit: Some(MAX_LIMIT + 1),
            ..Default::default()
        };
        assert!(matches!(
            query.apply(&EngineConfig::default()),
            Err(Error::InvalidInput { field: "limit", .. })
        ));
    }
}
