use std::{error::Error as StdError, process, sync::Arc};

use roamly::{
    application::{
        categories::{CategoryService, SearchOptions},
        error::AppError,
        repos::CategoriesRepo,
        search::SearchBackend,
    },
    cache::{CacheConfig, CacheState, CacheStore, MemoryCacheStore, invalidate_pattern},
    config::{self, CacheBackend, CacheSettings},
    infra::{
        db::PostgresRepositories,
        error::InfraError,
        http::{self, AdminState, HttpState},
        redis_cache::RedisCacheStore,
        search::ElasticsearchClient,
        telemetry,
    },
};
use tokio::try_join;
use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    let chain = error_chain(error);
    if dispatcher::has_been_set() {
        error!(error = %error, chain = ?chain, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, chain = ?chain, "application error");
    });
}

fn error_chain(error: &dyn StdError) -> Vec<String> {
    let mut messages = Vec::new();
    let mut current = error.source();
    while let Some(inner) = current {
        messages.push(inner.to_string());
        current = inner.source();
    }
    messages
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::InvalidateCache(args) => run_invalidate_cache(settings, args).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    let cache_store = build_cache_store(&settings.cache).await?;
    let search: Arc<dyn SearchBackend> = Arc::new(
        ElasticsearchClient::new(&settings.search.url, settings.search.api_key.clone())
            .map_err(InfraError::from)?,
    );

    let cache_config = CacheConfig::from(&settings.cache);
    let categories_repo: Arc<dyn CategoriesRepo> = repositories.clone();
    let categories = Arc::new(CategoryService::new(
        categories_repo,
        search,
        cache_store.clone(),
        cache_config.clone(),
        SearchOptions::from(&settings.search),
    ));

    let response_cache = cache_config.enable_response_cache.then(|| CacheState {
        config: cache_config.clone(),
        store: cache_store.clone(),
    });

    let http_state = HttpState {
        categories: categories.clone(),
        db: repositories,
        cache: response_cache,
    };
    let admin_state = AdminState {
        categories,
        cache: cache_store,
    };

    serve_http(&settings, http_state, admin_state).await
}

async fn run_invalidate_cache(
    settings: config::Settings,
    args: config::InvalidateCacheArgs,
) -> Result<(), AppError> {
    if settings.cache.backend == CacheBackend::Memory {
        return Err(AppError::validation(
            "invalidate-cache requires the redis cache backend",
        ));
    }

    let store = build_cache_store(&settings.cache).await?;
    let cleared = invalidate_pattern(store.as_ref(), &args.pattern)
        .await
        .map_err(InfraError::from)?;
    info!(
        target = "roamly::invalidate",
        pattern = %args.pattern,
        cleared,
        "Invalidation completed"
    );
    Ok(())
}

async fn init_repositories(
    settings: &config::Settings,
) -> Result<Arc<PostgresRepositories>, AppError> {
    let database_url = settings
        .database
        .url
        .as_ref()
        .ok_or_else(|| InfraError::configuration("database url is not configured"))?;

    let pool = PostgresRepositories::connect(database_url, settings.database.max_connections.get())
        .await
        .map_err(|err| InfraError::database(err.to_string()))?;

    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(|err| InfraError::database(err.to_string()))?;

    Ok(Arc::new(PostgresRepositories::new(pool)))
}

async fn build_cache_store(settings: &CacheSettings) -> Result<Arc<dyn CacheStore>, AppError> {
    let store: Arc<dyn CacheStore> = match settings.backend {
        CacheBackend::Redis => Arc::new(
            RedisCacheStore::connect(&settings.redis_url)
                .await
                .map_err(InfraError::from)?,
        ),
        CacheBackend::Memory => Arc::new(MemoryCacheStore::with_capacity(
            CacheConfig::from(settings).memory_capacity_non_zero(),
        )),
    };
    info!(target = "roamly::cache", backend = ?settings.backend, "cache store ready");
    Ok(store)
}

async fn serve_http(
    settings: &config::Settings,
    http_state: HttpState,
    admin_state: AdminState,
) -> Result<(), AppError> {
    let public_router = http::build_router(http_state);
    let admin_router = http::build_admin_router(admin_state);

    let public_listener = tokio::net::TcpListener::bind(settings.server.public_addr)
        .await
        .map_err(InfraError::from)?;
    let admin_listener = tokio::net::TcpListener::bind(settings.server.admin_addr)
        .await
        .map_err(InfraError::from)?;

    info!(
        target = "roamly::serve",
        public = %settings.server.public_addr,
        admin = %settings.server.admin_addr,
        "listening"
    );

    let public_server = axum::serve(public_listener, public_router.into_make_service())
        .with_graceful_shutdown(shutdown_signal());
    let admin_server = axum::serve(admin_listener, admin_router.into_make_service())
        .with_graceful_shutdown(shutdown_signal());

    try_join!(
        async { public_server.await },
        async { admin_server.await }
    )
    .map_err(|err| AppError::unexpected(format!("server error: {err}")))?;

    info!(target = "roamly::serve", "shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
