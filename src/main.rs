use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post, put},
};
use sqlx::postgres::PgPoolOptions;
use streamify_backend::{
    AppState,
    config::Config,
    gateway::StreamGateway,
    middleware::{RateLimiter, auth_middleware, log_errors, rate_limit},
    outbox, routes,
};
use tower_http::cors::CorsLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // 初始化日志
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 加载配置
    let config = Config::from_env().expect("Failed to load configuration");

    #[cfg(debug_assertions)]
    tracing::info!("Running in debug mode with CORS enabled");

    #[cfg(not(debug_assertions))]
    tracing::info!("Running in production mode with CORS disabled");

    // 设置数据库连接池
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .expect("Failed to connect to Postgres");

    sqlx::migrate!()
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    // 设置 Redis 客户端
    let redis_client =
        redis::Client::open(config.redis_url.clone()).expect("Failed to create Redis client");
    let redis_arc = Arc::new(redis_client.clone());

    // 外部聊天/通话网关
    let gateway = Arc::new(StreamGateway::new(&config));

    // 设置应用状态
    let state = AppState {
        pool,
        config: config.clone(),
        redis: redis_arc,
        gateway,
    };

    // 网关同步后台任务
    tokio::spawn(outbox::run_worker(state.clone()));

    // 设置限流器
    let rate_limiter = Arc::new(RateLimiter::new(redis_client, config.clone()));

    // 将路由分为公开路由和受保护路由
    let public_routes = Router::new()
        .route("/ping", get(routes::common::ping))
        .route("/users/register", post(routes::user::register))
        .route("/users/login", post(routes::user::login));

    let protected_routes = Router::new()
        // 账号路由
        .route(
            "/users/me",
            get(routes::user::get_me).put(routes::user::update_profile),
        )
        .route("/users/me/preferences", put(routes::user::update_preferences))
        .route("/users/block", post(routes::user::block_user))
        .route("/users/unblock", post(routes::user::unblock_user))
        .route("/users/friends", get(routes::user::list_friends))
        // 好友请求路由
        .route("/friends/send", post(routes::friend::send_request))
        .route("/friends/accept", post(routes::friend::accept_request))
        .route("/friends/incoming", get(routes::friend::incoming_requests))
        .route("/friends/outgoing", get(routes::friend::outgoing_requests))
        // 群组路由
        .route("/groups/create", post(routes::group::create_group))
        .route("/groups/by-id", get(routes::group::find_by_id))
        .route("/groups/search", get(routes::group::search_groups))
        .route("/groups/mine", get(routes::group::my_groups))
        .route("/groups/update", put(routes::group::update_group))
        .route("/groups/join", post(routes::group::join_group))
        .route("/groups/leave", post(routes::group::leave_group))
        .route("/groups/members", get(routes::group::get_group_members))
        .route("/groups/members/role", put(routes::group::set_member_role))
        .route(
            "/groups/members/remove",
            post(routes::group::remove_group_member),
        )
        .route("/groups/deactivate", post(routes::group::deactivate_group))
        // 通知路由
        .route("/notifications", get(routes::notification::list_notifications))
        .route("/notifications/read", post(routes::notification::mark_read))
        .route(
            "/notifications/read-all",
            post(routes::notification::mark_all_read),
        )
        .route(
            "/notifications/delete",
            post(routes::notification::delete_notification),
        )
        // 聊天token
        .route("/chat/token", get(routes::chat::chat_token))
        // 应用认证中间件
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    // 创建基础路由
    let router = Router::new().nest(
        "/api",
        Router::new().merge(public_routes).merge(protected_routes),
    );

    // 添加日志中间件和限流中间件
    let router = router.layer(axum::middleware::from_fn(log_errors)).layer(
        axum::middleware::from_fn_with_state(rate_limiter, rate_limit),
    );

    // 根据编译模式决定是否添加CORS
    #[cfg(debug_assertions)]
    let router = {
        tracing::debug!("Adding CORS layer for development mode");
        let cors = CorsLayer::permissive();
        router.layer(cors)
    };

    // 添加应用状态
    let app = router.with_state(state.clone());

    // 启动服务器
    let addr = SocketAddr::new(
        state.config.server_host.parse().unwrap_or_else(|_| {
            tracing::warn!("Invalid server_host, falling back to dual-stack default");
            IpAddr::V6(std::net::Ipv6Addr::UNSPECIFIED)
        }),
        state.config.server_port,
    );
    tracing::info!("Server listening on {}", addr);
    axum::serve(
        tokio::net::TcpListener::bind(&addr)
            .await
            .expect("Failed to bind"),
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .expect("Failed to start server");
}
