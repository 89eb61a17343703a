use std::sync::Arc;

use rand::Rng;
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use robohub_server::config::{
    generate_config_template, Config, EVENT_BUS_BUFFER_SIZE, SHUTDOWN_GRACE,
};
use robohub_server::{bus, db, http, manager, robot, sse, state, tcp, terminal};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load config with layered precedence: defaults < TOML < env < CLI
    let config = Config::load()?;

    // Handle --generate-config: print template and exit
    if config.generate_config {
        print!("{}", generate_config_template());
        return Ok(());
    }

    init_tracing(&config);
    tracing::info!(
        "robohub server v{} starting",
        env!("CARGO_PKG_VERSION")
    );

    // Root of the process-wide cancellation tree
    let main_token = CancellationToken::new();

    let bus = Arc::new(bus::EventBus::new(EVENT_BUS_BUFFER_SIZE));
    let store: Arc<dyn db::Store> = db::MemoryStore::shared();
    if config.mongodb_uri.is_empty() {
        tracing::warn!("MONGODB_URI not set; using the in-memory store");
    }

    // Robot type registry: populated once here, immutable afterwards
    let registry = robot::registry::builtin()?;
    tracing::info!(types = ?registry.types(), "robot types registered");

    let manager = Arc::new(manager::RobotManager::new(
        Arc::clone(&bus),
        Arc::clone(&store),
        registry,
        main_token.clone(),
    ));
    let gateway = Arc::new(sse::EventsGateway::new(Arc::clone(&bus)));

    // Operator session tokens are signed with a per-process random key
    let jwt_secret: [u8; 32] = rand::rng().random();
    let state = state::AppState {
        manager: Arc::clone(&manager),
        bus: Arc::clone(&bus),
        gateway: Arc::clone(&gateway),
        store: Arc::clone(&store),
        jwt_secret: Arc::new(jwt_secret.to_vec()),
        operator_user: config.operator_user.clone(),
        operator_password: config.operator_password.clone(),
    };

    let mut servers = JoinSet::new();

    // HTTP server (REST + SSE)
    let http_listener =
        TcpListener::bind((config.bind_address.as_str(), config.http_port)).await?;
    tracing::info!(addr = %http_listener.local_addr()?, "HTTP server listening");
    let app = http::build_router(state);
    let http_token = main_token.clone();
    servers.spawn(async move {
        if let Err(e) = axum::serve(http_listener, app)
            .with_graceful_shutdown(http_token.cancelled_owned())
            .await
        {
            tracing::error!(error = %e, "HTTP server failed");
        }
    });

    // Robot TCP server
    let tcp_listener =
        TcpListener::bind((config.bind_address.as_str(), config.tcp_port)).await?;
    let tcp_manager = Arc::clone(&manager);
    let tcp_token = main_token.clone();
    servers.spawn(async move {
        if let Err(e) = tcp::serve(tcp_listener, tcp_manager, tcp_token).await {
            tracing::error!(error = %e, "TCP server failed");
        }
    });

    // Ops terminal
    let terminal_listener =
        TcpListener::bind((config.bind_address.as_str(), config.terminal_port)).await?;
    let terminal_manager = Arc::clone(&manager);
    let terminal_bus = Arc::clone(&bus);
    let terminal_token = main_token.clone();
    servers.spawn(async move {
        if let Err(e) =
            terminal::serve(terminal_listener, terminal_manager, terminal_bus, terminal_token)
                .await
        {
            tracing::error!(error = %e, "terminal server failed");
        }
    });

    wait_for_shutdown(&main_token).await;
    tracing::info!("shutting down");

    main_token.cancel();
    bus.close();
    gateway.shutdown();

    // Bounded grace: servers and per-robot supervisors get SHUTDOWN_GRACE
    // to wind down before the process exits anyway.
    let drain = async {
        while servers.join_next().await.is_some() {}
    };
    if tokio::time::timeout(SHUTDOWN_GRACE, drain).await.is_err() {
        tracing::warn!("shutdown grace period elapsed; forcing exit");
    } else {
        tracing::info!("all servers shut down gracefully");
    }

    Ok(())
}

fn init_tracing(config: &Config) {
    let default_filter = if config.debug {
        "robohub_server=debug"
    } else {
        "robohub_server=info"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.parse().expect("static filter parses"));

    if config.json_logs {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().pretty().with_env_filter(filter).init();
    }
}

/// Block until SIGINT/SIGTERM, or an internal `stop program` cancels the
/// main token first.
async fn wait_for_shutdown(token: &CancellationToken) {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received interrupt"),
        _ = terminate => tracing::info!("received termination signal"),
        _ = token.cancelled() => tracing::info!("internal shutdown requested"),
    }
}
