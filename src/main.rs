use axum::{
    Router,
    extract::Extension,
    routing::{get, post},
};
use event_bank_cluster::bank::handlers::{
    handle_delete_messages, handle_events, handle_message_events, handle_post_digests,
};
use event_bank_cluster::bank::protocol::{
    ENDPOINT_DELETE_MESSAGES, ENDPOINT_EVENTS, ENDPOINT_MESSAGE_EVENTS, ENDPOINT_POST_DIGESTS,
};
use event_bank_cluster::bank::service::BankService;
use event_bank_cluster::client::transport::{HttpManagerClient, HttpTransport};
use event_bank_cluster::config::ClusterConfig;
use event_bank_cluster::membership::handlers::{
    handle_client_session, handle_login, handle_ping,
};
use event_bank_cluster::membership::protocol::{
    ENDPOINT_CLIENT_SESSION, ENDPOINT_LOGIN, ENDPOINT_PING,
};
use event_bank_cluster::membership::service::BankManagerService;
use event_bank_cluster::membership::types::BankId;
use event_bank_cluster::storage::events::MemoryEventStore;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Manager,
    Bank,
}

fn usage(program: &str) -> ! {
    eprintln!(
        "Usage: {} --role <manager|bank> --bind <addr:port> [--manager <addr:port>] [--config <file.json>] [--log-level <level>]",
        program
    );
    eprintln!("Example: {} --role manager --bind 127.0.0.1:7000", program);
    eprintln!(
        "Example: {} --role bank --bind 127.0.0.1:7001 --manager 127.0.0.1:7000",
        program
    );
    std::process::exit(1);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let program = args.first().map(String::as_str).unwrap_or("event-bank");

    let mut role: Option<Role> = None;
    let mut bind_addr: Option<SocketAddr> = None;
    let mut manager_addr: Option<String> = None;
    let mut config_path: Option<PathBuf> = None;
    let mut log_level = tracing::Level::INFO;

    let mut i = 1;
    while i < args.len() {
        let value = args.get(i + 1);
        match (args[i].as_str(), value) {
            ("--role", Some(v)) => {
                role = match v.as_str() {
                    "manager" => Some(Role::Manager),
                    "bank" => Some(Role::Bank),
                    other => anyhow::bail!("Unknown role: {}", other),
                };
                i += 2;
            }
            ("--bind", Some(v)) => {
                bind_addr = Some(v.parse()?);
                i += 2;
            }
            ("--manager", Some(v)) => {
                manager_addr = Some(v.clone());
                i += 2;
            }
            ("--config", Some(v)) => {
                config_path = Some(PathBuf::from(v));
                i += 2;
            }
            ("--log-level", Some(v)) => {
                log_level = v
                    .parse()
                    .map_err(|_| anyhow::anyhow!("Unknown log level: {}", v))?;
                i += 2;
            }
            _ => {
                i += 1;
            }
        }
    }

    tracing_subscriber::fmt().with_max_level(log_level).init();

    let (Some(role), Some(bind_addr)) = (role, bind_addr) else {
        usage(program);
    };
    let config = ClusterConfig::load(config_path.as_deref())?;

    let app = match role {
        Role::Manager => {
            tracing::info!("Starting manager on {}", bind_addr);
            let manager = BankManagerService::new(config.manager, config.client);
            manager.clone().start().await;

            Router::new()
                .route(ENDPOINT_LOGIN, post(handle_login))
                .route(ENDPOINT_PING, post(handle_ping))
                .route(ENDPOINT_CLIENT_SESSION, get(handle_client_session))
                .layer(Extension(manager))
        }
        Role::Bank => {
            let Some(manager_addr) = manager_addr else {
                eprintln!("--manager is required for a bank");
                usage(program);
            };
            tracing::info!("Starting bank on {} (manager: {})", bind_addr, manager_addr);

            let transport = HttpTransport::new(&config.client);
            let manager = Arc::new(HttpManagerClient::new(&manager_addr, transport));
            let bank = BankService::new(
                BankId::new(bind_addr.to_string()),
                config.bank,
                manager,
                Arc::new(MemoryEventStore::default()),
            );
            bank.clone().start().await;

            Router::new()
                .route(ENDPOINT_MESSAGE_EVENTS, post(handle_message_events))
                .route(ENDPOINT_POST_DIGESTS, post(handle_post_digests))
                .route(ENDPOINT_EVENTS, post(handle_events))
                .route(ENDPOINT_DELETE_MESSAGES, post(handle_delete_messages))
                .layer(Extension(bank))
        }
    };

    tracing::info!("HTTP server listening on {}", bind_addr);
    tracing::info!("Press Ctrl+C to shutdown");

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
