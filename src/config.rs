use std::time::Duration;

use clap::Parser;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// How long a pending registration waits for an operator decision before
/// it is dropped as not-accepted.
pub const REGISTERING_WAIT_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Upper bound on concurrent event-handler invocations across the whole bus.
pub const EVENT_BUS_BUFFER_SIZE: usize = 1000;

/// Grace period for servers and per-robot tasks to wind down after the main
/// cancellation fires.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(60);

/// Robohub coordination server
#[derive(Parser, Serialize, Deserialize, Clone, Debug)]
#[command(name = "robohub-server", version, about = "Robohub fleet coordination server")]
pub struct Config {
    /// Port for the robot TCP session protocol
    #[arg(long, env = "TCP_PORT", default_value = "9000")]
    pub tcp_port: u16,

    /// Port for the REST / SSE surface
    #[arg(long, env = "HTTP_PORT", default_value = "8080")]
    pub http_port: u16,

    /// Port for the ops terminal
    #[arg(long, env = "TERMINAL_PORT", default_value = "9001")]
    pub terminal_port: u16,

    /// Bind address for all listeners
    #[arg(long, env = "BIND_ADDRESS", default_value = "0.0.0.0")]
    pub bind_address: String,

    /// MongoDB connection string for the external persistence handler
    #[arg(long, env = "MONGODB_URI", default_value = "")]
    pub mongodb_uri: String,

    /// MongoDB database name
    #[arg(long, env = "MONGODB_DATABASE", default_value = "robohub")]
    pub mongodb_database: String,

    /// Enable verbose debug logging
    #[arg(long, env = "DEBUG")]
    pub debug: bool,

    /// Enable structured JSON logging (for Docker/production)
    #[arg(long, env = "JSON_LOGS")]
    pub json_logs: bool,

    /// Path to TOML config file
    #[arg(long, default_value = "./robohub.toml")]
    pub config: String,

    /// Output a commented TOML config template and exit
    #[arg(long)]
    pub generate_config: bool,

    /// Operator account name for the REST login
    #[arg(long, env = "OPERATOR_USER", default_value = "admin")]
    pub operator_user: String,

    /// Operator account password; login is disabled while empty
    #[arg(long, env = "OPERATOR_PASSWORD", default_value = "")]
    pub operator_password: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tcp_port: 9000,
            http_port: 8080,
            terminal_port: 9001,
            bind_address: "0.0.0.0".to_string(),
            mongodb_uri: String::new(),
            mongodb_database: "robohub".to_string(),
            debug: false,
            json_logs: false,
            config: "./robohub.toml".to_string(),
            generate_config: false,
            operator_user: "admin".to_string(),
            operator_password: String::new(),
        }
    }
}

impl Config {
    /// Load config with layered precedence:
    /// built-in defaults < TOML file < env vars < CLI args
    pub fn load() -> Result<Self, figment::Error> {
        let cli = Config::parse();
        let config_path = cli.config.clone();

        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_path))
            .merge(Env::raw().only(&[
                "TCP_PORT",
                "HTTP_PORT",
                "TERMINAL_PORT",
                "BIND_ADDRESS",
                "MONGODB_URI",
                "MONGODB_DATABASE",
            ]))
            .merge(Serialized::defaults(cli))
            .extract()
    }
}

/// Generate a commented TOML config template
pub fn generate_config_template() -> String {
    r#"# Robohub Coordination Server Configuration
# Place this file at ./robohub.toml or specify with --config <path>
# All settings can be overridden via environment variables (TCP_PORT, etc.)
# or CLI flags (--tcp-port, etc.)

# Robot TCP session protocol port (default: 9000)
# tcp_port = 9000

# REST / SSE port (default: 8080)
# http_port = 8080

# Ops terminal port (default: 9001)
# terminal_port = 9001

# Bind address (default: 0.0.0.0 - all interfaces)
# bind_address = "0.0.0.0"

# MongoDB connection string for the external persistence handler
# mongodb_uri = "mongodb://localhost:27017"
# mongodb_database = "robohub"

# Enable structured JSON logging for Docker/production
# json_logs = false

# Operator credentials for the REST login
# operator_user = "admin"
# operator_password = ""
"#
    .to_string()
}
