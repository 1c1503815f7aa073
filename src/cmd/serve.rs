//! HTTP service command: `grwm serve`.

use anyhow::Result;
use grwm::config::Config;

pub async fn cmd_serve(
    mut config: Config,
    host: Option<String>,
    port: Option<u16>,
    dev: bool,
) -> Result<()> {
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }
    if dev {
        config.server.cors_permissive = true;
        // Reachable from a frontend container during development.
        if config.server.host == "127.0.0.1" {
            config.server.host = "0.0.0.0".to_string();
        }
    }

    grwm::server::start_server(config).await
}
