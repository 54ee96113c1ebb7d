use anyhow::Result;

use crate::server::settings::Settings;

/// Start the HTTP server. `host` and `port` take precedence over the
/// configuration files.
pub async fn handle_serve(host: Option<String>, port: Option<u16>) -> Result<()> {
    let mut settings = Settings::new()?;
    if let Some(host) = host {
        settings.server.host = host;
    }
    if let Some(port) = port {
        settings.server.port = port;
    }
    crate::server::run_server(settings).await
}

pub fn handle_check_config() -> Result<()> {
    println!("Checking configuration...");
    match Settings::new() {
        Ok(settings) => {
            println!("✓ Configuration is valid");
            println!(
                "  listening on {}:{}{}/",
                settings.server.host,
                settings.server.port,
                settings.server.base_path()
            );
            println!(
                "  upload limit {} bytes",
                settings.server.max_upload_bytes
            );
            if let Some(socket) = &settings.docker.socket {
                println!("  docker socket {}", socket);
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("✗ Configuration error: {}", e);
            std::process::exit(1);
        }
    }
}
