use zenoh::Session;

use crate::config::{Credentials, ZenohConfig};
use crate::error::{Error, Result};

/// Connect to Zenoh using the provided configuration.
pub async fn connect(config: &ZenohConfig) -> Result<Session> {
    connect_with_credentials(config, None).await
}

/// Connect to Zenoh, authenticating with user/password when credentials are given.
pub async fn connect_with_credentials(
    config: &ZenohConfig,
    credentials: Option<&Credentials>,
) -> Result<Session> {
    let zenoh_config = build_zenoh_config(config, credentials)?;

    tracing::info!(
        mode = %config.mode,
        connect = ?config.connect,
        listen = ?config.listen,
        authenticated = credentials.is_some(),
        "Connecting to Zenoh"
    );

    let session = zenoh::open(zenoh_config).await?;

    tracing::info!(zid = %session.zid(), "Connected to Zenoh");

    Ok(session)
}

fn build_zenoh_config(
    config: &ZenohConfig,
    credentials: Option<&Credentials>,
) -> Result<zenoh::Config> {
    let mut zenoh_config = zenoh::Config::default();

    // Set mode
    let mode_str = match config.mode.as_str() {
        "client" | "peer" | "router" => format!("\"{}\"", config.mode),
        other => {
            return Err(Error::Config(format!(
                "Invalid Zenoh mode: '{}'. Expected 'client', 'peer', or 'router'",
                other
            )));
        }
    };

    zenoh_config
        .insert_json5("mode", &mode_str)
        .map_err(|e| Error::Config(format!("Failed to set mode: {}", e)))?;

    if !config.connect.is_empty() {
        let endpoints_json = serde_json::to_string(&config.connect)
            .map_err(|e| Error::Config(format!("Failed to serialize connect endpoints: {}", e)))?;

        zenoh_config
            .insert_json5("connect/endpoints", &endpoints_json)
            .map_err(|e| Error::Config(format!("Failed to set connect endpoints: {}", e)))?;
    }

    if !config.listen.is_empty() {
        let endpoints_json = serde_json::to_string(&config.listen)
            .map_err(|e| Error::Config(format!("Failed to serialize listen endpoints: {}", e)))?;

        zenoh_config
            .insert_json5("listen/endpoints", &endpoints_json)
            .map_err(|e| Error::Config(format!("Failed to set listen endpoints: {}", e)))?;
    }

    if let Some(credentials) = credentials {
        let user = serde_json::to_string(&credentials.username)?;
        let password = serde_json::to_string(&credentials.password)?;

        zenoh_config
            .insert_json5("transport/auth/usrpwd/user", &user)
            .map_err(|e| Error::Config(format!("Failed to set username: {}", e)))?;
        zenoh_config
            .insert_json5("transport/auth/usrpwd/password", &password)
            .map_err(|e| Error::Config(format!("Failed to set password: {}", e)))?;
    }

    Ok(zenoh_config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_mode_rejected() {
        let config = ZenohConfig {
            mode: "broker".to_string(),
            ..ZenohConfig::default()
        };

        let result = build_zenoh_config(&config, None);
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_client_config_with_credentials() {
        let config = ZenohConfig::client_for_host("emon");
        let credentials = Credentials {
            username: "emonpi".to_string(),
            password: "secret".to_string(),
        };

        assert!(build_zenoh_config(&config, Some(&credentials)).is_ok());
    }
}
