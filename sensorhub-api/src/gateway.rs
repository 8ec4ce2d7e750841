//! Outbound relay to the Node-RED gateway that drives the physical plugs.
//!
//! A command is a single `GET /powerplug?imei=<imei>&state=<0|1>`. It goes
//! out over plain HTTP first and, when that fails and fallback is enabled,
//! once more over HTTPS. Both attempts share one time budget. Failures are
//! reported as a [`GatewayOutcome`] value, never as an error, because the
//! database change that precedes the relay stands on its own.

use std::time::Duration;

use rocket::fairing::AdHoc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use ts_rs::TS;
use url::Url;

/// `gateway` table of the Rocket configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    /// Budget shared by the HTTP attempt and the HTTPS retry.
    pub timeout_secs: u64,
    pub https_fallback: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        GatewayConfig {
            host: "127.0.0.1".to_string(),
            port: 1880,
            timeout_secs: 5,
            https_fallback: true,
        }
    }
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("invalid gateway URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("gateway request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("gateway answered with HTTP {0}")]
    Status(u16),
    #[error("gateway did not answer within {0}s")]
    Timeout(u64),
}

/// What happened to a relayed command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct GatewayOutcome {
    pub delivered: bool,
    /// Scheme of the attempt that got through.
    pub protocol: Option<String>,
    pub attempts: u8,
    pub error: Option<String>,
}

/// Shared reqwest client plus the gateway location. Managed as Rocket state.
#[derive(Debug, Clone)]
pub struct GatewayClient {
    config: GatewayConfig,
    http: reqwest::Client,
}

impl GatewayClient {
    pub fn new(config: GatewayConfig) -> Result<Self, GatewayError> {
        let http = reqwest::Client::builder()
            .no_proxy()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(GatewayClient { config, http })
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Builds `<scheme>://<host>:<port>/powerplug?imei=..&state=0|1`.
    pub fn command_url(&self, scheme: &str, imei: &str, state: bool) -> Result<Url, GatewayError> {
        let mut url = Url::parse(&format!(
            "{}://{}:{}/powerplug",
            scheme, self.config.host, self.config.port
        ))?;
        url.query_pairs_mut()
            .append_pair("imei", imei)
            .append_pair("state", if state { "1" } else { "0" });
        Ok(url)
    }

    async fn attempt(&self, scheme: &str, imei: &str, state: bool) -> Result<(), GatewayError> {
        let url = self.command_url(scheme, imei, state)?;
        let response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::Status(status.as_u16()));
        }
        Ok(())
    }

    /// Relays a switch command. Never fails; see [`GatewayOutcome`].
    pub async fn send_power_command(&self, imei: &str, state: bool) -> GatewayOutcome {
        let schemes: &[&str] = if self.config.https_fallback {
            &["http", "https"]
        } else {
            &["http"]
        };
        let budget = Duration::from_secs(self.config.timeout_secs);

        let mut attempts: u8 = 0;
        let mut last_error: Option<GatewayError> = None;
        let relay = async {
            for scheme in schemes {
                attempts += 1;
                match self.attempt(scheme, imei, state).await {
                    Ok(()) => return Some(*scheme),
                    Err(e) => {
                        warn!("Gateway {} attempt for IMEI {} failed: {}", scheme, imei, e);
                        last_error = Some(e);
                    }
                }
            }
            None
        };
        let result = tokio::time::timeout(budget, relay).await;

        match result {
            Ok(Some(scheme)) => {
                info!(
                    "Gateway accepted state={} for IMEI {} over {}",
                    u8::from(state),
                    imei,
                    scheme
                );
                GatewayOutcome {
                    delivered: true,
                    protocol: Some(scheme.to_string()),
                    attempts,
                    error: None,
                }
            }
            Ok(None) => GatewayOutcome {
                delivered: false,
                protocol: None,
                attempts,
                error: last_error.map(|e| e.to_string()),
            },
            Err(_) => {
                let e = GatewayError::Timeout(self.config.timeout_secs);
                warn!("Gateway relay for IMEI {} abandoned: {}", imei, e);
                GatewayOutcome {
                    delivered: false,
                    protocol: None,
                    attempts,
                    error: Some(e.to_string()),
                }
            }
        }
    }
}

/// Reads the `gateway` table (falling back to defaults when absent) and
/// manages a [`GatewayClient`].
pub fn gateway_fairing() -> AdHoc {
    AdHoc::try_on_ignite("Gateway Client", |rocket| async {
        let figment = rocket.figment();
        let config = if figment.contains("gateway") {
            match figment.extract_inner::<GatewayConfig>("gateway") {
                Ok(config) => config,
                Err(e) => {
                    error!("Invalid gateway configuration: {}", e);
                    return Err(rocket);
                }
            }
        } else {
            GatewayConfig::default()
        };

        match GatewayClient::new(config) {
            Ok(client) => {
                info!(
                    "Gateway relay target: {}:{} (timeout {}s, https fallback {})",
                    client.config().host,
                    client.config().port,
                    client.config().timeout_secs,
                    client.config().https_fallback
                );
                Ok(rocket.manage(client))
            }
            Err(e) => {
                error!("Failed to build gateway client: {}", e);
                Err(rocket)
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orm::testing::{spawn_fake_gateway, spawn_silent_gateway};

    fn config(port: u16, timeout_secs: u64, https_fallback: bool) -> GatewayConfig {
        GatewayConfig {
            host: "127.0.0.1".to_string(),
            port,
            timeout_secs,
            https_fallback,
        }
    }

    #[test]
    fn test_command_url() {
        let client = GatewayClient::new(GatewayConfig::default()).unwrap();
        let url = client.command_url("http", "867206040000114", true).unwrap();
        assert_eq!(
            url.as_str(),
            "http://127.0.0.1:1880/powerplug?imei=867206040000114&state=1"
        );
        let url = client.command_url("https", "867206040000114", false).unwrap();
        assert_eq!(
            url.as_str(),
            "https://127.0.0.1:1880/powerplug?imei=867206040000114&state=0"
        );
    }

    #[tokio::test]
    async fn test_delivered_over_http() {
        let gateway = spawn_fake_gateway().await;
        let client = GatewayClient::new(config(gateway.port, 5, true)).unwrap();

        let outcome = client.send_power_command("867206040000114", true).await;
        assert!(outcome.delivered);
        assert_eq!(outcome.protocol.as_deref(), Some("http"));
        assert_eq!(outcome.attempts, 1);
        assert_eq!(
            gateway.requests().await,
            vec!["/powerplug?imei=867206040000114&state=1".to_string()]
        );
    }

    #[tokio::test]
    async fn test_unreachable_gateway_tries_both_schemes() {
        let client = GatewayClient::new(config(1, 5, true)).unwrap();

        let outcome = client.send_power_command("867206040000114", false).await;
        assert!(!outcome.delivered);
        assert_eq!(outcome.attempts, 2);
        assert!(outcome.protocol.is_none());
        assert!(outcome.error.is_some());
    }

    #[tokio::test]
    async fn test_no_fallback_makes_one_attempt() {
        let client = GatewayClient::new(config(1, 5, false)).unwrap();

        let outcome = client.send_power_command("867206040000114", false).await;
        assert!(!outcome.delivered);
        assert_eq!(outcome.attempts, 1);
    }

    #[tokio::test]
    async fn test_silent_gateway_hits_budget() {
        let gateway = spawn_silent_gateway().await;
        let client = GatewayClient::new(config(gateway.port, 1, true)).unwrap();

        let started = std::time::Instant::now();
        let outcome = client.send_power_command("867206040000114", true).await;
        assert!(!outcome.delivered);
        assert!(outcome.error.is_some());
        assert!(started.elapsed() < Duration::from_secs(4));
    }
}
