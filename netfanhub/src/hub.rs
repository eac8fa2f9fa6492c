use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::api::router;
use crate::config::{HubConfig, HubConfigCli};
use crate::signal::shutdown_signal;
use crate::websocket::{CloseReason, Hub};

/// How long shutdown waits for sessions to finish their close handshakes.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// The hub process: listener, router and the shared broadcast core.
pub struct FanHub {
    hub: Hub,
    listener: TcpListener,
    ws_path: String,
    cancel_token: CancellationToken,
}

impl FanHub {
    pub async fn main(cli: HubConfigCli) {
        let config = match HubConfig::new(&cli) {
            Ok(config) => config,
            Err(e) => {
                tracing_subscriber::fmt().init();
                tracing::error!("{}", e);
                return;
            }
        };
        let _guard = match config.setup_tracing_subscriber() {
            Ok(guard) => guard,
            Err(e) => {
                eprintln!("{e}");
                return;
            }
        };
        match Self::setup(config).await {
            Ok(fan_hub) => {
                if let Err(e) = fan_hub.run().await {
                    tracing::error!("{}", e);
                }
            }
            Err(e) => {
                tracing::error!("{}", e);
            }
        }
    }

    pub async fn setup(config: HubConfig) -> crate::error::Result<Self> {
        tracing::debug!("Hub is setting up");
        let listener = TcpListener::bind(config.bind()).await?;
        Ok(Self {
            hub: Hub::new(config.send_timeout()),
            listener,
            ws_path: config.ws_path().to_string(),
            cancel_token: CancellationToken::new(),
        })
    }

    pub fn hub(&self) -> &Hub {
        &self.hub
    }

    pub fn local_addr(&self) -> crate::error::Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Cancelling the token stops the hub as if a shutdown signal arrived.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    pub async fn run(self) -> crate::error::Result<()> {
        let FanHub {
            hub,
            listener,
            ws_path,
            cancel_token,
        } = self;
        let addr = listener.local_addr()?;
        let app = router(hub.clone(), &ws_path);
        tracing::info!("Hub is listening on: {}, channel at {}", addr, ws_path);
        if let Err(e) = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal(cancel_token))
        .await
        {
            tracing::error!("Server error: {}", e);
        }

        let closing = hub.close_all(CloseReason::going_away()).await;
        tracing::info!(connections = closing, "Hub shutting down");
        let drained = tokio::time::timeout(DRAIN_TIMEOUT, async {
            while hub.registry().count().await > 0 {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await;
        if drained.is_err() {
            let remaining = hub.registry().count().await;
            tracing::warn!(remaining, "Sessions still open after shutdown grace period");
        }
        Ok(())
    }
}
