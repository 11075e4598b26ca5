//! Application wiring: BLE radio, mirror link and telemetry

use std::sync::Arc;
use std::time::Duration;

use mirrorlink_ble::BtleplugRadio;
use mirrorlink_core::{
    CommandCodec, ConnectionState, IdentitySource, LinkHandle, LinkStatus, MirrorConfig,
    MirrorError, MirrorLink, TelemetryBatcher, TelemetryScheduler, TelemetrySender,
    CONNECTED_COMMAND, DISCONNECTED_COMMAND,
};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::error::{CliError, Result};

/// A running link to the mirror over the platform BLE adapter
pub struct MirrorApp {
    config: AppConfig,
    mirror: MirrorConfig,
    link: LinkHandle,
    task: JoinHandle<()>,
}

impl MirrorApp {
    /// Open the BLE adapter and start the link task
    pub async fn start(config: AppConfig) -> Result<Self> {
        let mirror = config.mirror_config();
        let cipher = config.cipher_context()?;

        let (radio, events) = BtleplugRadio::new().await?;
        let (link, task) = MirrorLink::spawn(radio, events, &mirror, cipher);

        Ok(Self {
            config,
            mirror,
            link,
            task,
        })
    }

    pub fn link(&self) -> &LinkHandle {
        &self.link
    }

    pub fn status(&self) -> LinkStatus {
        self.link.status()
    }

    /// Wait until the link status satisfies `pred`
    pub async fn wait_for(
        &self,
        what: &str,
        within: Duration,
        pred: impl FnMut(&LinkStatus) -> bool,
    ) -> Result<LinkStatus> {
        let mut status = self.link.watch_status();
        let result = match tokio::time::timeout(within, status.wait_for(pred)).await {
            Ok(Ok(status)) => Ok(status.clone()),
            Ok(Err(_)) => Err(MirrorError::LinkClosed.into()),
            Err(_) => Err(CliError::Timeout(what.to_string())),
        };
        result
    }

    /// Scan for the mirror, connect, and announce the link
    pub async fn connect(&self) -> Result<()> {
        info!("Scanning for {}", self.mirror.target_name);
        self.wait_for("the mirror to advertise", self.config.scan_timeout(), |s| {
            s.target_found
        })
        .await?;

        let attempts = self.config.link.connect_attempts;
        let mut attempt = 1;
        loop {
            match self.link.connect().await {
                Ok(()) => break,
                Err(e) if e.is_retryable() && attempt < attempts => {
                    warn!("Connect attempt {}/{} failed: {}", attempt, attempts, e);
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }

        self.wait_for("the command characteristic", self.config.ready_timeout(), |s| {
            s.state == ConnectionState::Ready
        })
        .await?;
        info!("Connected to {}", self.mirror.target_name);

        self.link.send_command(CONNECTED_COMMAND, "").await?;
        Ok(())
    }

    /// Announce the teardown and drop the link
    pub async fn disconnect(&self) -> Result<()> {
        if self.link.is_connected() {
            if let Err(e) = self.link.send_command(DISCONNECTED_COMMAND, "").await {
                warn!("Failed to announce disconnect: {}", e);
            }
        }
        self.link.disconnect().await?;
        Ok(())
    }

    /// Telemetry pipeline writing through this link
    pub fn telemetry(
        &self,
        display_name: String,
    ) -> (TelemetrySender, TelemetryScheduler<LinkHandle>) {
        let identity: Arc<dyn IdentitySource> = Arc::new(move || display_name.clone());
        let (sender, batcher) = TelemetryBatcher::new(self.link.clone(), identity, &self.mirror);
        (sender, TelemetryScheduler::new(batcher, &self.mirror))
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn stop(self) {
        self.task.abort();
    }
}

/// Codec configured from the application settings, for offline use
pub fn offline_codec(config: &AppConfig) -> Result<CommandCodec> {
    Ok(CommandCodec::new(config.cipher_context()?))
}
