//! Command handlers for the mirrorlink CLI

use std::time::Duration;

use mirrorlink_core::{Command, CommandCodec, LinkStatus, TelemetrySender};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};

use crate::app::{offline_codec, MirrorApp};
use crate::cli::{Cli, Commands};
use crate::config::AppConfig;
use crate::error::Result;

/// Command dispatcher for handling CLI commands
pub struct CommandDispatcher;

impl CommandDispatcher {
    /// Execute a CLI command
    pub async fn execute(cli: Cli, config: AppConfig) -> Result<()> {
        match cli.command {
            Commands::Run { name } => Self::handle_run_command(config, name).await,
            Commands::Send { key, value } => {
                Self::handle_send_command(config, Command::new(key, value.unwrap_or_default()))
                    .await
            }
            Commands::Scan { duration, json } => {
                Self::handle_scan_command(config, Duration::from_secs(duration), json).await
            }
            Commands::Encode { key, value } => {
                let codec = offline_codec(&config)?;
                let command = Command::new(key, value.unwrap_or_default());
                println!("{}", encode_payload(&codec, &command));
                Ok(())
            }
            Commands::Decode { payload } => {
                let codec = offline_codec(&config)?;
                println!("{}", codec.decode(payload.trim().as_bytes())?);
                Ok(())
            }
        }
    }

    /// Connect and relay stdin lines until EOF or Ctrl-C
    async fn handle_run_command(config: AppConfig, name: Option<String>) -> Result<()> {
        let display_name = name.unwrap_or_else(|| config.identity.name.clone());
        let app = MirrorApp::start(config).await?;
        app.connect().await?;

        let (sender, mut scheduler) = app.telemetry(display_name);
        scheduler.set_enabled(true).await;
        info!("Relaying telemetry from stdin; Ctrl-C to stop");

        let stdin = BufReader::new(tokio::io::stdin());
        tokio::select! {
            result = relay_lines(stdin, &sender) => {
                let relayed = result?;
                info!("stdin closed after {} entries", relayed);
                // Send what is still queued before leaving
                let report = scheduler.flush_now().await;
                info!("Final flush: {} sent, {} failed", report.sent, report.failed.len());
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
            }
        }

        scheduler.set_enabled(false).await;
        app.disconnect().await?;
        app.stop();
        Ok(())
    }

    async fn handle_send_command(config: AppConfig, command: Command) -> Result<()> {
        let app = MirrorApp::start(config).await?;
        app.connect().await?;

        let sent = app.link().send(command.clone()).await;
        let disconnected = app.disconnect().await;
        app.stop();

        sent?;
        disconnected?;
        info!("Sent {}", command);
        Ok(())
    }

    async fn handle_scan_command(config: AppConfig, duration: Duration, json: bool) -> Result<()> {
        let app = MirrorApp::start(config).await?;
        let mut status = app.link().watch_status();
        let mut last_seen: Option<String> = None;

        let deadline = tokio::time::sleep(duration);
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                _ = &mut deadline => break,
                changed = status.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let current = status.borrow_and_update().clone();
                    if current.most_recent_advertiser != last_seen {
                        last_seen = current.most_recent_advertiser.clone();
                        if let Some(name) = &last_seen {
                            println!("{}", name);
                        }
                    }
                }
            }
        }

        let final_status = app.status();
        if json {
            println!("{}", serde_json::to_string_pretty(&final_status)?);
        } else {
            print_status(&final_status, &app.config().link.target_name);
        }
        app.disconnect().await?;
        app.stop();
        Ok(())
    }
}

/// Wire payload for `command` as printable text
pub fn encode_payload(codec: &CommandCodec, command: &Command) -> String {
    String::from_utf8_lossy(&codec.encode(command)).into_owned()
}

/// Push every parseable line into the telemetry queue; returns how many were queued
pub async fn relay_lines<R>(reader: R, sender: &TelemetrySender) -> Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut relayed = 0;
    while let Some(line) = lines.next_line().await? {
        match Command::parse(&line) {
            Some(entry) => {
                debug!("Queued {}", entry);
                sender.push_entry(entry);
                relayed += 1;
            }
            None if line.trim().is_empty() => {}
            None => warn!("Ignoring malformed line: {}", line),
        }
    }
    Ok(relayed)
}

fn print_status(status: &LinkStatus, target_name: &str) {
    println!("Adapter:      {}", status.adapter);
    println!("Link state:   {}", status.state);
    println!(
        "Mirror:       {}",
        if status.target_found {
            format!("{} found", target_name)
        } else {
            format!("{} not seen", target_name)
        }
    );
    println!(
        "Last seen:    {}",
        status.most_recent_advertiser.as_deref().unwrap_or("-")
    );
}
