//! Campaign Dispatcher - Sends one paced batch of a WhatsApp campaign

use super::protection::{within_sending_hours, ProtectionLedger};
use super::template::MessageRenderer;
use crate::clock::{local_date, local_hour, Clock, SystemClock};
use crate::gateway::{GatewayConnector, GatewayError, MessageGateway};
use barbercast_common::config::DispatcherConfig;
use barbercast_common::types::{CampaignId, PhoneNumber, DEFAULT_COUNTRY_CODE};
use barbercast_common::{Error, Result};
use barbercast_storage::models::{Campaign, CampaignStatus, Contact, ProtectionSettings};
use barbercast_storage::repository::Repositories;
use chrono_tz::Tz;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Dispatcher errors. Every variant except `Storage` is a precondition that
/// stopped the run before anything was sent.
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("campaign not found")]
    CampaignNotFound,

    #[error("campaign already finished")]
    CampaignFinished,

    #[error("marketing disabled")]
    MarketingDisabled,

    #[error("outside allowed hours ({start}h-{end}h)")]
    OutsideAllowedHours { start: u32, end: u32 },

    #[error("daily limit reached ({limit} messages)")]
    DailyLimitReached { limit: u32 },

    #[error("gateway not configured")]
    GatewayNotConfigured,

    #[error("gateway not connected")]
    GatewayNotConnected,

    #[error("campaign already sending")]
    AlreadySending,

    #[error(transparent)]
    Storage(#[from] Error),
}

impl DispatchError {
    /// Returns the HTTP status code for this error
    pub fn http_status(&self) -> u16 {
        match self {
            DispatchError::AlreadySending => 409,
            DispatchError::Storage(_) => 500,
            _ => 400,
        }
    }
}

/// A dispatch trigger
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchRequest {
    pub campaign_id: CampaignId,
    /// Ignore sending hours and the daily limit, send to one contact only
    #[serde(default)]
    pub test_mode: bool,
}

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchOutcome {
    Completed,
    Paused,
    Failed,
}

impl From<DispatchOutcome> for CampaignStatus {
    fn from(outcome: DispatchOutcome) -> Self {
        match outcome {
            DispatchOutcome::Completed => CampaignStatus::Completed,
            DispatchOutcome::Paused => CampaignStatus::Paused,
            DispatchOutcome::Failed => CampaignStatus::Failed,
        }
    }
}

impl std::fmt::Display for DispatchOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", CampaignStatus::from(*self))
    }
}

/// Summary of one run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    pub outcome: DispatchOutcome,
    pub sent: u32,
    pub failed: u32,
    pub message: Option<String>,
    /// Contacts of the campaign still pending after the run
    pub remaining: i64,
}

/// Probe result for the configured gateway
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GatewayHealth {
    pub configured: bool,
    pub connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Dispatcher tuning
#[derive(Debug, Clone)]
pub struct DispatcherOptions {
    /// Civil timezone for sending hours and the daily rollover
    pub timezone: Tz,
    pub country_code: String,
    /// Age after which a `sending` campaign may be claimed again
    pub claim_stale_after: chrono::Duration,
}

impl Default for DispatcherOptions {
    fn default() -> Self {
        Self {
            timezone: chrono_tz::America::Sao_Paulo,
            country_code: DEFAULT_COUNTRY_CODE.to_string(),
            claim_stale_after: chrono::Duration::minutes(30),
        }
    }
}

impl DispatcherOptions {
    pub fn from_config(config: &DispatcherConfig) -> Result<Self> {
        let stale_secs = i64::try_from(config.claim_stale_after_secs)
            .map_err(|_| Error::Config("claim_stale_after_secs is too large".to_string()))?;

        Ok(Self {
            timezone: config.tz()?,
            country_code: config.country_code.clone(),
            claim_stale_after: chrono::Duration::seconds(stale_secs),
        })
    }
}

/// Random pause between two messages, uniform over the configured range
fn random_delay(settings: &ProtectionSettings) -> Duration {
    let lo = u64::from(settings.min_delay_seconds) * 1000;
    let hi = u64::from(settings.max_delay_seconds.max(settings.min_delay_seconds)) * 1000;
    Duration::from_millis(rand::thread_rng().gen_range(lo..=hi))
}

/// What a claimed run works on
struct Batch<'a> {
    campaign: &'a Campaign,
    /// Token returned by the campaign claim
    claim: Uuid,
    /// Contacts to select
    size: u32,
    /// Stop once the daily quota is used up
    enforce_limit: bool,
}

/// Per-run tallies
#[derive(Debug, Default)]
struct RunTally {
    sent: u32,
    failed: u32,
    breaker_tripped: bool,
    claim_lost: bool,
}

/// Campaign dispatcher
pub struct CampaignDispatcher {
    repos: Repositories,
    connector: Arc<dyn GatewayConnector>,
    clock: Arc<dyn Clock>,
    renderer: MessageRenderer,
    options: DispatcherOptions,
}

impl CampaignDispatcher {
    /// Create a new dispatcher on the system clock
    pub fn new(
        repos: Repositories,
        connector: Arc<dyn GatewayConnector>,
        options: DispatcherOptions,
    ) -> Self {
        Self {
            repos,
            connector,
            clock: Arc::new(SystemClock),
            renderer: MessageRenderer::new(),
            options,
        }
    }

    /// Replace the clock
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Run one batch of a campaign
    pub async fn dispatch(
        &self,
        request: DispatchRequest,
    ) -> std::result::Result<DispatchReport, DispatchError> {
        let span = info_span!(
            "dispatch",
            campaign_id = %request.campaign_id,
            test_mode = request.test_mode
        );
        self.dispatch_inner(request).instrument(span).await
    }

    async fn dispatch_inner(
        &self,
        request: DispatchRequest,
    ) -> std::result::Result<DispatchReport, DispatchError> {
        let campaign_id = request.campaign_id;

        let campaign = self
            .repos
            .campaigns
            .get(campaign_id)
            .await?
            .ok_or(DispatchError::CampaignNotFound)?;

        let mut ledger = match ProtectionLedger::load(Arc::clone(&self.repos.settings)).await? {
            Some(ledger) if ledger.settings().is_enabled => ledger,
            _ => return Err(DispatchError::MarketingDisabled),
        };

        let now = self.clock.now();
        ledger
            .roll_over(local_date(now, self.options.timezone))
            .await?;

        if !request.test_mode {
            let settings = ledger.settings();
            let hour = local_hour(now, self.options.timezone);
            if !within_sending_hours(settings, hour) {
                info!(hour = hour, "Outside allowed sending hours");
                return Err(DispatchError::OutsideAllowedHours {
                    start: settings.allowed_start_hour,
                    end: settings.allowed_end_hour,
                });
            }

            if ledger.remaining_today() == 0 {
                info!(
                    sent_today = settings.messages_sent_today,
                    "Daily sending limit reached"
                );
                return Err(DispatchError::DailyLimitReached {
                    limit: ledger.effective_daily_limit(),
                });
            }
        }

        let gateway = self.connect_gateway().await?;

        match gateway.status().await {
            Ok(status) if status.connected => debug!("Gateway connected"),
            Ok(_) => return Err(DispatchError::GatewayNotConnected),
            Err(e) => warn!(error = %e, "Gateway status probe failed, sending anyway"),
        }

        let stale_before = now - self.options.claim_stale_after;
        let Some(claim) = self
            .repos
            .campaigns
            .claim_for_sending(campaign_id, now, stale_before)
            .await?
        else {
            let finished = self
                .repos
                .campaigns
                .get(campaign_id)
                .await?
                .and_then(|c| c.status_enum())
                .is_some_and(|status| status.is_terminal());
            return Err(if finished {
                DispatchError::CampaignFinished
            } else {
                DispatchError::AlreadySending
            });
        };

        let batch = Batch {
            campaign: &campaign,
            claim,
            size: if request.test_mode {
                1
            } else {
                ledger.remaining_today()
            },
            enforce_limit: !request.test_mode,
        };

        match self.run(&batch, &mut ledger, gateway.as_ref()).await {
            Ok(report) => Ok(report),
            Err(e) => {
                error!(error = %e, "Dispatch aborted, releasing campaign");
                if let Err(release) = self
                    .repos
                    .campaigns
                    .release(campaign_id, claim, CampaignStatus::Paused, self.clock.now())
                    .await
                {
                    warn!(error = %release, "Failed to release campaign");
                }
                Err(e.into())
            }
        }
    }

    async fn connect_gateway(
        &self,
    ) -> std::result::Result<Arc<dyn MessageGateway>, DispatchError> {
        let config = self
            .repos
            .gateway_config
            .get()
            .await?
            .filter(|config| config.is_configured())
            .ok_or(DispatchError::GatewayNotConfigured)?;

        self.connector.connect(&config).map_err(|e| {
            warn!(error = %e, "Failed to build gateway client");
            DispatchError::GatewayNotConfigured
        })
    }

    /// Refresh the run's hold on the campaign
    async fn renew_claim(&self, batch: &Batch<'_>) -> Result<bool> {
        let held = self
            .repos
            .campaigns
            .renew_claim(batch.campaign.id, batch.claim, self.clock.now())
            .await?;
        if !held {
            warn!("Campaign was claimed by another run, stopping");
        }
        Ok(held)
    }

    /// The claimed part of a run: send the batch and settle the outcome
    async fn run(
        &self,
        batch: &Batch<'_>,
        ledger: &mut ProtectionLedger,
        gateway: &dyn MessageGateway,
    ) -> Result<DispatchReport> {
        let campaign = batch.campaign;
        let contacts = self
            .repos
            .contacts
            .list_pending(campaign.id, i64::from(batch.size))
            .await?;

        info!(batch = contacts.len(), "Starting campaign batch");

        let mut tally = RunTally::default();
        let total = contacts.len();

        for (index, contact) in contacts.iter().enumerate() {
            if ledger.circuit_open() {
                tally.breaker_tripped = true;
                break;
            }
            if !self.renew_claim(batch).await? {
                tally.claim_lost = true;
                break;
            }
            if !ledger.reserve_send(batch.enforce_limit).await? {
                info!("Daily limit reached during the batch");
                break;
            }

            match self.deliver(campaign, contact, gateway).await {
                Ok(()) => {
                    let marked = self
                        .repos
                        .contacts
                        .mark_sent(contact.id, self.clock.now())
                        .await?;
                    if !marked {
                        // The message went out, so its quota slot stays taken
                        warn!(contact_id = %contact.id, "Contact was no longer pending");
                        tally.claim_lost = true;
                        break;
                    }
                    ledger.record_success().await?;
                    self.repos
                        .campaigns
                        .increment_sent(campaign.id, self.clock.now())
                        .await?;
                    tally.sent += 1;
                    debug!(contact_id = %contact.id, "Message sent");
                }
                Err(reason) => {
                    warn!(contact_id = %contact.id, error = %reason, "Message failed");
                    self.repos.contacts.mark_failed(contact.id, &reason).await?;
                    ledger.record_failure().await?;
                    tally.failed += 1;
                }
            }

            let processed = index + 1;
            if processed == total {
                break;
            }
            if ledger.circuit_open() {
                tally.breaker_tripped = true;
                break;
            }
            if !self.renew_claim(batch).await? {
                tally.claim_lost = true;
                break;
            }

            let settings = ledger.settings();
            tokio::time::sleep(random_delay(settings)).await;

            let pause_every = settings.pause_every_n_messages as usize;
            if pause_every > 0 && processed % pause_every == 0 {
                debug!(
                    processed = processed,
                    seconds = settings.pause_duration_seconds,
                    "Periodic pause"
                );
                tokio::time::sleep(Duration::from_secs(u64::from(
                    settings.pause_duration_seconds,
                )))
                .await;
            }
        }

        let remaining = self.repos.contacts.count_by_status(campaign.id).await?.pending;

        if tally.claim_lost {
            info!(
                sent = tally.sent,
                failed = tally.failed,
                "Campaign batch handed over"
            );
            return Ok(DispatchReport {
                outcome: DispatchOutcome::Paused,
                sent: tally.sent,
                failed: tally.failed,
                message: Some("Sending was taken over by another run.".to_string()),
                remaining,
            });
        }

        let (outcome, message) = if tally.breaker_tripped {
            (
                DispatchOutcome::Paused,
                Some(format!(
                    "Sending paused after {} consecutive errors. Check the WhatsApp connection.",
                    ledger.settings().consecutive_errors
                )),
            )
        } else if tally.sent == 0 && tally.failed > 0 {
            (
                DispatchOutcome::Failed,
                Some("No messages could be sent. Check the WhatsApp connection.".to_string()),
            )
        } else if remaining > 0 {
            (
                DispatchOutcome::Paused,
                Some(format!(
                    "{} contacts remaining, sending resumes tomorrow.",
                    remaining
                )),
            )
        } else {
            (DispatchOutcome::Completed, None)
        };

        if !self
            .repos
            .campaigns
            .release(campaign.id, batch.claim, outcome.into(), self.clock.now())
            .await?
        {
            warn!("Campaign claim lost before the outcome was stored");
        }

        info!(
            outcome = %outcome,
            sent = tally.sent,
            failed = tally.failed,
            remaining = remaining,
            "Campaign batch finished"
        );

        Ok(DispatchReport {
            outcome,
            sent: tally.sent,
            failed: tally.failed,
            message,
            remaining,
        })
    }

    /// Send the campaign message to one contact. Errors carry the detail
    /// stored on the contact.
    async fn deliver(
        &self,
        campaign: &Campaign,
        contact: &Contact,
        gateway: &dyn MessageGateway,
    ) -> std::result::Result<(), String> {
        let phone = PhoneNumber::normalize(&contact.phone, &self.options.country_code)
            .ok_or_else(|| "invalid phone number".to_string())?;
        let message = self.renderer.render(campaign, contact);

        let result = match campaign.image() {
            Some(url) => gateway.send_image(&phone, url, &message).await,
            None => gateway.send_text(&phone, &message).await,
        };

        result.map_err(|e: GatewayError| e.to_string())
    }

    /// Probe the configured gateway without sending anything
    pub async fn gateway_health(&self) -> Result<GatewayHealth> {
        let gateway = match self.connect_gateway().await {
            Ok(gateway) => gateway,
            Err(DispatchError::Storage(e)) => return Err(e),
            Err(_) => {
                return Ok(GatewayHealth {
                    configured: false,
                    connected: false,
                    error: None,
                })
            }
        };

        Ok(match gateway.status().await {
            Ok(status) => GatewayHealth {
                configured: true,
                connected: status.connected,
                error: None,
            },
            Err(e) => GatewayHealth {
                configured: true,
                connected: false,
                error: Some(e.to_string()),
            },
        })
    }
}
