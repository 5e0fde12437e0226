//! In-memory stand-ins for the database, the gateway and the clock

use crate::campaign::protection::daily_rollover;
use crate::clock::Clock;
use crate::gateway::{GatewayConnector, GatewayError, GatewayStatus, MessageGateway};
use async_trait::async_trait;
use barbercast_common::types::{CampaignId, ContactId, PhoneNumber};
use barbercast_common::{Error, Result};
use barbercast_storage::models::{
    Campaign, CampaignStatus, Contact, ContactCounts, GatewayConfig, ProtectionSettings,
    UpdateProtectionSettings,
};
use barbercast_storage::repository::{
    CampaignRepository, ContactRepository, GatewayConfigRepository, Repositories,
    SettingsRepository,
};
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

/// A draft campaign with `message` as its template
pub fn campaign(message: &str) -> Campaign {
    let now = Utc::now();
    Campaign {
        id: Uuid::new_v4(),
        name: "Promo".to_string(),
        message: message.to_string(),
        image_url: None,
        button_text: None,
        button_url: None,
        status: CampaignStatus::Draft.to_string(),
        sent_count: 0,
        claim_token: None,
        created_at: now,
        updated_at: now,
        started_at: None,
        completed_at: None,
    }
}

/// Default settings with marketing switched on
pub fn enabled_settings() -> ProtectionSettings {
    ProtectionSettings {
        id: Uuid::new_v4(),
        is_enabled: true,
        ..ProtectionSettings::default()
    }
}

/// An enabled gateway configuration
pub fn gateway_config() -> GatewayConfig {
    GatewayConfig {
        id: Uuid::new_v4(),
        enabled: true,
        api_endpoint: Some("https://v5.chatpro.com.br/chatpro-test".to_string()),
        api_token: Some("test-token".to_string()),
        instance_id: Some("chatpro-test".to_string()),
        updated_at: Utc::now(),
    }
}

#[derive(Default)]
struct State {
    campaigns: Vec<Campaign>,
    contacts: Vec<Contact>,
    settings: Option<ProtectionSettings>,
    gateway_config: Option<GatewayConfig>,
}

/// In-memory implementation of every repository trait
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Repositories backed by this store
    pub fn repositories(self: &Arc<Self>) -> Repositories {
        Repositories {
            campaigns: self.clone(),
            contacts: self.clone(),
            settings: self.clone(),
            gateway_config: self.clone(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // A panicking test poisons the lock; the data is still usable
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn insert_campaign(&self, campaign: Campaign) {
        self.lock().campaigns.push(campaign);
    }

    pub fn insert_contact(
        &self,
        campaign_id: CampaignId,
        name: Option<&str>,
        phone: &str,
    ) -> ContactId {
        let id = Uuid::new_v4();
        self.lock().contacts.push(Contact {
            id,
            campaign_id,
            name: name.map(str::to_string),
            phone: phone.to_string(),
            status: "pending".to_string(),
            error_message: None,
            sent_at: None,
            created_at: Utc::now(),
        });
        id
    }

    pub fn set_settings(&self, settings: ProtectionSettings) {
        self.lock().settings = Some(settings);
    }

    pub fn clear_settings(&self) {
        self.lock().settings = None;
    }

    pub fn update_settings(&self, f: impl FnOnce(&mut ProtectionSettings)) {
        if let Some(settings) = self.lock().settings.as_mut() {
            f(settings);
        }
    }

    pub fn set_gateway_config(&self, config: GatewayConfig) {
        self.lock().gateway_config = Some(config);
    }

    pub fn update_gateway_config(&self, f: impl FnOnce(&mut GatewayConfig)) {
        if let Some(config) = self.lock().gateway_config.as_mut() {
            f(config);
        }
    }

    pub fn update_campaign(&self, id: CampaignId, f: impl FnOnce(&mut Campaign)) {
        if let Some(campaign) = self.lock().campaigns.iter_mut().find(|c| c.id == id) {
            f(campaign);
        }
    }

    pub fn campaign(&self, id: CampaignId) -> Option<Campaign> {
        self.lock().campaigns.iter().find(|c| c.id == id).cloned()
    }

    pub fn contacts(&self, campaign_id: CampaignId) -> Vec<Contact> {
        self.lock()
            .contacts
            .iter()
            .filter(|c| c.campaign_id == campaign_id)
            .cloned()
            .collect()
    }

    pub fn settings(&self) -> Option<ProtectionSettings> {
        self.lock().settings.clone()
    }

    fn with_settings<T>(
        &self,
        id: Uuid,
        f: impl FnOnce(&mut ProtectionSettings) -> T,
    ) -> Result<T> {
        match self.lock().settings.as_mut() {
            Some(settings) if settings.id == id => Ok(f(settings)),
            _ => Err(Error::NotFound(format!("Marketing settings {}", id))),
        }
    }
}

#[async_trait]
impl CampaignRepository for MemoryStore {
    async fn get(&self, id: CampaignId) -> Result<Option<Campaign>> {
        Ok(self.campaign(id))
    }

    async fn claim_for_sending(
        &self,
        id: CampaignId,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> Result<Option<Uuid>> {
        let mut state = self.lock();
        let Some(campaign) = state.campaigns.iter_mut().find(|c| c.id == id) else {
            return Ok(None);
        };

        let claimable = match campaign.status_enum() {
            Some(CampaignStatus::Draft | CampaignStatus::Paused) => true,
            Some(CampaignStatus::Sending) => campaign.updated_at < stale_before,
            _ => false,
        };
        if !claimable {
            return Ok(None);
        }

        let claim = Uuid::new_v4();
        campaign.status = CampaignStatus::Sending.to_string();
        campaign.claim_token = Some(claim);
        campaign.started_at.get_or_insert(now);
        campaign.updated_at = now;
        Ok(Some(claim))
    }

    async fn renew_claim(&self, id: CampaignId, claim: Uuid, now: DateTime<Utc>) -> Result<bool> {
        let mut state = self.lock();
        match state.campaigns.iter_mut().find(|c| {
            c.id == id
                && c.status_enum() == Some(CampaignStatus::Sending)
                && c.claim_token == Some(claim)
        }) {
            Some(campaign) => {
                campaign.updated_at = now;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn increment_sent(&self, id: CampaignId, now: DateTime<Utc>) -> Result<i32> {
        let mut state = self.lock();
        let campaign = state
            .campaigns
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| Error::NotFound(format!("Campaign {}", id)))?;
        campaign.sent_count += 1;
        campaign.updated_at = now;
        Ok(campaign.sent_count)
    }

    async fn release(
        &self,
        id: CampaignId,
        claim: Uuid,
        status: CampaignStatus,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let mut state = self.lock();
        match state
            .campaigns
            .iter_mut()
            .find(|c| c.id == id && c.claim_token == Some(claim))
        {
            Some(campaign) => {
                campaign.status = status.to_string();
                campaign.claim_token = None;
                campaign.updated_at = now;
                if status.is_terminal() {
                    campaign.completed_at = Some(now);
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl ContactRepository for MemoryStore {
    async fn list_pending(&self, campaign_id: CampaignId, limit: i64) -> Result<Vec<Contact>> {
        let limit = usize::try_from(limit).unwrap_or(0);
        Ok(self
            .lock()
            .contacts
            .iter()
            .filter(|c| c.campaign_id == campaign_id && c.status == "pending")
            .take(limit)
            .cloned()
            .collect())
    }

    async fn mark_sent(&self, id: ContactId, sent_at: DateTime<Utc>) -> Result<bool> {
        let mut state = self.lock();
        match state
            .contacts
            .iter_mut()
            .find(|c| c.id == id && c.status == "pending")
        {
            Some(contact) => {
                contact.status = "sent".to_string();
                contact.sent_at = Some(sent_at);
                contact.error_message = None;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn mark_failed(&self, id: ContactId, error: &str) -> Result<bool> {
        let mut state = self.lock();
        match state
            .contacts
            .iter_mut()
            .find(|c| c.id == id && c.status == "pending")
        {
            Some(contact) => {
                contact.status = "failed".to_string();
                contact.error_message = Some(error.to_string());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn count_by_status(&self, campaign_id: CampaignId) -> Result<ContactCounts> {
        let mut counts = ContactCounts::default();
        for contact in self.contacts(campaign_id) {
            match contact.status.as_str() {
                "pending" => counts.pending += 1,
                "sent" => counts.sent += 1,
                "failed" => counts.failed += 1,
                _ => {}
            }
        }
        Ok(counts)
    }
}

#[async_trait]
impl SettingsRepository for MemoryStore {
    async fn get(&self) -> Result<Option<ProtectionSettings>> {
        Ok(self.settings())
    }

    async fn roll_over(&self, id: Uuid, today: NaiveDate) -> Result<Option<ProtectionSettings>> {
        self.with_settings(id, |settings| {
            let rolled = daily_rollover(settings, today)?;
            *settings = rolled.clone();
            Some(rolled)
        })
    }

    async fn reserve_send(
        &self,
        id: Uuid,
        limit: Option<u32>,
    ) -> Result<Option<ProtectionSettings>> {
        self.with_settings(id, |settings| {
            if limit.is_some_and(|limit| settings.messages_sent_today >= limit) {
                return None;
            }
            settings.messages_sent_today += 1;
            Some(settings.clone())
        })
    }

    async fn record_success(&self, id: Uuid) -> Result<ProtectionSettings> {
        self.with_settings(id, |settings| {
            settings.consecutive_errors = 0;
            settings.clone()
        })
    }

    async fn record_failure(&self, id: Uuid) -> Result<ProtectionSettings> {
        self.with_settings(id, |settings| {
            settings.messages_sent_today = settings.messages_sent_today.saturating_sub(1);
            settings.consecutive_errors += 1;
            settings.clone()
        })
    }

    async fn update(
        &self,
        id: Uuid,
        input: UpdateProtectionSettings,
    ) -> Result<Option<ProtectionSettings>> {
        let current = match self.settings() {
            Some(settings) if settings.id == id => settings,
            _ => return Ok(None),
        };
        let next = input.apply_to(&current)?;
        self.set_settings(next.clone());
        Ok(Some(next))
    }
}

#[async_trait]
impl GatewayConfigRepository for MemoryStore {
    async fn get(&self) -> Result<Option<GatewayConfig>> {
        Ok(self.lock().gateway_config.clone())
    }
}

/// What the fake gateway answers to a status probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Probe {
    Connected,
    Disconnected,
    Error,
}

/// A message accepted by [`FakeGateway`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub to: String,
    pub text: String,
    pub image_url: Option<String>,
}

/// Scripted gateway recording every send attempt
pub struct FakeGateway {
    probe: Mutex<Probe>,
    script: Mutex<VecDeque<bool>>,
    succeed_by_default: Mutex<bool>,
    attempts: Mutex<usize>,
    sent: Mutex<Vec<SentMessage>>,
}

impl FakeGateway {
    pub fn new(probe: Probe) -> Arc<Self> {
        Arc::new(Self {
            probe: Mutex::new(probe),
            script: Mutex::new(VecDeque::new()),
            succeed_by_default: Mutex::new(true),
            attempts: Mutex::new(0),
            sent: Mutex::new(Vec::new()),
        })
    }

    pub fn set_probe(&self, probe: Probe) {
        *lock(&self.probe) = probe;
    }

    /// Outcomes for the next sends, in order; later sends use the default
    pub fn script(&self, outcomes: impl IntoIterator<Item = bool>) {
        lock(&self.script).extend(outcomes);
    }

    pub fn fail_by_default(&self) {
        *lock(&self.succeed_by_default) = false;
    }

    /// Number of send calls, successful or not
    pub fn attempts(&self) -> usize {
        *lock(&self.attempts)
    }

    /// Messages the gateway accepted
    pub fn sent(&self) -> Vec<SentMessage> {
        lock(&self.sent).clone()
    }

    fn send(
        &self,
        to: &PhoneNumber,
        text: &str,
        image_url: Option<&str>,
    ) -> std::result::Result<(), GatewayError> {
        *lock(&self.attempts) += 1;

        let succeed = lock(&self.script)
            .pop_front()
            .unwrap_or_else(|| *lock(&self.succeed_by_default));
        if !succeed {
            return Err(GatewayError::Rejected {
                status: 500,
                body: "session unavailable".to_string(),
            });
        }

        lock(&self.sent).push(SentMessage {
            to: to.as_str().to_string(),
            text: text.to_string(),
            image_url: image_url.map(str::to_string),
        });
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

#[async_trait]
impl MessageGateway for FakeGateway {
    async fn status(&self) -> std::result::Result<GatewayStatus, GatewayError> {
        match *lock(&self.probe) {
            Probe::Connected => Ok(GatewayStatus { connected: true }),
            Probe::Disconnected => Ok(GatewayStatus { connected: false }),
            Probe::Error => Err(GatewayError::Decode("probe unavailable".to_string())),
        }
    }

    async fn send_text(
        &self,
        to: &PhoneNumber,
        message: &str,
    ) -> std::result::Result<(), GatewayError> {
        self.send(to, message, None)
    }

    async fn send_image(
        &self,
        to: &PhoneNumber,
        image_url: &str,
        caption: &str,
    ) -> std::result::Result<(), GatewayError> {
        self.send(to, caption, Some(image_url))
    }
}

/// Connector handing out one shared [`FakeGateway`]
pub struct FakeConnector {
    gateway: Arc<FakeGateway>,
}

impl FakeConnector {
    pub fn new(gateway: Arc<FakeGateway>) -> Self {
        Self { gateway }
    }
}

impl GatewayConnector for FakeConnector {
    fn connect(
        &self,
        config: &GatewayConfig,
    ) -> std::result::Result<Arc<dyn MessageGateway>, GatewayError> {
        if !config.is_configured() {
            return Err(GatewayError::NotConfigured);
        }
        Ok(self.gateway.clone())
    }
}

/// A clock that only moves when told to
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *lock(&self.now) = now;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *lock(&self.now)
    }
}
