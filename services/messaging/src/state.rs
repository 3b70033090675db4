use std::sync::Arc;

use anyhow::Context as _;
use sea_orm::DatabaseConnection;

use crate::config::{EmptyCampaignPolicy, MessagingConfig, RetryPolicy};
use crate::domain::flow::FlowGraph;
use crate::infra::db::{DbCampaignRepository, DbChatSessionRepository, DbDeliveryLedger};
use crate::infra::provider::HttpProviders;
use crate::infra::worker::RetryWorker;
use crate::usecase::chatbot::{ChatSettings, ChatbotEngine};
use crate::usecase::reconcile::StatusReconciler;
use crate::usecase::retry::RetryOrchestrator;
use crate::usecase::session::SweepIdleSessionsUseCase;
use crate::usecase::webhook::ProcessWebhookUseCase;

pub type Orchestrator = RetryOrchestrator<DbDeliveryLedger, DbCampaignRepository, HttpProviders>;
pub type Reconciler = StatusReconciler<DbDeliveryLedger, DbCampaignRepository, HttpProviders>;
pub type Chatbot =
    ChatbotEngine<DbChatSessionRepository, DbDeliveryLedger, DbCampaignRepository, HttpProviders>;
pub type WebhookProcessor = ProcessWebhookUseCase<
    DbChatSessionRepository,
    DbDeliveryLedger,
    DbCampaignRepository,
    HttpProviders,
>;
pub type Worker =
    RetryWorker<DbChatSessionRepository, DbDeliveryLedger, DbCampaignRepository, HttpProviders>;

/// Shared application state passed to every handler via axum `State`.
#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub providers: HttpProviders,
    pub flow: Arc<FlowGraph>,
    pub webhook_verify_token: String,
    pub whatsapp_app_secret: Option<String>,
    pub retry_policy: RetryPolicy,
    pub chat: ChatSettings,
    pub empty_campaign_policy: EmptyCampaignPolicy,
    pub worker_batch_size: u64,
}

impl AppState {
    pub fn new(
        db: DatabaseConnection,
        config: &MessagingConfig,
        flow: FlowGraph,
    ) -> anyhow::Result<Self> {
        let providers = HttpProviders::new(
            config.sms.clone(),
            config.whatsapp.clone(),
            config.provider_timeout,
        )?;
        let idle_timeout = chrono::Duration::from_std(config.session_idle_timeout)
            .context("SESSION_IDLE_TIMEOUT_SECS out of range")?;
        Ok(Self {
            db,
            providers,
            flow: Arc::new(flow),
            webhook_verify_token: config.webhook_verify_token.clone(),
            whatsapp_app_secret: config.whatsapp_app_secret.clone(),
            retry_policy: config.retry,
            chat: ChatSettings {
                hop_cap: config.flow_hop_cap,
                idle_timeout,
            },
            empty_campaign_policy: config.empty_campaign_policy,
            worker_batch_size: config.worker_batch_size,
        })
    }

    pub fn ledger(&self) -> DbDeliveryLedger {
        DbDeliveryLedger {
            db: self.db.clone(),
        }
    }

    pub fn campaigns(&self) -> DbCampaignRepository {
        DbCampaignRepository {
            db: self.db.clone(),
        }
    }

    pub fn sessions(&self) -> DbChatSessionRepository {
        DbChatSessionRepository {
            db: self.db.clone(),
        }
    }

    pub fn orchestrator(&self) -> Orchestrator {
        RetryOrchestrator {
            ledger: self.ledger(),
            campaigns: self.campaigns(),
            provider: self.providers.clone(),
            policy: self.retry_policy,
        }
    }

    pub fn reconciler(&self) -> Reconciler {
        StatusReconciler {
            orchestrator: self.orchestrator(),
        }
    }

    pub fn chatbot(&self) -> Chatbot {
        ChatbotEngine {
            sessions: self.sessions(),
            orchestrator: self.orchestrator(),
            flow: Arc::clone(&self.flow),
            settings: self.chat,
        }
    }

    pub fn webhook(&self) -> WebhookProcessor {
        ProcessWebhookUseCase {
            reconciler: self.reconciler(),
            chatbot: self.chatbot(),
        }
    }

    pub fn retry_worker(&self) -> Worker {
        RetryWorker {
            orchestrator: self.orchestrator(),
            sweep: SweepIdleSessionsUseCase {
                sessions: self.sessions(),
                idle_timeout: self.chat.idle_timeout,
            },
            batch_size: self.worker_batch_size,
        }
    }
}
