//! Application state shared across handlers

use std::sync::Arc;

use axum::extract::FromRef;
use sqlx::PgPool;

use crate::ai::{CompletionApi, DraftGenerator};
use crate::auth::TokenVerifier;
use crate::chats::ChatService;
use crate::config::{CompletionConfig, GatewayConfig, MarketplaceConfig};
use crate::ledger::Ledger;
use crate::marketplace::MarketplaceApi;
use crate::payments::PaymentService;
use crate::reviews::{AutoReplier, ReplyDispatcher, ReviewService};
use crate::store::Store;
use crate::sync::Reconciler;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub token_verifier: Arc<TokenVerifier>,
    pub reconciler: Arc<Reconciler>,
    pub generator: Arc<DraftGenerator>,
    pub dispatcher: Arc<ReplyDispatcher>,
    pub auto_replier: Arc<AutoReplier>,
    pub review_service: Arc<ReviewService>,
    pub chat_service: Arc<ChatService>,
    pub payment_service: Arc<PaymentService>,
    pub ledger: Arc<Ledger>,
    /// Present when backed by PostgreSQL; used by the health check
    pub db_pool: Option<PgPool>,
}

impl AppState {
    /// Wire every service over one store and one pair of upstream clients
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn Store>,
        marketplace: Arc<dyn MarketplaceApi>,
        completion: Option<Arc<dyn CompletionApi>>,
        jwt_secret: &str,
        marketplace_config: MarketplaceConfig,
        completion_config: CompletionConfig,
        gateway: Option<GatewayConfig>,
        db_pool: Option<PgPool>,
    ) -> Self {
        let generator = DraftGenerator::new(store.clone(), completion, completion_config);
        let dispatcher = ReplyDispatcher::new(store.clone(), marketplace.clone());
        let auto_replier = AutoReplier::new(store.clone(), generator.clone(), dispatcher.clone());

        Self {
            token_verifier: Arc::new(TokenVerifier::new(jwt_secret)),
            reconciler: Arc::new(Reconciler::new(
                store.clone(),
                marketplace.clone(),
                marketplace_config,
            )),
            generator: Arc::new(generator),
            dispatcher: Arc::new(dispatcher),
            auto_replier: Arc::new(auto_replier),
            review_service: Arc::new(ReviewService::new(store.clone())),
            chat_service: Arc::new(ChatService::new(store.clone(), marketplace)),
            payment_service: Arc::new(PaymentService::new(store.clone(), gateway)),
            ledger: Arc::new(Ledger::new(store.clone())),
            store,
            db_pool,
        }
    }
}

impl FromRef<AppState> for Arc<TokenVerifier> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.token_verifier.clone()
    }
}

impl FromRef<AppState> for Arc<dyn Store> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.store.clone()
    }
}

impl FromRef<AppState> for Arc<Reconciler> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.reconciler.clone()
    }
}

impl FromRef<AppState> for Arc<DraftGenerator> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.generator.clone()
    }
}

impl FromRef<AppState> for Arc<ReplyDispatcher> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.dispatcher.clone()
    }
}

impl FromRef<AppState> for Arc<AutoReplier> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.auto_replier.clone()
    }
}

impl FromRef<AppState> for Arc<ReviewService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.review_service.clone()
    }
}

impl FromRef<AppState> for Arc<ChatService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.chat_service.clone()
    }
}

impl FromRef<AppState> for Arc<PaymentService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.payment_service.clone()
    }
}

impl FromRef<AppState> for Arc<Ledger> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.ledger.clone()
    }
}
