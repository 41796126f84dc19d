//! HTTP and WebSocket server
//!
//! [`AppState`] wires the engine: one live-session table shared by the
//! proximity index and the broadcaster, the scorer and the emergency workflow
//! on top, and the broadcaster plugged into the workflow as its area alerter.

pub mod http;
pub mod websocket;

pub use http::run;

use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::config::Args;
use crate::db::MongoClient;
use crate::emergency::EmergencyWorkflow;
use crate::nats::NatsClient;
use crate::notify::{LogNotifier, NatsNotifier, Notifier, RoutedNotifier, WebhookNotifier};
use crate::proximity::{LiveSessionTable, ProximityIndex};
use crate::realtime::RealtimeBroadcaster;
use crate::safety::SafetyScorer;
use crate::store::{MemoryStore, MongoStore, ReportStore, SpatialStore};
use crate::types::Result;

/// Shared application state
pub struct AppState {
    pub args: Args,
    pub mongo: Option<MongoClient>,
    pub nats: Option<NatsClient>,
    pub index: Arc<ProximityIndex>,
    pub scorer: Arc<SafetyScorer>,
    pub workflow: Arc<EmergencyWorkflow>,
    pub broadcaster: Arc<RealtimeBroadcaster>,
    pub started_at: Instant,
}

impl AppState {
    /// Wire the engine over explicit storage and notification ports
    pub fn with_stores(
        args: Args,
        spatial: Arc<dyn SpatialStore>,
        reports: Arc<dyn ReportStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let live = Arc::new(LiveSessionTable::new(args.max_live_sessions));
        let index = Arc::new(ProximityIndex::new(spatial, live));
        let scorer = Arc::new(SafetyScorer::new(Arc::clone(&index), args.scoring_policy()));
        let broadcaster = Arc::new(RealtimeBroadcaster::new(
            Arc::clone(&index),
            args.broadcaster_config(),
        ));
        let workflow = Arc::new(
            EmergencyWorkflow::new(Arc::clone(&index), reports, notifier, args.workflow_config())
                .with_area_alerter(broadcaster.clone()),
        );

        Self {
            args,
            mongo: None,
            nats: None,
            index,
            scorer,
            workflow,
            broadcaster,
            started_at: Instant::now(),
        }
    }

    /// In-memory store and log-only notifications
    pub fn in_memory(args: Args) -> Self {
        let store = Arc::new(MemoryStore::new());
        Self::with_stores(args, store.clone(), store, Arc::new(LogNotifier))
    }

    /// Build over whichever backends connected.
    ///
    /// Without MongoDB the in-memory store is used; without NATS personal
    /// notifications are only logged. Service notifications go to the dispatch
    /// webhook when one is configured.
    pub async fn with_services(
        args: Args,
        mongo: Option<MongoClient>,
        nats: Option<NatsClient>,
    ) -> Result<Self> {
        let (spatial, reports): (Arc<dyn SpatialStore>, Arc<dyn ReportStore>) = match &mongo {
            Some(client) => {
                let store = Arc::new(MongoStore::new(client.clone()).await?);
                info!(db = client.db_name(), "Using MongoDB store");
                (store.clone() as Arc<dyn SpatialStore>, store as Arc<dyn ReportStore>)
            }
            None => {
                warn!("Using in-memory store; data is lost on restart");
                let store = Arc::new(MemoryStore::new());
                (store.clone() as Arc<dyn SpatialStore>, store as Arc<dyn ReportStore>)
            }
        };

        let personal: Arc<dyn Notifier> = match &nats {
            Some(client) => Arc::new(NatsNotifier::new(client.clone())),
            None => {
                warn!("NATS unavailable; notifications are logged only");
                Arc::new(LogNotifier)
            }
        };
        let services: Arc<dyn Notifier> = match &args.dispatch_webhook_url {
            Some(url) => {
                info!(url = %url, "Service notifications go to dispatch webhook");
                Arc::new(WebhookNotifier::new(
                    url.clone(),
                    Duration::from_millis(args.notification_timeout_ms),
                )?)
            }
            None => Arc::clone(&personal),
        };
        let notifier = Arc::new(RoutedNotifier::new(personal, services));

        let mut state = Self::with_stores(args, spatial, reports, notifier);
        state.mongo = mongo;
        state.nats = nats;
        Ok(state)
    }
}
