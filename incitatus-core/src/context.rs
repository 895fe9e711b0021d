//! The application context shared by every processor.

use crate::config::{BotConfig, BotSettings, ConfigStore, Surface};
use crate::entities::Ledgers;
use crate::framework::{JsonDocument, LedgerProcessor, StoragePaths, StoreError};
use crate::game_data::GameDataSource;
use crate::ids::GuildId;
use crate::platform::ChatPlatform;
use crate::processors::cleanup::CleanupScheduler;
use crate::processors::event_machine::EventState;
use crate::utils::cooldown::CooldownTracker;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Everything a handler needs, created once at startup from the persisted
/// documents and flushed at shutdown.
///
/// Cloning is cheap; all state is shared.
#[derive(Clone)]
pub struct BotContext {
    pub guild: GuildId,
    pub config: ConfigStore<BotConfig>,
    pub ledgers: LedgerProcessor,
    pub platform: Arc<dyn ChatPlatform>,
    pub game_data: Arc<dyn GameDataSource>,
    pub settings: Arc<BotSettings>,
    pub cleanup: CleanupScheduler,
    pub(crate) event: Arc<Mutex<EventState>>,
    pub(crate) register_cooldown: CooldownTracker,
    /// One lock per surface so two refreshes of the same anchor never race
    /// into creating two messages.
    pub(crate) surface_locks: Arc<[Mutex<()>; Surface::COUNT]>,
}

impl BotContext {
    pub async fn open(
        guild: GuildId,
        paths: &StoragePaths,
        platform: Arc<dyn ChatPlatform>,
        game_data: Arc<dyn GameDataSource>,
        settings: BotSettings,
    ) -> Result<Self, StoreError> {
        let config = ConfigStore::<BotConfig>::open(JsonDocument::new(&paths.config)).await?;
        let ledgers = LedgerProcessor {
            ledgers: Arc::new(Ledgers::open(paths).await?),
        };
        let event_count = config.read().await.event_count;
        let cleanup = CleanupScheduler::new(
            platform.clone(),
            config.clone(),
            settings.cleanup_delay,
            settings.purge_scan_limit,
        );

        tracing::info!(%guild, event_count, "Bot context opened");

        Ok(Self {
            guild,
            config,
            ledgers,
            platform,
            game_data,
            register_cooldown: CooldownTracker::new(settings.registration_cooldown),
            settings: Arc::new(settings),
            cleanup,
            event: Arc::new(Mutex::new(EventState::idle(event_count))),
            surface_locks: Arc::new(std::array::from_fn(|_| Mutex::new(()))),
        })
    }

    /// Rewrite every persisted document. Called once at shutdown.
    pub async fn flush(&self) -> Result<(), StoreError> {
        self.cleanup.cancel_all().await;
        self.config.flush().await?;
        self.ledgers.ledgers.flush().await
    }
}
