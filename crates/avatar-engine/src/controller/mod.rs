//! The avatar composition controller.
//!
//! [`AvatarDriver`] owns every part, slot and clip and runs as one task.
//! [`AvatarController`] is the cloneable handle the host keeps.
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use avatar_asset::{catalog::PartCatalog, config::AvatarConfiguration};
use tokio::{
    sync::{broadcast, mpsc, oneshot, watch},
    task::JoinHandle,
    time::Instant,
};

use crate::{
    animation::{PlaybackMode, Pose},
    config::EngineConfig,
    error::ControllerClosed,
    source::{AssetLocator, SceneImporter},
};

pub use driver::AvatarDriver;
pub use view::{AvatarEvent, AvatarView, SlotView};

mod driver;
mod view;

#[derive(Debug)]
pub(crate) enum Command {
    Reconfigure {
        configuration: AvatarConfiguration,
        generation: u64,
    },
    Play {
        clip: String,
        mode: PlaybackMode,
    },
    Stop,
    Pause,
    SamplePoses {
        now: Instant,
        reply: oneshot::Sender<Vec<Pose>>,
    },
    Shutdown,
}

#[derive(Debug, Clone)]
pub struct AvatarController {
    commands: mpsc::UnboundedSender<Command>,
    ready: watch::Receiver<bool>,
    settled: watch::Receiver<u64>,
    view: watch::Receiver<AvatarView>,
    events: broadcast::Sender<AvatarEvent>,
    generation: Arc<AtomicU64>,
}

impl AvatarController {
    pub fn new<L, I>(
        config: EngineConfig,
        catalog: PartCatalog,
        locator: L,
        importer: I,
    ) -> (Self, AvatarDriver<L, I>)
    where
        L: AssetLocator,
        I: SceneImporter,
    {
        let (commands, command_receiver) = mpsc::unbounded_channel();
        let (ready_sender, ready) = watch::channel(false);
        let (settled_sender, settled) = watch::channel(0);
        let (view_sender, view) = watch::channel(AvatarView::default());
        let (events, _) = broadcast::channel(config.event_capacity.max(1));

        let driver = AvatarDriver::new(
            config,
            catalog,
            Arc::new(locator),
            Arc::new(importer),
            command_receiver,
            driver::Outputs {
                ready: ready_sender,
                settled: settled_sender,
                view: view_sender,
                events: events.clone(),
            },
        );
        let controller = Self {
            commands,
            ready,
            settled,
            view,
            events,
            generation: Arc::new(AtomicU64::new(0)),
        };
        (controller, driver)
    }

    /// Create the controller and run its driver on the current runtime.
    pub fn spawn<L, I>(
        config: EngineConfig,
        catalog: PartCatalog,
        locator: L,
        importer: I,
    ) -> (Self, JoinHandle<()>)
    where
        L: AssetLocator,
        I: SceneImporter,
    {
        let (controller, driver) = Self::new(config, catalog, locator, importer);
        (controller, tokio::spawn(driver.run()))
    }

    fn send(&self, command: Command) -> Result<(), ControllerClosed> {
        self.commands.send(command).map_err(|_| ControllerClosed)
    }

    /// Replace the desired configuration. Returns the generation number that
    /// [`AvatarController::wait_settled`] accepts.
    pub fn reconfigure(&self, configuration: AvatarConfiguration) -> Result<u64, ControllerClosed> {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        self.send(Command::Reconfigure {
            configuration,
            generation,
        })?;
        Ok(generation)
    }

    /// Whether the most recently requested configuration has settled with
    /// its clips attached.
    pub fn is_animation_ready(&self) -> bool {
        let generation = self.generation.load(Ordering::Relaxed);
        *self.settled.borrow() >= generation && *self.ready.borrow()
    }

    /// Raw readiness flag as published by the driver. It lags behind
    /// [`AvatarController::reconfigure`] until the driver has picked the
    /// request up.
    pub fn readiness(&self) -> watch::Receiver<bool> {
        self.ready.clone()
    }

    /// Wait until the most recently requested configuration has settled and
    /// the animation is ready.
    pub async fn ready(&self) -> Result<(), ControllerClosed> {
        self.wait_settled(self.generation.load(Ordering::Relaxed))
            .await?;
        let mut ready = self.ready.clone();
        ready
            .wait_for(|ready| *ready)
            .await
            .map(|_| ())
            .map_err(|_| ControllerClosed)
    }

    /// Wait until every load of `generation` or a later configuration has
    /// settled.
    pub async fn wait_settled(&self, generation: u64) -> Result<(), ControllerClosed> {
        let mut settled = self.settled.clone();
        settled
            .wait_for(|settled| *settled >= generation)
            .await
            .map(|_| ())
            .map_err(|_| ControllerClosed)
    }

    pub fn play_clip(&self, clip: impl Into<String>) -> Result<(), ControllerClosed> {
        self.play_clip_with(clip, PlaybackMode::Repeat)
    }

    pub fn play_clip_with(
        &self,
        clip: impl Into<String>,
        mode: PlaybackMode,
    ) -> Result<(), ControllerClosed> {
        self.send(Command::Play {
            clip: clip.into(),
            mode,
        })
    }

    pub fn stop_clip(&self) -> Result<(), ControllerClosed> {
        self.send(Command::Stop)
    }

    pub fn pause_clip(&self) -> Result<(), ControllerClosed> {
        self.send(Command::Pause)
    }

    /// Poses of every skeleton with a clip in play.
    pub async fn sample_poses(&self, now: Instant) -> Result<Vec<Pose>, ControllerClosed> {
        let (reply, response) = oneshot::channel();
        self.send(Command::SamplePoses { now, reply })?;
        response.await.map_err(|_| ControllerClosed)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AvatarEvent> {
        self.events.subscribe()
    }

    pub fn view(&self) -> watch::Receiver<AvatarView> {
        self.view.clone()
    }

    /// Dispose everything and stop the driver.
    pub fn shutdown(&self) -> Result<(), ControllerClosed> {
        self.send(Command::Shutdown)
    }
}
