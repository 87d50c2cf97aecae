use std::{
    env,
    error::Error,
    fmt::{self, Debug, Display, Formatter},
    fs::File,
    io::{self, BufReader},
    path::{Path, PathBuf},
    time::Duration,
};

use avatar_engine::{
    animation::PlaybackMode,
    asset::{
        catalog::PartCatalog,
        config::{AvatarConfiguration, Gender},
    },
    config::EngineConfig,
    controller::{AvatarController, AvatarEvent},
    error::ControllerClosed,
    source::fs::{DirectoryLocator, GltfImporter},
};
use log::{info, warn};
use serde::{de::DeserializeOwned, Deserialize};
use tokio::{
    sync::broadcast::error::RecvError,
    time::{sleep, Instant},
};

const USAGE: &str = "avatar-viewer <asset-dir> <catalog.json> <script.json>";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum Step {
    Reconfigure(AvatarConfiguration),
    /// Reconfigure with the catalog's default for a gender.
    Default(Gender),
    WaitSettled,
    WaitReady,
    Play(String),
    PlayWith { clip: String, mode: PlaybackMode },
    Pause,
    Stop,
    Sample,
    SleepMs(u64),
}

#[derive(Debug, Deserialize)]
struct Script {
    #[serde(default)]
    engine: EngineConfig,
    steps: Vec<Step>,
}

enum ViewerError {
    Usage,
    Io(PathBuf, io::Error),
    Json(PathBuf, serde_json::Error),
    Closed(ControllerClosed),
}

impl Debug for ViewerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(self, f)
    }
}

impl Display for ViewerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ViewerError::Usage => write!(f, "Usage: {}", USAGE),
            ViewerError::Io(path, error) => {
                write!(f, "Failed to read {}: {}", path.display(), error)
            }
            ViewerError::Json(path, error) => {
                write!(f, "Failed to parse {}: {}", path.display(), error)
            }
            ViewerError::Closed(error) => Display::fmt(error, f),
        }
    }
}

impl Error for ViewerError {}

impl From<ControllerClosed> for ViewerError {
    fn from(value: ControllerClosed) -> Self {
        Self::Closed(value)
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, ViewerError> {
    let file = File::open(path).map_err(|error| ViewerError::Io(path.to_path_buf(), error))?;
    serde_json::from_reader(BufReader::new(file))
        .map_err(|error| ViewerError::Json(path.to_path_buf(), error))
}

fn log_event(event: &AvatarEvent) {
    match event {
        AvatarEvent::SlotEnabled { slot, tag } => info!("+ {} {}", slot, tag),
        AvatarEvent::SlotDisposed { slot, tag } => info!("- {} {}", slot, tag),
        AvatarEvent::LoadFailed { slot, tag, error } => {
            warn!("! {} {}: {}", slot, tag, error)
        }
        AvatarEvent::LoadDiscarded { slot, tag } => info!("~ {} {}", slot, tag),
        AvatarEvent::GenderSwitchStarted { from, to } => {
            info!("Switching {:?} -> {}", from, to)
        }
        AvatarEvent::GenderSwitchAbandoned { gender } => info!("Abandoned switch to {}", gender),
        AvatarEvent::GenderCommitted { gender, slots } => {
            info!("Committed {} with {:?}", gender, slots)
        }
        AvatarEvent::ClipsAttached { gender, clips } => info!("Clips of {}: {:?}", gender, clips),
        AvatarEvent::AnimationPackFailed { gender, error } => {
            warn!("No animation for {}: {}", gender, error)
        }
        AvatarEvent::Ready { generation } => info!("Ready #{}", generation),
    }
}

async fn run_step(
    controller: &AvatarController,
    catalog: &PartCatalog,
    generation: &mut u64,
    step: Step,
) -> Result<(), ViewerError> {
    match step {
        Step::Reconfigure(configuration) => *generation = controller.reconfigure(configuration)?,
        Step::Default(gender) => match catalog.default_configuration(gender) {
            Some(configuration) => *generation = controller.reconfigure(configuration)?,
            None => warn!("Catalog has no body for {}", gender),
        },
        Step::WaitSettled => controller.wait_settled(*generation).await?,
        Step::WaitReady => controller.ready().await?,
        Step::Play(clip) => controller.play_clip(clip)?,
        Step::PlayWith { clip, mode } => controller.play_clip_with(clip, mode)?,
        Step::Pause => controller.pause_clip()?,
        Step::Stop => controller.stop_clip()?,
        Step::Sample => {
            let poses = controller.sample_poses(Instant::now()).await?;
            info!("{} poses", poses.len());
            for pose in poses {
                info!(
                    "  skeleton {} {} at {:.3}s, {} bones",
                    pose.skeleton,
                    pose.clip,
                    pose.time.as_secs_f32(),
                    pose.transforms.len()
                );
            }
        }
        Step::SleepMs(millis) => sleep(Duration::from_millis(millis)).await,
    }
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), ViewerError> {
    env_logger::init();
    let mut args = env::args_os().skip(1);
    let (Some(asset_dir), Some(catalog), Some(script)) = (args.next(), args.next(), args.next())
    else {
        return Err(ViewerError::Usage);
    };
    let catalog: PartCatalog = read_json(Path::new(&catalog))?;
    let script: Script = read_json(Path::new(&script))?;

    let (controller, driver) = AvatarController::spawn(
        script.engine,
        catalog.clone(),
        DirectoryLocator::new(asset_dir),
        GltfImporter,
    );

    let mut events = controller.subscribe();
    let logger = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => log_event(&event),
                Err(RecvError::Lagged(skipped)) => warn!("Skipped {} events", skipped),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let mut generation = 0;
    for step in script.steps {
        run_step(&controller, &catalog, &mut generation, step).await?;
    }

    controller.shutdown()?;
    if let Err(error) = driver.await {
        warn!("Avatar driver crashed: {}", error);
    }
    drop(controller);
    if let Err(error) = logger.await {
        warn!("Event logger crashed: {}", error);
    }
    Ok(())
}
