use std::path::PathBuf;
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use anyhow::{anyhow, bail, Context};
use clap::Parser;
use image::imageops;
use ort::{Environment, ExecutionProvider};

use posture_watch::app::PostureApp;
use posture_watch::config::MonitorConfig;
use posture_watch::face_detection::model_blazeface::BlazefaceModel;
use posture_watch::face_detection::FaceDetectionModel;
use posture_watch::face_landmarks::model_mediapipe::MediapipeFaceLandmarksModel;
use posture_watch::face_landmarks::LandmarkProvider;
use posture_watch::notify::NngNotifier;
use posture_watch::posture::{LoggingHooks, PostureHooks};
use posture_watch::session::PostureMonitor;
use posture_watch::utils::{lock, FrameRateMeter, SharedState, State};
use posture_watch::webcam::{self, Webcam};

// min score for the face detector that seeds the landmark crop
const DETECTOR_MIN_SCORE: f32 = 0.5;

#[derive(Parser, Debug)]
#[command(author, version, about = "Watches your head posture through the webcam")]
struct Args {
    /// Camera index
    #[arg(long, default_value_t = 0)]
    camera: u32,

    /// MediaPipe face mesh model (ONNX, with irises)
    #[arg(long, default_value = "models/face_landmarks.onnx")]
    landmark_model: PathBuf,

    /// BlazeFace detector model (ONNX) used to find the face when tracking is lost
    #[arg(long, requires = "anchors")]
    detector_model: Option<PathBuf>,

    /// BlazeFace anchors (.npy)
    #[arg(long, requires = "detector_model")]
    anchors: Option<PathBuf>,

    /// TOML file with thresholds
    #[arg(long)]
    config: Option<PathBuf>,

    /// Publish posture events on this nng address, e.g. tcp://127.0.0.1:54321
    #[arg(long)]
    notify: Option<String>,

    /// Do not mirror the camera image
    #[arg(long)]
    no_mirror: bool,

    /// List cameras and exit
    #[arg(long)]
    list_cameras: bool,
}

fn worker_thread<P: LandmarkProvider, H: PostureHooks>(
    camera_index: u32,
    mirror: bool,
    mut monitor: PostureMonitor<P, H>,
    shared_state: SharedState,
    ready: Sender<anyhow::Result<()>>,
) {
    // the camera is opened here since it cannot move between threads
    let mut webcam = match Webcam::open(camera_index) {
        Ok(webcam) => {
            let _ = ready.send(Ok(()));
            webcam
        }
        Err(e) => {
            let _ = ready.send(Err(anyhow!(e).context(format!("could not open camera {}", camera_index))));
            return;
        }
    };

    {
        let mut state = lock(&shared_state);
        state.resolution = Some(webcam.resolution());
        state.camera_name = Some(webcam.name());
    }

    let mut fps_meter = FrameRateMeter::new(10);

    loop {
        let (calibrate, quit) = {
            let mut state = lock(&shared_state);
            (std::mem::take(&mut state.calibration_requested), state.quit)
        };
        if quit {
            break;
        }
        if calibrate {
            monitor.request_calibration();
        }

        let mut image = match webcam.capture() {
            Ok(image) => image,
            Err(e) => {
                log::error!("Could not read frame, stopping: {}", e);
                break;
            }
        };
        if mirror {
            imageops::flip_horizontal_in_place(&mut image);
        }

        let now = Instant::now();
        let report = match monitor.process_frame(&image, now) {
            Ok(report) => report,
            Err(e) => {
                log::error!("Stopping: {}", e);
                break;
            }
        };
        let fps = fps_meter.tick(now);

        let mut state = lock(&shared_state);
        state.resolution = Some(image.dimensions());
        state.image = Some(image);
        state.report = Some(report);
        state.fps = fps;
    }

    lock(&shared_state).finished = true;
    log::info!("Worker stopped");
}

fn main() -> anyhow::Result<()> {
    env_logger::init(); // Log to stderr (if you run with `RUST_LOG=debug`).

    let args = Args::parse();

    if args.list_cameras {
        for camera in webcam::list_cameras()? {
            println!("{:<5} {}", camera.index(), camera.human_name());
        }
        return Ok(());
    }

    let mut config = match &args.config {
        Some(path) => MonitorConfig::load(path)
            .with_context(|| format!("could not load config {}", path.display()))?,
        None => MonitorConfig::default(),
    };
    if args.no_mirror {
        config.mirror = false;
    }
    log::debug!("{:?}", config);

    let environment = Environment::builder()
        .with_name("posture-watch")
        .with_execution_providers([ExecutionProvider::CPU(Default::default())])
        .build()?
        .into_arc();

    let detector: Option<Box<dyn FaceDetectionModel + Send>> =
        match (&args.detector_model, &args.anchors) {
            (Some(model), Some(anchors)) => Some(Box::new(
                BlazefaceModel::new(&environment, model, anchors, DETECTOR_MIN_SCORE)
                    .context("could not load face detector")?,
            )),
            (None, None) => None,
            _ => bail!("--detector-model and --anchors go together"),
        };

    let provider = MediapipeFaceLandmarksModel::new(
        &environment,
        &args.landmark_model,
        detector,
        config.face_confidence,
    )
    .with_context(|| format!("could not load {}", args.landmark_model.display()))?;

    let hooks: Box<dyn PostureHooks + Send> = match &args.notify {
        Some(address) => Box::new(
            NngNotifier::bind(address).with_context(|| format!("could not bind {}", address))?,
        ),
        None => Box::new(LoggingHooks),
    };

    let mirror = config.mirror;
    let monitor = PostureMonitor::new(provider, hooks, config);

    let shared_state: SharedState = Arc::new(Mutex::new(State::default()));

    let (ready_tx, ready_rx) = mpsc::channel();
    let thread_data = Arc::clone(&shared_state);
    let camera_index = args.camera;
    let worker = std::thread::spawn(move || {
        worker_thread(camera_index, mirror, monitor, thread_data, ready_tx)
    });

    ready_rx
        .recv()
        .map_err(|_| anyhow!("worker exited before opening the camera"))??;

    let gui_data = Arc::clone(&shared_state);
    let native_options = eframe::NativeOptions::default();

    eframe::run_native(
        "Posture Watch",
        native_options,
        Box::new(move |cc| {
            let _re_ui = re_ui::ReUi::load_and_apply(&cc.egui_ctx);
            Box::new(PostureApp::new(cc, gui_data))
        }),
    )
    .map_err(|e| anyhow!("window failed: {}", e))?;

    lock(&shared_state).quit = true;
    if worker.join().is_err() {
        log::error!("Worker panicked");
    }

    Ok(())
}
