use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{mpsc, Arc};
use std::time::Duration;

use clap::Parser;
use tracing::{debug, error, info, warn};

use stim_assets::{HttpFetcher, ResourceEvent, ResourceManager, ResourceRequest};
use stim_core::{Envelope, MonotonicClock};
use stim_net::HttpRemote;
use stim_sched::{FrameConfig, Signal, Task, TaskArgs};
use stim_session::{wait_for_resources, ExperimentRunner};

#[derive(Parser)]
#[command(name = "stim-runner", about = "Frame-locked experiment runner")]
struct Args {
    /// URL of the experiment configuration document
    #[arg(short, long, default_value = "http://127.0.0.1:8080/config.json")]
    config_url: String,

    /// Target frames per second
    #[arg(short, long, default_value_t = 60.0)]
    frame_rate: f64,

    /// Resource to download, as a name=url pair; repeatable. With no
    /// resources given, the manifest is requested from the server.
    #[arg(short, long = "resource")]
    resources: Vec<String>,

    /// Number of demo trials to run
    #[arg(short, long, default_value_t = 3)]
    trials: u32,

    /// Fixation duration before each trial, in seconds
    #[arg(long, default_value_t = 0.5)]
    fixation: f64,

    /// Geo endpoint for participant network info (collection is off when
    /// absent)
    #[arg(long)]
    geo_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();
    let resources = parse_resources(&args.resources)?;

    let remote = Arc::new(HttpRemote::new());
    let fetcher = Arc::new(HttpFetcher::new(HttpRemote::new()));
    let manager = ResourceManager::new(remote.clone(), fetcher.clone(), fetcher);

    let mut runner = ExperimentRunner::new(
        manager.clone(),
        FrameConfig {
            frame_rate: args.frame_rate,
            max_frames: 0,
        },
    );
    if let Some(geo_url) = &args.geo_url {
        runner.collect_participant_info(remote, geo_url.clone());
    }

    // Progress reporting off the event stream.
    let mut events = manager.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                ResourceEvent::ResourcesRegistered { count } => {
                    info!(count, "resources registered");
                }
                ResourceEvent::DownloadingResource { name } => info!(%name, "downloading"),
                ResourceEvent::ResourceDownloaded { name } => info!(%name, "downloaded"),
                ResourceEvent::DownloadCompleted => info!("all resources ready"),
                ResourceEvent::Status { status } => debug!(?status, "manager status"),
            }
        }
    });

    if let Err(envelope) = runner.start(&args.config_url, resources).await {
        report_failure(&envelope);
        std::process::exit(1);
    }

    let (results_tx, results_rx) = mpsc::channel();
    schedule_demo(&mut runner, &manager, results_tx, args.trials, args.fixation);

    // The frame loop paces itself by sleeping, so it runs on a blocking
    // thread while the download pipeline keeps the runtime.
    let mut runner = tokio::task::spawn_blocking(move || {
        let signal = runner.run_frames(|| {});
        info!(?signal, "frame loop finished");
        runner
    })
    .await?;

    let data = runner.data_mut();
    for (trial, time) in results_rx.try_iter() {
        data.add("trial", i64::from(trial));
        data.add("time", time);
        data.next_entry();
    }

    match runner.quit(None, true).await {
        Ok(text) => println!("{text}"),
        Err(envelope) => {
            report_failure(&envelope);
            std::process::exit(1);
        }
    }
    Ok(())
}

/// Queue the demo tasks: gate on resources, then per trial a fixation hold
/// followed by a recording step, then a conditional closing task.
fn schedule_demo(
    runner: &mut ExperimentRunner,
    manager: &ResourceManager,
    results: mpsc::Sender<(u32, f64)>,
    trials: u32,
    fixation: f64,
) {
    runner.schedule(wait_for_resources(manager), TaskArgs::none());

    let experiment_clock = MonotonicClock::new();
    let completed = Arc::new(AtomicU32::new(0));
    for trial in 1..=trials {
        // Fixation: hold for the configured duration, one frame at a time.
        let duration = Duration::from_secs_f64(fixation);
        let mut timer: Option<stim_core::CountdownTimer> = None;
        runner.schedule(
            Task::step(move |_| {
                let timer = timer.get_or_insert_with(|| stim_core::CountdownTimer::new(duration));
                if timer.expired() {
                    Signal::Continue
                } else {
                    Signal::Repeat
                }
            }),
            TaskArgs::none(),
        );

        let results = results.clone();
        let counter = Arc::clone(&completed);
        runner.schedule(
            Task::step(move |_| {
                let _ = results.send((trial, experiment_clock.get_time()));
                counter.fetch_add(1, Ordering::SeqCst);
                info!(trial, "trial complete");
                Signal::Continue
            }),
            TaskArgs::none(),
        );
    }

    // Evaluated when the scheduler reaches it, after the trials above.
    let counter = Arc::clone(&completed);
    runner.schedule_conditional(
        move || counter.load(Ordering::SeqCst) >= trials,
        Task::step(|_| {
            info!("all trials completed");
            Signal::Continue
        }),
        Task::step(|_| {
            warn!("experiment ended early");
            Signal::Continue
        }),
    );
}

fn parse_resources(specs: &[String]) -> Result<Vec<ResourceRequest>, String> {
    specs
        .iter()
        .map(|spec| {
            spec.split_once('=')
                .map(|(name, path)| ResourceRequest::new(name, path))
                .ok_or_else(|| format!("invalid resource (expected name=url): {spec}"))
        })
        .collect()
}

fn report_failure(envelope: &Envelope) {
    error!(error = %envelope, "experiment failed");
    eprintln!(
        "Unfortunately we encountered the following error:\n{}\nTry to run the experiment again. If the error persists, contact the experiment designer.",
        envelope.report()
    );
}
