use crate::progress::Progress;
use core::fmt::{Debug, Formatter};
use core::sync::atomic::{AtomicBool, Ordering};
use core::time::Duration;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::task::JoinHandle;

type StatusCallback = Box<dyn Fn() -> (u64, u64, String) + Send + Sync>;

/// How often the bar is redrawn.
const REFRESH_INTERVAL: Duration = Duration::from_millis(100);

/// Width of the bar and of the bouncing spinner track.
const TRACK_WIDTH: usize = 25;

/// Shared between the reporter and its refresh task.
struct Shared {
    visible_after: Instant,
    visible: AtomicBool,
    indeterminate: AtomicBool,
    phase_started: Mutex<Instant>,
    callback: Mutex<StatusCallback>,
}

/// Terminal progress display that stays hidden for short operations.
///
/// Nothing is drawn until `delay` has passed since creation. A background task polls the
/// status callback ten times per second and redraws the bar.
#[derive(Clone)]
pub struct ProgressReporter {
    bar: ProgressBar,
    shared: Arc<Shared>,
    refresh_task: Arc<JoinHandle<()>>,
    use_colors: bool,
}

impl ProgressReporter {
    /// Create a reporter. Must be called from within a tokio runtime.
    #[must_use]
    pub fn new(delay: Duration, use_colors: bool) -> Self {
        let bar = ProgressBar::hidden();
        let shared = Arc::new(Shared {
            visible_after: Instant::now() + delay,
            visible: AtomicBool::new(false),
            indeterminate: AtomicBool::new(false),
            phase_started: Mutex::new(Instant::now()),
            callback: Mutex::new(Box::new(|| (0, 0, String::new()))),
        });

        Self {
            refresh_task: Arc::new(tokio::spawn(refresh(bar.clone(), Arc::clone(&shared)))),
            bar,
            shared,
            use_colors,
        }
    }

    fn template(&self, body: &str) -> String {
        if self.use_colors {
            format!("{{prefix:>12.bold.cyan}} [{body}] {{msg}}")
        } else {
            format!("{{prefix:>12}} [{body}] {{msg}}")
        }
    }
}

/// Frames of a `===>` marker bouncing across the spinner track.
fn spinner_frames() -> Vec<String> {
    let forward = (0..TRACK_WIDTH + 4).map(|i| {
        let marker = "===>";
        let line = format!("{}{marker}{}", " ".repeat(TRACK_WIDTH), " ".repeat(TRACK_WIDTH));
        line[TRACK_WIDTH + marker.len() - i..][..TRACK_WIDTH].to_string()
    });
    let backward = (0..TRACK_WIDTH + 4).map(|i| {
        let marker = "<===";
        let line = format!("{}{marker}{}", " ".repeat(TRACK_WIDTH), " ".repeat(TRACK_WIDTH));
        line[i..][..TRACK_WIDTH].to_string()
    });
    forward.chain(backward).collect()
}

impl Progress for ProgressReporter {
    fn set_phase(&self, phase: &str) {
        self.bar.set_prefix(phase.to_string());
        *self.shared.phase_started.lock().expect("lock poisoned") = Instant::now();
    }

    fn set_determinate(&self, callback: Box<dyn Fn() -> (u64, u64, String) + Send + Sync + 'static>) {
        *self.shared.callback.lock().expect("lock poisoned") = callback;
        self.shared.indeterminate.store(false, Ordering::Relaxed);
        self.bar.disable_steady_tick();
        self.bar.set_length(0);
        self.bar.set_position(0);
        self.bar.set_style(
            ProgressStyle::default_bar()
                .template(&self.template("{bar:25}"))
                .expect("could not create progress bar style")
                .progress_chars("=> "),
        );
    }

    fn set_indeterminate(&self, callback: Box<dyn Fn() -> String + Send + Sync + 'static>) {
        *self.shared.callback.lock().expect("lock poisoned") = Box::new(move || (0, 0, callback()));
        *self.shared.phase_started.lock().expect("lock poisoned") = Instant::now();
        self.shared.indeterminate.store(true, Ordering::Relaxed);
        self.bar.enable_steady_tick(REFRESH_INTERVAL);

        let frames = spinner_frames();
        let frames: Vec<&str> = frames.iter().map(String::as_str).collect();
        self.bar.set_style(
            ProgressStyle::default_spinner()
                .template(&self.template("{spinner}"))
                .expect("could not create progress bar style")
                .tick_strings(&frames),
        );
    }

    fn println(&self, msg: &str) {
        self.bar.suspend(|| eprintln!("{msg}"));
    }

    fn done(&self) {
        self.refresh_task.abort();
        if self.shared.visible.load(Ordering::Relaxed) {
            self.bar.finish_and_clear();
        }
    }
}

impl Debug for ProgressReporter {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("bar", &self.bar)
            .field("visible", &self.shared.visible)
            .field("use_colors", &self.use_colors)
            .finish_non_exhaustive()
    }
}

async fn refresh(bar: ProgressBar, shared: Arc<Shared>) {
    let mut interval = tokio::time::interval(REFRESH_INTERVAL);
    #[expect(clippy::infinite_loop, reason = "task runs until aborted")]
    loop {
        let _ = interval.tick().await;

        if !shared.visible.load(Ordering::Relaxed) {
            if Instant::now() < shared.visible_after {
                continue;
            }
            shared.visible.store(true, Ordering::Relaxed);
            bar.set_draw_target(ProgressDrawTarget::stderr_with_hz(10));
        }

        let (length, position, mut message) = (shared.callback.lock().expect("lock poisoned"))();
        if shared.indeterminate.load(Ordering::Relaxed) {
            let elapsed = shared.phase_started.lock().expect("lock poisoned").elapsed().as_secs();
            message = format!("{elapsed}s: {message}");
        }

        if length > 0 {
            bar.set_length(length);
            bar.set_position(position);
        }
        bar.set_message(message);
    }
}
