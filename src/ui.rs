use clap::ValueEnum;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::{Duration, Instant};

/// Stderr progress style.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum UiMode {
    /// Spinners only when both stderr and stdout are terminals.
    Auto,
    Plain,
    /// Spinners whenever stderr is a terminal, even with stdout redirected.
    Pretty,
}

#[derive(Clone, Debug)]
pub struct Ui {
    pretty: bool,
}

impl Ui {
    pub fn new(mode: UiMode, stderr_is_tty: bool, stdout_is_tty: bool) -> Self {
        let pretty = stderr_is_tty
            && match mode {
                UiMode::Pretty => true,
                UiMode::Auto => stdout_is_tty,
                UiMode::Plain => false,
            };
        Self { pretty }
    }

    /// Open-ended stage shown as a spinner.
    pub fn stage(&self, name: &str) -> StageGuard {
        let bar = self.pretty.then(|| {
            let spinner = ProgressBar::new_spinner();
            spinner.enable_steady_tick(Duration::from_millis(120));
            styled(spinner, "{spinner} {msg}")
        });
        StageGuard::start(name, bar)
    }

    /// Stage with a known amount of work, advanced via `StageGuard::advance`.
    pub fn counted_stage(&self, name: &str, total: u64) -> StageGuard {
        let bar = self
            .pretty
            .then(|| styled(ProgressBar::new(total), "{msg} [{bar:30}] {pos}/{len}"));
        StageGuard::start(name, bar)
    }
}

fn styled(bar: ProgressBar, template: &str) -> ProgressBar {
    bar.set_draw_target(ProgressDrawTarget::stderr());
    let style = ProgressStyle::with_template(template)
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    bar.set_style(style);
    bar
}

pub struct StageGuard {
    name: String,
    start: Instant,
    bar: Option<ProgressBar>,
}

impl StageGuard {
    fn start(name: &str, bar: Option<ProgressBar>) -> Self {
        match &bar {
            Some(bar) => bar.set_message(format!("{name}…")),
            None => eprintln!("==> {}", name),
        }
        Self {
            name: name.to_string(),
            start: Instant::now(),
            bar,
        }
    }

    pub fn advance(&self, delta: u64) {
        if let Some(bar) = &self.bar {
            bar.inc(delta);
        }
    }
}

impl Drop for StageGuard {
    fn drop(&mut self) {
        let message = format!("✔ {} ({})", self.name, format_elapsed(self.start.elapsed()));
        match &self.bar {
            Some(bar) => bar.finish_with_message(message),
            None => eprintln!("{message}"),
        }
    }
}

fn format_elapsed(elapsed: Duration) -> String {
    if elapsed.as_secs() >= 1 {
        format!("{:.2}s", elapsed.as_secs_f64())
    } else {
        format!("{}ms", elapsed.as_millis())
    }
}
