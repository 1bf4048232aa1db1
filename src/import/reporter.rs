use crate::import::stats::{BatchOutcome, RunSummary, RunTotals};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::io::IsTerminal;
use std::time::Duration;
use tokio::time::Instant;

const BAR_TEMPLATE: &str = "{spinner:.dim} [{bar:30}] {pos}/{len} batches  {elapsed_precise}  {msg}";

/// Progress and summary output for one run.
///
/// Created before the first batch is dispatched and driven by the aggregator
/// task only. On a terminal the bar is drawn to stderr; otherwise progress
/// goes to the log every `progress_every` batches.
pub struct RunReporter {
    started_at: Instant,
    progress_every: usize,
    dispatched: usize,
    completed: usize,
    bar: ProgressBar,
}

impl RunReporter {
    pub fn start(progress_every: usize, show_bar: bool) -> Self {
        let bar = if show_bar && std::io::stderr().is_terminal() {
            progress_bar()
        } else {
            ProgressBar::with_draw_target(Some(0), ProgressDrawTarget::hidden())
        };
        Self {
            started_at: Instant::now(),
            progress_every: progress_every.max(1),
            dispatched: 0,
            completed: 0,
            bar,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub fn dispatched(&self) -> usize {
        self.dispatched
    }

    pub fn completed(&self) -> usize {
        self.completed
    }

    pub fn batch_dispatched(&mut self) {
        self.dispatched += 1;
        self.bar.inc_length(1);
    }

    pub fn batch_finished(&mut self, outcome: &BatchOutcome, totals: &RunTotals) {
        self.completed += 1;
        self.bar.inc(1);

        if let Some(err) = &outcome.result.error {
            self.bar.suspend(|| {
                log::error!(
                    "batch {}: write failed after {} attempts, {} items unprocessed: {}",
                    outcome.index,
                    outcome.result.attempts,
                    outcome.items,
                    err
                )
            });
        } else if outcome.result.unprocessed > 0 {
            self.bar.suspend(|| {
                log::warn!(
                    "batch {}: written after {} attempts ({} unprocessed reported on the way)",
                    outcome.index,
                    outcome.result.attempts,
                    outcome.result.unprocessed
                )
            });
        }

        if totals.unprocessed_items > 0 {
            self.bar
                .set_message(format!("{} unprocessed", totals.unprocessed_items));
        }

        if self.bar.is_hidden() && self.completed % self.progress_every == 0 {
            log::info!(
                "processing batches: {}/{} done, {} items unprocessed so far, {:.1}s elapsed",
                self.completed,
                self.dispatched,
                totals.unprocessed_items,
                self.elapsed().as_secs_f64()
            );
        }
    }

    pub fn finish(self, totals: RunTotals) -> RunSummary {
        self.bar.finish_and_clear();
        let summary = RunSummary::new(totals, self.elapsed());
        log::info!(
            "import finished: {} batches ({} failed), {} records submitted, {} unprocessed, {} lines skipped",
            summary.totals.batches,
            summary.totals.failed_batches,
            summary.totals.total_items,
            summary.totals.unprocessed_items,
            summary.totals.skipped_lines
        );
        summary
    }
}

fn progress_bar() -> ProgressBar {
    let bar = ProgressBar::with_draw_target(Some(0), ProgressDrawTarget::stderr());
    if let Ok(style) = ProgressStyle::with_template(BAR_TEMPLATE) {
        bar.set_style(style.progress_chars("=>-"));
    }
    bar.enable_steady_tick(Duration::from_millis(120));
    bar
}
