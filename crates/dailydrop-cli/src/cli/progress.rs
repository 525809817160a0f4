//! Multi-progress display for batch runs.
//!
//! One summary bar for the batch plus one bar per post, refreshed from
//! polled [`BatchRun`] snapshots.

use std::collections::HashMap;
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use dailydrop::models::{BatchRun, PostRunStatus};

pub struct BatchProgress {
    multi: MultiProgress,
    summary_bar: ProgressBar,
    post_bars: HashMap<String, ProgressBar>,
}

impl BatchProgress {
    /// Create bars for every post of `run`, in submission order.
    pub fn new(run: &BatchRun) -> anyhow::Result<Self> {
        let multi = MultiProgress::new();

        // Summary bar at the top
        let summary_bar = multi.add(ProgressBar::new(run.posts.len() as u64));
        summary_bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} {msg} [{bar:30.cyan/blue}] {pos}/{len}")?
                .progress_chars("█▓░"),
        );
        summary_bar.set_message("Running batch");
        summary_bar.enable_steady_tick(Duration::from_millis(100));

        let post_style = ProgressStyle::default_bar()
            .template("  {prefix:<16} [{bar:25.cyan/blue}] {pos:>3}% {wide_msg}")?
            .progress_chars("━╸─");

        let mut post_bars = HashMap::with_capacity(run.posts.len());
        for post in &run.posts {
            let bar = multi.add(ProgressBar::new(100));
            bar.set_style(post_style.clone());
            bar.set_prefix(truncate_ref(&post.post_ref, 16));
            bar.set_message("queued");
            post_bars.insert(post.post_ref.clone(), bar);
        }

        Ok(Self {
            multi,
            summary_bar,
            post_bars,
        })
    }

    /// Apply a fresh snapshot.
    pub fn update(&self, run: &BatchRun) {
        for post in &run.posts {
            if let Some(bar) = self.post_bars.get(&post.post_ref) {
                bar.set_position(u64::from(post.progress_percent));
                let message = match post.status {
                    PostRunStatus::Queued => "queued".to_string(),
                    _ => post.message.clone(),
                };
                bar.set_message(message);
            }
        }
        let done = run.counts.succeeded + run.counts.failed;
        self.summary_bar.set_position(done as u64);
        self.summary_bar.set_message(format!(
            "Succeeded: {} | Failed: {} | Running: {}",
            run.counts.succeeded, run.counts.failed, run.counts.running
        ));
    }

    /// Print a message that coordinates with the progress display.
    pub fn println(&self, message: &str) {
        let _ = self.multi.println(message);
    }

    /// Finish all progress bars and clear the display.
    pub fn finish(&self) {
        for bar in self.post_bars.values() {
            bar.finish_and_clear();
        }
        self.summary_bar.finish_and_clear();
    }
}

/// Shorten a post ref for the bar prefix.
fn truncate_ref(post_ref: &str, max_len: usize) -> String {
    if post_ref.chars().count() <= max_len {
        return post_ref.to_string();
    }
    let kept: String = post_ref.chars().take(max_len - 3).collect();
    format!("{}...", kept)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_ref() {
        assert_eq!(truncate_ref("casino-daily", 16), "casino-daily");
        assert_eq!(truncate_ref("coin-master-free-spins", 16), "coin-master-f...");
    }
}
