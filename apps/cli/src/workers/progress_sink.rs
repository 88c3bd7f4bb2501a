use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use anyhow::Result;
use async_trait::async_trait;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use videotitler_core::{
    Stage,
    events::{
        BatchFinished, BatchStarted, EnrichedEvent, ItemFailed, ItemRenamed, StageCompleted,
        StageStarted, downcast_ref,
    },
    queues::QueueKind,
    workers::{InputSpec, SubscriptionSpec, Worker},
};

use crate::format::{format_duration, format_summary};

/// Progress bar for full runs plus one line per finished, failed or renamed item.
#[derive(Default)]
pub struct ProgressSinkWorker {
    bar: Option<ProgressBar>,
    started: Option<Instant>,
}

impl ProgressSinkWorker {
    fn line(&self, text: String) {
        match &self.bar {
            Some(bar) => bar.println(text),
            None => println!("{text}"),
        }
    }

    fn start_bar(&mut self, total: usize) -> Result<()> {
        let bar = ProgressBar::new(total as u64);
        bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.cyan} [{bar:30.cyan/blue}] {pos}/{len} {msg} {elapsed:.dim}",
            )?
            .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ")
            .progress_chars("=> "),
        );
        bar.enable_steady_tick(Duration::from_millis(80));
        self.bar = Some(bar);
        self.started = Some(Instant::now());
        Ok(())
    }

    fn advance(&self) {
        if let Some(bar) = &self.bar {
            bar.inc(1);
        }
    }
}

#[async_trait]
impl Worker for ProgressSinkWorker {
    const SUBSCRIBER_ID: &'static str = "cli.progress_sink";

    fn subscription() -> SubscriptionSpec {
        let fifo = |event_type| InputSpec {
            event_type,
            queue_kind: QueueKind::FifoDropOldest { capacity: 256 },
        };
        SubscriptionSpec {
            subscriber_id: Self::SUBSCRIBER_ID,
            inputs: vec![
                fifo(BatchStarted::EVENT_TYPE),
                InputSpec {
                    event_type: StageStarted::EVENT_TYPE,
                    queue_kind: QueueKind::Latest1,
                },
                fifo(StageCompleted::EVENT_TYPE),
                fifo(ItemFailed::EVENT_TYPE),
                fifo(ItemRenamed::EVENT_TYPE),
                fifo(BatchFinished::EVENT_TYPE),
            ],
        }
    }

    async fn handle(&mut self, event: Arc<EnrichedEvent>) -> Result<()> {
        let event = &event.event;

        if let Some(started) = downcast_ref::<BatchStarted>(event) {
            if started.runnable > 0 {
                self.start_bar(started.runnable)?;
            }
        } else if let Some(started) = downcast_ref::<StageStarted>(event) {
            if let Some(bar) = &self.bar {
                let verb = match started.stage {
                    Stage::Extract => "extracting frame",
                    Stage::Ocr => "reading text",
                    Stage::Title => "asking for a title",
                    Stage::Commit => "renaming",
                };
                bar.set_message(format!("#{} {verb}", started.sequence_index));
            }
        } else if let Some(done) = downcast_ref::<StageCompleted>(event) {
            if done.stage == Stage::Title {
                self.line(format!(
                    "{} #{} {}",
                    style("✓").green().bold(),
                    done.sequence_index,
                    done.output.as_deref().unwrap_or_default()
                ));
                self.advance();
            }
        } else if let Some(failed) = downcast_ref::<ItemFailed>(event) {
            self.line(format!(
                "{} #{} failed at {}: {}",
                style("✗").red().bold(),
                failed.sequence_index,
                failed.stage,
                style(&failed.message).red()
            ));
            if failed.stage != Stage::Commit {
                self.advance();
            }
        } else if let Some(renamed) = downcast_ref::<ItemRenamed>(event) {
            let name = renamed
                .to
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            self.line(format!(
                "{} #{} renamed to {}",
                style("→").cyan().bold(),
                renamed.sequence_index,
                style(name).yellow()
            ));
        } else if let Some(finished) = downcast_ref::<BatchFinished>(event) {
            if let Some(bar) = self.bar.take() {
                bar.finish_and_clear();
            }
            let elapsed = self
                .started
                .take()
                .map(|t| format!(" {}", style(format!("[{}]", format_duration(t.elapsed()))).dim()))
                .unwrap_or_default();
            println!("{}{elapsed}", format_summary(&finished.summary));
        }
        Ok(())
    }

    async fn finish(&mut self) -> Result<()> {
        if let Some(bar) = self.bar.take() {
            bar.abandon();
        }
        Ok(())
    }
}
