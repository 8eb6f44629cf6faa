//! Line-oriented driver standing in for the browser: events arrive as JSON on
//! an async reader and are applied to the [`ModeController`].

pub mod events;
pub mod report;

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::{domain::Mode, infrastructure::shutdown::ShutdownListener, pipeline::ModeController};

pub use events::{parse_event, HostEvent};
pub use report::PageReport;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EventStats {
    pub applied: usize,
    pub rejected: usize,
    pub malformed: usize,
}

/// Applies one event. Mode changes that took effect are returned so the
/// caller can persist them.
pub async fn apply_event(controller: &Arc<ModeController>, event: HostEvent) -> Result<Option<Mode>> {
    match event {
        HostEvent::SetMode { mode } => {
            let mode = Mode::from_optional(mode.as_deref())?;
            if controller.set_mode(mode).await {
                return Ok(Some(mode));
            }
        }
        HostEvent::Scroll { y } => controller.handle_scroll(y),
        HostEvent::Resize { viewport_height } => controller.handle_resize(viewport_height),
        HostEvent::Insert { parent, node } => {
            let root = controller.handle_insert(parent, &node)?;
            tracing::debug!(target: "host", root = %root, tag = %node.tag, "node inserted");
        }
        HostEvent::Remove { id } => {
            controller
                .handle_remove(id)
                .with_context(|| format!("cannot remove element {id}"))?;
        }
    }
    Ok(None)
}

/// Reads events until end of stream or shutdown. `on_mode` sees every mode
/// change that took effect.
pub async fn run_event_loop<R, F>(
    reader: R,
    controller: &Arc<ModeController>,
    mut shutdown: ShutdownListener,
    mut on_mode: F,
) -> Result<EventStats>
where
    R: AsyncBufRead + Unpin,
    F: FnMut(Mode),
{
    let mut lines = reader.lines();
    let mut stats = EventStats::default();
    let mut line_no = 0usize;

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line.context("failed to read event stream")?,
            _ = shutdown.notified() => {
                tracing::info!(target: "host", "shutdown requested; no longer reading events");
                break;
            }
        };
        let Some(line) = line else {
            tracing::info!(target: "host", lines = line_no, "event stream closed");
            break;
        };
        line_no += 1;

        match parse_event(&line) {
            Ok(Some(event)) => match apply_event(controller, event).await {
                Ok(changed) => {
                    stats.applied += 1;
                    if let Some(mode) = changed {
                        on_mode(mode);
                    }
                }
                Err(err) => {
                    stats.rejected += 1;
                    tracing::warn!(target: "host", line = line_no, error = %err, "event rejected");
                }
            },
            Ok(None) => {}
            Err(err) => {
                stats.malformed += 1;
                tracing::warn!(target: "host", line = line_no, error = %err, "malformed event skipped");
            }
        }
    }
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use url::Url;

    use super::*;
    use crate::{
        classifier::{
            testing::{FakeFallback, FakeScorer},
            ClassificationChain, FallbackResponse,
        },
        config::{ClassifierConfig, PipelineConfig},
        infrastructure::shutdown::Shutdown,
        page::Page,
        pipeline::{presentation, PipelineState},
        tasks::{processor::CandidateProcessor, Scheduler},
    };

    fn controller() -> (Arc<ModeController>, crate::page::SharedPage) {
        let page = Page::new(Url::parse("https://example.com/").unwrap(), 800.0).into_shared();
        let config = PipelineConfig::default();
        let state = Arc::new(PipelineState::new(&config));
        let chain = ClassificationChain::new(
            Arc::new(FakeScorer::answering(0.99)),
            Arc::new(FakeFallback::answering(FallbackResponse::probability(0.1))),
            &ClassifierConfig::default(),
        );
        let processor = Arc::new(CandidateProcessor::new(
            chain.clone(),
            state.clone(),
            page.clone(),
        ));
        let scheduler = Scheduler::new(processor, state.clone(), page.clone(), config.max_inflight);
        (
            ModeController::new(state, page.clone(), scheduler, chain, &config),
            page,
        )
    }

    #[tokio::test]
    async fn event_stream_drives_controller() {
        let (controller, page) = controller();
        let (shutdown, _) = Shutdown::new();
        let input = concat!(
            "{\"type\":\"set_mode\",\"mode\":\"basic\"}\n",
            "\n",
            "{\"type\":\"insert\",\"node\":{\"tag\":\"div\",\"rect\":{\"top\":50,\"height\":100,\"width\":100},",
            "\"children\":[{\"tag\":\"img\",\"attrs\":{\"src\":\"/a.webp\"}}]}}\n",
            "{\"type\":\"set_mode\",\"mode\":\"sepia\"}\n",
            "this is not json\n",
            "{\"type\":\"remove\",\"id\":999}\n",
            "{\"type\":\"set_mode\",\"mode\":\"light\"}\n",
        );

        let mut modes = Vec::new();
        let stats = run_event_loop(input.as_bytes(), &controller, shutdown.subscribe(), |mode| {
            modes.push(mode)
        })
        .await
        .unwrap();

        assert_eq!(
            stats,
            EventStats {
                applied: 3,
                rejected: 2,
                malformed: 1
            }
        );
        assert_eq!(modes, vec![Mode::Light]);

        controller.scheduler().wait_idle().await;
        let page = page.lock();
        let img = page.images()[0];
        assert!(presentation::badge_of(&page, img).is_some());
    }

    #[tokio::test]
    async fn triggered_shutdown_stops_reading() {
        let (controller, _) = controller();
        let (shutdown, listener) = Shutdown::new();
        shutdown.trigger();

        let (_writer, reader) = tokio::io::duplex(64);
        let stats = run_event_loop(
            tokio::io::BufReader::new(reader),
            &controller,
            listener,
            |_| {},
        )
        .await
        .unwrap();
        assert_eq!(stats, EventStats::default());
    }
}
