use std::{sync::Arc, time::Duration};

use anyhow::Result;
use reqwest::Client;
use tokio::{
    io::{self, AsyncWriteExt, BufReader},
    time::timeout,
};

use crate::{
    classifier::{BackgroundClassifier, ClassificationChain, PassthroughEncoder, ScoringClient},
    config::AppConfig,
    domain::Mode,
    host::{self, PageReport},
    infrastructure::{directories::ResolvedPaths, mode_store::ModeStore, shutdown::Shutdown},
    page::{PageSnapshot, SharedPage},
    pipeline::{ModeController, PipelineState},
    tasks::{processor::CandidateProcessor, Scheduler},
};

const BLANK_PAGE_URL: &str = "about:blank";

pub struct FlaggerApp {
    controller: Arc<ModeController>,
    state: Arc<PipelineState>,
    page: SharedPage,
    mode_store: ModeStore,
    shutdown: Shutdown,
}

impl FlaggerApp {
    pub async fn initialize(config: AppConfig, paths: ResolvedPaths, shutdown: Shutdown) -> Result<Self> {
        let http_client = Client::builder()
            .user_agent(format!("ai-image-flagger/{}", env!("CARGO_PKG_VERSION")))
            .build()?;

        let scorer = Arc::new(ScoringClient::new(
            http_client.clone(),
            config.classifier.clone(),
        ));
        let fallback = Arc::new(BackgroundClassifier::new(
            http_client,
            config.classifier.clone(),
            Arc::new(PassthroughEncoder),
        ));
        let chain = ClassificationChain::new(scorer, fallback, &config.classifier);

        let snapshot = match &config.page_snapshot {
            Some(path) => PageSnapshot::load(path).await?,
            None => PageSnapshot::empty(BLANK_PAGE_URL),
        };
        let page = snapshot.build()?.into_shared();
        tracing::info!(
            target: "host",
            url = %snapshot.url,
            images = page.lock().images().len(),
            "page loaded"
        );

        let state = Arc::new(PipelineState::new(&config.pipeline));
        let processor = Arc::new(CandidateProcessor::new(
            chain.clone(),
            state.clone(),
            page.clone(),
        ));
        let scheduler = Scheduler::new(
            processor,
            state.clone(),
            page.clone(),
            config.pipeline.max_inflight,
        );
        let controller = ModeController::new(
            state.clone(),
            page.clone(),
            scheduler,
            chain,
            &config.pipeline,
        );

        Ok(Self {
            controller,
            state,
            page,
            mode_store: ModeStore::new(paths.settings_path),
            shutdown,
        })
    }

    pub async fn run(self) -> Result<()> {
        let FlaggerApp {
            controller,
            state,
            page,
            mode_store,
            shutdown,
        } = self;

        let initial = match mode_store.load().await {
            Ok(mode) => mode,
            Err(err) => {
                tracing::warn!(target: "mode", error = %err, "stored mode unreadable; starting disabled");
                Mode::Off
            }
        };
        tracing::info!(target: "mode", mode = %initial, "starting");
        controller.set_mode(initial).await;

        let mut changed = Vec::new();
        let stats = host::run_event_loop(
            BufReader::new(io::stdin()),
            &controller,
            shutdown.subscribe(),
            |mode| changed.push(mode),
        )
        .await?;
        tracing::info!(
            target: "host",
            applied = stats.applied,
            rejected = stats.rejected,
            malformed = stats.malformed,
            "event stream finished"
        );

        if let Some(mode) = changed.last() {
            if let Err(err) = mode_store.save(*mode).await {
                tracing::warn!(target: "mode", error = %err, "failed to persist mode");
            }
        }

        controller.flush_layout();
        let idle_timeout = Duration::from_secs(5);
        if timeout(idle_timeout, controller.scheduler().wait_idle()).await.is_err() {
            tracing::warn!(
                target: "host",
                pending = controller.scheduler().snapshot().pending(),
                "classifications still running after {:?}; reporting current state",
                idle_timeout
            );
        }

        let report = {
            let page = page.lock();
            PageReport::collect(
                &page,
                state.mode(),
                state.working_area(),
                controller.scheduler().snapshot(),
                state.cache_len(),
                |url| state.cached(url),
            )
        };
        tracing::info!(
            target: "host",
            images = report.images.len(),
            flagged = report.flagged(),
            "page report ready"
        );

        let mut body = serde_json::to_vec_pretty(&report)?;
        body.push(b'\n');
        let mut stdout = io::stdout();
        stdout.write_all(&body).await?;
        stdout.flush().await?;
        Ok(())
    }
}
