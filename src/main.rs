mod input;
mod logger;
mod render;

use data::chart::indicator::MaConfig;
use data::{AnnotationStore, CacheError, ChartViewState, Command, Redraw, Settings};
use exchange::{AdapterError, Bar, BridgeClient, RateRequest, RateSource};
use input::{Input, InputError};
use render::{LogRenderer, Renderer};

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{Duration, MissedTickBehavior};

use std::path::PathBuf;

#[derive(thiserror::Error, Debug)]
enum AppError {
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error("Invalid input: {0}")]
    Input(#[from] InputError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl AppError {
    fn to_user_message(&self) -> String {
        match self {
            AppError::Cache(CacheError::Adapter(err)) => err.to_user_message().to_string(),
            other => other.to_string(),
        }
    }
}

/// A refresh fetch running on its own task.
struct PendingRefresh {
    request: RateRequest,
    handle: JoinHandle<Result<Vec<Bar>, AdapterError>>,
}

enum Flow {
    Continue,
    Quit,
}

struct App<R> {
    chart: ChartViewState<BridgeClient>,
    renderer: R,
    annotations_path: PathBuf,
    pending: Option<PendingRefresh>,
}

fn main() {
    logger::setup(cfg!(debug_assertions)).expect("Failed to initialize logger");

    std::panic::set_hook(Box::new(|info| {
        let location = info.location().map_or_else(
            || "unknown location".to_string(),
            |loc| format!("{}:{}:{}", loc.file(), loc.line(), loc.column()),
        );
        log::error!("PANIC at {location}: {info}");
    }));

    let settings = Settings::load(&data::data_path(Some(data::SETTINGS_PATH)));

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("Failed to build runtime");

    if let Err(err) = runtime.block_on(run(settings, LogRenderer::default())) {
        log::error!("Exited with error: {err}");
        std::process::exit(1);
    }
}

async fn run<R: Renderer>(settings: Settings, renderer: R) -> Result<(), AppError> {
    let annotations_path = data::resolve_path(&settings.annotations_file);
    let mut annotations = AnnotationStore::default();
    annotations.load(&annotations_path);

    let source = BridgeClient::new(settings.endpoint.clone());
    log::info!(
        "Charting {} {} from {}",
        settings.symbol,
        settings.timeframe,
        source.endpoint()
    );

    let mut app = App {
        chart: ChartViewState::new(source, &settings).with_annotations(annotations),
        renderer,
        annotations_path,
        pending: None,
    };

    match app.chart.load().await {
        Ok(redraw) => app.draw(redraw),
        Err(err) => app.report(&AppError::from(err)),
    }

    let mut ticker = tokio::time::interval(Duration::from_secs(settings.auto_refresh_secs));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            _ = ticker.tick() => app.start_refresh(),
            joined = wait_refresh(&mut app.pending) => {
                if let Some(pending) = app.pending.take() {
                    app.finish_refresh(&pending.request, joined);
                }
            }
            line = lines.next_line() => {
                let Some(line) = line? else {
                    log::info!("Input closed");
                    break;
                };
                app.settle_refresh().await;

                match app.handle_line(&line).await {
                    Ok(Flow::Continue) => {}
                    Ok(Flow::Quit) => break,
                    Err(err) => app.report(&err),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                log::info!("Interrupted");
                break;
            }
        }
    }

    app.shutdown();
    Ok(())
}

async fn wait_refresh(
    pending: &mut Option<PendingRefresh>,
) -> Result<Result<Vec<Bar>, AdapterError>, JoinError> {
    match pending {
        Some(pending) => (&mut pending.handle).await,
        None => std::future::pending().await,
    }
}

impl<R: Renderer> App<R> {
    fn draw(&mut self, redraw: Redraw) {
        if redraw != Redraw::None {
            self.renderer.render(&self.chart.frame(), redraw);
        }
    }

    fn report(&mut self, err: &AppError) {
        log::warn!("{err}");
        self.renderer.status(&err.to_user_message());
    }

    fn start_refresh(&mut self) {
        if self.pending.is_some() {
            return;
        }
        let Some(request) = self.chart.begin_tick() else {
            return;
        };

        let source = self.chart.source().clone();
        let task_request = request.clone();
        let handle = tokio::spawn(async move { source.fetch_rates(&task_request).await });

        self.pending = Some(PendingRefresh { request, handle });
    }

    fn finish_refresh(
        &mut self,
        request: &RateRequest,
        joined: Result<Result<Vec<Bar>, AdapterError>, JoinError>,
    ) {
        match joined {
            Ok(fetched) => match self.chart.finish_tick(request, fetched) {
                Ok(redraw) => self.draw(redraw),
                Err(err) => self.report(&AppError::from(err)),
            },
            Err(err) => {
                log::error!("Refresh task failed: {err}");
                self.chart.cancel_tick(request);
            }
        }
    }

    /// Waits for an outstanding refresh so that its merge lands before the
    /// next state change.
    async fn settle_refresh(&mut self) {
        if let Some(pending) = self.pending.take() {
            let joined = pending.handle.await;
            self.finish_refresh(&pending.request, joined);
        }
    }

    async fn handle_line(&mut self, line: &str) -> Result<Flow, AppError> {
        if line.trim().is_empty() {
            return Ok(Flow::Continue);
        }

        match input::parse(line)? {
            Input::Chart(command) => {
                let redraw = self.chart.apply(command).await?;
                self.draw(redraw);
            }
            Input::Symbol(text) => {
                self.chart.apply(Command::OpenSymbolInput).await?;
                self.chart.apply(Command::TypeSymbol(text)).await?;
                let redraw = self.chart.apply(Command::SubmitSymbol).await?;
                self.draw(redraw);
            }
            Input::Edit(style) => {
                if self.chart.apply(Command::BeginEdit).await? == Redraw::None {
                    self.renderer.status("Nothing selected");
                    return Ok(Flow::Continue);
                }
                let redraw = self.chart.apply(Command::CommitEdit(style)).await?;
                self.draw(redraw);
            }
            Input::MovingAverages(periods) => {
                let configs = periods
                    .into_iter()
                    .enumerate()
                    .map(|(i, period)| match self.chart.moving_averages().get(i) {
                        Some(existing) => MaConfig { period, ..*existing }.sanitized(),
                        None => MaConfig::new(period),
                    })
                    .collect();
                let redraw = self.chart.apply(Command::SetMovingAverages(configs)).await?;
                self.draw(redraw);
            }
            Input::Rate(y) => {
                if let Some(label) = self.chart.price_at(y) {
                    self.renderer.status(&label);
                    self.draw(Redraw::Overlay);
                }
            }
            Input::Hover(x) => match self.chart.bar_info_at(x) {
                Some(info) => self.renderer.status(&info.to_string()),
                None => self.renderer.status("No bar under cursor"),
            },
            Input::Save => self.chart.persist_annotations(&self.annotations_path),
            Input::Quit => return Ok(Flow::Quit),
        }

        Ok(Flow::Continue)
    }

    fn shutdown(&mut self) {
        if let Some(pending) = self.pending.take() {
            pending.handle.abort();
            self.chart.cancel_tick(&pending.request);
        }

        self.chart.persist_annotations(&self.annotations_path);
        log::info!("Annotations saved to {}", self.annotations_path.display());
    }
}
