pub mod annotation;
pub mod frame;
pub mod indicator;
pub mod scale;

use crate::cache::{CacheError, CacheKey, RateCache};
use crate::config::{settings::Settings, theme};
use crate::symbol;
use crate::util::format_utc;

use annotation::{AnnotationStore, LineStyle, Selection};
use exchange::{AdapterError, Bar, Price, RateRequest, RateSource, Timeframe};
use frame::{Frame, Layer, Primitive};
use iced_core::Point;
use indicator::MaConfig;
use scale::{BarSpace, Projection};

use std::fmt;
use std::path::Path;

pub const MIN_DISPLAY_COUNT: usize = crate::config::settings::MIN_DISPLAY_COUNT;
pub const MAX_DISPLAY_COUNT: usize = crate::config::settings::MAX_DISPLAY_COUNT;

const SECONDS_PER_DAY: u64 = 86_400;
const ANCHOR_RADIUS: f32 = 3.0;
const BAR_TIME_FORMAT: &str = "%Y.%m.%d %H:%M";

/// First point of a diagonal line being placed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Anchor {
    pub time: u64,
    pub price: Price,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Interaction {
    #[default]
    Idle,
    PlacingHorizontal,
    PlacingDiagonal(Option<Anchor>),
}

/// An open dialog. While one is open, auto-refresh ticks are skipped.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Modal {
    #[default]
    None,
    EditingAnnotation(Selection),
    SymbolInput(String),
}

impl Modal {
    pub fn is_open(&self) -> bool {
        !matches!(self, Modal::None)
    }
}

/// How much of the chart a change invalidates, from nothing to everything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Redraw {
    #[default]
    None,
    /// Crosshair, pending anchor or dialogs only.
    Overlay,
    Annotations,
    Full,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    SelectTimeframe(Timeframe),
    OpenSymbolInput,
    TypeSymbol(String),
    SubmitSymbol,
    CancelSymbolInput,
    ToggleHorizontalMode,
    ToggleDiagonalMode,
    Click(Point),
    Drag(Point),
    Release,
    RateRelease,
    DeleteSelected,
    BeginEdit,
    CommitEdit(LineStyle),
    CancelEdit,
    ToggleCandles,
    ToggleMovingAverages,
    ToggleDividers,
    SetDisplayCount(usize),
    SetMovingAverages(Vec<MaConfig>),
}

/// Hover read-out for the bar under the cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BarInfo {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub time: String,
    pub open: String,
    pub high: String,
    pub low: String,
    pub close: String,
}

impl fmt::Display for BarInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} O:{} H:{} L:{} C:{}",
            self.symbol, self.timeframe, self.time, self.open, self.high, self.low, self.close
        )
    }
}

/// Everything one chart window shows: the active symbol and timeframe,
/// their cached bars, the user's lines, and the input mode.
pub struct ChartViewState<S> {
    source: S,
    cache: RateCache,
    annotations: AnnotationStore,
    symbol: String,
    timeframe: Timeframe,
    symbols: Vec<String>,
    display_count: usize,
    height: f32,
    interaction: Interaction,
    modal: Modal,
    selection: Option<Selection>,
    drag_from: Option<Point>,
    crosshair: Option<f32>,
    show_candles: bool,
    show_moving_averages: bool,
    show_dividers: bool,
    moving_averages: Vec<MaConfig>,
    selection_tolerance: f32,
    line_style: LineStyle,
}

impl<S: RateSource> ChartViewState<S> {
    pub fn new(source: S, settings: &Settings) -> Self {
        Self {
            source,
            cache: RateCache::new(settings.max_cached_bars),
            annotations: AnnotationStore::default(),
            symbol: settings.symbol.clone(),
            timeframe: settings.timeframe,
            symbols: settings.symbols.clone(),
            display_count: settings
                .display_count
                .clamp(MIN_DISPLAY_COUNT, MAX_DISPLAY_COUNT),
            height: settings.chart_height,
            interaction: Interaction::Idle,
            modal: Modal::None,
            selection: None,
            drag_from: None,
            crosshair: None,
            show_candles: settings.show_candles,
            show_moving_averages: settings.show_moving_averages,
            show_dividers: settings.show_dividers,
            moving_averages: settings.moving_averages.clone(),
            selection_tolerance: settings.selection_tolerance,
            line_style: LineStyle::default(),
        }
    }

    pub fn with_annotations(mut self, annotations: AnnotationStore) -> Self {
        self.annotations = annotations;
        self
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn cache(&self) -> &RateCache {
        &self.cache
    }

    pub fn annotations(&self) -> &AnnotationStore {
        &self.annotations
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn timeframe(&self) -> Timeframe {
        self.timeframe
    }

    pub fn display_count(&self) -> usize {
        self.display_count
    }

    pub fn interaction(&self) -> Interaction {
        self.interaction
    }

    pub fn modal(&self) -> &Modal {
        &self.modal
    }

    pub fn selection(&self) -> Option<Selection> {
        self.selection
    }

    pub fn moving_averages(&self) -> &[MaConfig] {
        &self.moving_averages
    }

    pub fn key(&self) -> CacheKey {
        CacheKey::new(self.symbol.clone(), self.timeframe)
    }

    /// The bars currently on screen, oldest first.
    pub fn window(&self) -> &[Bar] {
        self.cache
            .get(&self.key())
            .map(|series| series.tail(self.display_count))
            .unwrap_or_default()
    }

    pub fn bar_space(&self) -> BarSpace {
        BarSpace::for_count(self.display_count)
    }

    /// Pixel mapping for the current window, `None` until bars are loaded.
    pub fn projection(&self) -> Option<Projection<'_>> {
        Projection::new(self.window(), self.bar_space(), self.height, self.timeframe)
    }

    /// Loads the active series if it is not cached yet.
    pub async fn load(&mut self) -> Result<Redraw, CacheError> {
        let key = self.key();
        self.cache
            .get_or_fetch(&self.source, &key, self.display_count)
            .await?;
        Ok(Redraw::Full)
    }

    pub async fn apply(&mut self, command: Command) -> Result<Redraw, CacheError> {
        let redraw = match command {
            Command::SelectTimeframe(timeframe) => return self.switch_timeframe(timeframe).await,
            Command::OpenSymbolInput => self.open_symbol_input(),
            Command::TypeSymbol(text) => self.type_symbol(text),
            Command::SubmitSymbol => return self.submit_symbol().await,
            Command::CancelSymbolInput => self.cancel_symbol_input(),
            Command::ToggleHorizontalMode => self.toggle_horizontal_mode(),
            Command::ToggleDiagonalMode => self.toggle_diagonal_mode(),
            Command::Click(point) => self.click(point),
            Command::Drag(point) => self.drag_selected(point),
            Command::Release => self.release(),
            Command::RateRelease => self.rate_release(),
            Command::DeleteSelected => self.delete_selected(),
            Command::BeginEdit => self.begin_edit(),
            Command::CommitEdit(style) => self.commit_edit(style),
            Command::CancelEdit => self.cancel_edit(),
            Command::ToggleCandles => {
                self.show_candles = !self.show_candles;
                Redraw::Full
            }
            Command::ToggleMovingAverages => {
                self.show_moving_averages = !self.show_moving_averages;
                Redraw::Full
            }
            Command::ToggleDividers => {
                self.show_dividers = !self.show_dividers;
                Redraw::Full
            }
            Command::SetDisplayCount(count) => return self.set_display_count(count).await,
            Command::SetMovingAverages(configs) => self.set_moving_averages(configs),
        };

        Ok(redraw)
    }

    /// Switches to another symbol, given in full or as its two-letter short
    /// name. Unknown input is ignored. Any placement in progress is dropped.
    pub async fn switch_symbol(&mut self, input: &str) -> Result<Redraw, CacheError> {
        let Some(symbol) = symbol::resolve(input, &self.symbols) else {
            return Ok(Redraw::None);
        };
        if symbol == self.symbol {
            return Ok(Redraw::None);
        }

        let key = CacheKey::new(symbol.clone(), self.timeframe);
        self.cache
            .get_or_fetch(&self.source, &key, self.display_count)
            .await?;

        log::info!("Switched symbol {} -> {symbol}", self.symbol);
        self.symbol = symbol;
        self.interaction = Interaction::Idle;
        self.selection = None;
        self.drag_from = None;
        if matches!(self.modal, Modal::EditingAnnotation(_)) {
            self.modal = Modal::None;
        }

        Ok(Redraw::Full)
    }

    /// Switches timeframe. Lines are stored in absolute time and price, so
    /// annotation state is kept as is.
    pub async fn switch_timeframe(&mut self, timeframe: Timeframe) -> Result<Redraw, CacheError> {
        if timeframe == self.timeframe {
            return Ok(Redraw::None);
        }

        let key = CacheKey::new(self.symbol.clone(), timeframe);
        self.cache
            .get_or_fetch(&self.source, &key, self.display_count)
            .await?;

        log::info!("Switched timeframe {} -> {timeframe}", self.timeframe);
        self.timeframe = timeframe;
        Ok(Redraw::Full)
    }

    /// Periodic top-up of the active series. Skipped while a dialog is open
    /// or a fetch for the same key is outstanding.
    pub async fn auto_refresh_tick(&mut self) -> Result<Redraw, CacheError> {
        if self.modal.is_open() {
            log::debug!("Refresh skipped while a dialog is open");
            return Ok(Redraw::None);
        }

        let key = self.key();
        if self.cache.is_in_flight(&key) {
            log::debug!("Refresh for {key} still running");
            return Ok(Redraw::None);
        }

        let before = self.snapshot();
        self.cache
            .fetch_or_refresh(&self.source, &key, self.display_count)
            .await?;

        Ok(self.redraw_if_changed(before))
    }

    /// First half of a refresh whose fetch runs elsewhere, such as in a
    /// spawned task. Returns `None` when the tick should be skipped.
    pub fn begin_tick(&mut self) -> Option<RateRequest> {
        if self.modal.is_open() {
            log::debug!("Refresh skipped while a dialog is open");
            return None;
        }

        match self.cache.begin(&self.key(), self.display_count) {
            Ok(request) => Some(request),
            Err(err) => {
                log::debug!("Refresh skipped: {err}");
                None
            }
        }
    }

    pub fn finish_tick(
        &mut self,
        request: &RateRequest,
        fetched: Result<Vec<Bar>, AdapterError>,
    ) -> Result<Redraw, CacheError> {
        let before = self.snapshot();
        self.cache.complete(request, fetched)?;

        if CacheKey::from(request) == self.key() {
            Ok(self.redraw_if_changed(before))
        } else {
            Ok(Redraw::None)
        }
    }

    pub fn cancel_tick(&mut self, request: &RateRequest) {
        self.cache.cancel(request);
    }

    fn snapshot(&self) -> (usize, Option<Bar>) {
        let window = self.window();
        (window.len(), window.last().copied())
    }

    fn redraw_if_changed(&self, before: (usize, Option<Bar>)) -> Redraw {
        if self.snapshot() == before {
            Redraw::None
        } else {
            Redraw::Full
        }
    }

    pub fn open_symbol_input(&mut self) -> Redraw {
        self.modal = Modal::SymbolInput(String::new());
        Redraw::Overlay
    }

    pub fn type_symbol(&mut self, text: String) -> Redraw {
        match &mut self.modal {
            Modal::SymbolInput(buffer) => {
                *buffer = text;
                Redraw::Overlay
            }
            _ => Redraw::None,
        }
    }

    pub async fn submit_symbol(&mut self) -> Result<Redraw, CacheError> {
        let Modal::SymbolInput(input) = std::mem::take(&mut self.modal) else {
            return Ok(Redraw::None);
        };

        let redraw = self.switch_symbol(&input).await?;
        Ok(redraw.max(Redraw::Overlay))
    }

    pub fn cancel_symbol_input(&mut self) -> Redraw {
        if matches!(self.modal, Modal::SymbolInput(_)) {
            self.modal = Modal::None;
            Redraw::Overlay
        } else {
            Redraw::None
        }
    }

    pub fn toggle_horizontal_mode(&mut self) -> Redraw {
        self.interaction = match self.interaction {
            Interaction::Idle => Interaction::PlacingHorizontal,
            Interaction::PlacingHorizontal | Interaction::PlacingDiagonal(_) => Interaction::Idle,
        };
        self.after_mode_change()
    }

    pub fn toggle_diagonal_mode(&mut self) -> Redraw {
        self.interaction = match self.interaction {
            Interaction::Idle => Interaction::PlacingDiagonal(None),
            Interaction::PlacingHorizontal | Interaction::PlacingDiagonal(_) => Interaction::Idle,
        };
        self.after_mode_change()
    }

    fn after_mode_change(&mut self) -> Redraw {
        self.drag_from = None;
        if self.selection.take().is_some() {
            Redraw::Annotations
        } else {
            Redraw::Overlay
        }
    }

    /// Places a line point in the placing modes, selects in `Idle`.
    pub fn click(&mut self, point: Point) -> Redraw {
        let Some(projection) = self.projection() else {
            return Redraw::None;
        };
        let (time, price) = projection.from_screen(point);

        match self.interaction {
            Interaction::PlacingHorizontal => {
                self.annotations
                    .add_horizontal(&self.symbol, price, self.line_style);
                self.interaction = Interaction::Idle;
                Redraw::Annotations
            }
            Interaction::PlacingDiagonal(None) => {
                self.interaction = Interaction::PlacingDiagonal(Some(Anchor { time, price }));
                Redraw::Overlay
            }
            Interaction::PlacingDiagonal(Some(anchor)) => {
                self.annotations.add_diagonal(
                    &self.symbol,
                    (anchor.time, anchor.price),
                    (time, price),
                    self.line_style,
                );
                self.interaction = Interaction::Idle;
                Redraw::Annotations
            }
            Interaction::Idle => {
                let hit = self.annotations.select_at(
                    &self.symbol,
                    point,
                    self.selection_tolerance,
                    &projection,
                );
                self.drag_from = hit.map(|_| point);

                if hit == self.selection {
                    Redraw::None
                } else {
                    self.selection = hit;
                    Redraw::Annotations
                }
            }
        }
    }

    /// Moves the selected line along with the pointer.
    pub fn drag_selected(&mut self, point: Point) -> Redraw {
        let (Some(selection), Some(from)) = (self.selection, self.drag_from) else {
            return Redraw::None;
        };
        if self.interaction != Interaction::Idle {
            return Redraw::None;
        }
        let Some(projection) = self.projection() else {
            return Redraw::None;
        };

        let (from_time, from_price) = projection.from_screen(from);
        let (to_time, to_price) = projection.from_screen(point);

        let moved = match selection {
            Selection::Horizontal(id) => {
                self.annotations.move_horizontal(&self.symbol, id, to_price)
            }
            Selection::Diagonal(id) => {
                let dt = to_time as i64 - from_time as i64;
                self.annotations
                    .translate_diagonal(&self.symbol, id, dt, to_price - from_price)
            }
        };

        if moved {
            self.drag_from = Some(point);
            Redraw::Annotations
        } else {
            self.selection = None;
            self.drag_from = None;
            Redraw::None
        }
    }

    pub fn release(&mut self) -> Redraw {
        self.drag_from = None;
        Redraw::None
    }

    /// Price under the rate-control drag, formatted for display. Also shows
    /// the crosshair at `y`.
    pub fn price_at(&mut self, y: f32) -> Option<String> {
        let price = self.projection()?.prices.y_to_price(y);
        self.crosshair = Some(y);
        Some(price.to_string_with(3))
    }

    pub fn rate_release(&mut self) -> Redraw {
        if self.crosshair.take().is_some() {
            Redraw::Overlay
        } else {
            Redraw::None
        }
    }

    pub fn bar_info_at(&self, x: f32) -> Option<BarInfo> {
        let bar = self.projection()?.bar_at(x)?;

        Some(BarInfo {
            symbol: symbol::short_name(&self.symbol),
            timeframe: self.timeframe,
            time: format_utc(bar.time, BAR_TIME_FORMAT),
            open: bar.open.to_string_with(3),
            high: bar.high.to_string_with(3),
            low: bar.low.to_string_with(3),
            close: bar.close.to_string_with(3),
        })
    }

    pub fn delete_selected(&mut self) -> Redraw {
        let Some(selection) = self.selection.take() else {
            return Redraw::None;
        };
        self.drag_from = None;
        if self.modal == Modal::EditingAnnotation(selection) {
            self.modal = Modal::None;
        }

        if self.annotations.delete_selected(&self.symbol, &selection) {
            Redraw::Annotations
        } else {
            log::debug!("Selected line no longer exists");
            Redraw::None
        }
    }

    /// Opens the style dialog for the selected line, returning its style.
    pub fn begin_edit(&mut self) -> Redraw {
        let Some(selection) = self.selection else {
            return Redraw::None;
        };
        if !self.annotations.contains(&self.symbol, &selection) {
            self.selection = None;
            return Redraw::None;
        }

        self.modal = Modal::EditingAnnotation(selection);
        Redraw::Overlay
    }

    pub fn editing_style(&self) -> Option<LineStyle> {
        match &self.modal {
            Modal::EditingAnnotation(selection) => {
                self.annotations.style_of(&self.symbol, selection)
            }
            _ => None,
        }
    }

    pub fn commit_edit(&mut self, style: LineStyle) -> Redraw {
        let Modal::EditingAnnotation(selection) = self.modal else {
            return Redraw::None;
        };
        self.modal = Modal::None;

        if self.annotations.set_style(&self.symbol, &selection, style) {
            Redraw::Annotations
        } else {
            Redraw::Overlay
        }
    }

    pub fn cancel_edit(&mut self) -> Redraw {
        if matches!(self.modal, Modal::EditingAnnotation(_)) {
            self.modal = Modal::None;
            Redraw::Overlay
        } else {
            Redraw::None
        }
    }

    /// Changes how many bars are shown, fetching more history first when
    /// the cache holds fewer than requested. A failed fetch keeps the old count.
    pub async fn set_display_count(&mut self, count: usize) -> Result<Redraw, CacheError> {
        let count = count.clamp(MIN_DISPLAY_COUNT, MAX_DISPLAY_COUNT);
        if count == self.display_count {
            return Ok(Redraw::None);
        }

        let key = self.key();
        if self.cache.contains(&key) && self.cache.needs_backfill(&key, count) {
            self.cache.fetch(&self.source, &key, count).await?;
        }

        self.display_count = count;
        Ok(Redraw::Full)
    }

    pub fn set_moving_averages(&mut self, configs: Vec<MaConfig>) -> Redraw {
        self.moving_averages = configs.into_iter().map(MaConfig::sanitized).collect();
        Redraw::Full
    }

    pub fn persist_annotations(&self, path: &Path) {
        self.annotations.persist(path);
    }

    /// Draw calls for the current state, back to front.
    pub fn frame(&self) -> Frame {
        let bar_space = self.bar_space();
        let mut frame = Frame::new(bar_space.width, self.height);

        let Some(projection) = self.projection() else {
            return frame;
        };

        if self.show_candles {
            self.draw_candles(&mut frame, &projection);
        }
        if self.show_moving_averages {
            self.draw_moving_averages(&mut frame, &projection);
        }
        if self.show_dividers {
            draw_dividers(&mut frame, &projection);
        }
        self.draw_annotations(&mut frame, &projection);
        self.draw_overlay(&mut frame, &projection);

        frame
    }

    fn draw_candles(&self, frame: &mut Frame, projection: &Projection<'_>) {
        let len = projection.window.len();
        let width = projection.bars.candle_width;

        for (i, bar) in projection.window.iter().enumerate() {
            let x = projection.bars.x_of(i, len);
            let high = projection.prices.price_to_y(bar.high);
            let low = projection.prices.price_to_y(bar.low);
            let top = projection.prices.price_to_y(bar.body_top());
            let bottom = projection.prices.price_to_y(bar.body_bottom());

            frame.fill_rect(Layer::Candles, x, high, width, top - high, theme::WICK);
            frame.fill_rect(Layer::Candles, x, bottom, width, low - bottom, theme::WICK);
            frame.fill_rect(
                Layer::Candles,
                x,
                top,
                width,
                (bottom - top).max(1.0),
                theme::BODY,
            );
        }
    }

    fn draw_moving_averages(&self, frame: &mut Frame, projection: &Projection<'_>) {
        let Some(series) = self.cache.get(&self.key()) else {
            return;
        };
        let len = projection.window.len();

        for config in &self.moving_averages {
            let points: Vec<Point> =
                indicator::sma_for_window(series.bars(), len, config.period)
                    .into_iter()
                    .map(|(i, value)| {
                        Point::new(
                            projection.bars.center_of(i, len),
                            projection.prices.value_to_y(value),
                        )
                    })
                    .collect();

            if points.len() >= 2 {
                frame.push(
                    Layer::Indicators,
                    Primitive::Polyline {
                        points,
                        color: config.color,
                        width: 1.0,
                    },
                );
            }
        }
    }

    fn draw_annotations(&self, frame: &mut Frame, projection: &Projection<'_>) {
        let lines = self.annotations.apply_to_chart(&self.symbol);
        let width = frame.width;

        let color_for = |selection: Selection, style: &LineStyle| {
            if self.selection == Some(selection) {
                theme::highlight(style.color)
            } else {
                style.color
            }
        };

        for line in lines.horizontal {
            let y = projection.prices.price_to_y(line.price);
            frame.line(
                Layer::Annotations,
                Point::new(0.0, y),
                Point::new(width, y),
                color_for(Selection::Horizontal(line.id), &line.style),
                f32::from(line.style.width),
            );
        }

        for line in lines.diagonal {
            frame.line(
                Layer::Annotations,
                projection.to_screen(line.t1, line.p1),
                projection.to_screen(line.t2, line.p2),
                color_for(Selection::Diagonal(line.id), &line.style),
                f32::from(line.style.width),
            );
        }
    }

    fn draw_overlay(&self, frame: &mut Frame, projection: &Projection<'_>) {
        if let Interaction::PlacingDiagonal(Some(anchor)) = self.interaction {
            frame.push(
                Layer::Overlay,
                Primitive::Marker {
                    at: projection.to_screen(anchor.time, anchor.price),
                    radius: ANCHOR_RADIUS,
                    color: self.line_style.color,
                },
            );
        }

        if let Some(y) = self.crosshair {
            let width = frame.width;
            frame.dashed_line(
                Layer::Overlay,
                Point::new(0.0, y),
                Point::new(width, y),
                theme::CROSSHAIR,
            );
        }
    }
}

/// Vertical rule at the first bar of each new UTC day.
fn draw_dividers(frame: &mut Frame, projection: &Projection<'_>) {
    let len = projection.window.len();
    let height = frame.height;

    for (i, pair) in projection.window.windows(2).enumerate() {
        if pair[0].time / SECONDS_PER_DAY != pair[1].time / SECONDS_PER_DAY {
            let x = projection.bars.x_of(i + 1, len);
            frame.line(
                Layer::Dividers,
                Point::new(x, 0.0),
                Point::new(x, height),
                theme::DIVIDER,
                1.0,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::mock::{ScriptedSource, bars};

    const M5: u64 = 300;
    const H1: u64 = 3_600;

    fn settings() -> Settings {
        Settings {
            display_count: 20,
            ..Settings::default()
        }
    }

    async fn loaded_chart(source: ScriptedSource) -> ChartViewState<ScriptedSource> {
        let mut chart = ChartViewState::new(source, &settings());
        chart.load().await.unwrap();
        chart
    }

    fn m5_source() -> ScriptedSource {
        ScriptedSource::default().reply(Ok(bars(1_700_000_000, M5, 20)))
    }

    #[tokio::test]
    async fn diagonal_placement_commits_one_line() {
        let mut chart = loaded_chart(m5_source()).await;

        assert_eq!(chart.toggle_diagonal_mode(), Redraw::Overlay);
        assert_eq!(chart.interaction(), Interaction::PlacingDiagonal(None));

        let (first, second) = (Point::new(10.0, 200.0), Point::new(55.0, 40.0));
        let (t1, p1) = chart.projection().unwrap().from_screen(first);
        let (t2, p2) = chart.projection().unwrap().from_screen(second);

        assert_eq!(chart.click(first), Redraw::Overlay);
        assert_eq!(
            chart.interaction(),
            Interaction::PlacingDiagonal(Some(Anchor {
                time: t1,
                price: p1
            }))
        );
        assert_eq!(chart.frame().count(Layer::Overlay), 1);

        assert_eq!(chart.click(second), Redraw::Annotations);
        assert_eq!(chart.interaction(), Interaction::Idle);

        let lines: Vec<_> = chart.annotations().diagonal("USDJPY").collect();
        assert_eq!(lines.len(), 1);
        assert_eq!((lines[0].t1, lines[0].p1, lines[0].t2, lines[0].p2), (t1, p1, t2, p2));
        assert!(chart.annotations().horizontal("USDJPY").is_empty());
    }

    #[tokio::test]
    async fn placement_modes_are_exclusive() {
        let mut chart = loaded_chart(m5_source()).await;

        chart.toggle_horizontal_mode();
        assert_eq!(chart.interaction(), Interaction::PlacingHorizontal);
        chart.toggle_diagonal_mode();
        assert_eq!(chart.interaction(), Interaction::Idle);

        chart.toggle_diagonal_mode();
        chart.click(Point::new(30.0, 100.0));
        chart.toggle_horizontal_mode();
        assert_eq!(chart.interaction(), Interaction::Idle);
        assert_eq!(chart.annotations().diagonal("USDJPY").count(), 0);

        chart.toggle_horizontal_mode();
        assert_eq!(chart.toggle_horizontal_mode(), Redraw::Overlay);
        assert_eq!(chart.interaction(), Interaction::Idle);
    }

    #[tokio::test]
    async fn horizontal_line_select_drag_delete() {
        let mut chart = loaded_chart(m5_source()).await;

        chart.toggle_horizontal_mode();
        assert_eq!(chart.click(Point::new(30.0, 150.0)), Redraw::Annotations);
        assert_eq!(chart.interaction(), Interaction::Idle);
        assert_eq!(chart.annotations().horizontal("USDJPY").len(), 1);

        assert_eq!(chart.click(Point::new(5.0, 153.0)), Redraw::Annotations);
        let Some(Selection::Horizontal(id)) = chart.selection() else {
            panic!("expected a horizontal selection");
        };

        assert_eq!(chart.drag_selected(Point::new(5.0, 100.0)), Redraw::Annotations);
        let expected = chart.projection().unwrap().prices.y_to_price(100.0);
        let line = &chart.annotations().horizontal("USDJPY")[0];
        assert_eq!((line.id, line.price), (id, expected));

        chart.release();
        assert_eq!(chart.drag_selected(Point::new(5.0, 50.0)), Redraw::None);

        assert_eq!(chart.delete_selected(), Redraw::Annotations);
        assert!(chart.annotations().horizontal("USDJPY").is_empty());
        assert_eq!(chart.selection(), None);
        assert_eq!(chart.delete_selected(), Redraw::None);
    }

    #[tokio::test]
    async fn symbol_switch_resets_placement_and_keeps_lines() {
        let source = m5_source().reply(Ok(bars(1_700_000_000, M5, 20)));
        let mut chart = loaded_chart(source).await;

        chart.toggle_horizontal_mode();
        chart.click(Point::new(30.0, 150.0));
        chart.toggle_diagonal_mode();
        chart.click(Point::new(30.0, 150.0));

        assert_eq!(chart.switch_symbol("eu").await.unwrap(), Redraw::Full);
        assert_eq!(chart.symbol(), "EURUSD");
        assert_eq!(chart.interaction(), Interaction::Idle);
        assert!(chart.annotations().apply_to_chart("EURUSD").is_empty());
        assert_eq!(chart.annotations().horizontal("USDJPY").len(), 1);

        assert_eq!(chart.switch_symbol("zz").await.unwrap(), Redraw::None);
        assert_eq!(chart.switch_symbol("EURUSD").await.unwrap(), Redraw::None);
        assert_eq!(chart.source().requests().len(), 2);
    }

    #[tokio::test]
    async fn failed_switch_keeps_current_symbol() {
        let source = m5_source().reply(Err(AdapterError::Upstream("unknown symbol".into())));
        let mut chart = loaded_chart(source).await;

        assert!(chart.switch_symbol("GBPJPY").await.is_err());
        assert_eq!(chart.symbol(), "USDJPY");
        assert_eq!(chart.window().len(), 20);
    }

    #[tokio::test]
    async fn timeframe_switch_uses_cache_on_return() {
        let source = m5_source().reply(Ok(bars(1_700_000_000, H1, 20)));
        let mut chart = loaded_chart(source).await;
        chart.toggle_horizontal_mode();
        chart.click(Point::new(30.0, 150.0));

        assert_eq!(chart.apply(Command::SelectTimeframe(Timeframe::H1)).await.unwrap(), Redraw::Full);
        assert_eq!(chart.timeframe(), Timeframe::H1);
        assert_eq!(chart.window()[1].time - chart.window()[0].time, H1);
        assert_eq!(chart.annotations().horizontal("USDJPY").len(), 1);

        chart.switch_timeframe(Timeframe::M5).await.unwrap();
        assert_eq!(chart.source().requests().len(), 2);
        assert_eq!(chart.window()[1].time - chart.window()[0].time, M5);
    }

    #[tokio::test]
    async fn refresh_is_skipped_while_dialog_open() {
        let mut chart = loaded_chart(m5_source()).await;

        chart.open_symbol_input();
        assert_eq!(chart.auto_refresh_tick().await.unwrap(), Redraw::None);
        assert!(chart.begin_tick().is_none());
        assert_eq!(chart.source().requests().len(), 1);

        chart.type_symbol("gj".into());
        assert_eq!(chart.modal(), &Modal::SymbolInput("gj".into()));
        chart.cancel_symbol_input();

        let last = chart.window()[19];
        let mut updated = last;
        updated.close = Price::from_f64(151.0);
        updated.high = Price::from_f64(151.2);
        chart.source().push(Ok(vec![updated]));

        assert_eq!(chart.auto_refresh_tick().await.unwrap(), Redraw::Full);
        assert_eq!(chart.window()[19], updated);
        assert_eq!(chart.source().requests()[1].from_time, Some(last.time));

        assert_eq!(chart.auto_refresh_tick().await.unwrap(), Redraw::None);
    }

    #[tokio::test]
    async fn spawned_tick_protocol() {
        let mut chart = loaded_chart(m5_source()).await;

        let request = chart.begin_tick().unwrap();
        assert!(chart.begin_tick().is_none());

        let next = chart.window()[19].time + M5;
        let redraw = chart
            .finish_tick(&request, Ok(bars(next, M5, 1)))
            .unwrap();
        assert_eq!(redraw, Redraw::Full);
        assert_eq!(chart.window().last().map(|b| b.time), Some(next));

        let request = chart.begin_tick().unwrap();
        chart.cancel_tick(&request);
        assert!(chart.begin_tick().is_some());
    }

    #[tokio::test]
    async fn hover_and_rate_control() {
        let mut chart = loaded_chart(m5_source()).await;

        let info = chart.bar_info_at(59.0).unwrap();
        let last = chart.window()[19];
        assert_eq!(info.symbol, "UJ");
        assert_eq!(info.close, last.close.to_string_with(3));
        assert_eq!(info.time, format_utc(last.time, BAR_TIME_FORMAT));
        assert!(info.to_string().starts_with("UJ M5 "));
        assert!(chart.bar_info_at(-4.0).is_none());

        let label = chart.price_at(0.0).unwrap();
        assert_eq!(label, chart.projection().unwrap().prices.max().to_string_with(3));
        assert_eq!(chart.frame().count(Layer::Overlay), 1);
        assert_eq!(chart.rate_release(), Redraw::Overlay);
        assert_eq!(chart.frame().count(Layer::Overlay), 0);
    }

    #[tokio::test]
    async fn style_edit_goes_through_modal() {
        let mut chart = loaded_chart(m5_source()).await;
        chart.toggle_horizontal_mode();
        chart.click(Point::new(30.0, 150.0));

        assert_eq!(chart.begin_edit(), Redraw::None);
        chart.click(Point::new(30.0, 150.0));
        assert_eq!(chart.begin_edit(), Redraw::Overlay);
        assert_eq!(chart.editing_style(), Some(LineStyle::default()));

        let style = LineStyle::new(iced_core::Color::from_rgb8(0, 0, 255), 4);
        assert_eq!(chart.commit_edit(style), Redraw::Annotations);
        assert_eq!(chart.modal(), &Modal::None);
        assert_eq!(chart.annotations().horizontal("USDJPY")[0].style, style);
    }

    #[tokio::test]
    async fn frame_contents_follow_toggles() {
        let mut chart = loaded_chart(m5_source()).await;

        let frame = chart.frame();
        assert_eq!(frame.width, 60.0);
        assert_eq!(frame.count(Layer::Candles), 60);
        // 20 bars are too few for any default period to draw a line
        assert_eq!(frame.count(Layer::Indicators), 0);

        let redraw = chart
            .apply(Command::SetMovingAverages(vec![MaConfig::new(3), MaConfig::new(5)]))
            .await
            .unwrap();
        assert_eq!(redraw, Redraw::Full);
        assert_eq!(chart.frame().count(Layer::Indicators), 2);

        chart.apply(Command::ToggleMovingAverages).await.unwrap();
        assert_eq!(chart.frame().count(Layer::Indicators), 0);
        chart.apply(Command::ToggleMovingAverages).await.unwrap();
        assert_eq!(chart.frame().count(Layer::Indicators), 2);

        chart.toggle_horizontal_mode();
        chart.click(Point::new(30.0, 150.0));
        chart.price_at(80.0);
        chart.apply(Command::ToggleCandles).await.unwrap();
        let frame = chart.frame();
        assert_eq!(frame.count(Layer::Candles), 0);
        assert_eq!(frame.count(Layer::Indicators), 2);
        assert_eq!(frame.count(Layer::Annotations), 1);
        assert_eq!(frame.count(Layer::Overlay), 1);

        chart.apply(Command::ToggleCandles).await.unwrap();
        assert_eq!(chart.frame().count(Layer::Candles), 60);
    }

    #[tokio::test]
    async fn dividers_mark_new_days() {
        let start = 1_700_000_000 - 1_700_000_000 % SECONDS_PER_DAY + 20 * H1;
        let source = ScriptedSource::default().reply(Ok(bars(start, H1, 20)));
        let mut chart = ChartViewState::new(source, &settings());
        chart.switch_timeframe(Timeframe::H1).await.unwrap();

        assert_eq!(chart.frame().count(Layer::Dividers), 1);
        chart.apply(Command::ToggleDividers).await.unwrap();
        assert_eq!(chart.frame().count(Layer::Dividers), 0);
    }

    #[tokio::test]
    async fn display_count_is_clamped_and_backfilled() {
        let source = m5_source().reply(Ok(bars(1_700_000_000 - 30 * M5, M5, 50)));
        let mut chart = loaded_chart(source).await;

        assert_eq!(chart.set_display_count(5).await.unwrap(), Redraw::None);
        assert_eq!(chart.display_count(), MIN_DISPLAY_COUNT);

        assert_eq!(chart.set_display_count(50).await.unwrap(), Redraw::Full);
        let requests = chart.source().requests();
        assert_eq!(requests.len(), 2);
        assert_eq!((requests[1].count, requests[1].from_time), (50, None));
        assert_eq!(chart.window().len(), 50);

        chart.set_display_count(5_000).await.unwrap();
        assert_eq!(chart.display_count(), MAX_DISPLAY_COUNT);
    }

    #[tokio::test]
    async fn failed_backfill_keeps_count_and_retries() {
        let source = m5_source().reply(Err(AdapterError::WebsocketError("reset".into())));
        let mut chart = loaded_chart(source).await;

        assert!(chart.set_display_count(50).await.is_err());
        assert_eq!(chart.display_count(), 20);
        assert_eq!(chart.window().len(), 20);
        assert!(!chart.cache().is_in_flight(&chart.key()));

        chart
            .source()
            .push(Ok(bars(1_700_000_000 - 30 * M5, M5, 50)));
        assert_eq!(chart.set_display_count(50).await.unwrap(), Redraw::Full);
        assert_eq!(chart.display_count(), 50);
        assert_eq!(chart.window().len(), 50);

        let requests = chart.source().requests();
        assert_eq!(requests.len(), 3);
        assert_eq!((requests[2].count, requests[2].from_time), (50, None));
    }

    #[tokio::test]
    async fn tick_backfills_count_raised_before_first_load() {
        let source = ScriptedSource::default()
            .reply(Err(AdapterError::WebsocketError("refused".into())))
            .reply(Ok(bars(1_700_000_000, M5, 50)));
        let mut chart = ChartViewState::new(source, &settings());

        assert!(chart.load().await.is_err());
        assert_eq!(chart.set_display_count(50).await.unwrap(), Redraw::Full);

        assert_eq!(chart.auto_refresh_tick().await.unwrap(), Redraw::Full);
        assert_eq!(chart.window().len(), 50);
        let requests = chart.source().requests();
        assert_eq!((requests[1].count, requests[1].from_time), (50, None));
    }

    #[tokio::test]
    async fn switch_to_shorter_cached_series_backfills() {
        let source = m5_source()
            .reply(Ok(bars(1_700_000_000, H1, 20)))
            .reply(Ok(bars(1_700_000_000 - 30 * M5, M5, 50)))
            .reply(Ok(bars(1_700_000_000 - 30 * H1, H1, 50)));
        let mut chart = loaded_chart(source).await;

        chart.switch_timeframe(Timeframe::H1).await.unwrap();
        chart.switch_timeframe(Timeframe::M5).await.unwrap();
        assert_eq!(chart.source().requests().len(), 2);

        chart.set_display_count(50).await.unwrap();
        chart.switch_timeframe(Timeframe::H1).await.unwrap();

        let requests = chart.source().requests();
        assert_eq!(requests.len(), 4);
        assert_eq!(requests[3], RateRequest::latest("USDJPY", Timeframe::H1, 50));
        assert_eq!(chart.window().len(), 50);
    }
}
