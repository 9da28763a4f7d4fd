use super::scale::Projection;
use crate::config::theme;
use crate::{InternalError, read_json_file, write_json_to_file};

use exchange::Price;
use iced_core::{Color, Point};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

pub const MIN_LINE_WIDTH: u16 = 1;
pub const MAX_LINE_WIDTH: u16 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LineId(Uuid);

impl LineId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for LineId {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LineStyle {
    #[serde(with = "theme::hex")]
    pub color: Color,
    #[serde(deserialize_with = "clamped_width")]
    pub width: u16,
}

impl LineStyle {
    pub fn new(color: Color, width: u16) -> Self {
        Self {
            color,
            width: width.clamp(MIN_LINE_WIDTH, MAX_LINE_WIDTH),
        }
    }
}

impl Default for LineStyle {
    fn default() -> Self {
        Self::new(Color::from_rgb8(255, 0, 0), 1)
    }
}

fn clamped_width<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u16, D::Error> {
    let width = u64::deserialize(deserializer)?;
    let width = u16::try_from(width).unwrap_or(MAX_LINE_WIDTH);
    Ok(width.clamp(MIN_LINE_WIDTH, MAX_LINE_WIDTH))
}

#[derive(Debug, Clone, PartialEq)]
pub struct HorizontalLine {
    pub id: LineId,
    pub price: Price,
    pub style: LineStyle,
}

/// Trend line between two `(time, price)` points. Endpoints are absolute, so
/// the line survives timeframe switches.
#[derive(Debug, Clone, PartialEq)]
pub struct DiagonalLine {
    pub id: LineId,
    pub symbol: String,
    pub t1: u64,
    pub p1: Price,
    pub t2: u64,
    pub p2: Price,
    pub style: LineStyle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    Horizontal(LineId),
    Diagonal(LineId),
}

impl Selection {
    pub fn id(&self) -> LineId {
        match self {
            Selection::Horizontal(id) | Selection::Diagonal(id) => *id,
        }
    }
}

/// Lines to draw for one symbol.
#[derive(Debug, Clone, Default)]
pub struct SymbolLines<'a> {
    pub horizontal: &'a [HorizontalLine],
    pub diagonal: Vec<&'a DiagonalLine>,
}

impl SymbolLines<'_> {
    pub fn is_empty(&self) -> bool {
        self.horizontal.is_empty() && self.diagonal.is_empty()
    }
}

/// User-drawn lines for every symbol. Horizontal lines are kept per symbol,
/// diagonal lines in one list in placement order.
#[derive(Debug, Clone, Default)]
pub struct AnnotationStore {
    horizontal: FxHashMap<String, Vec<HorizontalLine>>,
    diagonal: Vec<DiagonalLine>,
}

impl AnnotationStore {
    pub fn add_horizontal(&mut self, symbol: &str, price: Price, style: LineStyle) -> LineId {
        let id = LineId::new();
        self.horizontal
            .entry(symbol.to_string())
            .or_default()
            .push(HorizontalLine { id, price, style });
        id
    }

    pub fn add_diagonal(
        &mut self,
        symbol: &str,
        (t1, p1): (u64, Price),
        (t2, p2): (u64, Price),
        style: LineStyle,
    ) -> LineId {
        let id = LineId::new();
        self.diagonal.push(DiagonalLine {
            id,
            symbol: symbol.to_string(),
            t1,
            p1,
            t2,
            p2,
            style,
        });
        id
    }

    pub fn horizontal(&self, symbol: &str) -> &[HorizontalLine] {
        self.horizontal
            .get(symbol)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn diagonal<'a>(&'a self, symbol: &'a str) -> impl Iterator<Item = &'a DiagonalLine> {
        self.diagonal.iter().filter(move |line| line.symbol == symbol)
    }

    pub fn apply_to_chart(&self, symbol: &str) -> SymbolLines<'_> {
        SymbolLines {
            horizontal: self.horizontal(symbol),
            diagonal: self
                .diagonal
                .iter()
                .filter(|line| line.symbol == symbol)
                .collect(),
        }
    }

    /// Symbols that have at least one line.
    pub fn symbols(&self) -> BTreeSet<&str> {
        self.horizontal
            .iter()
            .filter(|(_, lines)| !lines.is_empty())
            .map(|(symbol, _)| symbol.as_str())
            .chain(self.diagonal.iter().map(|line| line.symbol.as_str()))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.horizontal.values().all(Vec::is_empty) && self.diagonal.is_empty()
    }

    pub fn contains(&self, symbol: &str, selection: &Selection) -> bool {
        self.style_of(symbol, selection).is_some()
    }

    /// Hit-tests horizontal lines first, then diagonal ones, in placement order.
    pub fn select_at(
        &self,
        symbol: &str,
        point: Point,
        tolerance: f32,
        projection: &Projection<'_>,
    ) -> Option<Selection> {
        let horizontal = self.horizontal(symbol).iter().find(|line| {
            (projection.prices.price_to_y(line.price) - point.y).abs() <= tolerance
        });
        if let Some(line) = horizontal {
            return Some(Selection::Horizontal(line.id));
        }

        self.diagonal(symbol)
            .find(|line| {
                let a = projection.to_screen(line.t1, line.p1);
                let b = projection.to_screen(line.t2, line.p2);
                distance_to_segment(point, a, b) <= tolerance
            })
            .map(|line| Selection::Diagonal(line.id))
    }

    /// Removes the selected line. A selection that no longer exists is a
    /// no-op and returns `false`.
    pub fn delete_selected(&mut self, symbol: &str, selection: &Selection) -> bool {
        match selection {
            Selection::Horizontal(id) => match self.horizontal.get_mut(symbol) {
                Some(lines) => {
                    let before = lines.len();
                    lines.retain(|line| line.id != *id);
                    lines.len() != before
                }
                None => false,
            },
            Selection::Diagonal(id) => {
                let before = self.diagonal.len();
                self.diagonal
                    .retain(|line| !(line.id == *id && line.symbol == symbol));
                self.diagonal.len() != before
            }
        }
    }

    pub fn move_horizontal(&mut self, symbol: &str, id: LineId, price: Price) -> bool {
        self.horizontal
            .get_mut(symbol)
            .and_then(|lines| lines.iter_mut().find(|line| line.id == id))
            .map(|line| line.price = price)
            .is_some()
    }

    /// Shifts both endpoints by `dt` seconds and `dp` price.
    pub fn translate_diagonal(&mut self, symbol: &str, id: LineId, dt: i64, dp: Price) -> bool {
        let shift = |t: u64| t.saturating_add_signed(dt);

        self.diagonal
            .iter_mut()
            .find(|line| line.id == id && line.symbol == symbol)
            .map(|line| {
                line.t1 = shift(line.t1);
                line.t2 = shift(line.t2);
                line.p1 = line.p1 + dp;
                line.p2 = line.p2 + dp;
            })
            .is_some()
    }

    pub fn style_of(&self, symbol: &str, selection: &Selection) -> Option<LineStyle> {
        match selection {
            Selection::Horizontal(id) => self
                .horizontal(symbol)
                .iter()
                .find(|line| line.id == *id)
                .map(|line| line.style),
            Selection::Diagonal(id) => self
                .diagonal(symbol)
                .find(|line| line.id == *id)
                .map(|line| line.style),
        }
    }

    pub fn set_style(&mut self, symbol: &str, selection: &Selection, style: LineStyle) -> bool {
        let style = LineStyle::new(style.color, style.width);

        let slot = match selection {
            Selection::Horizontal(id) => self
                .horizontal
                .get_mut(symbol)
                .and_then(|lines| lines.iter_mut().find(|line| line.id == *id))
                .map(|line| &mut line.style),
            Selection::Diagonal(id) => self
                .diagonal
                .iter_mut()
                .find(|line| line.id == *id && line.symbol == symbol)
                .map(|line| &mut line.style),
        };

        slot.map(|slot| *slot = style).is_some()
    }

    /// Removes every line of `symbol`, returning how many were dropped.
    pub fn clear_symbol(&mut self, symbol: &str) -> usize {
        let horizontal = self.horizontal.remove(symbol).map_or(0, |lines| lines.len());

        let before = self.diagonal.len();
        self.diagonal.retain(|line| line.symbol != symbol);

        horizontal + before - self.diagonal.len()
    }

    /// Replaces the whole store with the file's contents. A missing or
    /// unreadable file leaves the store empty.
    pub fn load(&mut self, path: &Path) {
        *self = match read_json_file::<BTreeMap<String, SymbolRecord>>(path) {
            Ok(records) => {
                let store = Self::from_records(records);
                log::info!(
                    "Loaded annotations for {} symbol(s) from {}",
                    store.symbols().len(),
                    path.display()
                );
                store
            }
            Err(InternalError::Io { source, .. })
                if source.kind() == std::io::ErrorKind::NotFound =>
            {
                log::info!("No annotations at {}", path.display());
                Self::default()
            }
            Err(err) => {
                log::error!("Failed to load annotations: {err}");
                Self::default()
            }
        };
    }

    /// Writes every symbol's lines to `path`. Failures are logged only.
    pub fn persist(&self, path: &Path) {
        let result = serde_json::to_string_pretty(&self.to_records())
            .map_err(|source| InternalError::Json {
                path: path.to_path_buf(),
                source,
            })
            .and_then(|json| write_json_to_file(&json, path));

        match result {
            Ok(()) => log::debug!("Annotations saved to {}", path.display()),
            Err(err) => log::error!("Failed to save annotations: {err}"),
        }
    }

    fn to_records(&self) -> BTreeMap<String, SymbolRecord> {
        let mut records: BTreeMap<String, SymbolRecord> = BTreeMap::new();

        for (symbol, lines) in &self.horizontal {
            if lines.is_empty() {
                continue;
            }
            records.entry(symbol.clone()).or_default().horizontal =
                lines.iter().map(HorizontalRecord::from).collect();
        }

        for line in &self.diagonal {
            records
                .entry(line.symbol.clone())
                .or_default()
                .diagonal
                .push(DiagonalRecord::from(line));
        }

        records
    }

    fn from_records(records: BTreeMap<String, SymbolRecord>) -> Self {
        let mut store = Self::default();

        for (symbol, record) in records {
            for line in record.horizontal {
                store.add_horizontal(&symbol, line.price, line.style);
            }
            for line in record.diagonal {
                store.add_diagonal(&symbol, (line.t1, line.p1), (line.t2, line.p2), line.style);
            }
        }

        store
    }
}

/// Euclidean distance from `p` to the segment `a`-`b`.
pub fn distance_to_segment(p: Point, a: Point, b: Point) -> f32 {
    let (dx, dy) = (b.x - a.x, b.y - a.y);
    let length_sq = dx * dx + dy * dy;

    if length_sq == 0.0 {
        return p.distance(a);
    }

    let t = (((p.x - a.x) * dx + (p.y - a.y) * dy) / length_sq).clamp(0.0, 1.0);
    p.distance(Point::new(a.x + t * dx, a.y + t * dy))
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SymbolRecord {
    #[serde(default)]
    horizontal: Vec<HorizontalRecord>,
    #[serde(default)]
    diagonal: Vec<DiagonalRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
struct HorizontalRecord {
    price: Price,
    #[serde(flatten)]
    style: LineStyle,
}

#[derive(Debug, Serialize, Deserialize)]
struct DiagonalRecord {
    t1: u64,
    p1: Price,
    t2: u64,
    p2: Price,
    #[serde(flatten)]
    style: LineStyle,
}

impl From<&HorizontalLine> for HorizontalRecord {
    fn from(line: &HorizontalLine) -> Self {
        Self {
            price: line.price,
            style: line.style,
        }
    }
}

impl From<&DiagonalLine> for DiagonalRecord {
    fn from(line: &DiagonalLine) -> Self {
        Self {
            t1: line.t1,
            p1: line.p1,
            t2: line.t2,
            p2: line.p2,
            style: line.style,
        }
    }
}
