use iced_core::{Color, Point, Rectangle};

/// A draw call in chart pixel space. Rendering is left to the host.
#[derive(Debug, Clone, PartialEq)]
pub enum Primitive {
    Rect {
        bounds: Rectangle,
        color: Color,
    },
    Line {
        from: Point,
        to: Point,
        color: Color,
        width: f32,
        dashed: bool,
    },
    Polyline {
        points: Vec<Point>,
        color: Color,
        width: f32,
    },
    Marker {
        at: Point,
        radius: f32,
        color: Color,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Layer {
    Candles,
    Indicators,
    Dividers,
    Annotations,
    Overlay,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    pub width: f32,
    pub height: f32,
    primitives: Vec<(Layer, Primitive)>,
}

impl Frame {
    pub fn new(width: f32, height: f32) -> Self {
        Self {
            width,
            height,
            primitives: vec![],
        }
    }

    pub fn push(&mut self, layer: Layer, primitive: Primitive) {
        self.primitives.push((layer, primitive));
    }

    pub fn fill_rect(&mut self, layer: Layer, x: f32, y: f32, width: f32, height: f32, color: Color) {
        self.push(
            layer,
            Primitive::Rect {
                bounds: Rectangle {
                    x,
                    y,
                    width,
                    height,
                },
                color,
            },
        );
    }

    pub fn line(&mut self, layer: Layer, from: Point, to: Point, color: Color, width: f32) {
        self.push(
            layer,
            Primitive::Line {
                from,
                to,
                color,
                width,
                dashed: false,
            },
        );
    }

    pub fn dashed_line(&mut self, layer: Layer, from: Point, to: Point, color: Color) {
        self.push(
            layer,
            Primitive::Line {
                from,
                to,
                color,
                width: 1.0,
                dashed: true,
            },
        );
    }

    pub fn primitives(&self) -> impl Iterator<Item = &Primitive> {
        self.primitives.iter().map(|(_, primitive)| primitive)
    }

    pub fn layer(&self, layer: Layer) -> impl Iterator<Item = &Primitive> {
        self.primitives
            .iter()
            .filter(move |(l, _)| *l == layer)
            .map(|(_, primitive)| primitive)
    }

    pub fn count(&self, layer: Layer) -> usize {
        self.layer(layer).count()
    }

    pub fn len(&self) -> usize {
        self.primitives.len()
    }

    pub fn is_empty(&self) -> bool {
        self.primitives.is_empty()
    }
}
