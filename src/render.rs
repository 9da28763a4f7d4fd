use data::Redraw;
use data::chart::frame::{Frame, Layer};

/// Receives finished frames. Drawing them is up to the implementation.
pub trait Renderer {
    fn render(&mut self, frame: &Frame, redraw: Redraw);

    fn status(&mut self, text: &str);
}

/// Headless renderer that logs what would be drawn.
#[derive(Debug, Default)]
pub struct LogRenderer {
    frames: usize,
}

impl Renderer for LogRenderer {
    fn render(&mut self, frame: &Frame, redraw: Redraw) {
        self.frames += 1;
        log::info!("#{} {redraw:?}: {}", self.frames, summarize(frame));
    }

    fn status(&mut self, text: &str) {
        log::info!("{text}");
    }
}

pub fn summarize(frame: &Frame) -> String {
    format!(
        "{}x{} candles={} indicators={} dividers={} annotations={} overlay={}",
        frame.width,
        frame.height,
        frame.count(Layer::Candles) / 3,
        frame.count(Layer::Indicators),
        frame.count(Layer::Dividers),
        frame.count(Layer::Annotations),
        frame.count(Layer::Overlay),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use iced_core::{Color, Point};

    #[test]
    fn summary_counts_layers() {
        let mut frame = Frame::new(750.0, 300.0);
        for _ in 0..3 {
            frame.fill_rect(Layer::Candles, 0.0, 0.0, 2.0, 1.0, Color::BLACK);
        }
        frame.dashed_line(
            Layer::Overlay,
            Point::new(0.0, 10.0),
            Point::new(750.0, 10.0),
            Color::BLACK,
        );

        assert_eq!(
            summarize(&frame),
            "750x300 candles=1 indicators=0 dividers=0 annotations=0 overlay=1"
        );
    }
}
