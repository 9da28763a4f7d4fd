//! Line-oriented control protocol read from stdin.

use data::{Command, LineStyle, config::theme::hex_to_color};
use exchange::Timeframe;
use iced_core::Point;

#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    Chart(Command),
    Symbol(String),
    Edit(LineStyle),
    MovingAverages(Vec<usize>),
    Rate(f32),
    Hover(f32),
    Save,
    Quit,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum InputError {
    #[error("unknown command: {0}")]
    Unknown(String),
    #[error("`{0}` expects {1}")]
    Arguments(&'static str, &'static str),
}

pub fn parse(line: &str) -> Result<Input, InputError> {
    let mut words = line.split_whitespace();
    let Some(head) = words.next() else {
        return Err(InputError::Unknown(String::new()));
    };
    let args: Vec<&str> = words.collect();

    let mut chars = head.chars();
    if let (Some(key), None) = (chars.next(), chars.next())
        && let Some(timeframe) = Timeframe::from_key(key)
    {
        return Ok(Input::Chart(Command::SelectTimeframe(timeframe)));
    }

    let input = match head.to_ascii_lowercase().as_str() {
        "h" => Input::Chart(Command::ToggleHorizontalMode),
        "d" => Input::Chart(Command::ToggleDiagonalMode),
        "c" => Input::Chart(Command::ToggleCandles),
        "m" => Input::Chart(Command::ToggleMovingAverages),
        "v" => Input::Chart(Command::ToggleDividers),
        "del" => Input::Chart(Command::DeleteSelected),
        "release" => Input::Chart(Command::Release),
        "unrate" => Input::Chart(Command::RateRelease),
        "click" => Input::Chart(Command::Click(point(&args, "click")?)),
        "drag" => Input::Chart(Command::Drag(point(&args, "drag")?)),
        "rate" => Input::Rate(number(&args, "rate")?),
        "hover" => Input::Hover(number(&args, "hover")?),
        "count" => {
            let count = args
                .first()
                .and_then(|s| s.parse().ok())
                .ok_or(InputError::Arguments("count", "a bar count"))?;
            Input::Chart(Command::SetDisplayCount(count))
        }
        "sym" => match args.as_slice() {
            [symbol] => Input::Symbol(symbol.to_string()),
            _ => return Err(InputError::Arguments("sym", "a symbol or short name")),
        },
        "edit" => {
            let err = InputError::Arguments("edit", "a #RRGGBB colour and a width");
            match args.as_slice() {
                [color, width] => {
                    let color = hex_to_color(color).ok_or(err.clone())?;
                    let width = width.parse().map_err(|_| err)?;
                    Input::Edit(LineStyle::new(color, width))
                }
                _ => return Err(err),
            }
        }
        "ma" => {
            let periods: Result<Vec<usize>, _> = args
                .concat()
                .split(',')
                .filter(|s| !s.is_empty())
                .map(str::parse)
                .collect();
            match periods {
                Ok(periods) if !periods.is_empty() => Input::MovingAverages(periods),
                _ => return Err(InputError::Arguments("ma", "comma separated periods")),
            }
        }
        "save" => Input::Save,
        "quit" | "q" | "exit" => Input::Quit,
        _ => return Err(InputError::Unknown(head.to_string())),
    };

    Ok(input)
}

fn number(args: &[&str], name: &'static str) -> Result<f32, InputError> {
    args.first()
        .and_then(|s| s.parse::<f32>().ok())
        .filter(|v| v.is_finite())
        .ok_or(InputError::Arguments(name, "a pixel coordinate"))
}

fn point(args: &[&str], name: &'static str) -> Result<Point, InputError> {
    match args {
        [x, y] => match (x.parse::<f32>(), y.parse::<f32>()) {
            (Ok(x), Ok(y)) if x.is_finite() && y.is_finite() => Ok(Point::new(x, y)),
            _ => Err(InputError::Arguments(name, "X Y pixel coordinates")),
        },
        _ => Err(InputError::Arguments(name, "X Y pixel coordinates")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use iced_core::Color;

    #[test]
    fn digits_select_timeframes() {
        assert_eq!(
            parse("1"),
            Ok(Input::Chart(Command::SelectTimeframe(Timeframe::M1)))
        );
        assert_eq!(
            parse(" 9 "),
            Ok(Input::Chart(Command::SelectTimeframe(Timeframe::MN1)))
        );
        assert!(parse("0").is_err());
    }

    #[test]
    fn pointer_commands() {
        assert_eq!(
            parse("click 12 40.5"),
            Ok(Input::Chart(Command::Click(Point::new(12.0, 40.5))))
        );
        assert_eq!(
            parse("drag 3 4"),
            Ok(Input::Chart(Command::Drag(Point::new(3.0, 4.0))))
        );
        assert_eq!(parse("rate 120"), Ok(Input::Rate(120.0)));
        assert_eq!(parse("hover 700"), Ok(Input::Hover(700.0)));
        assert!(parse("click 12").is_err());
        assert!(parse("hover NaN").is_err());
    }

    #[test]
    fn commands_with_values() {
        assert_eq!(parse("sym gj"), Ok(Input::Symbol("gj".into())));
        assert_eq!(
            parse("count 400"),
            Ok(Input::Chart(Command::SetDisplayCount(400)))
        );
        assert_eq!(
            parse("ma 20, 75,200"),
            Ok(Input::MovingAverages(vec![20, 75, 200]))
        );
        assert_eq!(
            parse("edit #00ff00 3"),
            Ok(Input::Edit(LineStyle::new(Color::from_rgb8(0, 255, 0), 3)))
        );
        assert!(parse("ma").is_err());
        assert!(parse("edit green 3").is_err());
        assert!(parse("count many").is_err());
    }

    #[test]
    fn unknown_input() {
        assert_eq!(parse("zoom"), Err(InputError::Unknown("zoom".into())));
        assert!(parse("   ").is_err());
        assert_eq!(parse("Q"), Ok(Input::Quit));
        assert_eq!(parse("c"), Ok(Input::Chart(Command::ToggleCandles)));
    }
}
