use regex::Regex;

use std::sync::LazyLock;

static FULL_SYMBOL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z]{6}$").expect("valid symbol pattern"));
static SHORT_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z]{2}$").expect("valid short name pattern"));

/// Two-letter label made of the first letter of each currency,
/// `USDJPY -> UJ`. Symbols too short for that are returned as is.
pub fn short_name(symbol: &str) -> String {
    let mut chars = symbol.chars();
    match (chars.next(), chars.nth(2)) {
        (Some(base), Some(quote)) => [base, quote].iter().collect(),
        _ => symbol.to_string(),
    }
}

/// Turns typed input into a known symbol. Accepts a full six-letter symbol
/// or its short name, in any case. Anything else, including a short name
/// shared by several symbols, gives `None`.
pub fn resolve(input: &str, known: &[String]) -> Option<String> {
    let input = input.trim().to_uppercase();

    if FULL_SYMBOL.is_match(&input) {
        if known.is_empty() || known.iter().any(|s| *s == input) {
            return Some(input);
        }
        log::debug!("Symbol {input} is not in the configured list");
        return None;
    }

    if SHORT_NAME.is_match(&input) {
        let mut matches = known.iter().filter(|s| short_name(s) == input);
        return match (matches.next(), matches.next()) {
            (Some(symbol), None) => Some(symbol.clone()),
            (Some(_), Some(_)) => {
                log::debug!("Short name {input} is ambiguous");
                None
            }
            _ => {
                log::debug!("No symbol abbreviates to {input}");
                None
            }
        };
    }

    log::debug!("Ignoring symbol input {input:?}");
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn known() -> Vec<String> {
        ["USDJPY", "EURUSD", "GBPJPY"]
            .iter()
            .map(ToString::to_string)
            .collect()
    }

    #[test]
    fn short_names() {
        assert_eq!(short_name("USDJPY"), "UJ");
        assert_eq!(short_name("EURUSD"), "EU");
        assert_eq!(short_name("XAU"), "XAU");
    }

    #[test]
    fn resolves_full_and_short_input() {
        assert_eq!(resolve("eurusd", &known()).as_deref(), Some("EURUSD"));
        assert_eq!(resolve(" gj ", &known()).as_deref(), Some("GBPJPY"));
        assert_eq!(resolve("uj", &known()).as_deref(), Some("USDJPY"));
    }

    #[test]
    fn unknown_input_is_ignored() {
        assert_eq!(resolve("AUDNZD", &known()), None);
        assert_eq!(resolve("ZZ", &known()), None);
        assert_eq!(resolve("U", &known()), None);
        assert_eq!(resolve("USD/JPY", &known()), None);
        assert_eq!(resolve("AUDNZD", &[]).as_deref(), Some("AUDNZD"));
    }

    #[test]
    fn ambiguous_short_name_is_ignored() {
        let known = vec!["EURUSD".to_string(), "EURUSX".to_string()];
        assert_eq!(resolve("EU", &known), None);
    }
}
