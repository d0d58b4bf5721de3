//! Currency display. The host may plug in its own formatter; the default
//! maps a currency code to a display locale and always prints exactly two
//! fraction digits.

use rust_decimal::{Decimal, RoundingStrategy};

pub const FALLBACK_LOCALE: &str = "en-US";
pub const FALLBACK_CURRENCY: &str = "GBP";

const NBSP: &str = "\u{a0}";

pub trait CurrencyFormatter: Send + Sync {
    fn format(&self, amount: Decimal, currency_code: Option<&str>) -> String;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Grouping {
    Thousands,
    /// 12,34,567: first group of three, then pairs.
    Indian,
}

#[derive(Debug, Clone, Copy)]
struct LocaleStyle {
    locale: &'static str,
    symbol: &'static str,
    symbol_after: bool,
    group_separator: &'static str,
    decimal_separator: &'static str,
    grouping: Grouping,
}

const fn prefix(locale: &'static str, symbol: &'static str) -> LocaleStyle {
    LocaleStyle {
        locale,
        symbol,
        symbol_after: false,
        group_separator: ",",
        decimal_separator: ".",
        grouping: Grouping::Thousands,
    }
}

fn style_for(currency_code: &str) -> Option<LocaleStyle> {
    let style = match currency_code {
        "GBP" => prefix("en-GB", "£"),
        "USD" => prefix("en-US", "$"),
        "AUD" => prefix("en-AU", "$"),
        "CAD" => prefix("en-CA", "$"),
        "JPY" => prefix("ja-JP", "￥"),
        "EUR" => LocaleStyle {
            locale: "de-DE",
            symbol: "€",
            symbol_after: true,
            group_separator: ".",
            decimal_separator: ",",
            grouping: Grouping::Thousands,
        },
        "CHF" => LocaleStyle {
            locale: "de-CH",
            symbol: "CHF\u{a0}",
            symbol_after: false,
            group_separator: "’",
            decimal_separator: ".",
            grouping: Grouping::Thousands,
        },
        "INR" => LocaleStyle {
            grouping: Grouping::Indian,
            ..prefix("en-IN", "₹")
        },
        _ => return None,
    };
    Some(style)
}

/// Display locale used for a currency code.
pub fn locale_for(currency_code: &str) -> &'static str {
    style_for(&currency_code.trim().to_ascii_uppercase())
        .map(|style| style.locale)
        .unwrap_or(FALLBACK_LOCALE)
}

#[derive(Debug, Clone)]
pub struct LocaleCurrencyFormatter {
    default_currency: String,
}

impl Default for LocaleCurrencyFormatter {
    fn default() -> Self {
        Self::new(FALLBACK_CURRENCY)
    }
}

impl LocaleCurrencyFormatter {
    pub fn new(default_currency: impl Into<String>) -> Self {
        let default_currency = default_currency.into().trim().to_ascii_uppercase();
        Self {
            default_currency: if default_currency.is_empty() {
                FALLBACK_CURRENCY.to_string()
            } else {
                default_currency
            },
        }
    }
}

impl CurrencyFormatter for LocaleCurrencyFormatter {
    fn format(&self, amount: Decimal, currency_code: Option<&str>) -> String {
        let code = currency_code
            .map(str::trim)
            .filter(|code| !code.is_empty())
            .map(str::to_ascii_uppercase)
            .unwrap_or_else(|| self.default_currency.clone());

        // Unknown codes render in the fallback locale with the ISO code
        // standing in for a symbol.
        let (style, symbol) = match style_for(&code) {
            Some(style) => (style, style.symbol.to_string()),
            None => (prefix(FALLBACK_LOCALE, ""), format!("{code}{NBSP}")),
        };

        let rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
        let negative = rounded.is_sign_negative() && !rounded.is_zero();
        let digits = format!("{:.2}", rounded.abs());
        let (whole, fraction) = digits.split_once('.').unwrap_or((digits.as_str(), "00"));
        let number = format!(
            "{}{}{}",
            group_digits(whole, style.group_separator, style.grouping),
            style.decimal_separator,
            fraction
        );

        let sign = if negative { "-" } else { "" };
        if style.symbol_after {
            format!("{sign}{number}{NBSP}{symbol}")
        } else {
            format!("{sign}{symbol}{number}")
        }
    }
}

fn group_digits(whole: &str, separator: &str, grouping: Grouping) -> String {
    if whole.len() <= 3 {
        return whole.to_string();
    }
    let (head, tail) = whole.split_at(whole.len() - 3);
    let step = match grouping {
        Grouping::Thousands => 3,
        Grouping::Indian => 2,
    };

    let mut groups = Vec::new();
    let mut end = head.len();
    while end > 0 {
        let start = end.saturating_sub(step);
        groups.push(&head[start..end]);
        end = start;
    }
    groups.reverse();
    groups.push(tail);
    groups.join(separator)
}
