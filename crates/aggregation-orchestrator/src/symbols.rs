/// Trimmed, uppercase ticker
pub fn normalize_symbol(symbol: &str) -> String {
    symbol.trim().to_uppercase()
}

/// Split a comma- or whitespace-separated ticker list; blanks are dropped, order is kept
pub fn parse_symbols(input: &str) -> Vec<String> {
    input
        .split(|c: char| c == ',' || c.is_whitespace())
        .map(normalize_symbol)
        .filter(|s| !s.is_empty())
        .collect()
}

/// Stable identifier for a symbol group: sorted, de-duplicated, joined by `-`
pub fn group_key(symbols: &[String]) -> String {
    let mut sorted: Vec<&str> = symbols.iter().map(String::as_str).collect();
    sorted.sort_unstable();
    sorted.dedup();
    sorted.join("-")
}

/// Whether a news cache identifier (`{group}_{days}d_{max}[_mixed]`) includes `symbol` as a
/// whole group member
pub fn news_key_covers(identifier: &str, symbol: &str) -> bool {
    let group = identifier.split_once('_').map_or(identifier, |(group, _)| group);
    group == symbol
        || group.starts_with(&format!("{}-", symbol))
        || group.ends_with(&format!("-{}", symbol))
        || group.contains(&format!("-{}-", symbol))
}
