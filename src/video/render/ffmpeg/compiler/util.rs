use std::path::Path;

pub fn format_time(value: f64) -> String {
    format!("{value:.6}")
}

/// Escape a font path for a `drawtext=fontfile=` value inside `-filter_complex`.
pub fn escape_font_path(path: &Path) -> String {
    escape_option_value(&path.to_string_lossy())
}

/// Escape caption text for a `drawtext=text=` value inside `-filter_complex`.
///
/// Three parsers see the value in turn: drawtext's own `%{..}` expansion, the
/// filter option parser (`:` separated, quote aware) and the filtergraph
/// parser (`[],;` separated, quote aware). Each layer is escaped innermost
/// first so the text survives all three verbatim.
pub fn escape_drawtext_text(text: &str) -> String {
    escape_option_value(&text.replace('\\', "\\\\").replace('%', "\\%"))
}

/// Quote `value` for the filter option parser, then escape the quoted form
/// for the filtergraph parser.
fn escape_option_value(value: &str) -> String {
    let option_quoted = format!("'{}'", value.replace('\'', "'\\''"));

    let mut escaped = String::with_capacity(option_quoted.len() * 2);
    for ch in option_quoted.chars() {
        if matches!(ch, '\\' | '\'' | '[' | ']' | ',' | ';') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}
