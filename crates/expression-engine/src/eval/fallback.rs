use model::{core::value::Value, records::row::RowData};

/// Best-effort value for text the grammar cannot parse: the row value of the
/// first identifier-like word (qualifier stripped) that names a row column.
/// Quoted sections are ignored. Returns NULL when nothing matches.
pub fn fallback_column_value(text: &str, row: &RowData) -> Value {
    words(text)
        .into_iter()
        .map(|word| word.rsplit('.').next().unwrap_or(word))
        .find(|name| row.contains(name))
        .map(|name| row.get_value(name))
        .unwrap_or(Value::Null)
}

fn words(text: &str) -> Vec<&str> {
    let mut words = Vec::new();
    let mut quote: Option<char> = None;
    let mut start: Option<usize> = None;

    for (i, c) in text.char_indices() {
        if let Some(q) = quote {
            if c == q {
                quote = None;
            }
            continue;
        }
        let is_word = c.is_ascii_alphanumeric() || c == '_' || c == '$' || c == '.';
        match (is_word, start) {
            (true, None) => start = Some(i),
            (false, Some(s)) => {
                words.push(&text[s..i]);
                start = None;
            }
            _ => {}
        }
        if c == '\'' || c == '"' || c == '`' {
            // Backticks quote identifiers, so their contents still count.
            if c != '`' {
                quote = Some(c);
            }
        }
    }
    if let Some(s) = start {
        words.push(&text[s..]);
    }

    words
        .into_iter()
        .filter(|w| w.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_'))
        .collect()
}
