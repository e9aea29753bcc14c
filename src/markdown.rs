//! Text helpers shared by the schema accessors and the renderer.

/// Split an identifier or phrase into words.
///
/// Breaks on any non-alphanumeric character, on lower-to-upper case
/// transitions (`fooBar`) and before the last capital of an acronym that is
/// followed by a lowercase letter (`HTMLParser` -> `HTML`, `Parser`).
fn words(input: &str) -> Vec<String> {
    let chars: Vec<char> = input.chars().collect();
    let mut words = Vec::new();
    let mut current = String::new();

    for (i, &c) in chars.iter().enumerate() {
        if !c.is_alphanumeric() {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            continue;
        }

        if let Some(&prev) = i.checked_sub(1).and_then(|p| chars.get(p)) {
            let next_lower = chars.get(i + 1).map_or(false, |n| n.is_lowercase());
            let boundary = c.is_uppercase()
                && (prev.is_lowercase()
                    || (prev.is_numeric() && !current.is_empty())
                    || (prev.is_uppercase() && next_lower));
            if boundary && !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
        }
        current.push(c);
    }

    if !current.is_empty() {
        words.push(current);
    }
    words
}

/// `foo_bar`, `foo bar`, `fooBar` -> `FooBar`. Acronyms keep their case.
pub fn pascalize(input: &str) -> String {
    words(input)
        .iter()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect()
}

/// `FooBar`, `foo bar`, `HTMLParser` -> `foo_bar`, `foo_bar`, `html_parser`.
pub fn underscore(input: &str) -> String {
    words(input)
        .iter()
        .map(|word| word.to_lowercase())
        .collect::<Vec<_>>()
        .join("_")
}

/// Heading anchor: lowercase with spaces turned into hyphens.
pub fn anchor(name: &str) -> String {
    name.trim().to_lowercase().replace(' ', "-")
}

pub fn wrap_code(text: &str) -> String {
    format!("`{}`", text)
}

/// The first sentence or line of `text`, whichever ends first.
pub fn first_sentence(text: &str) -> &str {
    let text = text.trim();
    let line_end = text.find('\n').unwrap_or(text.len());
    let line = &text[..line_end];

    match line.find(". ") {
        Some(idx) => &line[..=idx],
        None => line.trim_end(),
    }
}

/// Make `text` safe inside a single Markdown table cell.
pub fn table_cell(text: &str) -> String {
    text.replace("\r\n", " ")
        .replace('\n', " ")
        .replace('|', "&#124;")
}

/// Join words as prose: `a or b`, `a, b, or c`.
pub fn word_sequence<S: AsRef<str>>(words: &[S], separator: &str) -> String {
    let words: Vec<&str> = words.iter().map(AsRef::as_ref).collect();
    match words.split_last() {
        Some((last, rest)) if words.len() > 2 => {
            format!("{}, {} {}", rest.join(", "), separator, last)
        }
        _ => words.join(&format!(" {} ", separator)),
    }
}
