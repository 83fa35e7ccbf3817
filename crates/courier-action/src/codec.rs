//! Header-block codec for task files.
//!
//! A task file optionally starts with a `---` delimiter line, followed by
//! `key: value` lines and a closing `---` line. Everything after the closing
//! delimiter is the body, kept byte for byte. Header order is preserved.

use std::fmt;

pub const DELIMITER: &str = "---";

/// Ordered header map. Keys are unique; inserting an existing key replaces
/// its value in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        let index = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(index).1)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Headers::new();
        for (k, v) in iter {
            headers.insert(k, v);
        }
        headers
    }
}

/// A task file split into its header block and body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskRecord {
    pub headers: Headers,
    pub body: String,
    /// The source opened with a closed header block, possibly an empty one.
    delimited: bool,
}

impl TaskRecord {
    pub fn new(headers: Headers, body: impl Into<String>) -> Self {
        Self {
            headers,
            body: body.into(),
            delimited: false,
        }
    }

    /// Header value with one layer of matching quotes stripped.
    pub fn value(&self, key: &str) -> Option<String> {
        self.headers.get(key).map(|v| unquote(v).to_string())
    }

    /// Serialize back to file text. An empty header block read from the
    /// source is written back as an empty block.
    pub fn render(&self) -> String {
        if self.delimited && self.headers.is_empty() {
            return format!("{DELIMITER}\n{DELIMITER}\n{}", self.body);
        }
        serialize(&self.headers, &self.body)
    }
}

impl fmt::Display for TaskRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// Split `text` into header block and body.
///
/// Text that does not open with a delimiter line, or whose header block is
/// never closed, parses as an empty header with the whole text as body.
/// Header lines without a colon are ignored; keys and values are trimmed.
pub fn parse(text: &str) -> TaskRecord {
    let mut lines = text.split_inclusive('\n');
    let first = match lines.next() {
        Some(line) if line.trim_end() == DELIMITER => line,
        _ => return TaskRecord::new(Headers::new(), text),
    };

    let mut offset = first.len();
    let mut headers = Headers::new();

    for line in lines {
        offset += line.len();
        let trimmed = line.trim();
        if trimmed == DELIMITER {
            let mut record = TaskRecord::new(headers, &text[offset..]);
            record.delimited = true;
            return record;
        }
        if let Some((key, value)) = trimmed.split_once(':') {
            let key = key.trim();
            if !key.is_empty() {
                headers.insert(key, value.trim());
            }
        }
    }

    TaskRecord::new(Headers::new(), text)
}

/// Render a header block followed by `body`. An empty header renders the
/// body alone; use [`TaskRecord::render`] to keep an empty block from the
/// source.
pub fn serialize(headers: &Headers, body: &str) -> String {
    if headers.is_empty() {
        return body.to_string();
    }
    let mut out = String::with_capacity(body.len() + 64);
    out.push_str(DELIMITER);
    out.push('\n');
    for (key, value) in headers.iter() {
        out.push_str(key);
        out.push_str(": ");
        out.push_str(value);
        out.push('\n');
    }
    out.push_str(DELIMITER);
    out.push('\n');
    out.push_str(body);
    out
}

/// Strip one layer of matching single or double quotes.
pub fn unquote(value: &str) -> &str {
    let value = value.trim();
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}
