//! Concat manifests for the engine's concat demuxer.

use crate::domain::paths::relative_to;

/// How a manifest entry is quoted on its line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QuoteRule {
    /// `file '<path>'`, with an embedded `'` written as `'\''`.
    #[default]
    SingleQuoted,
}

impl QuoteRule {
    fn quote(&self, path: &str) -> String {
        match self {
            QuoteRule::SingleQuoted => format!("file '{}'", path.replace('\'', r"'\''")),
        }
    }

    fn unquote(&self, line: &str) -> Option<String> {
        match self {
            QuoteRule::SingleQuoted => {
                let quoted = line.strip_prefix("file ")?.trim();
                let mut path = String::with_capacity(quoted.len());
                let mut in_quotes = false;
                let mut chars = quoted.chars();
                while let Some(c) = chars.next() {
                    match c {
                        '\'' => in_quotes = !in_quotes,
                        '\\' if !in_quotes => path.push(chars.next()?),
                        c => path.push(c),
                    }
                }
                if in_quotes || path.is_empty() {
                    None
                } else {
                    Some(path)
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed manifest line {line}: {content:?}")]
pub struct ManifestError {
    pub line: usize,
    pub content: String,
}

/// Ordered list of segment references consumed by one concat invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConcatManifest {
    entries: Vec<String>,
    quote: QuoteRule,
}

impl ConcatManifest {
    pub fn new(entries: Vec<String>) -> Self {
        Self::with_quote_rule(entries, QuoteRule::default())
    }

    pub fn with_quote_rule(entries: Vec<String>, quote: QuoteRule) -> Self {
        Self { entries, quote }
    }

    /// Build a manifest whose entries are resolved against the manifest's own directory.
    pub fn relative_to<I, S>(base_dir: &str, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let entries = paths
            .into_iter()
            .map(|path| {
                let path = path.as_ref();
                relative_to(path, base_dir).unwrap_or(path).to_string()
            })
            .collect();
        Self::new(entries)
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn serialize(&self) -> String {
        let mut out = String::new();
        for entry in &self.entries {
            out.push_str(&self.quote.quote(entry));
            out.push('\n');
        }
        out
    }

    /// Parse a manifest previously produced by [`ConcatManifest::serialize`].
    ///
    /// Blank lines and `#` comments are skipped.
    pub fn parse(text: &str) -> Result<Self, ManifestError> {
        let quote = QuoteRule::default();
        let mut entries = Vec::new();
        for (n, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let entry = quote.unquote(line).ok_or_else(|| ManifestError {
                line: n + 1,
                content: line.to_string(),
            })?;
            entries.push(entry);
        }
        Ok(Self { entries, quote })
    }
}
