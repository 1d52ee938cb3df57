// src/bibliography/citekeys.rs
// Citation key extraction for pandoc and LaTeX citation syntax

use super::normalize::normalize_newlines;
use regex::Regex;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

static LATEX_CITE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\\(?:[Pp]arencite|[Tt]extcite|[Aa]utocite|[Ff]ootcite|[Ss]martcite|[Ss]upercite|[Cc]ite[pt]?|nocite|citeauthor|citeyear)\*?(?:\s*\[[^\]]*\]){0,2}\s*\{([^}]*)\}",
    )
    .expect("valid regex")
});

/// Characters allowed inside a bare pandoc key after the first one
const KEY_PUNCT: &str = ":.#$%&-+?<>~/";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Notation {
    /// `[@a, p. 2; -@b]` and in-text `@a`
    Pandoc,
    /// `\parencite[2]{a,b}`
    Latex,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CitekeyOccurrence {
    pub key: String,
    pub notation: Notation,
    /// 1-based line in the normalized document
    pub line: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedCitekeys {
    /// Distinct keys, first-seen order
    pub ordered: Vec<String>,
    /// Every occurrence in document order
    pub occurrences: Vec<CitekeyOccurrence>,
}

impl ExtractedCitekeys {
    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }

    pub fn set(&self) -> HashSet<&str> {
        self.ordered.iter().map(String::as_str).collect()
    }

    /// Keys cited more than once, first-seen order.
    pub fn repeated(&self) -> Vec<String> {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for occ in &self.occurrences {
            *counts.entry(occ.key.as_str()).or_insert(0) += 1;
        }
        self.ordered
            .iter()
            .filter(|k| counts.get(k.as_str()).copied().unwrap_or(0) > 1)
            .cloned()
            .collect()
    }
}

/// Extract citekeys from a markdown document.
///
/// Leading front matter, fenced code blocks and inline code spans are ignored.
pub fn extract_citekeys(text: &str) -> ExtractedCitekeys {
    let text = normalize_newlines(text);
    let lines = scannable_lines(&text);

    let mut found: Vec<(usize, usize, String, Notation)> = Vec::new();
    for (idx, line) in lines.iter().enumerate() {
        if line.is_empty() {
            continue;
        }
        for caps in LATEX_CITE_RE.captures_iter(line) {
            let (Some(whole), Some(keys)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            let col = line[..whole.start()].chars().count();
            for key in keys.as_str().split(',').map(str::trim) {
                if !key.is_empty() && key != "*" {
                    found.push((idx, col, key.to_string(), Notation::Latex));
                }
            }
        }
        for (col, key) in pandoc_keys(line) {
            found.push((idx, col, key, Notation::Pandoc));
        }
    }
    found.sort_by_key(|(line, col, _, _)| (*line, *col));

    let mut out = ExtractedCitekeys::default();
    let mut seen = HashSet::new();
    for (line, _, key, notation) in found {
        if seen.insert(key.clone()) {
            out.ordered.push(key.clone());
        }
        out.occurrences.push(CitekeyOccurrence {
            key,
            notation,
            line: line + 1,
        });
    }
    out
}

/// Lines with front matter and fenced code blanked and inline code masked.
/// Line count is preserved so occurrences keep their line numbers.
fn scannable_lines(text: &str) -> Vec<String> {
    let raw: Vec<&str> = text.split('\n').collect();
    let mut out: Vec<String> = Vec::with_capacity(raw.len());
    let mut start = 0;

    if raw.first().is_some_and(|l| l.trim_end() == "---")
        && let Some(end) = raw
            .iter()
            .skip(1)
            .position(|l| matches!(l.trim_end(), "---" | "..."))
    {
        let close = end + 1;
        out.extend(std::iter::repeat_n(String::new(), close + 1));
        start = close + 1;
    }

    let mut fence: Option<(char, usize)> = None;
    for line in &raw[start.min(raw.len())..] {
        match fence {
            Some((ch, len)) => {
                if is_closing_fence(line, ch, len) {
                    fence = None;
                }
                out.push(String::new());
            }
            None => {
                if let Some(open) = opening_fence(line) {
                    fence = Some(open);
                    out.push(String::new());
                } else {
                    out.push(mask_inline_code(line));
                }
            }
        }
    }
    out
}

fn fence_run(line: &str) -> Option<(char, usize, &str)> {
    let indent = line.len() - line.trim_start_matches(' ').len();
    if indent > 3 {
        return None;
    }
    let rest = &line[indent..];
    let ch = rest.chars().next().filter(|c| *c == '`' || *c == '~')?;
    let len = rest.chars().take_while(|c| *c == ch).count();
    (len >= 3).then(|| (ch, len, &rest[len..]))
}

fn opening_fence(line: &str) -> Option<(char, usize)> {
    let (ch, len, info) = fence_run(line)?;
    // backtick fences may not carry backticks in the info string
    if ch == '`' && info.contains('`') {
        return None;
    }
    Some((ch, len))
}

fn is_closing_fence(line: &str, ch: char, len: usize) -> bool {
    matches!(fence_run(line), Some((c, l, rest)) if c == ch && l >= len && rest.trim().is_empty())
}

/// Replace the contents of backtick code spans with spaces.
fn mask_inline_code(line: &str) -> String {
    if !line.contains('`') {
        return line.to_string();
    }
    let chars: Vec<char> = line.chars().collect();
    let mut out = String::with_capacity(line.len());
    let mut i = 0;
    while i < chars.len() {
        if chars[i] != '`' {
            out.push(chars[i]);
            i += 1;
            continue;
        }
        let run = chars[i..].iter().take_while(|c| **c == '`').count();
        match find_backtick_run(&chars, i + run, run) {
            Some(close) => {
                out.extend(std::iter::repeat_n(' ', close + run - i));
                i = close + run;
            }
            None => {
                out.extend(std::iter::repeat_n('`', run));
                i += run;
            }
        }
    }
    out
}

fn find_backtick_run(chars: &[char], from: usize, run: usize) -> Option<usize> {
    let mut j = from;
    while j < chars.len() {
        if chars[j] == '`' {
            let len = chars[j..].iter().take_while(|c| **c == '`').count();
            if len == run {
                return Some(j);
            }
            j += len;
        } else {
            j += 1;
        }
    }
    None
}

/// `(char column, key)` for every pandoc-style key on a line.
fn pandoc_keys(line: &str) -> Vec<(usize, String)> {
    let chars: Vec<char> = line.chars().collect();
    let mut keys = Vec::new();

    for (i, c) in chars.iter().enumerate() {
        if *c != '@' {
            continue;
        }
        if let Some(prev) = i.checked_sub(1).map(|p| chars[p])
            && (prev == '\\' || prev.is_alphanumeric() || prev == '_')
        {
            continue;
        }

        let key = if chars.get(i + 1) == Some(&'{') {
            let body: String = chars[i + 2..].iter().take_while(|c| **c != '}').collect();
            let closed = chars.get(i + 2 + body.chars().count()) == Some(&'}');
            if !closed {
                continue;
            }
            body.trim().to_string()
        } else {
            bare_key(&chars[i + 1..])
        };

        if !key.is_empty() {
            keys.push((i, key));
        }
    }
    keys
}

fn bare_key(chars: &[char]) -> String {
    let Some(first) = chars.first() else {
        return String::new();
    };
    if !(first.is_alphanumeric() || *first == '_') {
        return String::new();
    }
    let raw: String = chars
        .iter()
        .take_while(|c| c.is_alphanumeric() || **c == '_' || KEY_PUNCT.contains(**c))
        .collect();
    raw.trim_end_matches(|c| KEY_PUNCT.contains(c)).to_string()
}
