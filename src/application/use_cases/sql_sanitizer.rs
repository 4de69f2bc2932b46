//! SQL sanitizer
//!
//! Reduces free-form coder model output to one executable statement:
//! - reasoning blocks (`<think>`, `<reasoning>`) are dropped
//! - only the first fenced code block is kept, minus its language tag
//! - echoed labels (`SQL Query:`) and commentary lines around the statement are dropped
//! - everything from the first `;` outside quotes and comments on is cut
//! - the result must start with a read verb and contain no write/DDL keyword
//!
//! This is a shape check, not a parser. Every rule is idempotent, so sanitizing
//! sanitized SQL returns it unchanged.

use crate::domain::error::{AppError, Result};
use crate::domain::pipeline::SqlStatement;
use once_cell::sync::Lazy;
use regex::Regex;

static REASONING_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)<think>.*?</think>|<think\s*/>|<reasoning>.*?</reasoning>").unwrap()
});

static FENCE_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)```(.*?)(?:```|\z)").unwrap());

static LABEL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(?:\s*(?:sql\s*query|sqlquery|sql|query)\s*:\s*)+").unwrap());

const FENCE_LANGUAGE_TAGS: &[&str] = &[
    "sql", "mysql", "postgres", "postgresql", "pgsql", "psql", "sqlite", "tsql", "plsql",
];

/// Verbs a statement may start with.
const READ_VERBS: &[&str] = &[
    "SELECT", "WITH", "SHOW", "DESCRIBE", "DESC", "EXPLAIN", "VALUES", "TABLE",
];

const WRITE_KEYWORDS: &[&str] = &[
    "INSERT", "UPDATE", "DELETE", "DROP", "ALTER", "TRUNCATE", "CREATE", "GRANT", "REVOKE",
    "MERGE",
];

/// Words that show up in SQL but rarely open an English sentence.
const CLAUSE_KEYWORDS: &[&str] = &[
    "FROM", "WHERE", "JOIN", "GROUP", "ORDER", "LIMIT", "HAVING", "AS", "ON", "UNION", "BY",
];

pub fn sanitize_sql(raw: &str) -> Result<SqlStatement> {
    let without_reasoning = REASONING_PATTERN.replace_all(raw, "");
    let unfenced = strip_code_fence(&without_reasoning);
    let extracted = extract_statement(&unfenced).ok_or_else(|| {
        AppError::SanitizationError(format!(
            "Model output contains no SQL statement: {}",
            preview(raw, 120)
        ))
    })?;

    let first = match first_code_semicolon(&extracted) {
        Some(idx) => &extracted[..idx],
        None => extracted.as_str(),
    };
    let statement = drop_trailing_commentary(first.trim());

    verify_read_only(&statement)?;
    SqlStatement::new(statement)
}

fn strip_code_fence(text: &str) -> String {
    let Some(caps) = FENCE_PATTERN.captures(text) else {
        return text.to_string();
    };
    let body = caps.get(1).map(|m| m.as_str()).unwrap_or("").trim_start();

    let tag_end = body
        .find(|c: char| c.is_whitespace())
        .unwrap_or(body.len());
    let (first, rest) = body.split_at(tag_end);
    if FENCE_LANGUAGE_TAGS.contains(&first.to_lowercase().as_str()) {
        rest.to_string()
    } else {
        body.to_string()
    }
}

/// Lines from the first statement-like line to the last non-commentary line.
fn extract_statement(text: &str) -> Option<String> {
    let lines: Vec<&str> = text.lines().collect();

    let (start, first_line) = lines.iter().enumerate().find_map(|(idx, line)| {
        let candidate = LABEL_PATTERN.replace(line.trim(), "").into_owned();
        if starts_with_verb(&candidate) && !is_commentary(&candidate) {
            Some((idx, candidate))
        } else {
            None
        }
    })?;

    let mut statement = first_line;
    for line in &lines[start + 1..] {
        statement.push('\n');
        statement.push_str(line);
    }
    Some(drop_trailing_commentary(&statement))
}

/// Drops blank and commentary lines after the last statement line. The first line is kept.
fn drop_trailing_commentary(text: &str) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let mut end = lines.len();
    while end > 1 && (lines[end - 1].trim().is_empty() || is_commentary(lines[end - 1])) {
        end -= 1;
    }
    lines[..end]
        .iter()
        .map(|line| line.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}

fn first_word(line: &str) -> &str {
    let trimmed = line.trim_start();
    let end = trimmed
        .find(|c: char| !c.is_ascii_alphabetic())
        .unwrap_or(trimmed.len());
    &trimmed[..end]
}

fn starts_with_verb(line: &str) -> bool {
    let word = first_word(line).to_uppercase();
    READ_VERBS.contains(&word.as_str()) || WRITE_KEYWORDS.contains(&word.as_str())
}

/// Comment lines and sentences that are not part of a statement.
fn is_commentary(line: &str) -> bool {
    let t = line.trim();
    if t.is_empty() {
        return false;
    }
    if t.starts_with("--") || t.starts_with('#') || t.starts_with("/*") || t.starts_with("*/") {
        return true;
    }

    let word = first_word(t);
    let upper = word.to_uppercase();
    let is_keyword = READ_VERBS.contains(&upper.as_str())
        || WRITE_KEYWORDS.contains(&upper.as_str())
        || CLAUSE_KEYWORDS.contains(&upper.as_str());
    if is_keyword && word == upper {
        return false;
    }

    let capitalized = t.chars().next().map(|c| c.is_uppercase()).unwrap_or(false);
    if !capitalized {
        return false;
    }
    if t.ends_with(':') {
        return true;
    }

    let has_clause = t
        .split(|c: char| !c.is_ascii_alphanumeric() && c != '_')
        .skip(1)
        .any(|w| CLAUSE_KEYWORDS.contains(&w.to_uppercase().as_str()));
    let sentence_end = t.ends_with('.') || t.ends_with('!') || t.ends_with('?');
    if is_keyword && has_clause && !sentence_end {
        return false;
    }
    if sentence_end {
        return true;
    }

    let has_sql_syntax = t.contains(|c: char| "(),=*<>`'\";".contains(c));
    !has_sql_syntax && !has_clause && t.split_whitespace().count() >= 3
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Region {
    Code,
    Quoted,
    Comment,
}

/// Classifies each character as statement code, quoted text or comment.
/// `--` runs to the end of the line, `/* */` to its closing marker, and a
/// backslash inside `'` or `"` escapes the next character.
fn regions(sql: &str) -> Vec<(usize, char, Region)> {
    let chars: Vec<(usize, char)> = sql.char_indices().collect();
    let mut out = Vec::with_capacity(chars.len());
    let mut i = 0;

    while i < chars.len() {
        let (idx, c) = chars[i];
        let next = chars.get(i + 1).map(|&(_, n)| n);
        match c {
            '\'' | '"' | '`' => {
                out.push((idx, c, Region::Quoted));
                i += 1;
                while i < chars.len() {
                    let (j, d) = chars[i];
                    out.push((j, d, Region::Quoted));
                    i += 1;
                    if d == '\\' && c != '`' {
                        if let Some(&(k, escaped)) = chars.get(i) {
                            out.push((k, escaped, Region::Quoted));
                            i += 1;
                        }
                    } else if d == c {
                        break;
                    }
                }
            }
            '-' if next == Some('-') => {
                while i < chars.len() && chars[i].1 != '\n' {
                    out.push((chars[i].0, chars[i].1, Region::Comment));
                    i += 1;
                }
            }
            '/' if next == Some('*') => {
                let mut prev = ' ';
                let mut consumed = 0;
                while i < chars.len() {
                    let (j, d) = chars[i];
                    out.push((j, d, Region::Comment));
                    i += 1;
                    consumed += 1;
                    if consumed >= 4 && prev == '*' && d == '/' {
                        break;
                    }
                    prev = d;
                }
            }
            _ => {
                out.push((idx, c, Region::Code));
                i += 1;
            }
        }
    }
    out
}

fn first_code_semicolon(sql: &str) -> Option<usize> {
    regions(sql)
        .into_iter()
        .find(|&(_, c, region)| c == ';' && region == Region::Code)
        .map(|(idx, _, _)| idx)
}

/// Copy of `sql` with quoted text and comments blanked out.
fn mask_quoted(sql: &str) -> String {
    regions(sql)
        .into_iter()
        .map(|(_, c, region)| if region == Region::Code { c } else { ' ' })
        .collect()
}

fn verify_read_only(sql: &str) -> Result<()> {
    let verb = first_word(sql).to_uppercase();
    if !READ_VERBS.contains(&verb.as_str()) {
        return Err(AppError::SanitizationError(format!(
            "Only read-only statements are executed, got '{}'",
            preview(sql, 80)
        )));
    }

    let masked = mask_quoted(sql).to_uppercase();
    for keyword in WRITE_KEYWORDS {
        if contains_whole_word(&masked, keyword) {
            return Err(AppError::SanitizationError(format!(
                "SQL contains forbidden keyword: {}",
                keyword
            )));
        }
    }
    Ok(())
}

/// Whole-word match; `_` counts as part of a word so `UPDATE_TIME` is not `UPDATE`.
fn contains_whole_word(text: &str, keyword: &str) -> bool {
    let is_word = |b: u8| b.is_ascii_alphanumeric() || b == b'_';
    let bytes = text.as_bytes();
    text.match_indices(keyword).any(|(i, _)| {
        let end = i + keyword.len();
        let before_ok = i == 0 || !is_word(bytes[i - 1]);
        let after_ok = end == bytes.len() || !is_word(bytes[end]);
        before_ok && after_ok
    })
}

fn preview(text: &str, max_chars: usize) -> String {
    let flat: String = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max_chars {
        flat
    } else {
        format!("{}...", flat.chars().take(max_chars).collect::<String>())
    }
}
