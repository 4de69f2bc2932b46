//! Renders a query result as bounded plain text for the answer prompt.

use crate::domain::pipeline::{cell_text, QueryResult, ResultLimits};

/// Emitted instead of an empty string when a query returns nothing.
pub const NO_ROWS_MARKER: &str = "(no rows)";

const COLUMN_SEPARATOR: &str = " | ";
const ELLIPSIS: &str = "...";

pub fn sanitize_result(result: &QueryResult, limits: &ResultLimits) -> String {
    if result.is_empty() {
        return NO_ROWS_MARKER.to_string();
    }

    let columns = column_names(result);
    if result.rows.len() == 1 && columns.len() == 1 {
        let scalar = clean_cell(&cell_text(result.cell(0, &columns[0])), limits.max_cell_chars);
        return truncate_chars(scalar, limits.max_chars);
    }

    let shown_columns = &columns[..columns.len().min(limits.max_columns)];
    let mut header = shown_columns
        .iter()
        .map(|c| clean_cell(c, limits.max_cell_chars))
        .collect::<Vec<_>>()
        .join(COLUMN_SEPARATOR);
    if columns.len() > shown_columns.len() {
        header.push_str(&format!(
            "{}... (+{} columns)",
            COLUMN_SEPARATOR,
            columns.len() - shown_columns.len()
        ));
    }

    let total_rows = result.rows.len();
    let budget = limits
        .max_chars
        .saturating_sub(more_rows_line(total_rows).chars().count() + 1);

    let mut output = header;
    let mut used = output.chars().count();
    let mut shown_rows = 0;
    for row in 0..total_rows.min(limits.max_rows) {
        let line = shown_columns
            .iter()
            .map(|c| clean_cell(&cell_text(result.cell(row, c)), limits.max_cell_chars))
            .collect::<Vec<_>>()
            .join(COLUMN_SEPARATOR);
        let cost = line.chars().count() + 1;
        if used + cost > budget {
            break;
        }
        output.push('\n');
        output.push_str(&line);
        used += cost;
        shown_rows += 1;
    }

    if shown_rows < total_rows {
        // Cut the table, never the omitted-rows line.
        let more_rows = more_rows_line(total_rows - shown_rows);
        let room = limits.max_chars.saturating_sub(more_rows.chars().count() + 1);
        output = truncate_chars(output, room);
        output.push('\n');
        output.push_str(&more_rows);
    }

    truncate_chars(output, limits.max_chars)
}

/// Declared column order, or sorted keys of the first row when none was declared.
fn column_names(result: &QueryResult) -> Vec<String> {
    if !result.columns.is_empty() {
        return result.columns.clone();
    }
    let mut keys: Vec<String> = result
        .rows
        .first()
        .map(|row| row.keys().cloned().collect())
        .unwrap_or_default();
    keys.sort();
    keys
}

fn more_rows_line(omitted: usize) -> String {
    format!("... ({} more rows)", omitted)
}

/// Control characters become spaces, `|` is escaped, length is capped.
fn clean_cell(text: &str, max_chars: usize) -> String {
    let mut cleaned = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '|' => cleaned.push_str("\\|"),
            c if c.is_control() => cleaned.push(' '),
            c => cleaned.push(c),
        }
    }
    truncate_chars(cleaned, max_chars)
}

fn truncate_chars(text: String, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text;
    }
    let keep = max_chars.saturating_sub(ELLIPSIS.len());
    let mut truncated: String = text.chars().take(keep).collect();
    truncated.push_str(ELLIPSIS);
    truncated
}
