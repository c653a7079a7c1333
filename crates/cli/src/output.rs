// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tabular stdout formatting.

/// Render rows as space-aligned columns with a header line.
pub fn format_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            if i < widths.len() {
                widths[i] = widths[i].max(cell.len());
            }
        }
    }

    let mut out = String::new();
    render_row(&mut out, &widths, headers.iter().map(|h| h.to_string()));
    for row in rows {
        render_row(&mut out, &widths, row.iter().cloned());
    }
    out
}

fn render_row(out: &mut String, widths: &[usize], cells: impl Iterator<Item = String>) {
    let cells: Vec<String> = cells.collect();
    let last = cells.len().saturating_sub(1);
    for (i, cell) in cells.iter().enumerate() {
        if i == last {
            out.push_str(cell);
        } else {
            let width = widths.get(i).copied().unwrap_or(cell.len());
            out.push_str(&format!("{cell:<width$}  "));
        }
    }
    out.push('\n');
}

/// Epoch milliseconds → compact UTC timestamp for tables.
pub fn format_epoch_ms(epoch_ms: u64) -> String {
    chrono::DateTime::from_timestamp_millis(epoch_ms as i64)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| epoch_ms.to_string())
}

#[cfg(test)]
#[path = "output_tests.rs"]
mod tests;
