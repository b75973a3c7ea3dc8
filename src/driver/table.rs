//! Plain text tables for `get-vdc-info`

use crate::resource::LocatorMap;
use std::fmt::Write;

/// Gap between the key and value columns
pub const COLUMN_SPACING: usize = 3;

/// Current terminal width, if stdout is a terminal
pub fn terminal_width() -> Option<usize> {
    crossterm::terminal::size().ok().map(|(cols, _)| cols as usize)
}

/// Render titled sections of `name  href` rows.
///
/// With `wrap` set to a column count, long rows continue on indented lines
/// so nothing runs past that width.
pub fn render(sections: &[(String, LocatorMap)], wrap: Option<usize>) -> String {
    let width = |s: &str| s.chars().count();
    let rows = || sections.iter().flat_map(|(_, map)| map.iter());
    let key_len = rows().map(|(k, _)| width(k)).max().unwrap_or(0);
    let value_len = rows().map(|(_, v)| width(v)).max().unwrap_or(0);
    let indent = key_len + COLUMN_SPACING;

    let mut out = String::new();
    let wrap = match wrap {
        Some(columns) if indent >= columns => {
            out.push_str("ABORTING WRAP: Columns less than Key Size\n");
            None
        }
        other => other,
    };

    for (title, map) in sections {
        let mut rule = key_len + value_len + COLUMN_SPACING;
        if let Some(columns) = wrap {
            rule = rule.min(columns);
        }
        let _ = write!(out, "\n{}\n\n{}\n{}\n", "_".repeat(rule), title, "~".repeat(rule));

        for (name, href) in map {
            let pad = key_len - width(name) + COLUMN_SPACING;
            let line: Vec<char> = format!("{}{}{}", name, " ".repeat(pad), href)
                .chars()
                .collect();

            match wrap {
                Some(columns) => {
                    let (head, mut rest) = line.split_at(line.len().min(columns));
                    out.extend(head);
                    out.push('\n');
                    while !rest.is_empty() {
                        let (chunk, tail) = rest.split_at(rest.len().min(columns - indent));
                        out.push_str(&" ".repeat(indent));
                        out.extend(chunk);
                        out.push('\n');
                        rest = tail;
                    }
                }
                None => {
                    out.extend(line);
                    out.push('\n');
                }
            }
        }
        let _ = writeln!(out, "{}", "~".repeat(rule));
    }
    out
}
