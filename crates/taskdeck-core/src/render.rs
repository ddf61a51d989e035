use std::io::{self, IsTerminal, Write};

use anyhow::anyhow;
use chrono::{Local, NaiveDate};
use unicode_width::UnicodeWidthStr;

use crate::config::Config;
use crate::session::Theme;
use crate::store::TaskStore;
use crate::task::{Priority, Status, Task};

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
    theme: Theme,
}

impl Renderer {
    pub fn new(cfg: &Config, theme: Theme) -> anyhow::Result<Self> {
        let color_cfg = cfg.get("color").unwrap_or_else(|| "on".to_string());
        let color = match color_cfg.to_ascii_lowercase().as_str() {
            "on" | "yes" | "true" | "1" => true,
            "off" | "no" | "false" | "0" => false,
            other => return Err(anyhow!("invalid color setting: {other}")),
        };

        Ok(Self { color, theme })
    }

    /// The dashboard table: one row per task on the cached page.
    #[tracing::instrument(skip(self, store))]
    pub fn print_task_table(&mut self, store: &TaskStore, today: NaiveDate) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        if store.tasks.is_empty() {
            writeln!(out, "No tasks yet. Use `add` to create your first task.")?;
            return Ok(());
        }

        let headers = vec![
            "ID".to_string(),
            "Title".to_string(),
            "Due".to_string(),
            "Priority".to_string(),
            "Status".to_string(),
        ];

        let mut rows = Vec::with_capacity(store.tasks.len());
        for task in &store.tasks {
            let id = self.paint(&short_id(task), self.accent_code());

            let due = task.due_date.format("%Y-%m-%d").to_string();
            let due = if task.due_date < today && task.status != Status::Completed {
                self.paint(&due, "31")
            } else {
                due
            };

            let priority = self.paint(task.priority.as_str(), priority_code(task.priority));
            let status = self.paint(task.status.as_str(), status_code(task.status));

            rows.push(vec![id, task.title.clone(), due, priority, status]);
        }

        write_table(&mut out, headers, rows)?;

        let page = store.query.page + 1;
        let pages = store.total_pages().max(1);
        writeln!(out, "Page {page} of {pages} ({} tasks)", store.total)?;
        Ok(())
    }

    #[tracing::instrument(skip(self, task))]
    pub fn print_task_info(&mut self, task: &Task) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        writeln!(out, "id          {}", task.id)?;
        writeln!(out, "title       {}", task.title)?;
        writeln!(
            out,
            "description {}",
            task.description.clone().unwrap_or_default()
        )?;
        writeln!(out, "due         {}", task.due_date.format("%Y-%m-%d"))?;
        writeln!(out, "priority    {}", task.priority)?;
        writeln!(out, "status      {}", task.status)?;
        Ok(())
    }

    /// Header line above the interactive dashboard.
    pub fn print_greeting(&mut self, name: &str) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        let banner = self.paint(&format!("Hi, {name}!"), self.accent_code());
        writeln!(out, "{banner}  (today: {})", Local::now().format("%Y-%m-%d"))?;
        Ok(())
    }

    fn accent_code(&self) -> &'static str {
        match self.theme {
            Theme::Light => "33",
            Theme::Dark => "93",
        }
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color || !io::stdout().is_terminal() {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn short_id(task: &Task) -> String {
    task.id.to_string().chars().take(8).collect()
}

fn priority_code(priority: Priority) -> &'static str {
    match priority {
        Priority::High => "31",
        Priority::Medium => "33",
        Priority::Low => "32",
    }
}

fn status_code(status: Status) -> &'static str {
    match status {
        Status::Completed => "32",
        Status::InProgress => "34",
        Status::Pending => "37",
    }
}

fn write_table<W: Write>(
    mut writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(header.as_str()));
    }

    for row in &rows {
        for (idx, cell) in row.iter().enumerate() {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    for idx in 0..column_count {
        write!(writer, "{:width$} ", headers[idx], width = widths[idx])?;
    }
    writeln!(writer)?;

    for idx in 0..column_count {
        write!(writer, "{:-<width$} ", "", width = widths[idx])?;
    }
    writeln!(writer)?;

    for row in rows {
        for idx in 0..column_count {
            let cell = &row[idx];
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = widths[idx].saturating_sub(visible_width);
            write!(writer, "{}{} ", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_pads_to_widest_cell() {
        let mut buf = Vec::new();
        write_table(
            &mut buf,
            vec!["A".to_string(), "B".to_string()],
            vec![vec!["wide cell".to_string(), "x".to_string()]],
        )
        .expect("write table");

        let text = String::from_utf8(buf).expect("utf8");
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[0].starts_with("A         B"));
        assert!(lines[1].starts_with("--------- -"));
    }

    #[test]
    fn strip_ansi_removes_escapes() {
        assert_eq!(strip_ansi("\x1b[31mred\x1b[0m"), "red");
    }
}
