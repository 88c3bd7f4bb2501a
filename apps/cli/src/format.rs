use std::time::Duration;

use console::{StyledObject, style};
use videotitler_core::{BatchSummary, ItemView};

pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs_f64();
    if secs < 60.0 {
        format!("{:.1}s", secs)
    } else {
        format!("{:.0}m {:.0}s", (secs / 60.0).floor(), secs % 60.0)
    }
}

fn styled_status(view: &ItemView) -> StyledObject<String> {
    let label = match view.failed_stage {
        Some(stage) => format!("failed ({stage})"),
        None => view.status.to_string(),
    };
    match view.status {
        "renamed" => style(label).green(),
        "title done" | "rename pending" => style(label).cyan(),
        "failed" => style(label).red(),
        _ => style(label).dim(),
    }
}

fn truncate(text: &str, max: usize) -> String {
    let first_line = text.lines().next().unwrap_or_default();
    if first_line.chars().count() <= max && first_line.len() == text.trim_end().len() {
        return first_line.to_string();
    }
    let cut: String = first_line.chars().take(max.saturating_sub(1)).collect();
    format!("{cut}…")
}

/// One line per item: number, status, current file and the name it would get.
pub fn format_table(views: &[ItemView]) -> String {
    let mut output = String::new();
    for view in views {
        let target = match (&view.new_name, view.status) {
            (_, "renamed") => String::new(),
            (Some(name), _) => format!(" → {}", name),
            (None, _) => String::new(),
        };
        output.push_str(&format!(
            "{:>4}  {:<22} {}{}\n",
            style(view.sequence_index).bold(),
            styled_status(view),
            truncate(&view.file_name, 48),
            style(target).yellow()
        ));
    }
    output
}

pub fn format_detail(view: &ItemView) -> String {
    let mut output = String::new();
    output.push_str(&format!(
        "{} {}\n",
        style(format!("#{}", view.sequence_index)).bold(),
        style(&view.file_name).cyan()
    ));
    output.push_str(&format!("  status:   {}\n", styled_status(view)));
    if let Some(message) = &view.message {
        output.push_str(&format!("  error:    {}\n", style(message).red()));
    }
    output.push_str(&format!("  path:     {}\n", view.source_path.display()));
    if let Some(title) = &view.title {
        output.push_str(&format!("  title:    {}\n", title));
    }
    if let Some(name) = &view.new_name {
        output.push_str(&format!("  new name: {}\n", style(name).yellow()));
    }
    match &view.ocr_text {
        Some(text) => {
            output.push_str("  ocr text:\n");
            for line in text.lines() {
                output.push_str(&format!("    {}\n", style(line).dim()));
            }
        }
        None => output.push_str(&format!("  ocr text: {}\n", style("(none)").dim())),
    }
    output
}

pub fn format_summary(summary: &BatchSummary) -> String {
    let mut parts = vec![
        format!("{} titled", style(summary.title_done).cyan().bold()),
        format!("{} renamed", style(summary.renamed).green().bold()),
    ];
    if summary.failed > 0 {
        parts.push(format!("{} failed", style(summary.failed).red().bold()));
    }
    if summary.pending > 0 {
        parts.push(format!("{} pending", style(summary.pending).dim()));
    }

    let mut line = format!("{} of {} items: {}", style("Batch").bold(), summary.total, parts.join(", "));
    if summary.stopped {
        line.push_str(&format!(" {}", style("(stopped)").yellow()));
    }
    line
}
