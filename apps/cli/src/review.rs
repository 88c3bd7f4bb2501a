use anyhow::{Result, anyhow};
use console::style;
use tokio::io::{AsyncBufReadExt, BufReader};
use videotitler_core::BatchController;

use crate::format::{format_detail, format_summary, format_table};

const HELP: &str = "\
Commands:
  list                 show all items
  show N               show OCR text, title and target name of item N
  ocr N TEXT           replace the recognized text (\\n for a line break)
  title N TEXT         set the title by hand
  retry N              run item N again from its current or failed stage
  reset N              forget everything about item N
  rename N             rename item N now
  commit               rename every titled item
  start                process all unfinished items
  preview on|off       toggle renaming after processing
  stop                 halt after the current stage
  help                 show this list
  quit                 leave";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewCommand {
    List,
    Show(u32),
    Ocr(u32, String),
    Title(u32, String),
    Retry(u32),
    Reset(u32),
    Rename(u32),
    Commit,
    Start,
    Preview(bool),
    Stop,
    Help,
    Quit,
}

impl ReviewCommand {
    pub fn parse(line: &str) -> Result<Self> {
        let line = line.trim();
        let (word, rest) = line
            .split_once(char::is_whitespace)
            .map(|(w, r)| (w, r.trim()))
            .unwrap_or((line, ""));

        let command = match word.to_lowercase().as_str() {
            "list" | "ls" => ReviewCommand::List,
            "show" => ReviewCommand::Show(item_number(rest)?),
            "ocr" => {
                let (n, text) = number_and_text(rest)?;
                ReviewCommand::Ocr(n, text.replace("\\n", "\n"))
            }
            "title" => {
                let (n, text) = number_and_text(rest)?;
                ReviewCommand::Title(n, text)
            }
            "retry" => ReviewCommand::Retry(item_number(rest)?),
            "reset" => ReviewCommand::Reset(item_number(rest)?),
            "rename" => ReviewCommand::Rename(item_number(rest)?),
            "commit" => ReviewCommand::Commit,
            "start" | "run" => ReviewCommand::Start,
            "preview" => match rest {
                "on" => ReviewCommand::Preview(true),
                "off" => ReviewCommand::Preview(false),
                _ => return Err(anyhow!("usage: preview on|off")),
            },
            "stop" => ReviewCommand::Stop,
            "help" | "?" => ReviewCommand::Help,
            "quit" | "exit" | "q" => ReviewCommand::Quit,
            other => return Err(anyhow!("unknown command `{other}`, try `help`")),
        };
        Ok(command)
    }
}

fn item_number(text: &str) -> Result<u32> {
    text.parse()
        .map_err(|_| anyhow!("expected an item number, got `{text}`"))
}

fn number_and_text(rest: &str) -> Result<(u32, String)> {
    let (n, text) = rest
        .split_once(char::is_whitespace)
        .ok_or_else(|| anyhow!("expected an item number followed by text"))?;
    Ok((item_number(n)?, text.trim().to_string()))
}

/// Reads commands from stdin until `quit` or end of input. Ctrl-C stops a
/// running command, or leaves when nothing is running.
pub async fn run(controller: &BatchController) -> Result<()> {
    println!("{}", style(HELP).dim());
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if line.trim().is_empty() {
                    continue;
                }
                match ReviewCommand::parse(&line) {
                    Ok(ReviewCommand::Quit) => break,
                    Ok(command) => {
                        if let Err(e) = execute(controller, command).await {
                            eprintln!("{} {}", style("Error:").red().bold(), e);
                        }
                    }
                    Err(e) => eprintln!("{} {}", style("Error:").red().bold(), e),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                if !controller.is_busy() {
                    break;
                }
                controller.stop();
                println!("{}", style("Stopping after the current stage...").yellow());
            }
        }
    }
    Ok(())
}

async fn execute(controller: &BatchController, command: ReviewCommand) -> Result<()> {
    match command {
        ReviewCommand::List => {
            print!("{}", format_table(&controller.snapshot().await));
            println!("{}", format_summary(&controller.summary().await));
        }
        ReviewCommand::Show(n) => {
            let view = controller
                .item(n)
                .await
                .ok_or_else(|| anyhow!("no item {n}"))?;
            print!("{}", format_detail(&view));
        }
        ReviewCommand::Ocr(n, text) => {
            let view = controller.set_ocr_text(n, &text).await?;
            print!("{}", format_detail(&view));
            println!("{}", style("Title cleared; `retry` to generate a new one.").dim());
        }
        ReviewCommand::Title(n, text) => {
            let view = controller.set_title(n, &text).await?;
            print!("{}", format_table(&[view]));
        }
        ReviewCommand::Retry(n) => controller.retry(n).await?,
        ReviewCommand::Reset(n) => {
            let view = controller.reset(n).await?;
            print!("{}", format_table(&[view]));
        }
        ReviewCommand::Rename(n) => controller.rename_single(n).await?,
        ReviewCommand::Commit => controller.commit().await?,
        ReviewCommand::Start => controller.start().await?,
        ReviewCommand::Preview(on) => {
            controller.set_preview(on).await;
            println!("preview {}", if on { "on" } else { "off" });
        }
        ReviewCommand::Stop => {
            if controller.is_busy() {
                controller.stop();
            } else {
                println!("nothing is running");
            }
        }
        ReviewCommand::Help => println!("{HELP}"),
        ReviewCommand::Quit => {}
    }
    Ok(())
}
