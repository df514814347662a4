//! Line-oriented chat loop.

use std::fmt::Write as _;
use std::path::PathBuf;

use anyhow::Result;
use docchat_rag::{Answer, Conversation, DocChat, IndexStats};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tracing::warn;

const HELP: &str = "\
Commands:
  /refresh   re-index the folder
  /files     list the folder's files and whether they are indexed
  /stats     show index statistics
  /clear     forget the conversation so far
  /help      show this message
  /quit      exit
Anything else is asked as a question.";

#[derive(Debug, PartialEq, Eq)]
pub enum Command {
    Ask(String),
    Refresh,
    Files,
    Stats,
    Clear,
    Help,
    Quit,
    Unknown(String),
    Empty,
}

pub fn parse_command(line: &str) -> Command {
    let line = line.trim();
    if line.is_empty() {
        return Command::Empty;
    }
    let Some(name) = line.strip_prefix('/') else {
        return Command::Ask(line.to_string());
    };
    match name.split_whitespace().next().unwrap_or_default().to_ascii_lowercase().as_str() {
        "refresh" | "reload" => Command::Refresh,
        "files" => Command::Files,
        "stats" => Command::Stats,
        "clear" => Command::Clear,
        "help" | "?" => Command::Help,
        "quit" | "exit" | "q" => Command::Quit,
        _ => Command::Unknown(line.to_string()),
    }
}

/// Numbered list of the chunks an answer was built from.
pub fn render_sources(answer: &Answer) -> String {
    let mut out = String::new();
    for (i, result) in answer.source_chunks.iter().enumerate() {
        let chunk = &result.chunk;
        let _ = writeln!(
            out,
            "  [{}] {} [{}..{}] (score {:.3})",
            i + 1,
            chunk.source().unwrap_or(chunk.document_id.as_str()),
            chunk.char_offset_start,
            chunk.char_offset_end,
            result.score,
        );
    }
    out
}

/// One line per file in the folder, marking those in the current index.
pub fn render_files(folder_files: &[PathBuf], indexed: &[PathBuf]) -> String {
    let mut out = String::new();
    for file in folder_files {
        let mark = if indexed.contains(file) { "*" } else { " " };
        let _ = writeln!(out, "  {mark} {}", file.display());
    }
    let _ = writeln!(out, "  ({} indexed, * = in the current index)", indexed.len());
    out
}

pub fn render_stats(stats: &IndexStats) -> String {
    let mut out = format!(
        "{} documents, {} chunks, dimension {}, built {}\n",
        stats.documents,
        stats.chunks,
        stats.dimension,
        stats.built_at.format("%Y-%m-%d %H:%M:%S UTC"),
    );
    for skipped in &stats.skipped {
        let _ = writeln!(out, "  skipped {}: {}", skipped.path.display(), skipped.reason);
    }
    out
}

pub async fn run(chat: &DocChat, show_sources: bool) -> Result<()> {
    let mut editor = DefaultEditor::new()?;
    let mut conversation = Conversation::new();
    println!("{}", render_stats(&chat.stats().await).trim_end());
    println!("Type /help for commands.");

    loop {
        let line = match editor.readline(">> ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        };
        let command = parse_command(&line);
        if !matches!(command, Command::Empty) {
            let _ = editor.add_history_entry(line.trim());
        }

        match command {
            Command::Empty => {}
            Command::Quit => break,
            Command::Help => println!("{HELP}"),
            Command::Unknown(input) => println!("unknown command {input}; try /help"),
            Command::Clear => {
                conversation.clear();
                println!("conversation cleared");
            }
            Command::Files => match chat.folder_files().await {
                Ok(files) => print!("{}", render_files(&files, &chat.indexed_files().await)),
                Err(e) => println!("error: {e}"),
            },
            Command::Stats => print!("{}", render_stats(&chat.stats().await)),
            Command::Refresh => match chat.refresh_index().await {
                Ok(stats) => print!("{}", render_stats(&stats)),
                Err(e) => println!("refresh failed, still serving the previous index: {e}"),
            },
            Command::Ask(question) => {
                let result = chat.ask(&question, conversation.turns()).await;
                match result {
                    Ok(answer) => {
                        println!("{}", answer.answer.trim());
                        if show_sources {
                            print!("{}", render_sources(&answer));
                        }
                        conversation.record(question, &answer);
                    }
                    Err(e) => {
                        warn!(error = %e, "question failed");
                        println!("error: {e}");
                    }
                }
            }
        }
    }
    Ok(())
}
