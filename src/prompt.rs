//! Operator prompts
//!
//! The registration workflow only talks to a [`Prompter`]: show a line, read
//! a line. Confirmation, multi-line input and selection from a displayed
//! list are built on those two, so the workflow runs the same against the
//! console or a scripted answer queue.

use std::collections::VecDeque;
use std::io::BufRead;
use console::Term;
use crate::{Error, Result};

pub trait Prompter {
    /// Show one line to the operator
    fn say(&mut self, line: &str) -> Result<()>;

    /// Show `prompt` and read one line of input, without the line ending
    fn read_line(&mut self, prompt: &str) -> Result<String>;

    /// Ask a yes/no question until answered with `y` or `n`
    fn confirm(&mut self, question: &str) -> Result<bool> {
        loop {
            match self.read_line(&format!("{} (y/n): ", question))?.trim() {
                "y" | "Y" => return Ok(true),
                "n" | "N" => return Ok(false),
                _ => continue,
            }
        }
    }

    /// Read lines until an empty one
    fn read_lines(&mut self, prompt: &str) -> Result<Vec<String>> {
        let mut lines = Vec::new();
        loop {
            let line = self.read_line(prompt)?;
            if line.trim().is_empty() {
                return Ok(lines);
            }
            lines.push(line);
        }
    }

    /// Pick exactly one of `items` by its displayed index
    fn select_one(&mut self, title: &str, items: &[String]) -> Result<usize> {
        if items.is_empty() {
            return Err(Error::InputValidation(format!("nothing to choose from for '{}'", title)));
        }
        self.say(title)?;
        show_items(self, items)?;
        loop {
            let answer = self.read_line("Label: ")?;
            if let Some(idx) = parse_index(&answer, items.len()) {
                return Ok(idx);
            }
            self.say(&format!("'{}' is not a label between 0 and {}", answer.trim(), items.len() - 1))?;
        }
    }

    /// Pick zero or more of `items`; an empty line finishes.
    /// Indices are returned in selection order without repeats.
    fn select_many(&mut self, title: &str, items: &[String]) -> Result<Vec<usize>> {
        let mut picked = Vec::new();
        if items.is_empty() {
            return Ok(picked);
        }
        self.say(title)?;
        show_items(self, items)?;
        loop {
            let answer = self.read_line("Next label (empty to finish): ")?;
            if answer.trim().is_empty() {
                return Ok(picked);
            }
            match parse_index(&answer, items.len()) {
                Some(idx) if !picked.contains(&idx) => picked.push(idx),
                Some(_) => {}
                None => self.say(&format!(
                    "'{}' is not a label between 0 and {}",
                    answer.trim(),
                    items.len() - 1
                ))?,
            }
        }
    }
}

fn show_items<P: Prompter + ?Sized>(prompter: &mut P, items: &[String]) -> Result<()> {
    for (idx, item) in items.iter().enumerate() {
        prompter.say(&format!("{:>3} - {}", idx, item))?;
    }
    Ok(())
}

fn parse_index(answer: &str, len: usize) -> Option<usize> {
    answer.trim().parse::<usize>().ok().filter(|idx| *idx < len)
}

/// Prompts on the terminal
pub struct ConsolePrompter {
    term: Term,
}

impl ConsolePrompter {
    pub fn new() -> Self {
        Self { term: Term::stdout() }
    }
}

impl Default for ConsolePrompter {
    fn default() -> Self {
        Self::new()
    }
}

impl Prompter for ConsolePrompter {
    fn say(&mut self, line: &str) -> Result<()> {
        self.term.write_line(line)?;
        Ok(())
    }

    fn read_line(&mut self, prompt: &str) -> Result<String> {
        self.term.write_str(prompt)?;
        self.term.flush()?;
        if self.term.is_term() {
            return Ok(self.term.read_line()?);
        }

        // Piped input: stop at end of stream instead of reading empty lines forever
        let mut line = String::new();
        if std::io::stdin().lock().read_line(&mut line)? == 0 {
            return Err(std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "input closed").into());
        }
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }
}

/// Replays queued answers and records everything shown
#[derive(Debug, Default)]
pub struct ScriptedPrompter {
    answers: VecDeque<String>,
    pub transcript: Vec<String>,
}

impl ScriptedPrompter {
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            answers: answers.into_iter().map(Into::into).collect(),
            transcript: Vec::new(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.answers.len()
    }
}

impl Prompter for ScriptedPrompter {
    fn say(&mut self, line: &str) -> Result<()> {
        self.transcript.push(line.to_string());
        Ok(())
    }

    fn read_line(&mut self, prompt: &str) -> Result<String> {
        self.transcript.push(prompt.to_string());
        self.answers.pop_front().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "scripted answers exhausted").into()
        })
    }
}
