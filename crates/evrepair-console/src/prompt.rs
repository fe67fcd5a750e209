use crate::keys::{self, Key, KeyInput};
use std::fmt::Display;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

const INVALID_FORMAT: &str = "Invalid format";
const INVALID_NUMBER: &str = "Invalid number";
const NOT_A_CHOICE: &str = "Not a number or choice";
const CONFIRM_HINT: &str = "Input Y or N";

#[derive(Debug, thiserror::Error)]
pub enum PromptError {
    #[error("input stream closed")]
    Aborted,
    #[error("selection prompt has no choices")]
    NoChoices,
    #[error("console io error: {0}")]
    Io(#[from] io::Error),
}

pub type PromptResult<T> = Result<T, PromptError>;

/// A finite set of variants known at compile time, listed in display order.
pub trait Variants: Sized + Copy + 'static {
    const ALL: &'static [Self];
}

pub struct Prompter<R, W> {
    input: R,
    output: W,
    keys: KeyInput,
}

impl<R: BufRead, W: Write> Prompter<R, W> {
    pub fn new(input: R, output: W, keys: KeyInput) -> Self {
        Self {
            input,
            output,
            keys,
        }
    }

    pub fn output(&mut self) -> &mut W {
        &mut self.output
    }

    pub fn into_parts(self) -> (R, W) {
        (self.input, self.output)
    }

    pub fn say(&mut self, message: impl Display) -> PromptResult<()> {
        writeln!(self.output, "{message}")?;
        self.output.flush()?;
        Ok(())
    }

    pub fn request_typed<T, F>(
        &mut self,
        prompt: &str,
        error_message: &str,
        parse: F,
    ) -> PromptResult<T>
    where
        F: Fn(&str) -> Option<T>,
    {
        loop {
            let input = self.request_line(prompt)?;
            if let Some(value) = parse(&input) {
                return Ok(value);
            }
            writeln!(self.output, "{error_message}")?;
        }
    }

    pub fn request_line(&mut self, prompt: &str) -> PromptResult<String> {
        write!(self.output, "{prompt}")?;
        self.read_line()
    }

    pub fn request_validated_line<F>(
        &mut self,
        prompt: &str,
        error_message: &str,
        predicate: F,
    ) -> PromptResult<String>
    where
        F: Fn(&str) -> bool,
    {
        self.request_typed(prompt, error_message, |input| {
            predicate(input).then(|| input.to_string())
        })
    }

    pub fn request_i32(&mut self, prompt: &str) -> PromptResult<i32> {
        self.request_typed(prompt, INVALID_FORMAT, |input| input.trim().parse().ok())
    }

    pub fn request_i64(&mut self, prompt: &str) -> PromptResult<i64> {
        self.request_typed(prompt, INVALID_FORMAT, |input| input.trim().parse().ok())
    }

    pub fn request_f32(&mut self, prompt: &str) -> PromptResult<f32> {
        self.request_typed(prompt, INVALID_FORMAT, |input| input.trim().parse().ok())
    }

    pub fn request_f64(&mut self, prompt: &str) -> PromptResult<f64> {
        self.request_typed(prompt, INVALID_FORMAT, |input| input.trim().parse().ok())
    }

    pub fn request_file_path(&mut self, prompt: &str) -> PromptResult<PathBuf> {
        self.request_typed(prompt, "File does not exist", |input| {
            let path = Path::new(normalize_path_input(input));
            path.is_file().then(|| path.to_path_buf())
        })
    }

    pub fn request_directory_path(&mut self, prompt: &str) -> PromptResult<PathBuf> {
        self.request_typed(prompt, "Directory does not exist", |input| {
            let path = Path::new(normalize_path_input(input));
            path.is_dir().then(|| path.to_path_buf())
        })
    }

    pub fn request_confirmation(
        &mut self,
        prompt: &str,
        default: Option<bool>,
    ) -> PromptResult<bool> {
        let tail = match default {
            None => "(y/n)",
            Some(true) => "(Y/n)",
            Some(false) => "(y/N)",
        };
        let message = format!("{prompt} {tail} ");

        loop {
            let input = self.request_line(&message)?;
            if input.eq_ignore_ascii_case("y") {
                return Ok(true);
            }
            if input.eq_ignore_ascii_case("n") {
                return Ok(false);
            }
            if input.trim().is_empty() {
                if let Some(value) = default {
                    return Ok(value);
                }
            }
            writeln!(self.output, "{CONFIRM_HINT}")?;
        }
    }

    pub fn request_selection<S: AsRef<str>>(
        &mut self,
        prompt: &str,
        number_start: i64,
        choices: &[S],
    ) -> PromptResult<usize> {
        if choices.is_empty() {
            return Err(PromptError::NoChoices);
        }

        writeln!(self.output, "{prompt}")?;
        for (index, choice) in choices.iter().enumerate() {
            let number = i128::from(number_start) + index as i128;
            writeln!(self.output, "  {number}. {}", choice.as_ref())?;
        }

        loop {
            let input = self.read_line()?;
            if let Some(index) = choices.iter().position(|choice| choice.as_ref() == input) {
                return Ok(index);
            }
            match input.trim().parse::<i64>() {
                Ok(number) => match selection_index(number, number_start, choices.len()) {
                    Some(index) => return Ok(index),
                    None => writeln!(self.output, "{INVALID_NUMBER}")?,
                },
                Err(_) => writeln!(self.output, "{NOT_A_CHOICE}")?,
            }
        }
    }

    pub fn select_value<T, F>(
        &mut self,
        prompt: &str,
        number_start: i64,
        values: &[T],
        label: F,
    ) -> PromptResult<T>
    where
        T: Clone,
        F: Fn(&T) -> String,
    {
        let labels: Vec<String> = values.iter().map(&label).collect();
        let index = self.request_selection(prompt, number_start, &labels)?;
        Ok(values[index].clone())
    }

    pub fn select_variant<T, F>(
        &mut self,
        prompt: &str,
        number_start: i64,
        label: F,
    ) -> PromptResult<T>
    where
        T: Variants,
        F: Fn(&T) -> String,
    {
        self.select_value(prompt, number_start, T::ALL, label)
    }

    pub fn request_keypress(&mut self, prompt: &str) -> PromptResult<Key> {
        writeln!(self.output, "{prompt}")?;
        self.output.flush()?;
        match self.keys {
            KeyInput::Terminal => keys::read_terminal_key()?.ok_or(PromptError::Aborted),
            KeyInput::Line => {
                let line = self.read_line()?;
                Ok(Key::from_line(&line))
            }
        }
    }

    fn read_line(&mut self) -> PromptResult<String> {
        self.output.flush()?;
        let mut buf = Vec::new();
        if self.input.read_until(b'\n', &mut buf)? == 0 {
            tracing::debug!("console input closed");
            return Err(PromptError::Aborted);
        }
        if buf.last() == Some(&b'\n') {
            buf.pop();
            if buf.last() == Some(&b'\r') {
                buf.pop();
            }
        }
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}

fn selection_index(number: i64, number_start: i64, len: usize) -> Option<usize> {
    let offset = number.checked_sub(number_start)?;
    let index = usize::try_from(offset).ok()?;
    (index < len).then_some(index)
}

/// Strips whitespace and one pair of matching quotes, which terminals add
/// when a file is dragged onto the window.
pub fn normalize_path_input(input: &str) -> &str {
    let trimmed = input.trim();
    for quote in ['"', '\''] {
        if trimmed.len() >= 2 && trimmed.starts_with(quote) && trimmed.ends_with(quote) {
            return &trimmed[1..trimmed.len() - 1];
        }
    }
    trimmed
}
