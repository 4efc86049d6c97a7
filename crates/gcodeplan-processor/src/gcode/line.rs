//! Line tokenizer
//!
//! Splits one G-code line into its command word, single-letter parameters,
//! Klipper style `KEY=VALUE` parameters and the trailing comment.

use gcodeplan_core::Axis;
use tracing::warn;

/// Letters that name axes the processor does not track
const FOREIGN_AXES: [char; 6] = ['A', 'B', 'C', 'U', 'V', 'W'];

#[derive(Debug, Clone, Copy, PartialEq)]
struct Param {
    letter: char,
    /// `None` for a bare letter such as the `X` in `G28 X`
    value: Option<f32>,
}

/// One tokenized G-code line, borrowing from the source text
#[derive(Debug, Clone, PartialEq)]
pub struct GcodeLine<'a> {
    raw: &'a str,
    line_number: u32,
    command: &'a str,
    params: Vec<Param>,
    named: Vec<(&'a str, &'a str)>,
    comment: Option<&'a str>,
}

impl<'a> GcodeLine<'a> {
    /// Tokenize `raw`; `line_number` is only used in diagnostics
    pub fn parse(raw: &'a str, line_number: u32) -> Self {
        let raw = raw.trim_end_matches(['\r', '\n']);
        let (code, comment) = match raw.find(';') {
            Some(pos) => (&raw[..pos], Some(&raw[pos + 1..])),
            None => (raw, None),
        };

        let mut tokens = code.split_whitespace();
        let command = tokens.next().unwrap_or("");
        let mut params = Vec::new();
        let mut named = Vec::new();

        for token in tokens {
            if let Some((key, value)) = token.split_once('=') {
                named.push((key, value));
                continue;
            }
            let mut chars = token.chars();
            let Some(letter) = chars.next() else { continue };
            if !letter.is_ascii_alphabetic() {
                warn!("Line {}: ignoring parameter '{}'", line_number, token);
                continue;
            }
            let text = chars.as_str();
            let letter = letter.to_ascii_uppercase();
            if text.is_empty() {
                params.push(Param { letter, value: None });
                continue;
            }
            match text.parse::<f32>() {
                Ok(value) if value.is_finite() => params.push(Param {
                    letter,
                    value: Some(value),
                }),
                _ => warn!(
                    "Line {}: invalid value '{}' for parameter {}",
                    line_number, text, letter
                ),
            }
        }

        Self {
            raw,
            line_number,
            command,
            params,
            named,
            comment,
        }
    }

    /// The line without its end-of-line characters
    pub fn raw(&self) -> &'a str {
        self.raw
    }

    pub fn line_number(&self) -> u32 {
        self.line_number
    }

    /// First word of the line, e.g. `G1`, `M104` or `T2`
    pub fn command(&self) -> &'a str {
        self.command
    }

    /// Text after the first `;`
    pub fn comment(&self) -> Option<&'a str> {
        self.comment
    }

    /// Whether the parameter is present, with or without a value
    pub fn has(&self, letter: char) -> bool {
        let letter = letter.to_ascii_uppercase();
        self.params.iter().any(|p| p.letter == letter)
    }

    pub fn value(&self, letter: char) -> Option<f32> {
        let letter = letter.to_ascii_uppercase();
        self.params
            .iter()
            .find(|p| p.letter == letter)
            .and_then(|p| p.value)
    }

    pub fn axis(&self, axis: Axis) -> Option<f32> {
        self.value(axis.letter())
    }

    pub fn has_axis(&self, axis: Axis) -> bool {
        self.has(axis.letter())
    }

    /// Feed rate in mm/min
    pub fn feedrate(&self) -> Option<f32> {
        self.value('F')
    }

    /// Whether the line addresses an axis other than X, Y, Z or E
    pub fn has_unknown_axis(&self) -> bool {
        self.params.iter().any(|p| FOREIGN_AXES.contains(&p.letter))
    }

    /// `KEY=VALUE` parameter, key compared case-insensitively
    pub fn named(&self, key: &str) -> Option<f32> {
        self.named
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .and_then(|(_, v)| match v.parse::<f32>() {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!("Line {}: invalid value '{}' for {}", self.line_number, v, key);
                    None
                }
            })
    }

    /// Command word is exactly `cmd` (case-insensitive)
    pub fn is_command(&self, cmd: &str) -> bool {
        self.command.eq_ignore_ascii_case(cmd)
    }
}
