//! G-code command model: opcode recognition, case normalization, and the
//! queue tag used to preserve host bookkeeping through rewrites.

pub mod translator;

use std::fmt;

/// Letter-plus-number prefix identifying a command's category, e.g. `G28`
/// or `M106`. Only `G`, `M` and `T` commands are recognized; anything else
/// on the queue is header noise from a sliced print file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Opcode {
    pub letter: char,
    pub number: u16,
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.letter, self.number)
    }
}

/// One textual command line plus the host's queue tag.
///
/// The tag carries no meaning here; it is preserved when a command is
/// rewritten (rather than dropped) so the host's bookkeeping still lines
/// up with what was actually sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    line: String,
    tag: Option<String>,
}

impl Command {
    pub fn new(line: impl Into<String>) -> Self {
        Self {
            line: line.into(),
            tag: None,
        }
    }

    pub fn tagged(line: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            line: line.into(),
            tag: Some(tag.into()),
        }
    }

    pub fn line(&self) -> &str {
        &self.line
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    /// Rewritten command carrying this command's queue tag.
    pub fn rewritten(&self, line: impl Into<String>) -> Command {
        Command {
            line: line.into(),
            tag: self.tag.clone(),
        }
    }

    /// Opcode at the start of the line, if the line is a recognized
    /// command. Requires `G`, `M` or `T` followed by one or more digits;
    /// everything else (file headers, comments, garbage) yields `None`.
    pub fn opcode(&self) -> Option<Opcode> {
        parse_opcode(&self.line)
    }

    /// Argument tail after the opcode, trimmed of leading whitespace.
    pub fn args(&self) -> &str {
        if self.opcode().is_none() {
            return "";
        }
        let digits = self.line[1..]
            .bytes()
            .take_while(|b| b.is_ascii_digit())
            .count();
        self.line[1 + digits..].trim_start()
    }
}

/// Parse the `[GMT]\d+` prefix of a line.
pub fn parse_opcode(line: &str) -> Option<Opcode> {
    let bytes = line.as_bytes();
    let letter = *bytes.first()? as char;
    if !matches!(letter, 'G' | 'M' | 'T') {
        return None;
    }
    let digits: &str = {
        let end = bytes[1..]
            .iter()
            .position(|b| !b.is_ascii_digit())
            .map(|p| p + 1)
            .unwrap_or(bytes.len());
        &line[1..end]
    };
    if digits.is_empty() {
        return None;
    }
    let number = digits.parse().ok()?;
    Some(Opcode { letter, number })
}

/// Uppercase a queued command unless its opcode is exempt.
///
/// The printer expects uppercase commands, but a few (the LED-color
/// command) take case-significant arguments and must pass through
/// untouched.
pub fn normalize_case(cmd: &Command, case_sensitive_opcodes: &[String]) -> Command {
    let line = cmd.line();
    if let Some(op) = parse_opcode(&line.to_ascii_uppercase()) {
        if case_sensitive_opcodes.iter().any(|o| o == &op.to_string()) {
            return cmd.clone();
        }
    }
    Command {
        line: line.to_ascii_uppercase(),
        tag: cmd.tag.clone(),
    }
}
