// Copyright 2025 Sushanth (https://github.com/sushanthpy)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Input validation for gateway requests
//!
//! Protects the engine against:
//! - Oversized query text
//! - Statements that execute external code or write to the model
//! - Malformed table/column identifiers
//! - Path traversal in filesystem parameters
//!
//! Validation is a pure function of the request and the static policy tables
//! compiled at construction. Comments are stripped before denylist matching so
//! that `DROP/**/TABLE` or `xp_/* */cmdshell` cannot slip through.

use crate::config::{ConfigError, ValidationConfig};
use olapgate_core::{QueryRequest, TextKind, ValidationResult};
use regex::{Regex, RegexBuilder};
use std::path::Path;

/// Stock denylist. Matched case-insensitively.
pub fn default_denylist() -> Vec<String> {
    [
        // External code execution
        r"\bxp_cmdshell\b",
        r"\bOPENROWSET\s*\(",
        r"\bOPENQUERY\s*\(",
        r"\bOPENDATASOURCE\s*\(",
        r"\bEXEC(UTE)?\s+(sp_|xp_)\w*",
        // Read-only bypass: DDL/DML statements
        r"(^|;)\s*(CREATE|ALTER|DROP|DELETE|INSERT|UPDATE|MERGE|GRANT|REVOKE)\b",
        // XMLA commands
        r"<(Alter|Create|Delete|Drop|Process|Execute|Batch|Refresh|Restore|Synchronize)\b",
        // TMSL commands
        r#""(createOrReplace|create|alter|delete|refresh|sequence|mergePartitions)"\s*:"#,
    ]
    .iter()
    .map(|p| p.to_string())
    .collect()
}

const BYTE_ORDER_MARK: char = '\u{feff}';

/// Stateless request validator.
#[derive(Debug, Clone)]
pub struct InputValidator {
    max_query_bytes: usize,
    max_identifier_length: usize,
    denylist: Vec<Regex>,
}

impl InputValidator {
    pub fn new(config: &ValidationConfig) -> Result<Self, ConfigError> {
        let denylist = config
            .denylist
            .iter()
            .map(|pattern| {
                RegexBuilder::new(pattern)
                    .case_insensitive(true)
                    .build()
                    .map_err(|source| ConfigError::Pattern {
                        pattern: pattern.clone(),
                        source,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            max_query_bytes: config.max_query_bytes,
            max_identifier_length: config.max_identifier_length,
            denylist,
        })
    }

    /// Validate a request. Checks run in a fixed order and stop at the first
    /// failure.
    pub fn validate(&self, request: &QueryRequest) -> ValidationResult {
        let text = request.text();

        if text.len() > self.max_query_bytes {
            return ValidationResult::rejected(format!(
                "Text too large: {} bytes exceeds maximum of {} bytes",
                text.len(),
                self.max_query_bytes
            ));
        }
        if text.contains('\0') {
            return ValidationResult::rejected("Text contains NUL bytes");
        }

        let sanitized = text.trim_start_matches(BYTE_ORDER_MARK).trim();
        if sanitized.is_empty() {
            return ValidationResult::rejected("Text is empty");
        }

        let outcome = match request.text_kind() {
            TextKind::Query => self.check_denylist(sanitized),
            TextKind::Identifier => self.check_identifier(sanitized),
            TextKind::Path => check_path(sanitized),
        };
        if let Err(reason) = outcome {
            return ValidationResult::rejected(reason);
        }

        if let Some(target) = request.target_path() {
            if let Err(reason) = check_path(target.trim()) {
                return ValidationResult::rejected(format!("Invalid target path: {}", reason));
            }
        }

        ValidationResult::accepted(sanitized)
    }

    fn check_denylist(&self, text: &str) -> Result<(), String> {
        // Comments become a space in one rendition and vanish in the other so
        // neither `DROP/**/TABLE` nor `xp_/**/cmdshell` hides a construct.
        let spaced = collapse_whitespace(&strip_comments(text, " "));
        let joined = collapse_whitespace(&strip_comments(text, ""));

        for pattern in &self.denylist {
            for candidate in [&spaced, &joined] {
                if let Some(found) = pattern.find(candidate) {
                    let construct = found.as_str().trim_start_matches(';').trim();
                    return Err(format!(
                        "Query contains a denied construct: '{}'. Only read-only queries are allowed",
                        construct
                    ));
                }
            }
        }
        Ok(())
    }

    fn check_identifier(&self, name: &str) -> Result<(), String> {
        let length = name.chars().count();
        if length > self.max_identifier_length {
            return Err(format!(
                "Identifier too long: {} characters exceeds maximum of {}",
                length, self.max_identifier_length
            ));
        }
        if let Some(bad) = name
            .chars()
            .find(|c| !(c.is_alphanumeric() || matches!(c, '_' | ' ' | '-' | '.')))
        {
            return Err(format!(
                "Identifier contains disallowed character '{}'. Allowed: letters, digits, '_', ' ', '-', '.'",
                bad.escape_default()
            ));
        }
        Ok(())
    }
}

/// Paths must not traverse upwards and must be absolute.
fn check_path(path: &str) -> Result<(), String> {
    if path.is_empty() {
        return Err("Path is empty".to_string());
    }
    let decoded = fully_percent_decoded(path);
    if path.contains('\0') || decoded.contains('\0') {
        return Err("Path contains NUL bytes".to_string());
    }
    if decoded.split(['/', '\\']).any(|part| part == "..") {
        return Err("Path traversal sequence '..' is not allowed".to_string());
    }
    if !is_absolute(path) {
        return Err("Path must be absolute".to_string());
    }
    Ok(())
}

/// Decode until stable so `%252e` style double encoding is unwrapped too.
fn fully_percent_decoded(path: &str) -> String {
    let mut current = path.to_string();
    for _ in 0..3 {
        let next = percent_decode(&current);
        if next == current {
            break;
        }
        current = next;
    }
    current
}

/// Decode `%XX` escapes. Malformed escapes are kept verbatim.
fn percent_decode(text: &str) -> String {
    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let (Some(hi), Some(lo)) = (hex_value(bytes[i + 1]), hex_value(bytes[i + 2])) {
                out.push(hi << 4 | lo);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn hex_value(byte: u8) -> Option<u8> {
    (byte as char).to_digit(16).map(|digit| digit as u8)
}

fn is_absolute(path: &str) -> bool {
    if Path::new(path).is_absolute() {
        return true;
    }
    // Windows forms, accepted on every host since the engine runs on Windows
    let bytes = path.as_bytes();
    let drive = bytes.len() >= 3
        && bytes[0].is_ascii_alphabetic()
        && bytes[1] == b':'
        && matches!(bytes[2], b'\\' | b'/');
    drive || path.starts_with("\\\\")
}

/// Remove `--` and `//` line comments and `/* */` block comments, replacing
/// each with `replacement`. String literals (`"..."`), quoted table names
/// (`'...'`) and bracketed references (`[...]`) are kept verbatim.
pub fn strip_comments(text: &str, replacement: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();

        match c {
            '"' | '\'' | '[' => {
                let close = if c == '[' { ']' } else { c };
                out.push(c);
                i += 1;
                while i < chars.len() {
                    out.push(chars[i]);
                    if chars[i] == close {
                        // Doubled delimiter is an escape
                        if chars.get(i + 1) == Some(&close) {
                            out.push(close);
                            i += 2;
                            continue;
                        }
                        break;
                    }
                    i += 1;
                }
                i += 1;
            }
            '-' if next == Some('-') => {
                i = skip_line(&chars, i);
                out.push_str(replacement);
            }
            '/' if next == Some('/') => {
                i = skip_line(&chars, i);
                out.push_str(replacement);
            }
            '/' if next == Some('*') => {
                i += 2;
                while i < chars.len() && !(chars[i] == '*' && chars.get(i + 1) == Some(&'/')) {
                    i += 1;
                }
                i += 2;
                out.push_str(replacement);
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }

    out
}

/// Trim and collapse whitespace runs to one space. The contents of string
/// literals, quoted table names and bracketed references are kept verbatim,
/// so queries that differ only inside a literal stay distinct.
pub fn normalize_query_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.trim().chars().peekable();
    let mut pending_space = false;

    while let Some(c) = chars.next() {
        if c.is_whitespace() {
            pending_space = true;
            continue;
        }
        if pending_space {
            out.push(' ');
            pending_space = false;
        }
        out.push(c);

        if matches!(c, '"' | '\'' | '[') {
            let close = if c == '[' { ']' } else { c };
            while let Some(inner) = chars.next() {
                out.push(inner);
                if inner == close {
                    // Doubled delimiter is an escape
                    if chars.peek() == Some(&close) {
                        chars.next();
                        out.push(close);
                        continue;
                    }
                    break;
                }
            }
        }
    }

    out
}

fn skip_line(chars: &[char], mut i: usize) -> usize {
    while i < chars.len() && chars[i] != '\n' {
        i += 1;
    }
    i
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
