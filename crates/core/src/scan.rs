//! A header-level module scanner.
//!
//! [`HeaderScanner`] does not understand rule bodies. It reads the `package`
//! declaration and the top-level rule heads of a module, recording literal
//! JSON-compatible values assigned with `:=` or `=`. That is all bundle
//! packaging and policy discovery need, so it serves tooling that never
//! evaluates rules.

use serde_json::Value;

use crate::error::ParseError;
use crate::module::{Module, PackagePath, RuleDecl};
use crate::runtime::ModuleParser;

#[derive(Debug, Clone, Copy, Default)]
pub struct HeaderScanner;

impl ModuleParser for HeaderScanner {
    fn parse_module(&self, path: &str, source: &str) -> Result<Module, ParseError> {
        scan_module(path, source)
    }
}

/// Scan `source` into a [`Module`].
pub fn scan_module(path: &str, source: &str) -> Result<Module, ParseError> {
    let lines: Vec<(usize, String)> = source
        .lines()
        .enumerate()
        .map(|(i, l)| (i + 1, strip_comment(l)))
        .collect();

    let mut package = None;
    let mut rules = Vec::new();
    let mut depth: i64 = 0;
    let mut idx = 0;

    while idx < lines.len() {
        let (line_no, line) = &lines[idx];
        let trimmed = line.trim();
        idx += 1;

        if depth > 0 || trimmed.is_empty() || line.starts_with(char::is_whitespace) {
            depth += bracket_delta(line);
            if depth < 0 {
                return Err(ParseError::new(path, "unbalanced closing bracket").at_line(*line_no));
            }
            continue;
        }

        if package.is_none() {
            let Some(dotted) = trimmed.strip_prefix("package ") else {
                return Err(ParseError::new(path, "expected package declaration").at_line(*line_no));
            };
            let pkg = PackagePath::parse(dotted);
            if pkg.is_empty() {
                return Err(ParseError::new(path, "empty package name").at_line(*line_no));
            }
            package = Some(pkg);
            continue;
        }

        if trimmed.starts_with("import ") {
            continue;
        }

        let head = trimmed.strip_prefix("default ").unwrap_or(trimmed);
        let name_len = head
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(head.len());
        let name = &head[..name_len];
        if name.is_empty() || name.starts_with(|c: char| c.is_ascii_digit()) {
            return Err(ParseError::new(path, format!("unexpected token: {trimmed}")).at_line(*line_no));
        }

        let rest = head[name_len..].trim_start();
        let assigned = rest
            .strip_prefix(":=")
            .or_else(|| rest.strip_prefix('=').filter(|r| !r.starts_with('=')));

        let constant = match assigned {
            Some(value_src) if !trimmed.starts_with("default ") => {
                // Gather continuation lines until brackets balance.
                let mut text = value_src.trim().to_string();
                let mut balance = bracket_delta(&text);
                while balance > 0 && idx < lines.len() {
                    let next = &lines[idx].1;
                    balance += bracket_delta(next);
                    text.push('\n');
                    text.push_str(next);
                    idx += 1;
                }
                if balance != 0 {
                    return Err(ParseError::new(path, "unbalanced brackets in rule value").at_line(*line_no));
                }
                serde_json::from_str::<Value>(&text).ok()
            }
            _ => {
                depth += bracket_delta(line);
                None
            }
        };

        rules.push(RuleDecl {
            name: name.to_string(),
            constant,
        });
    }

    if depth != 0 {
        return Err(ParseError::new(path, "unexpected end of file inside a block"));
    }

    let package = package.ok_or_else(|| ParseError::new(path, "missing package declaration"))?;
    Ok(Module {
        path: path.to_string(),
        package,
        rules,
        source: source.into(),
    })
}

/// Drop a trailing `#` comment that is not inside a string literal.
fn strip_comment(line: &str) -> String {
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in line.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '#' if !in_string => return line[..i].to_string(),
            _ => {}
        }
    }
    line.to_string()
}

/// Net count of opening minus closing brackets outside string literals.
fn bracket_delta(text: &str) -> i64 {
    let mut delta = 0;
    let mut in_string = false;
    let mut escaped = false;
    for c in text.chars() {
        match c {
            _ if escaped => escaped = false,
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '{' | '[' | '(' if !in_string => delta += 1,
            '}' | ']' | ')' if !in_string => delta -= 1,
            _ => {}
        }
    }
    delta
}
