//! Argument parsing for reserved commands invoked from pipeline scripts.
//!
//! Reserved commands receive raw words from the interpreter. Accepted
//! grammar:
//!
//!   name... [--flag] [--option value | --option=value] [-- rest...]
//!
//! Unknown flags are errors, never silently treated as names.

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::error::{Error, Result};

#[derive(Debug, Default, Clone, PartialEq)]
pub struct ParsedArgs {
    pub positional: Vec<String>,
    options: HashMap<String, Vec<String>>,
    switches: HashSet<String>,
}

impl ParsedArgs {
    pub fn switch(&self, name: &str) -> bool {
        self.switches.contains(name)
    }

    /// Last value given for an option.
    pub fn option(&self, name: &str) -> Option<&str> {
        self.options
            .get(name)
            .and_then(|values| values.last())
            .map(String::as_str)
    }

    pub fn option_values(&self, name: &str) -> &[String] {
        self.options.get(name).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Flags a reserved command accepts, named without the leading dashes.
#[derive(Debug, Clone, Copy)]
pub struct ArgSpec<'a> {
    pub command: &'a str,
    pub switches: &'a [&'a str],
    pub options: &'a [&'a str],
}

impl ArgSpec<'_> {
    pub fn parse(&self, args: &[String]) -> Result<ParsedArgs> {
        let mut parsed = ParsedArgs::default();
        let mut iter = args.iter();

        while let Some(arg) = iter.next() {
            if arg == "--" {
                parsed.positional.extend(iter.by_ref().cloned());
                break;
            }

            let Some(flag) = arg.strip_prefix("--") else {
                if arg.len() > 1 && arg.starts_with('-') {
                    return Err(self.unknown_flag(arg));
                }
                parsed.positional.push(arg.clone());
                continue;
            };

            let (name, inline_value) = match flag.split_once('=') {
                Some((name, value)) => (name, Some(value.to_string())),
                None => (flag, None),
            };

            if self.switches.contains(&name) {
                if inline_value.is_some() {
                    return Err(Error::validation_invalid_argument(
                        name,
                        format!("{}: --{} does not take a value", self.command, name),
                        None,
                        None,
                    ));
                }
                parsed.switches.insert(name.to_string());
            } else if self.options.contains(&name) {
                let value = match inline_value {
                    Some(value) => value,
                    None => iter.next().cloned().ok_or_else(|| {
                        Error::validation_missing_argument(vec![format!("--{}", name)])
                    })?,
                };
                parsed
                    .options
                    .entry(name.to_string())
                    .or_default()
                    .push(value);
            } else {
                return Err(self.unknown_flag(arg));
            }
        }

        Ok(parsed)
    }

    fn unknown_flag(&self, arg: &str) -> Error {
        let mut known: Vec<String> = self
            .switches
            .iter()
            .chain(self.options.iter())
            .map(|f| format!("--{}", f))
            .collect();
        known.sort();
        Error::validation_invalid_argument(
            "flag",
            format!("{}: unknown flag {}", self.command, arg),
            Some(arg.to_string()),
            Some(known),
        )
    }
}

/// Pick entries of `items` named by `parsed`: every entry with `--all`,
/// otherwise each positional name in order.
pub fn select<'a, T>(
    items: &'a BTreeMap<String, T>,
    parsed: &ParsedArgs,
    not_found: fn(String) -> Error,
) -> Result<Vec<(&'a str, &'a T)>> {
    if parsed.switch("all") {
        return Ok(items.iter().map(|(k, v)| (k.as_str(), v)).collect());
    }

    if parsed.positional.is_empty() {
        return Err(Error::validation_missing_argument(vec![
            "<name>...".to_string(),
            "--all".to_string(),
        ]));
    }

    let mut selected: Vec<(&str, &T)> = Vec::new();
    for name in &parsed.positional {
        let (key, value) = items
            .get_key_value(name.as_str())
            .ok_or_else(|| not_found(name.clone()))?;
        if !selected.iter().any(|(k, _)| *k == key.as_str()) {
            selected.push((key.as_str(), value));
        }
    }
    Ok(selected)
}
