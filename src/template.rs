//! Per-invocation templating of configured strings
//!
//! Configured URLs, bodies, scripts and pipe arguments may refer to the positional
//! arguments of the current invocation with Go-template style actions such as
//! `{{index .args 0}}`. After rendering, `${NAME}` and `$NAME` references are
//! expanded from the process environment, falling back to the config `vars`.

use std::collections::BTreeMap;

use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum RenderError {
    #[error("template `{template}`: {message}")]
    Syntax { template: String, message: String },
    #[error("template `{template}`: unknown action `{{{{{action}}}}}`")]
    UnknownAction { template: String, action: String },
    #[error("template `{template}`: argument {index} requested but only {len} given")]
    ArgIndex {
        template: String,
        index: usize,
        len: usize,
    },
}

/// Renders `template` against the positional `args`.
///
/// # Errors
///
/// Returns `RenderError::Syntax` for unterminated actions or bad quoting,
/// `RenderError::UnknownAction` for unsupported actions, and
/// `RenderError::ArgIndex` when an argument beyond `args.len()` is referenced.
pub fn render(template: &str, args: &[String]) -> Result<String, RenderError> {
    if template.is_empty() {
        return Ok(String::new());
    }

    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    let mut trim_next = false;

    while let Some(start) = rest.find("{{") {
        let text = if trim_next {
            rest[..start].trim_start()
        } else {
            &rest[..start]
        };
        out.push_str(text);

        let after_open = &rest[start + 2..];
        let Some(end) = after_open.find("}}") else {
            return Err(RenderError::Syntax {
                template: template.to_string(),
                message: "unclosed action".to_string(),
            });
        };
        let mut inner = &after_open[..end];

        if let Some(stripped) = inner.strip_prefix('-').filter(|s| starts_with_space(s)) {
            let trimmed = out.trim_end().len();
            out.truncate(trimmed);
            inner = stripped;
        }
        trim_next = false;
        if let Some(stripped) = inner.strip_suffix('-').filter(|s| ends_with_space(s)) {
            trim_next = true;
            inner = stripped;
        }

        out.push_str(&eval_action(template, inner.trim(), args)?);
        rest = &after_open[end + 2..];
    }

    if trim_next {
        out.push_str(rest.trim_start());
    } else {
        out.push_str(rest);
    }
    Ok(out)
}

fn starts_with_space(s: &str) -> bool {
    s.chars().next().is_some_and(char::is_whitespace)
}

fn ends_with_space(s: &str) -> bool {
    s.chars().last().is_some_and(char::is_whitespace)
}

fn eval_action(template: &str, action: &str, args: &[String]) -> Result<String, RenderError> {
    if action.starts_with("/*") && action.ends_with("*/") {
        return Ok(String::new());
    }

    let syntax = |message: &str| RenderError::Syntax {
        template: template.to_string(),
        message: message.to_string(),
    };
    let words = split_words(action).map_err(|m| syntax(&m))?;
    let words: Vec<&str> = words.iter().map(String::as_str).collect();

    match words.as_slice() {
        [] => Err(syntax("missing value for command")),
        [".args"] => Ok(format!("[{}]", args.join(" "))),
        ["len", ".args"] => Ok(args.len().to_string()),
        ["index", ".args", index] => {
            let index: usize = index
                .parse()
                .map_err(|_| syntax(&format!("invalid argument index `{index}`")))?;
            args.get(index)
                .cloned()
                .ok_or_else(|| RenderError::ArgIndex {
                    template: template.to_string(),
                    index,
                    len: args.len(),
                })
        }
        ["join", ".args", separator] => Ok(args.join(*separator)),
        _ => Err(RenderError::UnknownAction {
            template: template.to_string(),
            action: action.to_string(),
        }),
    }
}

/// Splits an action into words, honouring double-quoted strings.
fn split_words(action: &str) -> Result<Vec<String>, String> {
    let mut words = Vec::new();
    let mut chars = action.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        let mut word = String::new();
        if c == '"' {
            chars.next();
            loop {
                match chars.next() {
                    Some('"') => break,
                    Some('\\') => match chars.next() {
                        Some('n') => word.push('\n'),
                        Some('t') => word.push('\t'),
                        Some(other) => word.push(other),
                        None => return Err("unterminated quoted string".to_string()),
                    },
                    Some(other) => word.push(other),
                    None => return Err("unterminated quoted string".to_string()),
                }
            }
        } else {
            while let Some(&c) = chars.peek() {
                if c.is_whitespace() {
                    break;
                }
                if c == '"' {
                    return Err("unexpected quote".to_string());
                }
                word.push(c);
                chars.next();
            }
        }
        words.push(word);
    }
    Ok(words)
}

/// Expands `${NAME}` and `$NAME` using `lookup`; unknown names become empty.
///
/// References that are not identifiers, such as `$5`, are kept as written.
pub fn expand_with<F>(input: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    shellexpand::env_with_context_no_errors(input, |name: &str| {
        is_identifier(name).then(|| lookup(name).unwrap_or_default())
    })
    .into_owned()
}

fn is_identifier(name: &str) -> bool {
    name.chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Expands references from the process environment, then `vars`.
#[must_use]
pub fn expand_env(input: &str, vars: &BTreeMap<String, String>) -> String {
    expand_with(input, |name| {
        std::env::var(name).ok().or_else(|| vars.get(name).cloned())
    })
}

/// Renders `template` and expands environment references in the result.
///
/// # Errors
///
/// Propagates any [`RenderError`] from [`render`].
pub fn render_and_expand(
    template: &str,
    args: &[String],
    vars: &BTreeMap<String, String>,
) -> Result<String, RenderError> {
    Ok(expand_env(&render(template, args)?, vars))
}
