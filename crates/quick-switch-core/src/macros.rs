//! `<name>` / `<name:argument>` template expansion for status and tooltip
//! text.
//!
//! Recognized names are `workspace`, `project`, `basename`, `lower` and
//! `upper`; anything else expands to nothing. `\<` emits a literal `<`
//! without opening a token. An argument containing `<` is expanded as a
//! template, otherwise it is evaluated as a macro expression itself, so
//! `<basename:project>` and `<upper:<workspace>>` both work.

use std::path::Path;
use tracing::warn;

use crate::model::DEFAULT_WORKSPACE;

/// Deepest token nesting evaluated before the token collapses to "".
pub const MAX_MACRO_DEPTH: usize = 16;

#[derive(Debug, Clone, Copy, Default)]
pub struct MacroContext<'a> {
    pub project: Option<&'a str>,
    pub workspace: Option<&'a str>,
}

pub fn expand(template: &str, context: &MacroContext<'_>) -> String {
    expand_at(template, context, 0)
}

fn expand_at(template: &str, context: &MacroContext<'_>, depth: usize) -> String {
    let mut output = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(pos) = rest.find(|ch| ch == '\\' || ch == '<') {
        output.push_str(&rest[..pos]);
        let tail = &rest[pos..];
        if let Some(after) = tail.strip_prefix("\\<") {
            output.push('<');
            rest = after;
            continue;
        }
        if let Some(after) = tail.strip_prefix('\\') {
            output.push('\\');
            rest = after;
            continue;
        }
        match closing_bracket(tail) {
            Some(end) => {
                output.push_str(&evaluate(&tail[1..end], context, depth + 1));
                rest = &tail[end + 1..];
            }
            None => {
                // unterminated
                output.push('<');
                rest = &tail[1..];
            }
        }
    }

    output.push_str(rest);
    output
}

/// Byte offset of the `>` closing the token that opens at `tail[0]`.
fn closing_bracket(tail: &str) -> Option<usize> {
    let bytes = tail.as_bytes();
    let mut depth = 0usize;
    let mut index = 0;
    while index < bytes.len() {
        match bytes[index] {
            b'\\' if bytes.get(index + 1) == Some(&b'<') => {
                index += 2;
                continue;
            }
            b'<' => depth += 1,
            b'>' => {
                depth -= 1;
                if depth == 0 {
                    return Some(index);
                }
            }
            _ => {}
        }
        index += 1;
    }
    None
}

fn evaluate(expr: &str, context: &MacroContext<'_>, depth: usize) -> String {
    if depth > MAX_MACRO_DEPTH {
        warn!("macro nesting deeper than {MAX_MACRO_DEPTH}, dropping {expr:?}");
        return String::new();
    }

    let (name, argument) = match expr.split_once(':') {
        Some((name, argument)) => (name, Some(argument)),
        None => (expr, None),
    };

    match (name, argument) {
        ("workspace", _) => context.workspace.unwrap_or(DEFAULT_WORKSPACE).to_string(),
        ("project", _) => context.project.unwrap_or_default().to_string(),
        ("basename", Some(argument)) => basename(&argument_value(argument, context, depth)),
        ("lower", Some(argument)) => argument_value(argument, context, depth).to_lowercase(),
        ("upper", Some(argument)) => argument_value(argument, context, depth).to_uppercase(),
        _ => String::new(),
    }
}

fn argument_value(argument: &str, context: &MacroContext<'_>, depth: usize) -> String {
    if argument.contains('<') {
        expand_at(argument, context, depth)
    } else {
        evaluate(argument, context, depth + 1)
    }
}

fn basename(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context<'a>(project: &'a str, workspace: &'a str) -> MacroContext<'a> {
        MacroContext {
            project: Some(project),
            workspace: Some(workspace),
        }
    }

    #[test]
    fn basename_of_project() {
        let ctx = context("/home/u/app", "default");
        assert_eq!(expand("<basename:project>", &ctx), "app");
    }

    #[test]
    fn escaped_bracket_is_not_expanded() {
        let ctx = context("/home/u/app", "demo");
        assert_eq!(expand("\\<workspace>", &ctx), "<workspace>");
        assert_eq!(expand("a\\b", &ctx), "a\\b");
    }

    #[test]
    fn nested_case_folding() {
        let ctx = context("/home/u/App", "demo");
        assert_eq!(expand("<upper:<workspace>>", &ctx), "DEMO");
        assert_eq!(expand("<lower:<basename:project>>", &ctx), "app");
        assert_eq!(expand("<upper:basename:project>", &ctx), "APP");
        assert_eq!(expand("[<upper:ws-<workspace>>]", &ctx), "[WS-DEMO]");
    }

    #[test]
    fn missing_context_falls_back() {
        let ctx = MacroContext::default();
        assert_eq!(expand("<workspace>|<project>|<basename:project>", &ctx), "default||");
    }

    #[test]
    fn unknown_macros_expand_to_nothing() {
        let ctx = context("/p", "w");
        assert_eq!(expand("x<nope>y<lower>z<nope:project>", &ctx), "xyz");
    }

    #[test]
    fn unterminated_token_is_literal() {
        let ctx = context("/p", "w");
        assert_eq!(expand("a < b <workspace>", &ctx), "a < b w");
        assert_eq!(expand("<upper:<workspace>", &ctx), "<upper:w");
    }

    #[test]
    fn deep_nesting_is_cut_off() {
        let ctx = context("/p", "demo");
        let nest = |levels: usize| {
            format!(
                "{}<workspace>{}",
                "<upper:".repeat(levels),
                ">".repeat(levels)
            )
        };
        assert_eq!(expand(&nest(4), &ctx), "DEMO");
        assert_eq!(expand(&nest(MAX_MACRO_DEPTH + 4), &ctx), "");
    }
}
