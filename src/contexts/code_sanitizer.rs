use regex::Regex;
use std::sync::OnceLock;

fn fenced_code_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```[A-Za-z0-9_+-]*[ \t]*\r?\n(.*?)```").expect("valid regex"))
}

/// Strips markdown fences from model-generated code.
///
/// Handles a response that is entirely fenced (``` or ''' with an optional
/// language tag on the fence line) and a response where commentary wraps a
/// fenced block, in which case the first block wins. Anything else is
/// returned trimmed.
pub fn sanitize_code_output(raw: &str) -> String {
    let code = raw.trim();

    let fence = ["```", "'''"].into_iter().find(|f| code.starts_with(f));
    let Some(fence) = fence else {
        if let Some(block) = fenced_code_re().captures(code).and_then(|c| c.get(1)) {
            return block.as_str().trim().to_string();
        }
        return code.to_string();
    };

    let after = &code[fence.len()..];
    let (first_line, rest) = after.split_once('\n').unwrap_or((after, ""));
    let is_language_tag = first_line
        .trim()
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '_' | '+' | '-'));
    let body = if is_language_tag { rest } else { after };

    let body = body.trim_end();
    let body = ["```", "'''"]
        .into_iter()
        .find_map(|f| body.strip_suffix(f))
        .unwrap_or(body);

    body.trim().to_string()
}
