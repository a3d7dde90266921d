use regex::Regex;

/// Recovers the exact source of one class or function, decorators included.
///
/// The block ends at the first non-blank line indented no deeper than the
/// header. The result is dedented so that symbols found inside another block
/// come back zero-based. Returns `None` when the name is not defined.
pub fn extract_code_block(source: &str, target_name: &str) -> Option<String> {
    let header = Regex::new(&format!(
        r"^\s*(?:async\s+)?(?:def|class)\s+{}\b",
        regex::escape(target_name)
    ))
    .ok()?;

    let lines: Vec<&str> = source.lines().collect();
    let start = lines.iter().position(|line| header.is_match(line))?;
    let base_indent = indentation(lines[start]);

    let mut first = start;
    while first > 0 && lines[first - 1].trim().starts_with('@') {
        first -= 1;
    }

    let mut end = start + 1;
    while end < lines.len() {
        let line = lines[end];
        if !line.trim().is_empty() && indentation(line) <= base_indent {
            break;
        }
        end += 1;
    }

    // Blank lines are kept inside the block but not after it.
    while end > start + 1 && lines[end - 1].trim().is_empty() {
        end -= 1;
    }

    Some(dedent(&lines[first..end]))
}

fn indentation(line: &str) -> usize {
    line.chars().take_while(|c| c.is_whitespace()).count()
}

fn dedent(lines: &[&str]) -> String {
    let common = lines
        .iter()
        .filter(|l| !l.trim().is_empty())
        .map(|l| indentation(l))
        .min()
        .unwrap_or(0);

    lines
        .iter()
        .map(|l| {
            if l.trim().is_empty() {
                ""
            } else {
                let cut = l
                    .char_indices()
                    .nth(common)
                    .map(|(i, _)| i)
                    .unwrap_or(l.len());
                &l[cut..]
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}
