/// Remove a markdown code fence wrapped around generated markup.
///
/// Strips a leading ```` ``` ```` (optionally tagged `html`, any case) and a
/// trailing ```` ``` ````, then trims. Stripping repeats until nothing changes,
/// so applying it to its own output is a no-op.
pub fn strip_code_fences(raw: &str) -> String {
    let mut text = raw.trim();
    loop {
        let next = strip_once(text);
        if next.len() == text.len() {
            return next.to_string();
        }
        text = next;
    }
}

fn strip_once(text: &str) -> &str {
    let mut text = text.trim();
    if let Some(rest) = text.strip_prefix("```") {
        text = match rest.get(..4) {
            Some(tag) if tag.eq_ignore_ascii_case("html") => &rest[4..],
            _ => rest,
        };
        text = text.trim_start();
    }
    if let Some(rest) = text.strip_suffix("```") {
        text = rest.trim_end();
    }
    text.trim()
}
