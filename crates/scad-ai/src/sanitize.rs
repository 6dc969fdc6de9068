/// Strips one outer markdown code fence from a completion, if and only if
/// both an opening marker (with optional language tag) and a closing marker
/// are present. Anything else is returned verbatim, trimmed of surrounding
/// whitespace. No validation of the OpenSCAD syntax happens here; syntax
/// errors are discovered at compile time.
pub fn strip_code_fences(raw: &str) -> String {
    let trimmed = raw.trim();
    let mut lines = trimmed.lines();

    let Some(first) = lines.next() else {
        return trimmed.to_string();
    };
    if !first.trim_start().starts_with("```") {
        return trimmed.to_string();
    }

    let body: Vec<&str> = lines.collect();
    match body.split_last() {
        Some((last, inner)) if last.trim() == "```" => inner.join("\n"),
        _ => trimmed.to_string(),
    }
}
