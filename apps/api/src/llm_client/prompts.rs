// Cross-cutting prompt fragments shared by every engine stage that produces or
// edits résumé-facing text. Stage-specific prompts live in engine::prompts.

/// Common instruction prepended to every prompt that produces or edits résumé content.
pub const GROUNDING_INSTRUCTION: &str = "\
    CRITICAL: Never invent qualifications, employers, dates, degrees, certifications, \
    metrics or skills the candidate has not already stated. \
    You may reorder, rephrase and emphasize existing content, and you may adopt the \
    posting's terminology ONLY where it accurately describes what is already there. \
    If a requirement cannot be supported by existing content, leave it unaddressed.";

/// Substitutes `{name}` placeholders in a single left-to-right pass over `template`.
///
/// Substituted values are never rescanned, so document text that happens to contain a
/// placeholder is sent verbatim. Braces that do not form a known placeholder (the JSON
/// schema examples) are left alone.
pub fn fill_template(template: &str, values: &[(&str, &str)]) -> String {
    let extra: usize = values.iter().map(|(_, v)| v.len()).sum();
    let mut out = String::with_capacity(template.len() + extra);
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let hit = values.iter().find_map(|(name, value)| {
            after
                .strip_prefix(*name)
                .and_then(|tail| tail.strip_prefix('}'))
                .map(|tail| (*value, tail))
        });
        match hit {
            Some((value, tail)) => {
                out.push_str(value);
                rest = tail;
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_template_substitutes_every_placeholder() {
        let filled = fill_template("{a} and {b}, then {a}", &[("a", "x"), ("b", "y")]);
        assert_eq!(filled, "x and y, then x");
    }

    #[test]
    fn test_fill_template_does_not_rescan_values() {
        let filled = fill_template(
            "JOB:\n{job_text}\nRESUME:\n{resume_text}",
            &[("job_text", "wants {resume_text} here"), ("resume_text", "Rust")],
        );
        assert_eq!(filled, "JOB:\nwants {resume_text} here\nRESUME:\nRust");
    }

    #[test]
    fn test_fill_template_keeps_unknown_braces() {
        let filled = fill_template(r#"Return: {"summary": "{x}"} {unknown}"#, &[("x", "ok")]);
        assert_eq!(filled, r#"Return: {"summary": "ok"} {unknown}"#);
    }
}
