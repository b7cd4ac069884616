//! Lenient extraction of structured values from raw model output.
//!
//! Models are asked for a single field or a score, but answer in prose,
//! fenced JSON, or with thinking markup; these helpers pull out the usable
//! part and fall back to the whole text when nothing structured is found.

use curator_protocol::RewriteField;

/// Extracts a field value from raw output, preferring a JSON-embedded
/// field of that name over the whole response.
pub fn field_value(raw: &str, field: RewriteField) -> String {
    if let Some(value) = embedded_field(raw, field.as_str()) {
        return value;
    }
    raw.trim().to_string()
}

/// Looks for `{"<name>": "..."}` either as the whole response or inside a
/// fenced code block.
pub fn embedded_field(raw: &str, name: &str) -> Option<String> {
    for candidate in json_candidates(raw) {
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(candidate)
            && let Some(field) = value.get(name).and_then(|v| v.as_str())
        {
            return Some(field.to_string());
        }
    }
    None
}

fn json_candidates(raw: &str) -> Vec<&str> {
    let trimmed = raw.trim();
    let mut candidates = vec![trimmed];
    if let Some(fenced) = fenced_block(trimmed) {
        candidates.push(fenced);
    }
    candidates
}

fn fenced_block(raw: &str) -> Option<&str> {
    let start = raw.find("```")?;
    let after_fence = &raw[start + 3..];
    // Skip an optional language tag on the fence line.
    let body_start = after_fence.find('\n')? + 1;
    let body = &after_fence[body_start..];
    let end = body.find("```")?;
    Some(body[..end].trim())
}

/// Strips `<think>`/`<thinking>` blocks and stray tags from reasoning text.
pub fn strip_think_markup(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    loop {
        let Some((open_tag, close_tag, start)) = find_think_open(rest) else {
            out.push_str(rest);
            break;
        };
        out.push_str(&rest[..start]);
        let after_open = &rest[start + open_tag.len()..];
        match after_open.find(close_tag) {
            Some(end) => {
                // Keep the inner text: the markup is noise, the thinking is
                // usually the reasoning being asked for.
                out.push_str(&after_open[..end]);
                rest = &after_open[end + close_tag.len()..];
            }
            None => {
                out.push_str(after_open);
                break;
            }
        }
    }
    out.trim().to_string()
}

fn find_think_open(raw: &str) -> Option<(&'static str, &'static str, usize)> {
    const TAGS: [(&str, &str); 2] = [("<thinking>", "</thinking>"), ("<think>", "</think>")];
    TAGS.iter()
        .filter_map(|(open, close)| raw.find(open).map(|pos| (*open, *close, pos)))
        .min_by_key(|(_, _, pos)| *pos)
}

/// Splits a combined response into (reasoning, answer).
///
/// Tries `<think>…</think>` markup first, then `Reasoning:`/`Answer:`
/// section markers; with neither present the whole text is the answer and
/// the reasoning side is reported unusable.
pub fn split_reasoning_answer(raw: &str) -> (Option<String>, Option<String>) {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return (None, None);
    }

    for (open, close) in [("<thinking>", "</thinking>"), ("<think>", "</think>")] {
        if let Some(start) = trimmed.find(open)
            && let Some(end) = trimmed[start + open.len()..].find(close)
        {
            let reasoning = trimmed[start + open.len()..start + open.len() + end].trim();
            let mut answer = String::new();
            answer.push_str(trimmed[..start].trim());
            let after = trimmed[start + open.len() + end + close.len()..].trim();
            if !after.is_empty() {
                if !answer.is_empty() {
                    answer.push('\n');
                }
                answer.push_str(after);
            }
            return (
                non_empty(reasoning.to_string()),
                non_empty(answer),
            );
        }
    }

    if let Some((reasoning, answer)) = marker_split(trimmed) {
        return (non_empty(reasoning), non_empty(answer));
    }

    (None, Some(trimmed.to_string()))
}

fn marker_split(raw: &str) -> Option<(String, String)> {
    let (reasoning_pos, reasoning_len) = find_marker(raw, &["Reasoning:", "reasoning:"])?;
    let after_reasoning = &raw[reasoning_pos + reasoning_len..];
    let (answer_pos, answer_len) = find_marker(after_reasoning, &["Answer:", "answer:"])?;
    let reasoning = after_reasoning[..answer_pos].trim();
    let answer = after_reasoning[answer_pos + answer_len..].trim();
    Some((reasoning.to_string(), answer.to_string()))
}

fn find_marker(raw: &str, markers: &[&str]) -> Option<(usize, usize)> {
    markers
        .iter()
        .filter_map(|marker| raw.find(marker).map(|pos| (pos, marker.len())))
        .min_by_key(|(pos, _)| *pos)
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// First digit 1-5 in the text, or 0 when none occurs.
pub fn first_score_digit(raw: &str) -> u8 {
    raw.chars()
        .find_map(|c| match c {
            '1'..='5' => c.to_digit(10).map(|d| d as u8),
            _ => None,
        })
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn score_extraction_finds_first_one_to_five() {
        assert_eq!(first_score_digit("I'd give this a score: 4 out of 5"), 4);
        assert_eq!(first_score_digit("Score: 5"), 5);
        assert_eq!(first_score_digit("0 then 3"), 3);
        assert_eq!(first_score_digit("no digits here"), 0);
        assert_eq!(first_score_digit("6789 only"), 0);
        assert_eq!(first_score_digit(""), 0);
    }

    #[test]
    fn field_value_prefers_embedded_json() {
        let raw = r#"{"answer": "42", "confidence": "high"}"#;
        assert_eq!(field_value(raw, RewriteField::Answer), "42");
        assert_eq!(field_value("just text", RewriteField::Answer), "just text");
    }

    #[test]
    fn field_value_reads_fenced_json() {
        let raw = "Here you go:\n```json\n{\"query\": \"What is 2+2?\"}\n```";
        assert_eq!(field_value(raw, RewriteField::Query), "What is 2+2?");
    }

    #[test]
    fn think_markup_is_stripped_but_content_kept() {
        assert_eq!(
            strip_think_markup("<think>step one\nstep two</think>"),
            "step one\nstep two"
        );
        assert_eq!(
            strip_think_markup("prefix <thinking>core</thinking> suffix"),
            "prefix core suffix"
        );
        assert_eq!(strip_think_markup("plain"), "plain");
        // Unclosed tag: keep everything after it.
        assert_eq!(strip_think_markup("<think>dangling"), "dangling");
    }

    #[test]
    fn split_handles_think_markup() {
        let (reasoning, answer) = split_reasoning_answer("<think>add the numbers</think>4");
        assert_eq!(reasoning.as_deref(), Some("add the numbers"));
        assert_eq!(answer.as_deref(), Some("4"));
    }

    #[test]
    fn split_handles_section_markers() {
        let raw = "Reasoning: carry the one\nAnswer: 11";
        let (reasoning, answer) = split_reasoning_answer(raw);
        assert_eq!(reasoning.as_deref(), Some("carry the one"));
        assert_eq!(answer.as_deref(), Some("11"));
    }

    #[test]
    fn split_without_markers_is_answer_only() {
        let (reasoning, answer) = split_reasoning_answer("just an answer");
        assert_eq!(reasoning, None);
        assert_eq!(answer.as_deref(), Some("just an answer"));
    }

    #[test]
    fn split_of_empty_text_is_unusable_on_both_sides() {
        assert_eq!(split_reasoning_answer("  "), (None, None));
    }
}
