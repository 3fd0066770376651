//! Human-readable sub-agent outcome summaries.

use super::types::SubAgentResult;

/// Cap on how much of a sub-agent's result text is forwarded to owners.
pub const MAX_RESULT_CHARS: usize = 3000;

/// Describe a finished sub-agent for its owners.
///
/// Four outcomes are distinguished: timed out with a partial result, timed out
/// without one, failed, and succeeded (with or without output).
pub fn summarize(result: &SubAgentResult) -> String {
    let id = &result.task_id;
    let output = result
        .result
        .as_deref()
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(|text| truncate_chars(text, MAX_RESULT_CHARS));

    match (result.timed_out, &result.error, output) {
        (true, _, Some(partial)) => {
            format!("Sub-agent {id} timed out. Partial result:\n\n{partial}")
        }
        (true, _, None) => format!("Sub-agent {id} timed out without producing a result."),
        (false, Some(error), Some(partial)) => {
            format!("Sub-agent {id} failed: {error}\n\nPartial result:\n\n{partial}")
        }
        (false, Some(error), None) => format!("Sub-agent {id} failed: {error}"),
        (false, None, Some(output)) => format!("Sub-agent {id} finished:\n\n{output}"),
        (false, None, None) => format!("Sub-agent {id} finished with no output."),
    }
}

/// Truncate to at most `max_chars` characters, appending "..." when cut.
/// Counts `char`s, so multi-byte characters are never split.
pub fn truncate_chars(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}...", &s[..byte_idx]),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn result(text: Option<&str>, error: Option<&str>, timed_out: bool) -> SubAgentResult {
        SubAgentResult {
            task_id: "abc".to_string(),
            workspace: PathBuf::from("/tmp/abc"),
            result: text.map(String::from),
            error: error.map(String::from),
            timed_out,
        }
    }

    #[test]
    fn timed_out_with_partial_result() {
        let s = summarize(&result(Some("half done"), None, true));
        assert!(s.contains("timed out"));
        assert!(s.contains("half done"));
    }

    #[test]
    fn timed_out_without_result() {
        let s = summarize(&result(None, None, true));
        assert!(s.contains("timed out without producing a result"));
    }

    #[test]
    fn failed_reports_error() {
        let s = summarize(&result(None, Some("exit status: 3"), false));
        assert_eq!(s, "Sub-agent abc failed: exit status: 3");
    }

    #[test]
    fn succeeded_with_and_without_output() {
        assert_eq!(
            summarize(&result(Some("42\n"), None, false)),
            "Sub-agent abc finished:\n\n42"
        );
        assert_eq!(
            summarize(&result(Some("   "), None, false)),
            "Sub-agent abc finished with no output."
        );
    }

    #[test]
    fn truncate_chars_respects_multibyte_boundaries() {
        let s = "héllo wörld";
        assert_eq!(truncate_chars(s, 2), "hé...");
        assert_eq!(truncate_chars(s, 50), s);
        assert_eq!(truncate_chars("日本語テキスト", 3), "日本語...");
    }
}
