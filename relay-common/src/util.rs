//! Utility functions shared by the relay crates.

/// Truncate a string to at most `max_chars` characters, appending "..." if truncated.
///
/// Counts characters rather than bytes, so multi-byte text is never split.
pub fn truncate_with_ellipsis(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => {
            let truncated = &s[..idx];
            format!("{}...", truncated.trim_end())
        }
        None => s.to_string(),
    }
}

/// Sanitize a string for safe logging (redact sensitive patterns).
pub fn sanitize_for_log(s: &str) -> String {
    let patterns: &[(&str, &str)] = &[
        (r"(?i)(api[_-]?key|apikey)[=:]\s*\S{20,}", "$1=***REDACTED***"),
        (r"(?i)(token|secret|bearer)\s*[=:]?\s*[A-Za-z0-9._\-]{10,}", "$1 ***REDACTED***"),
        (r"sk-[a-zA-Z0-9_\-]{8,}", "***REDACTED_API_KEY***"),
    ];

    let mut result = s.to_string();
    for (pattern, replacement) in patterns {
        if let Ok(re) = regex::Regex::new(pattern) {
            result = re.replace_all(&result, *replacement).to_string();
        }
    }
    result
}

/// Prepare an upstream error body for a log line: redacted and bounded.
pub fn summarize_for_log(s: &str, max_chars: usize) -> String {
    truncate_with_ellipsis(&sanitize_for_log(s), max_chars)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_with_ellipsis() {
        assert_eq!(truncate_with_ellipsis("hello", 10), "hello");
        assert_eq!(truncate_with_ellipsis("hello world", 5), "hello...");
        assert_eq!(truncate_with_ellipsis("😀😀😀😀", 2), "😀😀...");
        assert_eq!(truncate_with_ellipsis("", 10), "");
    }

    #[test]
    fn test_sanitize_for_log() {
        let input = "Incorrect API key provided: sk-proj-12345678901234567890";
        let output = sanitize_for_log(input);
        assert!(!output.contains("sk-proj-12345678901234567890"));
        assert!(output.contains("REDACTED"));
    }

    #[test]
    fn test_sanitize_bearer_header() {
        let output = sanitize_for_log("Authorization: Bearer abcdefghijklmnop");
        assert!(!output.contains("abcdefghijklmnop"));
    }

    #[test]
    fn test_summarize_for_log() {
        let body = format!("{} sk-abcdefghijklmnop", "x".repeat(50));
        let summary = summarize_for_log(&body, 20);
        assert!(summary.ends_with("..."));
        assert!(!summary.contains("sk-abcdefghijklmnop"));
    }
}
