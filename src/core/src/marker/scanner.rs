use std::collections::HashSet;

use super::{parse_message, scan_markers, ParsedMessage, ToolCallRequest};

/// Incremental marker detection over a streamed message.
///
/// Each request is reported once, the first time its marker is complete.
/// A marker touching the end of the buffer is held back until more text
/// arrives or the stream finishes, since its name may still be growing.
#[derive(Debug, Default)]
pub struct MarkerScanner {
    buffer: String,
    emitted: HashSet<String>,
}

impl MarkerScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return requests completed by it.
    pub fn push(&mut self, chunk: &str) -> Vec<ToolCallRequest> {
        self.buffer.push_str(chunk);
        let mut fresh = Vec::new();
        for m in scan_markers(&self.buffer) {
            if m.span.end >= self.buffer.len() {
                continue;
            }
            if self.emitted.insert(m.id.clone()) {
                fresh.push(ToolCallRequest::new(m.id, m.name));
            }
        }
        fresh
    }

    /// Parse the complete message, including fallback patterns, and return
    /// it with only the requests not reported by [`push`](Self::push).
    pub fn finish(mut self) -> (ParsedMessage, Vec<ToolCallRequest>) {
        let parsed = parse_message(&self.buffer);
        let fresh = parsed
            .requests
            .iter()
            .filter(|r| self.emitted.insert(r.id.clone()))
            .cloned()
            .collect();
        (parsed, fresh)
    }

    pub fn buffer(&self) -> &str {
        &self.buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marker_split_across_chunks_is_reported_once() {
        let mut scanner = MarkerScanner::new();
        assert!(scanner.push("Sending now. __REQUIRES_APPR").is_empty());
        assert!(scanner.push("OVAL__:abc123:gmail_se").is_empty());
        assert!(scanner.push("nd_email").is_empty());

        let done = scanner.push("\n");
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].id, "abc123");
        assert_eq!(done[0].name, "gmail_send_email");

        assert!(scanner.push(" more text").is_empty());
    }

    #[test]
    fn finish_releases_trailing_marker() {
        let mut scanner = MarkerScanner::new();
        assert!(scanner
            .push("Sending now. __REQUIRES_APPROVAL__:abc123:gmail_send_email")
            .is_empty());
        let (parsed, fresh) = scanner.finish();
        assert_eq!(parsed.narrative, "Sending now.");
        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh[0].name, "gmail_send_email");
    }

    #[test]
    fn finish_skips_already_reported_requests() {
        let mut scanner = MarkerScanner::new();
        let first = scanner.push("__REQUIRES_APPROVAL__:a1:gmail_send_email then ");
        assert_eq!(first.len(), 1);
        scanner.push("__REQUIRES_APPROVAL__:b2:gmail_search_emails");
        let (parsed, fresh) = scanner.finish();
        assert_eq!(parsed.requests.len(), 2);
        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh[0].id, "b2");
    }
}
