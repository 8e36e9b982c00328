//! Email preprocessing: HTML stripping, whitespace normalization and
//! reply-thread detection. Pure text-in/text-out; the classifier core only
//! sees the cleaned reply and the thread context produced here.

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Prior classification of an earlier message in the same conversation,
/// supplied by the caller when known.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriorClassification {
    pub category: String,
    pub subcategory: Option<String>,
    pub confidence: f64,
}

/// Thread membership metadata for one email.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ThreadContext {
    /// Whether the body contains quoted earlier messages.
    pub in_thread: bool,
    /// Number of thread markers found.
    pub thread_count: usize,
    /// Classification of the prior message in this thread, if any.
    pub prior: Option<PriorClassification>,
}

/// Preprocessing output handed to the classification pipeline.
#[derive(Debug, Clone)]
pub struct CleanedEmail {
    pub subject: String,
    /// Cleaned text of the current reply only (thread tails cut off).
    pub text: String,
    pub thread: ThreadContext,
}

pub struct Preprocessor {
    html_tag: Regex,
    thread_markers: Vec<Regex>,
    reply_separators: Vec<Regex>,
}

impl Default for Preprocessor {
    fn default() -> Self {
        Self::new()
    }
}

impl Preprocessor {
    pub fn new() -> Self {
        let re = |p: &str| Regex::new(p).unwrap();
        Self {
            html_tag: re(r"(?s)<[^>]+>"),
            thread_markers: vec![
                re(r"(?i)-{2,}\s*original message\s*-{2,}"),
                re(r"(?i)-{2,}\s*forwarded message\s*-{2,}"),
                re(r"(?im)^on .{0,80}wrote:"),
                re(r"(?im)^from:\s*.+\r?\n(sent|date):"),
                re(r"(?im)^>{1,}\s"),
            ],
            reply_separators: vec![
                re(r"(?i)-{2,}\s*original message\s*-{2,}"),
                re(r"(?i)-{2,}\s*forwarded message\s*-{2,}"),
                re(r"(?im)^on .{0,80}wrote:"),
                re(r"(?im)^from:\s*.+\r?\n(sent|date):"),
            ],
        }
    }

    /// Clean an email and detect thread membership. The returned text is the
    /// current reply only; quoted history is cut at the first separator.
    pub fn preprocess(&self, subject: &str, body: &str) -> CleanedEmail {
        let subject = self.clean(subject);
        let cleaned = self.clean(body);

        let thread_count = self
            .thread_markers
            .iter()
            .map(|m| m.find_iter(&cleaned).count())
            .sum();
        let in_thread = thread_count > 0;

        let reply = self.current_reply(&cleaned);
        // If cutting the thread leaves nothing useful, keep the full text;
        // some clients put the whole content below the marker.
        let text = if reply.split_whitespace().count() >= 3 {
            reply
        } else {
            cleaned
        };

        log::debug!(
            "preprocess: in_thread={in_thread}, markers={thread_count}, {} chars",
            text.len()
        );

        CleanedEmail {
            subject,
            text,
            thread: ThreadContext {
                in_thread,
                thread_count,
                prior: None,
            },
        }
    }

    fn clean(&self, raw: &str) -> String {
        let no_html = self.html_tag.replace_all(raw, " ");
        let decoded = no_html
            .replace("&nbsp;", " ")
            .replace("&amp;", "&")
            .replace("&lt;", "<")
            .replace("&gt;", ">")
            .replace("&quot;", "\"")
            .replace("&#39;", "'")
            .replace("=\r\n", "")
            .replace("=\n", "");

        // Collapse runs of spaces/tabs but keep line structure for the
        // line-anchored thread markers.
        let mut out = String::with_capacity(decoded.len());
        for line in decoded.lines() {
            let line = line.split_whitespace().collect::<Vec<_>>().join(" ");
            out.push_str(&line);
            out.push('\n');
        }
        out.trim().to_string()
    }

    fn current_reply(&self, text: &str) -> String {
        let cut = self
            .reply_separators
            .iter()
            .filter_map(|m| m.find(text).map(|f| f.start()))
            .min()
            .unwrap_or(text.len());
        text[..cut].trim().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_html_and_entities() {
        let p = Preprocessor::new();
        let out = p.preprocess("Hi", "<div>Invoice&nbsp;is <b>attached</b> &amp; paid</div>");
        assert_eq!(out.text, "Invoice is attached & paid");
        assert!(!out.thread.in_thread);
    }

    #[test]
    fn test_detects_outlook_thread_and_cuts_reply() {
        let p = Preprocessor::new();
        let body = "This has already been paid, see below.\n\n\
                    -----Original Message-----\n\
                    From: billing@example.com\n\
                    Sent: Monday\n\
                    Please remit payment for invoice 123.";
        let out = p.preprocess("RE: invoice 123", body);
        assert!(out.thread.in_thread);
        assert!(out.thread.thread_count >= 1);
        assert_eq!(out.text, "This has already been paid, see below.");
    }

    #[test]
    fn test_detects_gmail_reply_marker() {
        let p = Preprocessor::new();
        let body = "We sent the check last week.\n\
                    On Tue, Apr 2, 2025 at 9:14 AM Billing wrote:\n\
                    > Your balance is outstanding.";
        let out = p.preprocess("Re: balance", body);
        assert!(out.thread.in_thread);
        assert_eq!(out.text, "We sent the check last week.");
    }

    #[test]
    fn test_keeps_full_text_when_reply_is_empty() {
        let p = Preprocessor::new();
        let body = "-----Original Message-----\nFrom: a@b.com\nSent: Monday\nThe actual content lives here.";
        let out = p.preprocess("fwd", body);
        assert!(out.thread.in_thread);
        assert!(out.text.contains("actual content"));
    }
}
