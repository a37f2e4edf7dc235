//! Redaction of verifier output before it is returned to daemon clients.

use std::path::Path;

/// Longest diagnostic returned to a client.
pub const MAX_DIAGNOSTIC_BYTES: usize = 512;

const REDACTED: &str = "<redacted>";

/// Strip local paths from verifier output, trim it, and cap its length.
pub fn redact_diagnostic(output: &str, local_paths: &[&Path]) -> String {
    let mut text = output.trim().to_string();
    for path in local_paths {
        let path = path.to_string_lossy();
        if !path.is_empty() {
            text = text.replace(path.as_ref(), REDACTED);
        }
    }
    truncate_on_char_boundary(text, MAX_DIAGNOSTIC_BYTES)
}

fn truncate_on_char_boundary(text: String, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text;
    }
    let mut end = max_bytes;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &text[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redacts_local_paths() {
        let out = redact_diagnostic(
            "open /root/.docker/tls/notary.local/root-ca.crt: no such file\n",
            &[Path::new("/root/.docker/tls/notary.local/root-ca.crt")],
        );
        assert_eq!(out, "open <redacted>: no such file");
    }

    #[test]
    fn test_keeps_plain_diagnostics() {
        let out = redact_diagnostic("  no trust data for docker.io/library/ubuntu  ", &[]);
        assert_eq!(out, "no trust data for docker.io/library/ubuntu");
    }

    #[test]
    fn test_caps_long_output() {
        let out = redact_diagnostic(&"x".repeat(2000), &[]);
        assert!(out.len() <= MAX_DIAGNOSTIC_BYTES + '…'.len_utf8());
        assert!(out.ends_with('…'));
    }

    #[test]
    fn test_truncation_respects_char_boundaries() {
        let out = truncate_on_char_boundary("é".repeat(400), 11);
        assert_eq!(out, format!("{}…", "é".repeat(5)));
    }
}
