use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

/// The base64 payloads stored alongside each fuzz result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Source,
    ImprovedSource,
    Traceback,
}

impl ArtifactKind {
    /// Shown when the column is NULL or empty.
    pub fn missing_text(&self) -> &'static str {
        match self {
            ArtifactKind::Source => "No Source Available",
            ArtifactKind::ImprovedSource => "No Improved Source Available",
            ArtifactKind::Traceback => "No Traceback Available",
        }
    }

    /// Shown when the payload is not valid base64 or not UTF-8.
    pub fn undecodable_text(&self) -> &'static str {
        match self {
            ArtifactKind::Source => "Source Code Unknown",
            ArtifactKind::ImprovedSource => "Improved Source Unknown",
            ArtifactKind::Traceback => "Full Traceback Unknown",
        }
    }
}

/// Decodes a stored artifact into text that is safe to embed in HTML.
///
/// Never fails: problems with a single field turn into that field's
/// sentinel text.
pub fn decode_artifact(kind: ArtifactKind, encoded: Option<&str>) -> String {
    let compact: String = match encoded {
        Some(raw) => raw.chars().filter(|c| !c.is_ascii_whitespace()).collect(),
        None => String::new(),
    };
    if compact.is_empty() {
        return kind.missing_text().to_string();
    }

    let decoded = BASE64
        .decode(compact.as_bytes())
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok());

    match decoded {
        Some(text) if !text.is_empty() => html_escape(&text),
        Some(_) => kind.missing_text().to_string(),
        None => {
            log::debug!("undecodable {:?} artifact ({} bytes)", kind, compact.len());
            kind.undecodable_text().to_string()
        }
    }
}

/// Escapes the five characters that are significant in HTML text and
/// attribute values.
pub fn html_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const KINDS: [ArtifactKind; 3] =
        [ArtifactKind::Source, ArtifactKind::ImprovedSource, ArtifactKind::Traceback];

    #[test]
    fn test_absent_source_sentinel() {
        assert_eq!(decode_artifact(ArtifactKind::Source, None), "No Source Available");
        assert_eq!(decode_artifact(ArtifactKind::Source, Some("")), "No Source Available");
        assert_eq!(decode_artifact(ArtifactKind::Traceback, None), "No Traceback Available");
    }

    #[test]
    fn test_invalid_base64_sentinel() {
        assert_eq!(decode_artifact(ArtifactKind::Source, Some("@@@")), "Source Code Unknown");
        assert_eq!(
            decode_artifact(ArtifactKind::ImprovedSource, Some("abc")),
            "Improved Source Unknown"
        );
    }

    #[test]
    fn test_non_utf8_payload_sentinel() {
        let encoded = BASE64.encode([0xff, 0xfe, 0x00]);
        assert_eq!(
            decode_artifact(ArtifactKind::Traceback, Some(&encoded)),
            "Full Traceback Unknown"
        );
    }

    #[test]
    fn test_decoded_text_is_escaped() {
        let samples = [
            "def f(x):\n    return x < 1 and x > -1\n",
            "Traceback (most recent call last):\n  File \"<string>\", line 1\nValueError: 'bad' & worse",
            "<script>alert(1)</script>",
            "plain ünïcödé ✓",
        ];
        for text in samples {
            let encoded = BASE64.encode(text);
            for kind in KINDS {
                assert_eq!(decode_artifact(kind, Some(&encoded)), html_escape(text));
            }
        }
    }

    #[test]
    fn test_wrapped_base64_is_accepted() {
        let encoded = BASE64.encode("import os\nprint(os.name)\n");
        let wrapped = format!("{}\n{}\n", &encoded[..8], &encoded[8..]);
        assert_eq!(
            decode_artifact(ArtifactKind::Source, Some(&wrapped)),
            "import os\nprint(os.name)\n"
        );
    }

    #[test]
    fn test_escape_neutralises_markup() {
        assert_eq!(
            html_escape(r#"<img src=x onerror="alert('x')">&"#),
            "&lt;img src=x onerror=&quot;alert(&#39;x&#39;)&quot;&gt;&amp;"
        );
    }
}
