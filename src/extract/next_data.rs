use serde_json::Value;

use crate::error::SourceError;

/// Attribute that identifies the Next.js page-data script tag.
const NEXT_DATA_ID: &str = r#"id="__NEXT_DATA__""#;
const SCRIPT_CLOSE: &str = "</script>";

/// Pull the `__NEXT_DATA__` JSON payload out of a server-rendered page.
///
/// Finds the tag carrying `id="__NEXT_DATA__"`, takes everything between the
/// end of that opening tag and the next `</script>`, and parses it.
pub fn extract_next_data(html: &str) -> Result<Value, SourceError> {
    let marker = html
        .find(NEXT_DATA_ID)
        .ok_or_else(|| SourceError::Extraction("__NEXT_DATA__ script not found".into()))?;

    let after_marker = marker + NEXT_DATA_ID.len();
    let tag_end = html[after_marker..]
        .find('>')
        .map(|i| after_marker + i + 1)
        .ok_or_else(|| SourceError::Extraction("__NEXT_DATA__ tag not terminated".into()))?;

    let end = html[tag_end..]
        .find(SCRIPT_CLOSE)
        .map(|i| tag_end + i)
        .ok_or_else(|| SourceError::Extraction("__NEXT_DATA__ script not closed".into()))?;

    let raw = html[tag_end..end].trim();
    serde_json::from_str(raw)
        .map_err(|e| SourceError::Parse(format!("__NEXT_DATA__ is not valid JSON: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn page(body: &str) -> String {
        format!(
            "<html><head><script src=\"/app.js\"></script></head><body>\
             <div id=\"root\"></div>{body}</body></html>"
        )
    }

    #[test]
    fn test_extracts_payload() {
        let html = page(
            r#"<script id="__NEXT_DATA__" type="application/json">
               {"props":{"pageProps":{"tvl":"$1,000"}},"page":"/strategy"}
               </script>"#,
        );
        let data = extract_next_data(&html).unwrap();
        assert_eq!(
            data,
            json!({"props": {"pageProps": {"tvl": "$1,000"}}, "page": "/strategy"})
        );
    }

    #[test]
    fn test_attribute_order_does_not_matter() {
        let html = page(r#"<script type="application/json" id="__NEXT_DATA__" nonce="x">{"a":1}</script>"#);
        assert_eq!(extract_next_data(&html).unwrap(), json!({"a": 1}));
    }

    #[test]
    fn test_missing_marker() {
        let html = page(r#"<script type="application/json">{"a":1}</script>"#);
        assert!(matches!(
            extract_next_data(&html),
            Err(SourceError::Extraction(_))
        ));
    }

    #[test]
    fn test_unclosed_script() {
        let html = r#"<script id="__NEXT_DATA__" type="application/json">{"a":1}"#;
        assert!(matches!(
            extract_next_data(html),
            Err(SourceError::Extraction(_))
        ));
    }

    #[test]
    fn test_invalid_json() {
        let html = page(r#"<script id="__NEXT_DATA__" type="application/json">{"a":</script>"#);
        assert!(matches!(extract_next_data(&html), Err(SourceError::Parse(_))));
    }
}
