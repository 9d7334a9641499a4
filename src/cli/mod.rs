pub mod config;
pub mod memory;
pub mod session;
pub mod shell;

use strata::Metadata;

/// Parse repeated `key=value` flags. Values that parse as JSON keep their
/// type, anything else is stored as a string.
pub fn parse_metadata(entries: &[String]) -> Result<Metadata, String> {
    let mut metadata = Metadata::new();
    for entry in entries {
        let (key, value) = entry
            .split_once('=')
            .ok_or_else(|| format!("Metadata must be key=value, got: {}", entry))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(format!("Metadata key is empty: {}", entry));
        }
        let value = serde_json::from_str(value.trim())
            .unwrap_or_else(|_| serde_json::Value::String(value.trim().to_string()));
        metadata.insert(key.to_string(), value);
    }
    Ok(metadata)
}

/// Render metadata as `k=v, k=v`
pub fn format_metadata(metadata: &Metadata) -> String {
    metadata
        .iter()
        .map(|(k, v)| match v {
            serde_json::Value::String(s) => format!("{}={}", k, s),
            other => format!("{}={}", k, other),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_metadata_types() {
        let parsed = parse_metadata(&[
            "tag=rust".to_string(),
            "count=3".to_string(),
            "flags=[1, 2]".to_string(),
        ])
        .unwrap();
        assert_eq!(parsed["tag"], json!("rust"));
        assert_eq!(parsed["count"], json!(3));
        assert_eq!(parsed["flags"], json!([1, 2]));
    }

    #[test]
    fn test_parse_metadata_rejects_malformed() {
        assert!(parse_metadata(&["novalue".to_string()]).is_err());
        assert!(parse_metadata(&["=x".to_string()]).is_err());
    }

    #[test]
    fn test_format_metadata() {
        let parsed = parse_metadata(&["b=2".to_string(), "a=x".to_string()]).unwrap();
        assert_eq!(format_metadata(&parsed), "a=x, b=2");
    }
}
