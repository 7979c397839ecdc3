//! PHP `serialize()` encoding for archive metadata

use std::fmt::Write;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhpValue {
    Int(i64),
    Str(String),
}

impl From<&str> for PhpValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_owned())
    }
}

impl From<usize> for PhpValue {
    fn from(value: usize) -> Self {
        Self::Int(i64::try_from(value).unwrap_or(i64::MAX))
    }
}

fn serialize_str(out: &mut String, value: &str) {
    // string lengths are byte counts
    let _ = write!(out, "s:{}:\"{value}\";", value.len());
}

/// Serialize an associative array with string keys, preserving order
pub fn serialize_array(entries: &[(&str, PhpValue)]) -> String {
    let mut out = format!("a:{}:{{", entries.len());
    for (key, value) in entries {
        serialize_str(&mut out, key);
        match value {
            PhpValue::Int(number) => {
                let _ = write!(out, "i:{number};");
            }
            PhpValue::Str(text) => serialize_str(&mut out, text),
        }
    }
    out.push('}');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matches_php_serialize() {
        let encoded = serialize_array(&[
            ("title", "Tool".into()),
            ("files", 3usize.into()),
            ("entrypoint", "".into()),
        ]);
        assert_eq!(
            encoded,
            r#"a:3:{s:5:"title";s:4:"Tool";s:5:"files";i:3;s:10:"entrypoint";s:0:"";}"#
        );
    }

    #[test]
    fn test_string_length_counts_bytes() {
        let encoded = serialize_array(&[("title", "Café".into())]);
        assert_eq!(encoded, r#"a:1:{s:5:"title";s:5:"Café";}"#);
    }
}
