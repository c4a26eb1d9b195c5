//! Version-pin rewriting.

use regex::Regex;

use crate::error::{GitOpsError, GitOpsResult};

/// Rewrite every `range: '...'` in `content` to `range: '<version>'`.
///
/// Returns `Ok(None)` when the file already pins `version`.
pub fn patch_pin(content: &str, version: &str) -> GitOpsResult<Option<String>> {
    let target = format!("range: '{version}'");
    if content.contains(&target) {
        return Ok(None);
    }
    let range_re = Regex::new(r"range: '.*'").map_err(|e| GitOpsError::Decode(e.to_string()))?;
    if !range_re.is_match(content) {
        return Err(GitOpsError::MissingPinField);
    }
    Ok(Some(
        range_re
            .replace_all(content, regex::NoExpand(&target))
            .into_owned(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    const POLICY: &str = "apiVersion: image.toolkit.fluxcd.io/v1beta2
kind: ImagePolicy
metadata:
  name: kbot
spec:
  imageRepositoryRef:
    name: kbot
  policy:
    semver:
      range: '1.2.3'
";

    #[test]
    fn rewrites_range() {
        let patched = patch_pin(POLICY, "1.2.4").unwrap().unwrap();
        assert!(patched.contains("range: '1.2.4'"));
        assert!(!patched.contains("1.2.3"));
        assert!(patched.starts_with("apiVersion:"));
    }

    #[test]
    fn same_version_is_unchanged() {
        assert_eq!(patch_pin(POLICY, "1.2.3").unwrap(), None);
    }

    #[test]
    fn missing_field_is_an_error() {
        let err = patch_pin("kind: ImagePolicy\n", "1.0").unwrap_err();
        assert_eq!(err, GitOpsError::MissingPinField);
    }

    #[test]
    fn version_text_is_literal() {
        // `$1` would be a capture reference without NoExpand.
        let patched = patch_pin("range: '0.1'", "$1").unwrap().unwrap();
        assert_eq!(patched, "range: '$1'");
    }

    #[test]
    fn match_stays_on_one_line() {
        let patched = patch_pin("range: 'a'\nother: 'b'\n", "c").unwrap().unwrap();
        assert_eq!(patched, "range: 'c'\nother: 'b'\n");
    }
}
