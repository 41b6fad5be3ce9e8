//! EBICS authentication signature preparation (`spec.md` §4.2).
//!
//! EBICS does not sign over full W3C canonical XML. It signs over the
//! request body byte-for-byte as it will be transmitted, except that the
//! `AuthSignature/SignatureValue` element's text content must be blank at
//! signing time (the signature cannot cover itself). This module exists to
//! keep that one substitution in a single, well-tested place rather than
//! re-deriving it at each call site.

use super::shape::XmlError;

const SIGNATURE_VALUE_PLACEHOLDER: &str = "<SignatureValue></SignatureValue>";

/// Replaces the text content of the (unique) `SignatureValue` element inside
/// `AuthSignature` with an empty string, returning the bytes to run the A006
/// digest/sign over. `request_xml` must already contain the element as a
/// self-contained (no nested markup) text node.
pub fn blank_auth_signature_value(request_xml: &str) -> Result<String, XmlError> {
    let start_tag_pos = request_xml.find("<SignatureValue").ok_or_else(|| XmlError::Shape {
        path: "AuthSignature/SignatureValue".to_string(),
        reason: "element not present in request".to_string(),
    })?;

    let open_end = request_xml[start_tag_pos..]
        .find('>')
        .map(|i| start_tag_pos + i + 1)
        .ok_or_else(|| XmlError::Shape {
            path: "AuthSignature/SignatureValue".to_string(),
            reason: "malformed start tag".to_string(),
        })?;

    let close_tag_pos = request_xml[open_end..]
        .find("</SignatureValue>")
        .map(|i| open_end + i)
        .ok_or_else(|| XmlError::Shape {
            path: "AuthSignature/SignatureValue".to_string(),
            reason: "no matching close tag".to_string(),
        })?;

    let mut blanked = String::with_capacity(request_xml.len());
    blanked.push_str(&request_xml[..start_tag_pos]);
    blanked.push_str(SIGNATURE_VALUE_PLACEHOLDER);
    blanked.push_str(&request_xml[close_tag_pos + "</SignatureValue>".len()..]);

    Ok(blanked)
}

/// Extracts the base64 signature value currently present, to compare
/// against a freshly computed one in tests, or to read back what the bank
/// claims to have signed.
pub fn extract_auth_signature_value(request_xml: &str) -> Result<String, XmlError> {
    let start = request_xml.find("<SignatureValue").ok_or_else(|| XmlError::Shape {
        path: "AuthSignature/SignatureValue".to_string(),
        reason: "element not present".to_string(),
    })?;
    let open_end = request_xml[start..]
        .find('>')
        .map(|i| start + i + 1)
        .ok_or_else(|| XmlError::Shape {
            path: "AuthSignature/SignatureValue".to_string(),
            reason: "malformed start tag".to_string(),
        })?;
    let close = request_xml[open_end..]
        .find("</SignatureValue>")
        .map(|i| open_end + i)
        .ok_or_else(|| XmlError::Shape {
            path: "AuthSignature/SignatureValue".to_string(),
            reason: "no matching close tag".to_string(),
        })?;
    Ok(request_xml[open_end..close].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blanks_signature_value_leaving_rest_intact() {
        let doc = "<Header><AuthSignature><SignatureValue>abcd1234==</SignatureValue></AuthSignature></Header>";
        let blanked = blank_auth_signature_value(doc).unwrap();
        assert_eq!(
            blanked,
            "<Header><AuthSignature><SignatureValue></SignatureValue></AuthSignature></Header>"
        );
    }

    #[test]
    fn blanks_signature_value_with_attributes_on_start_tag() {
        let doc = r#"<AuthSignature><SignatureValue Authenticate="true">xyz</SignatureValue></AuthSignature>"#;
        let blanked = blank_auth_signature_value(doc).unwrap();
        assert_eq!(blanked, "<AuthSignature><SignatureValue></SignatureValue></AuthSignature>");
    }

    #[test]
    fn missing_element_is_shape_error() {
        let doc = "<Header></Header>";
        assert!(blank_auth_signature_value(doc).is_err());
    }

    #[test]
    fn extracts_current_value() {
        let doc = "<SignatureValue>abcd1234==</SignatureValue>";
        assert_eq!(extract_auth_signature_value(doc).unwrap(), "abcd1234==");
    }
}
