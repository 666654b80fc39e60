//! GENA `propertyset` bodies carried by NOTIFY requests

use quick_xml::escape::escape;

use crate::envelope::{child_elements, element_text, parse_document};
use crate::error::DecodeError;

pub const GENA_EVENT_NS: &str = "urn:schemas-upnp-org:event-1-0";

/// Decode a NOTIFY body into `(variable, value)` pairs in document order.
///
/// Every element child of every `property` element is reported, so a
/// property carrying several variables yields several pairs.
pub fn decode_notify_body(body: &[u8]) -> Result<Vec<(String, String)>, DecodeError> {
    let root = parse_document(body)?;
    if root.name != "propertyset" {
        return Err(DecodeError::UnexpectedRoot {
            expected: "propertyset",
            found: root.name,
        });
    }

    let mut changes = Vec::new();
    for property in child_elements(&root).filter(|el| el.name == "property") {
        for variable in child_elements(property) {
            changes.push((variable.name.clone(), element_text(variable)));
        }
    }
    Ok(changes)
}

/// Encode a NOTIFY body with one `property` element per variable.
///
/// Variable names are written verbatim and must satisfy
/// [`is_xml_name`](crate::is_xml_name).
pub fn encode_notify_body(variables: &[(&str, &str)]) -> Vec<u8> {
    let mut body = format!(
        r#"<?xml version="1.0" encoding="utf-8"?><e:propertyset xmlns:e="{GENA_EVENT_NS}">"#
    );
    for (name, value) in variables {
        body.push_str(&format!(
            "<e:property><{name}>{}</{name}></e:property>",
            escape(value)
        ));
    }
    body.push_str("</e:propertyset>");
    body.into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_notify_body() {
        let xml = r#"<?xml version="1.0"?>
            <e:propertyset xmlns:e="urn:schemas-upnp-org:event-1-0">
                <e:property><Volume>30</Volume></e:property>
                <e:property><Mute>0</Mute><Loudness>1</Loudness></e:property>
            </e:propertyset>"#;

        let changes = decode_notify_body(xml.as_bytes()).unwrap();
        assert_eq!(
            changes,
            vec![
                ("Volume".to_string(), "30".to_string()),
                ("Mute".to_string(), "0".to_string()),
                ("Loudness".to_string(), "1".to_string()),
            ]
        );
    }

    #[test]
    fn test_decode_notify_body_wrong_root() {
        let err = decode_notify_body(b"<html><body/></html>").unwrap_err();
        assert_eq!(
            err,
            DecodeError::UnexpectedRoot {
                expected: "propertyset",
                found: "html".to_string(),
            }
        );
    }

    #[test]
    fn test_decode_notify_body_empty_value() {
        let body = encode_notify_body(&[("LastChange", "")]);
        assert_eq!(
            decode_notify_body(&body).unwrap(),
            vec![("LastChange".to_string(), String::new())]
        );
    }

    #[test]
    fn test_notify_body_keeps_escaped_markup() {
        let last_change = r#"<Event><InstanceID val="0"><Volume val="12"/></InstanceID></Event>"#;
        let body = encode_notify_body(&[("LastChange", last_change)]);
        let changes = decode_notify_body(&body).unwrap();
        assert_eq!(changes[0].1, last_change);
    }

    #[test]
    fn test_decode_notify_body_not_xml() {
        assert!(matches!(
            decode_notify_body(b"Volume=30"),
            Err(DecodeError::Xml(_))
        ));
    }
}
