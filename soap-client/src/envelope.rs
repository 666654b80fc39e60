//! SOAP 1.1 envelopes for UPnP action invocation

use quick_xml::escape::escape;
use xmltree::{Element, XMLNode};

use crate::argument::Argument;
use crate::error::{DecodeError, ResponseError, SoapFault};

pub const SOAP_ENVELOPE_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";
pub const SOAP_ENCODING_NS: &str = "http://schemas.xmlsoap.org/soap/encoding/";
pub const UPNP_CONTROL_NS: &str = "urn:schemas-upnp-org:control-1-0";

/// A decoded action request, as a device would see it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionRequest {
    pub action: String,
    /// Namespace of the action element, i.e. the service type
    pub service_type: Option<String>,
    pub arguments: Vec<(String, String)>,
}

/// Whether `name` can be written as an unprefixed element name.
///
/// Action, argument and state variable names go into the XML as element
/// names without escaping, so encoders expect names that pass this check.
pub fn is_xml_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first == '_' || first.is_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

fn envelope(payload: &str) -> Vec<u8> {
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?><s:Envelope xmlns:s="{SOAP_ENVELOPE_NS}" s:encodingStyle="{SOAP_ENCODING_NS}"><s:Body>{payload}</s:Body></s:Envelope>"#
    )
    .into_bytes()
}

/// Build the request body for `action` on a service of type `service_type`.
///
/// Child elements are written in exactly the order of `args`. `action`
/// and argument names are written verbatim and must satisfy
/// [`is_xml_name`]; values are escaped.
pub fn encode_action_request(service_type: &str, action: &str, args: &[Argument]) -> Vec<u8> {
    let mut payload = format!(r#"<u:{action} xmlns:u="{}">"#, escape(service_type));
    for arg in args {
        let value = arg.value.to_wire_string();
        payload.push_str(&format!("<{name}>{}</{name}>", escape(&value), name = arg.name));
    }
    payload.push_str(&format!("</u:{action}>"));
    envelope(&payload)
}

/// Build a successful `<action>Response` body. Names must satisfy
/// [`is_xml_name`].
pub fn encode_action_response(
    service_type: &str,
    action: &str,
    out_args: &[(&str, &str)],
) -> Vec<u8> {
    let mut payload = format!(r#"<u:{action}Response xmlns:u="{}">"#, escape(service_type));
    for (name, value) in out_args {
        payload.push_str(&format!("<{name}>{}</{name}>", escape(value)));
    }
    payload.push_str(&format!("</u:{action}Response>"));
    envelope(&payload)
}

/// Build a fault body carrying a `UPnPError`
pub fn encode_fault(code: i32, description: &str) -> Vec<u8> {
    let payload = format!(
        r#"<s:Fault><faultcode>s:Client</faultcode><faultstring>UPnPError</faultstring><detail><UPnPError xmlns="{UPNP_CONTROL_NS}"><errorCode>{code}</errorCode><errorDescription>{}</errorDescription></UPnPError></detail></s:Fault>"#,
        escape(description)
    );
    envelope(&payload)
}

/// Decode an action response into its out-arguments, in document order.
///
/// A `Fault` body yields [`ResponseError::Fault`]; anything that is not a
/// well-formed envelope yields [`ResponseError::Decode`].
pub fn decode_action_response(body: &[u8]) -> Result<Vec<(String, String)>, ResponseError> {
    let root = parse_document(body)?;
    let payload = body_payload(&root)?;

    if payload.name == "Fault" {
        return Err(ResponseError::Fault(parse_fault(payload)?));
    }

    Ok(child_elements(payload)
        .map(|arg| (arg.name.clone(), element_text(arg)))
        .collect())
}

/// Decode an action request body
pub fn decode_action_request(body: &[u8]) -> Result<ActionRequest, DecodeError> {
    let root = parse_document(body)?;
    let payload = body_payload(&root)?;

    Ok(ActionRequest {
        action: payload.name.clone(),
        service_type: payload.namespace.clone(),
        arguments: child_elements(payload)
            .map(|arg| (arg.name.clone(), element_text(arg)))
            .collect(),
    })
}

pub(crate) fn parse_document(body: &[u8]) -> Result<Element, DecodeError> {
    Element::parse(body).map_err(|e| DecodeError::Xml(e.to_string()))
}

pub(crate) fn child_elements(element: &Element) -> impl Iterator<Item = &Element> {
    element.children.iter().filter_map(|node| match node {
        XMLNode::Element(child) => Some(child),
        _ => None,
    })
}

pub(crate) fn element_text(element: &Element) -> String {
    element
        .get_text()
        .map(|text| text.into_owned())
        .unwrap_or_default()
}

/// Locate the first element inside `Envelope/Body`, skipping an optional
/// `Header`
fn body_payload(root: &Element) -> Result<&Element, DecodeError> {
    if root.name != "Envelope" {
        return Err(DecodeError::UnexpectedRoot {
            expected: "Envelope",
            found: root.name.clone(),
        });
    }

    let mut children = child_elements(root);
    let mut body = children.next();
    if body.is_some_and(|el| el.name == "Header") {
        body = children.next();
    }

    let body = body
        .filter(|el| el.name == "Body")
        .ok_or_else(|| DecodeError::InvalidEnvelope("Missing SOAP Body".to_string()))?;

    child_elements(body)
        .next()
        .ok_or_else(|| DecodeError::InvalidEnvelope("Empty SOAP Body".to_string()))
}

fn parse_fault(fault: &Element) -> Result<SoapFault, DecodeError> {
    let error = fault
        .get_child("detail")
        .and_then(|detail| detail.get_child("UPnPError"))
        .ok_or_else(|| DecodeError::InvalidFault("Missing UPnPError detail".to_string()))?;

    let code = error
        .get_child("errorCode")
        .map(element_text)
        .and_then(|text| text.trim().parse::<i32>().ok())
        .ok_or_else(|| DecodeError::InvalidFault("Missing or invalid errorCode".to_string()))?;

    let description = error.get_child("errorDescription").map(element_text);

    Ok(SoapFault { code, description })
}
