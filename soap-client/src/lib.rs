//! SOAP and GENA wire codec for UPnP service proxies
//!
//! This crate knows how UPnP control and eventing messages look on the wire
//! and nothing about how they travel. It builds SOAP 1.1 action envelopes,
//! decodes action responses and faults, decodes GENA `propertyset` bodies,
//! and converts between UPnP's string forms and typed values.
//!
//! # Example
//!
//! ```
//! use soap_client::{decode_action_response, encode_action_request, Argument};
//!
//! let body = encode_action_request(
//!     "urn:schemas-upnp-org:service:RenderingControl:1",
//!     "GetVolume",
//!     &[Argument::new("InstanceID", 0u32), Argument::new("Channel", "Master")],
//! );
//! assert!(String::from_utf8_lossy(&body).contains("<Channel>Master</Channel>"));
//!
//! let response = br#"<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/">
//!     <s:Body><u:GetVolumeResponse xmlns:u="urn:schemas-upnp-org:service:RenderingControl:1">
//!     <CurrentVolume>25</CurrentVolume></u:GetVolumeResponse></s:Body></s:Envelope>"#;
//! let out = decode_action_response(response).unwrap();
//! assert_eq!(out, vec![("CurrentVolume".to_string(), "25".to_string())]);
//! ```

mod argument;
mod envelope;
mod error;
mod fault;
mod propertyset;
mod value;

pub use argument::{Argument, OutArgument};
pub use envelope::{
    decode_action_request, decode_action_response, encode_action_request,
    encode_action_response, encode_fault, is_xml_name, ActionRequest, SOAP_ENCODING_NS, SOAP_ENVELOPE_NS,
    UPNP_CONTROL_NS,
};
pub use error::{CoercionError, DecodeError, ResponseError, SoapFault};
pub use fault::ControlErrorKind;
pub use propertyset::{decode_notify_body, encode_notify_body, GENA_EVENT_NS};
pub use value::{TypedValue, ValueType};
