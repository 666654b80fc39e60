//! Property tests for the action and event codecs

use proptest::prelude::*;
use soap_client::{
    decode_action_request, decode_action_response, decode_notify_body, encode_action_request,
    encode_fault, encode_notify_body, Argument, ControlErrorKind, ResponseError, TypedValue,
    ValueType,
};

const RENDERING_CONTROL: &str = "urn:schemas-upnp-org:service:RenderingControl:1";

fn arg_name() -> impl Strategy<Value = String> {
    "[A-Z][A-Za-z0-9]{0,15}"
}

fn arg_value() -> impl Strategy<Value = String> {
    "[ -~]{1,32}".prop_map(|s| s.trim().to_string()).prop_filter("non-empty", |s| !s.is_empty())
}

proptest! {
    #[test]
    fn request_preserves_argument_order(
        args in proptest::collection::vec((arg_name(), arg_value()), 0..8)
    ) {
        let arguments: Vec<Argument> = args
            .iter()
            .map(|(name, value)| Argument::new(name.clone(), value.clone()))
            .collect();

        let body = encode_action_request(RENDERING_CONTROL, "SetThings", &arguments);
        let decoded = decode_action_request(&body).unwrap();

        prop_assert_eq!(decoded.action, "SetThings");
        prop_assert_eq!(decoded.arguments, args);
    }

    #[test]
    fn fault_code_survives_round_trip(code in 0i32..1000, description in arg_value()) {
        let body = encode_fault(code, &description);
        match decode_action_response(&body) {
            Err(ResponseError::Fault(fault)) => {
                prop_assert_eq!(fault.code, code);
                prop_assert_eq!(fault.description, Some(description));
            }
            other => prop_assert!(false, "expected fault, got {:?}", other),
        }
    }

    #[test]
    fn notify_body_preserves_variable_order(
        vars in proptest::collection::vec((arg_name(), arg_value()), 1..6)
    ) {
        let borrowed: Vec<(&str, &str)> =
            vars.iter().map(|(n, v)| (n.as_str(), v.as_str())).collect();
        let decoded = decode_notify_body(&encode_notify_body(&borrowed)).unwrap();
        prop_assert_eq!(decoded, vars);
    }

    #[test]
    fn int_wire_form_coerces_back(value in any::<i32>()) {
        let wire = TypedValue::Int(value).to_wire_string();
        prop_assert_eq!(TypedValue::coerce(&wire, ValueType::Int).unwrap(), TypedValue::Int(value));
    }
}

#[test]
fn invalid_args_fault_maps_to_kind() {
    let body = encode_fault(402, "Invalid Args");
    let Err(ResponseError::Fault(fault)) = decode_action_response(&body) else {
        panic!("expected a fault");
    };
    assert_eq!(ControlErrorKind::from_code(fault.code), ControlErrorKind::InvalidArgs);
    assert_eq!(fault.description.as_deref(), Some("Invalid Args"));
}
