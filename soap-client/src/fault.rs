//! Mapping of UPnP control error codes

use std::fmt;

use tracing::warn;

/// Category of a UPnP control error reported in a SOAP fault
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlErrorKind {
    /// 401
    InvalidAction,
    /// 402
    InvalidArgs,
    /// 403
    OutOfSync,
    /// 501
    ActionFailed,
    /// 600-699
    UpnpForumDefined,
    /// 700-799
    DeviceTypeDefined,
    /// 800-899, and every code outside the known ranges
    VendorDefined,
}

impl ControlErrorKind {
    /// Map a fault `errorCode` to its kind.
    ///
    /// Codes outside every defined range (negative numbers, 900+,
    /// unassigned 4xx/5xx) are reported as `VendorDefined` with a warning.
    pub fn from_code(code: i32) -> Self {
        match code {
            401 => ControlErrorKind::InvalidAction,
            402 => ControlErrorKind::InvalidArgs,
            403 => ControlErrorKind::OutOfSync,
            501 => ControlErrorKind::ActionFailed,
            600..=699 => ControlErrorKind::UpnpForumDefined,
            700..=799 => ControlErrorKind::DeviceTypeDefined,
            800..=899 => ControlErrorKind::VendorDefined,
            other => {
                warn!(code = other, "unrecognized UPnP error code, treating as vendor defined");
                ControlErrorKind::VendorDefined
            }
        }
    }
}

impl fmt::Display for ControlErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ControlErrorKind::InvalidAction => "invalid action",
            ControlErrorKind::InvalidArgs => "invalid args",
            ControlErrorKind::OutOfSync => "out of sync",
            ControlErrorKind::ActionFailed => "action failed",
            ControlErrorKind::UpnpForumDefined => "UPnP forum defined",
            ControlErrorKind::DeviceTypeDefined => "device type defined",
            ControlErrorKind::VendorDefined => "vendor defined",
        };
        f.write_str(name)
    }
}
