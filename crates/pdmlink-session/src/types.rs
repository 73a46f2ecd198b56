//! Enumerated register values.

use std::fmt;
use std::str::FromStr;

macro_rules! device_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident = $code:literal => $text:literal, )+
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $( $(#[$vmeta])* $variant, )+
        }

        impl $name {
            /// Every value, in code order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Wire code.
            pub fn code(self) -> u8 {
                match self {
                    $( $name::$variant => $code, )+
                }
            }

            /// Look up a value by wire code.
            pub fn from_code(code: u8) -> Option<Self> {
                match code {
                    $( $code => Some($name::$variant), )+
                    _ => None,
                }
            }

            pub fn name(self) -> &'static str {
                match self {
                    $( $name::$variant => $text, )+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.name())
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                $name::ALL
                    .iter()
                    .copied()
                    .find(|value| value.name().eq_ignore_ascii_case(s))
                    .ok_or_else(|| {
                        let names: Vec<&str> = $name::ALL.iter().map(|v| v.name()).collect();
                        format!("expected one of {}, got '{s}'", names.join(", "))
                    })
            }
        }
    };
}

device_enum! {
    /// Trigger source for pulses.
    SyncSource {
        ExternalTtlLvttl = 0 => "external-ttl-lvttl",
        ExternalLvds = 1 => "external-lvds",
        Internal = 2 => "internal",
    }
}

device_enum! {
    DelayLineType {
        None = 0 => "none",
        Internal = 1 => "internal",
    }
}

device_enum! {
    /// Where the pulse current setpoint comes from.
    CurrentSource {
        /// Analog input on the module.
        Analog = 0 => "analog",
        /// The `current` register.
        Numeric = 1 => "numeric",
    }
}

device_enum! {
    /// Pulsed or continuous-wave operation.
    Mode {
        Pulsed = 0 => "pulsed",
        Continuous = 1 => "continuous",
    }
}

device_enum! {
    /// Whether the operating mode follows the hardware selector or the
    /// `software_control_mode` register (protocol 3.7).
    ControlMode {
        Hardware = 0 => "hardware",
        Software = 1 => "software",
    }
}
