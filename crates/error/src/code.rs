use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const PREFIX: &str = "SLUICE-";

macro_rules! error_codes {
    ($( $(#[$doc:meta])* $name:ident = $num:literal, )*) => {
        /// Numeric error codes, rendered as `SLUICE-XXXX`.
        ///
        /// ## Code Ranges
        /// - **1000-1999**: Data source errors
        /// - **2000-2999**: Query errors
        /// - **3000-3999**: Configuration errors
        /// - **5000-5999**: Internal errors
        ///
        /// Numbers are stable; new codes are only ever appended.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(into = "String", try_from = "String")]
        #[non_exhaustive]
        pub enum ErrorCode {
            $( $(#[$doc])* $name = $num, )*
        }

        impl ErrorCode {
            /// Every defined code, in numeric order.
            pub const ALL: &'static [ErrorCode] = &[$( ErrorCode::$name, )*];
        }

        impl TryFrom<u16> for ErrorCode {
            type Error = String;

            fn try_from(n: u16) -> std::result::Result<Self, Self::Error> {
                match n {
                    $( $num => Ok(ErrorCode::$name), )*
                    _ => Err(format!("Unknown error code: {}", n)),
                }
            }
        }
    };
}

error_codes! {
    /// Database file or endpoint does not exist
    SourceNotFound = 1001,
    /// A row reader or its connection could not be opened
    ReaderUnavailable = 1006,
    /// The source failed while rows were being read
    SourceFailure = 1007,

    /// Statement rejected by the backend
    SyntaxError = 2001,
    /// Cancelled by the caller
    QueryCancelled = 2008,
    /// Plan does not have the single-statement shape the runner executes
    PlanShape = 2009,
    /// Column value could not be converted to the requested type
    CoercionFailed = 2010,
    /// Call argument could not be bound to a plan parameter
    InvalidParameter = 2011,

    /// Configuration could not be read or parsed
    InvalidConfig = 3001,
    /// Configuration failed validation
    SchemaViolation = 3002,

    SerializationFailed = 5002,
    InternalPanic = 5003,
    NotImplemented = 5004,
}

impl ErrorCode {
    pub fn as_u16(&self) -> u16 {
        *self as u16
    }

    /// `SLUICE-` followed by the zero-padded number.
    pub fn as_str(&self) -> String {
        format!("{}{:04}", PREFIX, self.as_u16())
    }

    pub fn category(&self) -> ErrorCategory {
        ErrorCategory::of(self.as_u16())
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{:04}", PREFIX, self.as_u16())
    }
}

impl FromStr for ErrorCode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let num = s
            .strip_prefix(PREFIX)
            .and_then(|n| n.parse::<u16>().ok())
            .ok_or_else(|| format!("Expected {}XXXX, got '{}'", PREFIX, s))?;
        Self::try_from(num)
    }
}

impl From<ErrorCode> for String {
    fn from(code: ErrorCode) -> String {
        code.as_str()
    }
}

impl TryFrom<String> for ErrorCode {
    type Error = String;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        s.parse()
    }
}

/// Coarse grouping of codes by their thousands range. The CLI maps these to
/// exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum ErrorCategory {
    Source,
    Query,
    Config,
    Internal,
}

impl ErrorCategory {
    fn of(code: u16) -> Self {
        match code / 1000 {
            1 => ErrorCategory::Source,
            2 => ErrorCategory::Query,
            3 => ErrorCategory::Config,
            _ => ErrorCategory::Internal,
        }
    }
}
