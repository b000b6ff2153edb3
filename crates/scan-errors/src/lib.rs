//! Error facade shared by the mpiscan probe and its harvest harness.
//!
//! Every failure carries an [`ErrorKind`] (who is at fault), a stable
//! [`ErrorCode`] (what went wrong, machine-readable) and a free-form message
//! plus ordered key/value context. The binaries map the kind onto a process
//! exit status; the code travels into structured logs and JSON trailers.

use std::error::Error;
use std::fmt;

/// Convenient alias for fallible operations across the workspace.
pub type ScanResult<T> = Result<T, ScanError>;

type BoxedSource = Box<dyn Error + Send + Sync + 'static>;

/// Broad classification of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[non_exhaustive]
pub enum ErrorKind {
    /// The caller supplied invalid input or configuration.
    Usage,
    /// The environment failed us: runtime library, filesystem, pipes, tools.
    Environment,
    /// A bug in mpiscan itself.
    Internal,
}

macro_rules! error_codes {
    ($($(#[$meta:meta])* $variant:ident => $text:literal,)*) => {
        /// Stable identifiers for failures, rendered as `ERR_*` strings.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[non_exhaustive]
        pub enum ErrorCode {
            $($(#[$meta])* $variant,)*
        }

        impl ErrorCode {
            /// Stable textual form of the code.
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(ErrorCode::$variant => $text,)*
                }
            }

            /// Parse the textual form produced by [`ErrorCode::as_str`].
            pub fn parse(value: &str) -> Option<Self> {
                match value {
                    $($text => Some(ErrorCode::$variant),)*
                    _ => None,
                }
            }
        }
    };
}

error_codes! {
    /// No more specific code applies.
    Unknown => "ERR_UNKNOWN",
    /// A configuration value could not be parsed.
    InvalidPolicyValue => "ERR_INVALID_POLICY_VALUE",
    /// Generic I/O failure.
    Io => "ERR_IO",
    /// The distributed runtime reported a failing initialize.
    RuntimeInitFailed => "ERR_RUNTIME_INIT_FAILED",
    /// The distributed runtime reported a failing finalize.
    RuntimeFinalizeFailed => "ERR_RUNTIME_FINALIZE_FAILED",
    /// The probe was asked to collect an empty target table.
    EmptyTargetSet => "ERR_EMPTY_TARGET_SET",
    /// The report could not be written to its output channel.
    OutputUnavailable => "ERR_OUTPUT_UNAVAILABLE",
    /// The package manager does not know the requested package.
    UnknownPackage => "ERR_UNKNOWN_PACKAGE",
    /// The package manager lists no versions for a package.
    NoVersionsFound => "ERR_NO_VERSIONS_FOUND",
    /// An external command could not be spawned or failed outright.
    CommandFailed => "ERR_COMMAND_FAILED",
    /// The probe source to compile does not exist or is not usable.
    SourceMissing => "ERR_SOURCE_MISSING",
    /// A previously stored results file is missing or malformed.
    ResultsFileInvalid => "ERR_RESULTS_FILE_INVALID",
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for ErrorCode {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for ErrorCode {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let text = <std::borrow::Cow<'de, str> as serde::Deserialize>::deserialize(deserializer)?;
        ErrorCode::parse(&text)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown error code '{text}'")))
    }
}

/// Error value flowing through every fallible mpiscan operation.
#[derive(Debug)]
pub struct ScanError {
    pub kind: ErrorKind,
    pub code: ErrorCode,
    pub message: String,
    pub context: Vec<(&'static str, String)>,
    source: Option<BoxedSource>,
}

impl ScanError {
    pub fn new(kind: ErrorKind, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            kind,
            code,
            message: message.into(),
            context: Vec::new(),
            source: None,
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Attach a key/value pair describing the failure. Keys keep insertion order.
    pub fn with_context(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.context.push((key, value.into()));
        self
    }

    /// Attach the underlying cause.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    pub fn source_ref(&self) -> Option<&(dyn Error + Send + Sync + 'static)> {
        self.source.as_deref()
    }

    /// Look up the first context value recorded under `key`.
    pub fn context_value(&self, key: &str) -> Option<&str> {
        self.context
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }
}

impl fmt::Display for ScanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)?;
        if !self.context.is_empty() {
            f.write_str(" (")?;
            for (idx, (key, value)) in self.context.iter().enumerate() {
                if idx > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{key}={value}")?;
            }
            f.write_str(")")?;
        }
        Ok(())
    }
}

impl Error for ScanError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.source
            .as_deref()
            .map(|source| source as &(dyn Error + 'static))
    }
}

/// Build a [`ScanError`] of kind [`ErrorKind::Usage`].
#[macro_export]
macro_rules! usage {
    ($code:expr, $($fmt:tt)+) => {
        $crate::ScanError::new($crate::ErrorKind::Usage, $code, format!($($fmt)+))
    };
}

/// Build a [`ScanError`] of kind [`ErrorKind::Environment`].
#[macro_export]
macro_rules! enverr {
    ($code:expr, $($fmt:tt)+) => {
        $crate::ScanError::new($crate::ErrorKind::Environment, $code, format!($($fmt)+))
    };
}

/// Build a [`ScanError`] of kind [`ErrorKind::Internal`].
#[macro_export]
macro_rules! bug {
    ($code:expr, $($fmt:tt)+) => {
        $crate::ScanError::new($crate::ErrorKind::Internal, $code, format!($($fmt)+))
    };
}

/// Return early with a usage error unless `cond` holds.
#[macro_export]
macro_rules! ensure_usage {
    ($cond:expr, $code:expr, $($fmt:tt)+) => {
        if !$cond {
            return Err($crate::usage!($code, $($fmt)+));
        }
    };
}
