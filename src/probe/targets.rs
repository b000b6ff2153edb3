//! The closed set of constants a probe build inspects.

use std::fmt;

use super::sentinel::ProbeResult;

/// One constant fixed when the probe is compiled: its identifier plus an
/// accessor that captures its value and storage size.
#[derive(Clone, Copy)]
pub struct ProbeTarget {
    name: &'static str,
    read: fn() -> ProbeResult,
}

impl ProbeTarget {
    pub const fn new(name: &'static str, read: fn() -> ProbeResult) -> Self {
        Self { name, read }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Format the constant. Only valid while the runtime that owns it is initialized.
    pub fn read(&self) -> ProbeResult {
        (self.read)()
    }
}

impl fmt::Debug for ProbeTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProbeTarget")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Declare a [`ProbeTarget`] for a constant expression, naming it after the
/// identifier given as first argument.
///
/// The `value = .., size = ..` form takes both halves from elsewhere, for
/// constants whose type is only known to a C compiler.
///
/// ```
/// use mpiscan::probe::ProbeTarget;
///
/// const NO_HANDLE: i32 = -1;
/// static TARGETS: &[ProbeTarget] = &[mpiscan::probe_target!(NO_HANDLE, NO_HANDLE)];
/// assert_eq!(TARGETS[0].read().value(), -1);
/// ```
#[macro_export]
macro_rules! probe_target {
    ($name:ident, value = $value:expr, size = $size:expr $(,)?) => {
        $crate::probe::ProbeTarget::new(::core::stringify!($name), || {
            $crate::probe::ProbeResult::native(::core::stringify!($name), $value, $size)
        })
    };
    ($name:ident, $value:expr) => {
        $crate::probe::ProbeTarget::new(::core::stringify!($name), || {
            $crate::probe::format_sentinel(::core::stringify!($name), $value)
        })
    };
    ($name:ident) => {
        $crate::probe_target!($name, $name)
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::c_void;
    use std::ptr;

    const CONST_B: i32 = -1;

    static TARGETS: &[ProbeTarget] = &[
        crate::probe_target!(CONST_A, ptr::null::<c_void>()),
        crate::probe_target!(CONST_B),
    ];

    fn shim_value() -> crate::probe::NativeLong {
        -1
    }

    static SHIMMED: &[ProbeTarget] = &[crate::probe_target!(
        CONST_C,
        value = shim_value(),
        size = 4,
    )];

    #[test]
    fn names_come_from_identifiers() {
        let names: Vec<_> = TARGETS.iter().map(ProbeTarget::name).collect();
        assert_eq!(names, ["CONST_A", "CONST_B"]);
    }

    #[test]
    fn reading_formats_the_constant() {
        let first = TARGETS[0].read();
        assert_eq!(first.name(), "CONST_A");
        assert_eq!(first.value(), 0);
        assert_eq!(first.size_bytes(), std::mem::size_of::<*const c_void>());

        let second = TARGETS[1].read();
        assert_eq!(second.value(), -1);
        assert_eq!(second.size_bytes(), 4);
    }

    #[test]
    fn explicit_value_and_size_bypass_the_rust_type() {
        let result = SHIMMED[0].read();
        assert_eq!(result.name(), "CONST_C");
        assert_eq!(result.value(), -1);
        assert_eq!(result.size_bytes(), 4);
        assert!(!result.truncated());
    }

    #[test]
    fn debug_hides_the_accessor() {
        assert_eq!(
            format!("{:?}", TARGETS[1]),
            "ProbeTarget { name: \"CONST_B\", .. }"
        );
    }
}
