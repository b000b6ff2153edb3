//! Rendering of sentinel constants as `(value, size)` pairs.
//!
//! Sentinels are either small integer handles or addresses that must never be
//! dereferenced (`MPI_BOTTOM`, `MPI_IN_PLACE`). Both are reduced to their bit
//! pattern read as a signed integer and displayed with the width of a C
//! `long`, the conventional type used to print them.

use std::mem;

/// Integer type used to display sentinel values.
pub type NativeLong = libc::c_long;

/// A constant whose bit pattern can be inspected without reading through it.
pub trait Sentinel: Copy {
    /// The constant's bit pattern interpreted as a signed integer, widened
    /// without loss. Address-valued sentinels report their address bits.
    fn signed_bits(self) -> i128;
}

impl<T> Sentinel for *const T {
    fn signed_bits(self) -> i128 {
        self as usize as isize as i128
    }
}

impl<T> Sentinel for *mut T {
    fn signed_bits(self) -> i128 {
        self as usize as isize as i128
    }
}

macro_rules! integer_sentinel {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Sentinel for $ty {
                fn signed_bits(self) -> i128 {
                    self as i128
                }
            }
        )*
    };
}

integer_sentinel!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);

/// One formatted constant. Produced once per probe target and never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResult {
    name: &'static str,
    value: NativeLong,
    size_bytes: usize,
    truncated: bool,
}

impl ProbeResult {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn value(&self) -> NativeLong {
        self.value
    }

    pub fn size_bytes(&self) -> usize {
        self.size_bytes
    }

    /// Whether the signed bit pattern was wider than [`NativeLong`] and had to
    /// be narrowed for display.
    pub fn truncated(&self) -> bool {
        self.truncated
    }

    /// A constant whose value and storage size were taken by a C compiler,
    /// which already applied the cast to `long`. Storage wider than
    /// [`NativeLong`] is flagged since the cast may have dropped bits.
    pub fn native(name: &'static str, value: NativeLong, size_bytes: usize) -> Self {
        Self {
            name,
            value,
            size_bytes,
            truncated: size_bytes > mem::size_of::<NativeLong>(),
        }
    }
}

/// Format `value` as the constant `name`.
///
/// The size is the storage size of `S` as seen by this toolchain. Values that
/// do not fit a C `long` are narrowed like a C cast would and flagged.
pub fn format_sentinel<S: Sentinel>(name: &'static str, value: S) -> ProbeResult {
    let bits = value.signed_bits();
    let (value, truncated) = match NativeLong::try_from(bits) {
        Ok(value) => (value, false),
        Err(_) => (bits as NativeLong, true),
    };
    if truncated {
        log::warn!(
            target: "mpiscan::probe",
            sentinel = name, width = mem::size_of::<NativeLong>();
            "sentinel {} has bit pattern {} wider than the display integer; value narrowed",
            name,
            bits
        );
    }
    ProbeResult {
        name,
        value,
        size_bytes: mem::size_of::<S>(),
        truncated,
    }
}
