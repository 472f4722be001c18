//! Constant-time comparison helpers

use subtle::ConstantTimeEq;

/// Compare two byte slices without leaking the position of the first difference.
///
/// Slices of different length compare unequal; the length itself is not secret.
pub fn ct_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}
