//! Secret buffer hygiene
//!
//! Helpers for wiping key material once an operation no longer needs it.
//! Long-lived secrets should live in `zeroize::Zeroizing` wrappers; these
//! functions cover buffers the caller owns directly.

use zeroize::Zeroize;

/// Overwrite a byte buffer with zeros
pub fn secure_erase(buf: &mut [u8]) {
    buf.zeroize();
}

/// Overwrite and clear a string holding secret text (WIF, passphrase)
pub fn secure_erase_string(text: &mut String) {
    text.zeroize();
}

/// Overwrite a list of secret buffers, then clear the list
pub fn secure_erase_all(buffers: &mut Vec<Vec<u8>>) {
    for buf in buffers.iter_mut() {
        buf.zeroize();
    }
    buffers.clear();
}
