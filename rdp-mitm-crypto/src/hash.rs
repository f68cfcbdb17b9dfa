//! Hash macros used by the RDP session-key derivation ladder.

/// Calculate the SHA-1 digest of one or more byte slices concatenated.
#[macro_export]
macro_rules! sha1 {
    ( $( $x:expr ),+ $(,)? ) => {{
        use sha1::{Digest, Sha1};
        let mut h = Sha1::new();
        $( h.update($x); )+
        let out: [u8; 20] = h.finalize().into();
        out
    }};
}

/// Calculate the MD5 digest of one or more byte slices concatenated.
#[macro_export]
macro_rules! md5 {
    ( $( $x:expr ),+ $(,)? ) => {{
        use md5::{Digest, Md5};
        let mut h = Md5::new();
        $( h.update($x); )+
        let out: [u8; 16] = h.finalize().into();
        out
    }};
}
