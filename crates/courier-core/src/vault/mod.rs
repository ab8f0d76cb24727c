//! Credential vault: the process encryption key and the per-user mailbox
//! configuration it protects.

mod key;

pub use key::{DecryptionError, EncryptionKey, KeyError, KeyManager};
