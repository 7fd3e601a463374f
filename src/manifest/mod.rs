mod codec;
mod varint;

pub use codec::{decode, encode, FileEntry, Manifest, ManifestError, MAX_MANIFEST_SIZE, MAX_NAME_LEN};
