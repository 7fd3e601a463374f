use super::varint;

/// Maximum byte length of an encoded manifest; the 16-bit `header_size`
/// field cannot represent anything larger.
pub const MAX_MANIFEST_SIZE: usize = u16::MAX as usize;

/// Maximum byte length of a single filename; `name_lengths` is an 8-bit
/// field per spec.
pub const MAX_NAME_LEN: usize = u8::MAX as usize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub name: String,
    pub size: u64,
}

impl FileEntry {
    pub fn new(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            size,
        }
    }
}

/// The decoded transfer manifest: a list of files a sender intends to
/// transmit, in send order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    pub header_size: u16,
    pub entries: Vec<FileEntry>,
}

#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("filename {name:?} is {len} bytes, exceeding the 255-byte limit")]
    NameTooLong { name: String, len: usize },

    #[error("encoded manifest would be {size} bytes, exceeding the 65535-byte limit")]
    ManifestTooLarge { size: usize },

    #[error("manifest declares no files")]
    EmptyManifest,

    #[error("truncated manifest: need at least {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("header_size mismatch: header claims {claimed} bytes but the body encodes to {computed} bytes")]
    SizeMismatch { claimed: u16, computed: u16 },

    #[error("malformed varint while decoding file size {index}")]
    MalformedVarint { index: usize },

    #[error("manifest declares non-UTF8 filename bytes")]
    InvalidUtf8,
}

/// Lays out the manifest body (name lengths, names, varint sizes) and then
/// prepends the 4-byte `header_size`+`file_count` prefix in one step, rather
/// than reserving space up front and backfilling it once the body length is
/// known.
pub fn encode(entries: &[FileEntry]) -> Result<Vec<u8>, ManifestError> {
    if entries.is_empty() {
        return Err(ManifestError::EmptyManifest);
    }

    let mut body = Vec::new();

    for entry in entries {
        let name_len = entry.name.len();
        if name_len > MAX_NAME_LEN {
            return Err(ManifestError::NameTooLong {
                name: entry.name.clone(),
                len: name_len,
            });
        }
        body.push(name_len as u8);
    }

    for entry in entries {
        body.extend_from_slice(entry.name.as_bytes());
    }

    for entry in entries {
        varint::encode_signed(entry.size as i64, &mut body);
    }

    let total_len = 4 + body.len();
    if total_len > MAX_MANIFEST_SIZE {
        return Err(ManifestError::ManifestTooLarge { size: total_len });
    }

    let mut out = Vec::with_capacity(total_len);
    out.extend_from_slice(&(total_len as u16).to_be_bytes());
    out.extend_from_slice(&(entries.len() as u16).to_be_bytes());
    out.extend_from_slice(&body);

    Ok(out)
}

/// Decodes a fully-buffered manifest. Partial reads must already have been
/// resolved by the caller; this function does not tolerate short input as an
/// "ask for more" signal, only as an error.
pub fn decode(bytes: &[u8]) -> Result<Manifest, ManifestError> {
    if bytes.len() < 4 {
        return Err(ManifestError::Truncated {
            expected: 4,
            actual: bytes.len(),
        });
    }

    let header_size = u16::from_be_bytes([bytes[0], bytes[1]]);
    let file_count = u16::from_be_bytes([bytes[2], bytes[3]]) as usize;

    if file_count == 0 {
        return Err(ManifestError::EmptyManifest);
    }

    let mut offset = 4;

    let name_lengths_end = offset + file_count;
    if bytes.len() < name_lengths_end {
        return Err(ManifestError::Truncated {
            expected: name_lengths_end,
            actual: bytes.len(),
        });
    }
    let name_lengths = &bytes[offset..name_lengths_end];
    offset = name_lengths_end;

    let mut names = Vec::with_capacity(file_count);
    for &len in name_lengths {
        let len = len as usize;
        let end = offset + len;
        if bytes.len() < end {
            return Err(ManifestError::Truncated {
                expected: end,
                actual: bytes.len(),
            });
        }
        let name =
            std::str::from_utf8(&bytes[offset..end]).map_err(|_| ManifestError::InvalidUtf8)?;
        names.push(name.to_owned());
        offset = end;
    }

    let mut sizes = Vec::with_capacity(file_count);
    for index in 0..file_count {
        let (size, consumed) =
            varint::decode_signed(&bytes[offset..]).ok_or(ManifestError::MalformedVarint { index })?;
        sizes.push(size as u64);
        offset += consumed;
    }

    if offset > u16::MAX as usize {
        return Err(ManifestError::ManifestTooLarge { size: offset });
    }

    if offset as u16 != header_size {
        return Err(ManifestError::SizeMismatch {
            claimed: header_size,
            computed: offset as u16,
        });
    }

    let entries = names
        .into_iter()
        .zip(sizes)
        .map(|(name, size)| FileEntry { name, size })
        .collect();

    Ok(Manifest {
        header_size,
        entries,
    })
}
