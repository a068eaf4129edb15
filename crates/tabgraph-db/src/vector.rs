//! Embedding vectors packed as little-endian IEEE-754 f32 BLOBs.

/// Pack a vector into its on-disk BLOB form.
pub fn to_blob(vector: &[f32]) -> Vec<u8> {
    let mut blob = Vec::with_capacity(vector.len() * 4);
    for value in vector {
        blob.extend_from_slice(&value.to_le_bytes());
    }
    blob
}

/// Unpack an on-disk BLOB into a vector.
///
/// Trailing bytes that do not form a whole f32 are ignored.
pub fn from_blob(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_vectors() {
        let vector = vec![0.25_f32, -1.5, 0.0, 3.75];
        assert_eq!(from_blob(&to_blob(&vector)), vector);
    }

    #[test]
    fn empty_blob_is_empty_vector() {
        assert!(from_blob(&[]).is_empty());
    }
}
