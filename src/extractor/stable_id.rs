use crate::model::DatasetSplit;
use blake3::Hasher;

/// Identity of one method occurrence in one commit.
///
/// Byte offsets are hashed rather than lines so that two single-line methods
/// on the same line still get distinct ids. The result is `m_` followed by the
/// first 16 hex characters of the blake3 digest.
pub fn method_id(
    full_name: &str,
    commit_sha: &str,
    rel_path: &str,
    start_byte: usize,
    end_byte: usize,
) -> String {
    let mut hasher = Hasher::new();
    hasher.update(full_name.to_lowercase().as_bytes());
    hasher.update(b"\x00");
    hasher.update(commit_sha.as_bytes());
    hasher.update(b"\x00");
    hasher.update(rel_path.as_bytes());
    hasher.update(b"\x00");
    hasher.update(start_byte.to_string().as_bytes());
    hasher.update(b"\x00");
    hasher.update(end_byte.to_string().as_bytes());
    let hash = hasher.finalize();
    format!("m_{}", &hash.to_hex()[..16])
}

/// Split assignment per repository: bucket 8 is validation, 9 is test.
pub fn dataset_split(full_name: &str) -> DatasetSplit {
    let hash = blake3::hash(full_name.to_lowercase().as_bytes());
    let bytes = hash.as_bytes();
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&bytes[..8]);
    match u64::from_le_bytes(prefix) % 10 {
        8 => DatasetSplit::Val,
        9 => DatasetSplit::Test,
        _ => DatasetSplit::Train,
    }
}
