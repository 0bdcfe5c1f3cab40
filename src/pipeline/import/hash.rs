use sha2::{Digest, Sha256};

/// SHA-256 of raw bytes as lowercase hex
pub fn compute_content_hash(content: &[u8]) -> String {
    format!("{:x}", Sha256::digest(content))
}

/// Stable source-document id: the first 16 hex characters of the content hash.
pub fn document_id_for(sha256_hex: &str) -> String {
    sha256_hex.chars().take(16).collect()
}

/// Hash of the whole input set. Order-independent: the same files uploaded
/// in a different order hash the same.
pub fn compute_inputs_hash<'a>(hashes: impl IntoIterator<Item = &'a str>) -> String {
    let mut sorted: Vec<&str> = hashes.into_iter().collect();
    sorted.sort_unstable();
    compute_content_hash(sorted.join("|").as_bytes())
}
