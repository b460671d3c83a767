//! Fingerprint composition for the higher cache layers.
//!
//! Inputs are sorted before hashing, so a fingerprint is insensitive to the
//! order includes, defines, or directories were declared in.

use loom_core::hash::sha256_hex;

/// Composite fingerprint of one file: content hash plus sorted include
/// hashes, defines, and include directories.
#[must_use]
pub fn effective_hash(
    content_hash: &str,
    include_hashes: &[String],
    defines: &[String],
    include_dirs: &[String],
) -> String {
    let mut includes = include_hashes.to_vec();
    let mut defs = defines.to_vec();
    let mut dirs = include_dirs.to_vec();
    includes.sort();
    defs.sort();
    dirs.sort();

    let mut combined = content_hash.to_string();
    for h in &includes {
        combined.push('|');
        combined.push_str(h);
    }
    combined.push_str("||");
    for d in &defs {
        combined.push('|');
        combined.push_str(d);
    }
    combined.push_str("||");
    for d in &dirs {
        combined.push('|');
        combined.push_str(d);
    }

    sha256_hex(combined.as_bytes())
}

/// Fingerprint of a whole filelist: build version, manifest checksum, and
/// the sorted per-file effective hashes.
#[must_use]
pub fn filelist_key(
    loom_version: &str,
    manifest_hash: &str,
    effective_hashes: &[String],
) -> String {
    let mut hashes = effective_hashes.to_vec();
    hashes.sort();

    let mut combined = format!("{loom_version}|{manifest_hash}");
    for h in &hashes {
        combined.push('|');
        combined.push_str(h);
    }

    sha256_hex(combined.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strs(v: &[&str]) -> Vec<String> {
        v.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn effective_hash_permutation_invariant() {
        let a = effective_hash(
            "content",
            &strs(&["h1", "h2", "h3"]),
            &strs(&["SYNTHESIS", "FPGA"]),
            &strs(&["include", "rtl/include"]),
        );
        let b = effective_hash(
            "content",
            &strs(&["h3", "h1", "h2"]),
            &strs(&["FPGA", "SYNTHESIS"]),
            &strs(&["rtl/include", "include"]),
        );
        assert_eq!(a, b);
    }

    #[test]
    fn effective_hash_sensitive_to_each_input() {
        let base = effective_hash("content", &strs(&["h1"]), &strs(&["D"]), &strs(&["i"]));
        assert_ne!(
            base,
            effective_hash("other", &strs(&["h1"]), &strs(&["D"]), &strs(&["i"]))
        );
        assert_ne!(
            base,
            effective_hash("content", &strs(&["h2"]), &strs(&["D"]), &strs(&["i"]))
        );
        assert_ne!(
            base,
            effective_hash("content", &strs(&["h1"]), &strs(&["E"]), &strs(&["i"]))
        );
        assert_ne!(
            base,
            effective_hash("content", &strs(&["h1"]), &strs(&["D"]), &strs(&["j"]))
        );
    }

    #[test]
    fn field_boundaries_are_delimited() {
        // A value moving between the define and include-dir lists must not
        // collide.
        let a = effective_hash("c", &[], &strs(&["x"]), &[]);
        let b = effective_hash("c", &[], &[], &strs(&["x"]));
        assert_ne!(a, b);
    }

    #[test]
    fn filelist_key_sorted_and_versioned() {
        let a = filelist_key("0.1.0", "mh", &strs(&["e1", "e2"]));
        let b = filelist_key("0.1.0", "mh", &strs(&["e2", "e1"]));
        assert_eq!(a, b);

        assert_ne!(a, filelist_key("0.2.0", "mh", &strs(&["e1", "e2"])));
        assert_ne!(a, filelist_key("0.1.0", "other", &strs(&["e1", "e2"])));
        assert_ne!(a, filelist_key("0.1.0", "mh", &strs(&["e1"])));
    }
}
