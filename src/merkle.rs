use super::*;

/// Root of a merkle tree over 32-byte leaves in canonical (little-endian)
/// byte order. Odd levels duplicate their last node.
pub(crate) fn merkle_root(mut hashes: Vec<[u8; 32]>) -> [u8; 32] {
    assert!(!hashes.is_empty(), "merkle tree needs at least one leaf");

    while hashes.len() > 1 {
        if hashes.len() % 2 == 1 {
            hashes.push(*hashes.last().expect("hashes is non-empty"));
        }

        hashes = hashes
            .chunks(2)
            .map(|pair| {
                let mut concat = [0u8; 64];
                concat[..32].copy_from_slice(&pair[0]);
                concat[32..].copy_from_slice(&pair[1]);
                sha256d_hash(&concat)
            })
            .collect();
    }

    hashes[0]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf_from_display_hex(display: &str) -> [u8; 32] {
        let mut bytes: [u8; 32] = hex::decode(display).unwrap().try_into().unwrap();
        bytes.reverse();
        bytes
    }

    #[test]
    fn singleton_is_its_own_root() {
        let leaf = [0x42u8; 32];
        assert_eq!(merkle_root(vec![leaf]), leaf);
    }

    #[test]
    fn pair_is_hash_of_concatenation() {
        let a = [1u8; 32];
        let b = [2u8; 32];

        let mut concat = [0u8; 64];
        concat[..32].copy_from_slice(&a);
        concat[32..].copy_from_slice(&b);

        assert_eq!(merkle_root(vec![a, b]), sha256d_hash(&concat));
    }

    #[test]
    fn odd_level_duplicates_last_leaf() {
        let a = [1u8; 32];
        let b = [2u8; 32];
        let c = [3u8; 32];

        assert_eq!(merkle_root(vec![a, b, c]), merkle_root(vec![a, b, c, c]));
    }

    #[test]
    fn bitcoin_block_170() {
        // The first ever block with a non-coinbase transaction; txids and the
        // merkle root are in display (big-endian) order on explorers.
        let coinbase =
            leaf_from_display_hex("b1fea52486ce0c62bb442b530a3f0132b826c74e473d1f2c220bfa78111c5082");
        let payment =
            leaf_from_display_hex("f4184fc596403b9d638783cf57adfe4c75c605f6356fbc91338530e9831e9e16");

        let mut root = merkle_root(vec![coinbase, payment]);
        root.reverse();

        assert_eq!(
            hex::encode(root),
            "7dac2c5666815c17a3b36427de37bb9d2e2c5ccec3f8633eb91a4205cb4c10ff"
        );
    }
}
