/// Compute a non-zero FNV-1a hash over an iterator of byte slices.
///
/// Used to fingerprint a descriptor so that replicas can confirm, at every
/// rendezvous, that they hold identical copies (kind, shapes, groups,
/// reduction, channel). Returns a non-zero `u64`.
pub(crate) fn fnv1a<I, S>(parts: I) -> u64
where
    I: IntoIterator<Item = S>,
    S: AsRef<[u8]>,
{
    let mut h: u64 = 0xcbf29ce484222325; // FNV-1a offset basis
    for part in parts {
        for &b in part.as_ref() {
            h ^= b as u64;
            h = h.wrapping_mul(0x100000001b3);
        }
        // Field separator so ["ab", "c"] and ["a", "bc"] differ.
        h ^= 0xff;
        h = h.wrapping_mul(0x100000001b3);
    }
    if h == 0 { 1 } else { h }
}
