use rand::Rng;

use super::domain::VoucherCode;

/// Uppercase alphanumerics without the easily confused 0/O and 1/I.
const ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
pub const CODE_LENGTH: usize = 12;

pub fn generate<R: Rng + ?Sized>(rng: &mut R) -> VoucherCode {
    let code = (0..CODE_LENGTH)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect();
    VoucherCode(code)
}
