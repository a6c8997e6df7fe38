use crate::*;
use digest::Digest;
use fhe::bfv::{BfvParameters, BfvParametersBuilder};
use fhe_traits::Serialize as FheSerialize;
use sha2::Sha256;
use std::fmt;
use std::sync::Arc;

/// Polynomial degree; also the number of SIMD slots in a plaintext.
pub const DEFAULT_DEGREE: usize = 4096;

/// 20-bit prime congruent to 1 mod 2*degree, so the plaintext space supports batching.
pub const DEFAULT_PLAINTEXT_MODULUS: u64 = 1032193;

/// Coefficient modulus chain of 36, 36 and 37 bit NTT-friendly primes.
pub const DEFAULT_MODULI: [u64; 3] = [0xffffee001, 0xffffc4001, 0x1ffffe0001];

/// Maximum number of ballots summed into a single aggregate.
pub const DEFAULT_MAX_SUMMANDS: usize = 1_000_000;

/// The fixed BFV parameter set.
///
/// Built once and shared behind an `Arc`; every cipher and key operation takes
/// its parameters from here instead of reconstructing them.
pub struct SchemeParameters {
    degree: usize,
    plaintext_modulus: u64,
    moduli: Vec<u64>,
    max_summands: usize,
    bfv: Arc<BfvParameters>,
    fingerprint: String,
}

impl SchemeParameters {
    /// Build the default parameter set
    pub fn new() -> Result<Arc<Self>, CryptoError> {
        Self::build(
            DEFAULT_DEGREE,
            DEFAULT_PLAINTEXT_MODULUS,
            &DEFAULT_MODULI,
            DEFAULT_MAX_SUMMANDS,
        )
    }

    /// Build the default parameter set with a different summation cap
    pub fn with_max_summands(max_summands: usize) -> Result<Arc<Self>, CryptoError> {
        Self::build(
            DEFAULT_DEGREE,
            DEFAULT_PLAINTEXT_MODULUS,
            &DEFAULT_MODULI,
            max_summands,
        )
    }

    pub fn build(
        degree: usize,
        plaintext_modulus: u64,
        moduli: &[u64],
        max_summands: usize,
    ) -> Result<Arc<Self>, CryptoError> {
        if max_summands == 0 {
            return Err(CryptoError::InvalidParameters(
                "max_summands must be at least 1".to_owned(),
            ));
        }

        let bfv = BfvParametersBuilder::new()
            .set_degree(degree)
            .set_plaintext_modulus(plaintext_modulus)
            .set_moduli(moduli)
            .build_arc()?;

        let fingerprint = hex::encode(Sha256::digest(&bfv.to_bytes()));

        // A slot can never hold more than t - 1 one-hot contributions
        let max_summands = max_summands.min((plaintext_modulus - 1) as usize);

        Ok(Arc::new(SchemeParameters {
            degree,
            plaintext_modulus,
            moduli: moduli.to_vec(),
            max_summands,
            bfv,
            fingerprint,
        }))
    }

    pub fn degree(&self) -> usize {
        self.degree
    }

    /// Number of SIMD slots available to a plaintext vector
    pub fn slots(&self) -> usize {
        self.degree
    }

    pub fn plaintext_modulus(&self) -> u64 {
        self.plaintext_modulus
    }

    pub fn moduli(&self) -> &[u64] {
        &self.moduli
    }

    /// Largest number of ciphertexts `homomorphic_sum` or a running
    /// `accumulate` will add together
    pub fn max_summands(&self) -> usize {
        self.max_summands
    }

    /// Hex SHA-256 of the serialized parameters. Keys and ciphertexts are
    /// only valid under the fingerprint they were made with.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub(crate) fn bfv(&self) -> &Arc<BfvParameters> {
        &self.bfv
    }
}

impl fmt::Debug for SchemeParameters {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("SchemeParameters")
            .field("degree", &self.degree)
            .field("plaintext_modulus", &self.plaintext_modulus)
            .field("moduli", &self.moduli)
            .field("max_summands", &self.max_summands)
            .field("fingerprint", &self.fingerprint)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_parameters() {
        let params = SchemeParameters::new().unwrap();
        assert_eq!(params.slots(), 4096);
        assert_eq!(params.plaintext_modulus(), DEFAULT_PLAINTEXT_MODULUS);
        assert_eq!(params.max_summands(), DEFAULT_MAX_SUMMANDS);
        assert_eq!(params.fingerprint().len(), 64);

        // Same parameters, same fingerprint
        let again = SchemeParameters::new().unwrap();
        assert_eq!(params.fingerprint(), again.fingerprint());
    }

    #[test]
    fn test_summand_cap_is_bounded_by_plaintext_modulus() {
        let params = SchemeParameters::with_max_summands(usize::MAX).unwrap();
        assert_eq!(
            params.max_summands(),
            (DEFAULT_PLAINTEXT_MODULUS - 1) as usize
        );

        assert!(SchemeParameters::with_max_summands(0).is_err());
    }
}
