use crate::*;
use fhe::bfv::{Encoding, Plaintext, PublicKey, SecretKey};
use fhe_traits::{
    DeserializeParametrized, FheDecoder, FheDecrypter, FheEncoder, FheEncrypter,
    Serialize as FheSerialize,
};
use rand::rngs::OsRng;
use std::sync::Arc;

pub use fhe::bfv::Ciphertext;

/// BFV encryption, homomorphic addition and decryption of ballot vectors
/// under one fixed parameter set.
#[derive(Debug, Clone)]
pub struct HomomorphicCipher {
    params: Arc<SchemeParameters>,
}

impl HomomorphicCipher {
    pub fn new(params: Arc<SchemeParameters>) -> Self {
        HomomorphicCipher { params }
    }

    pub fn params(&self) -> &Arc<SchemeParameters> {
        &self.params
    }

    /// Encrypt a vector slot-wise (SIMD batch encoding) under the public key
    pub fn encrypt(
        &self,
        vector: &PlaintextVector,
        public_key: &PublicKey,
    ) -> Result<Ciphertext, CryptoError> {
        let slots = self.params.slots();
        if vector.len() > slots {
            return Err(CryptoError::TooManySlots {
                len: vector.len(),
                slots,
            });
        }

        let modulus = self.params.plaintext_modulus();
        if let Some((slot, value)) = vector.iter().enumerate().find(|(_, v)| **v >= modulus) {
            return Err(CryptoError::EncodingOutOfRange {
                slot,
                value: *value,
                modulus,
            });
        }

        let values: &[u64] = vector;
        let plaintext = Plaintext::try_encode(values, Encoding::simd(), self.params.bfv())?;
        let ciphertext = public_key.try_encrypt(&plaintext, &mut OsRng)?;
        Ok(ciphertext)
    }

    /// Sum ciphertexts homomorphically.
    ///
    /// Returns `None` for an empty input and the single ciphertext unchanged for
    /// an input of one. Larger inputs are folded left to right; the result
    /// does not depend on the order because the addition is exact.
    pub fn homomorphic_sum(
        &self,
        ciphertexts: &[Ciphertext],
    ) -> Result<Option<Ciphertext>, CryptoError> {
        let supported = self.params.max_summands();
        if ciphertexts.len() > supported {
            return Err(CryptoError::NoiseBudgetExhausted {
                requested: ciphertexts.len(),
                supported,
            });
        }

        let (first, rest) = match ciphertexts.split_first() {
            Some(split) => split,
            None => return Ok(None),
        };

        let mut sum = first.clone();
        for ct in rest {
            sum += ct;
        }
        Ok(Some(sum))
    }

    /// Add one more ciphertext to a running sum that already holds `summands`
    /// ciphertexts, for folding a stream without collecting it first.
    pub fn accumulate(
        &self,
        sum: &mut Option<Ciphertext>,
        summands: usize,
        ciphertext: &Ciphertext,
    ) -> Result<(), CryptoError> {
        let supported = self.params.max_summands();
        if summands >= supported {
            return Err(CryptoError::NoiseBudgetExhausted {
                requested: summands + 1,
                supported,
            });
        }

        match sum {
            Some(total) => *total += ciphertext,
            None => *sum = Some(ciphertext.clone()),
        }
        Ok(())
    }

    /// Decrypt into the full set of plaintext slots
    pub fn decrypt(
        &self,
        ciphertext: &Ciphertext,
        secret_key: &SecretKey,
    ) -> Result<PlaintextVector, CryptoError> {
        let plaintext = secret_key
            .try_decrypt(ciphertext)
            .map_err(|e| CryptoError::InvalidCiphertext(e.to_string()))?;
        let slots = Vec::<u64>::try_decode(&plaintext, Encoding::simd())
            .map_err(|e| CryptoError::InvalidCiphertext(e.to_string()))?;
        Ok(PlaintextVector::new(slots))
    }

    /// Serialize a ciphertext for storage in a ledger record
    pub fn to_base64(&self, ciphertext: &Ciphertext) -> String {
        base64::encode(ciphertext.to_bytes())
    }

    /// Parse a stored ciphertext. Bytes produced under a different parameter
    /// set are rejected here rather than at decryption time.
    pub fn from_base64(&self, encoded: &str) -> Result<Ciphertext, CryptoError> {
        let bytes = base64::decode(encoded.trim())
            .map_err(|e| CryptoError::InvalidCiphertext(format!("bad base64: {}", e)))?;
        Ciphertext::from_bytes(&bytes, self.params.bfv())
            .map_err(|e| CryptoError::InvalidCiphertext(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::seq::SliceRandom;
    use rand::Rng;

    fn setup() -> (HomomorphicCipher, Arc<KeyPair>) {
        let params = SchemeParameters::new().unwrap();
        let keys = KeyStore::new(MemBlobStore::default(), params.clone())
            .ensure_keys()
            .unwrap();
        (HomomorphicCipher::new(params), keys)
    }

    fn one_hot(len: usize, index: usize) -> PlaintextVector {
        let mut slots = vec![0; len];
        slots[index] = 1;
        PlaintextVector::new(slots)
    }

    #[test]
    fn test_round_trip() {
        let (cipher, keys) = setup();

        for index in 0..4 {
            let v = one_hot(4, index);
            let ct = cipher.encrypt(&v, keys.public_key()).unwrap();
            let mut decrypted = cipher.decrypt(&ct, keys.secret_key()).unwrap();
            assert_eq!(decrypted.len(), cipher.params().slots());
            assert!(decrypted[4..].iter().all(|s| *s == 0));
            decrypted.truncate(4);
            assert_eq!(decrypted, v);
        }
    }

    #[test]
    fn test_encryption_is_randomized() {
        let (cipher, keys) = setup();
        let v = one_hot(4, 0);
        let a = cipher.encrypt(&v, keys.public_key()).unwrap();
        let b = cipher.encrypt(&v, keys.public_key()).unwrap();
        assert_ne!(cipher.to_base64(&a), cipher.to_base64(&b));
    }

    #[test]
    fn test_homomorphic_additivity_and_order_independence() {
        let (cipher, keys) = setup();
        let mut rng = rand::thread_rng();

        let plain: Vec<PlaintextVector> = (0..25).map(|_| one_hot(4, rng.gen_range(0..4))).collect();
        let mut cts: Vec<Ciphertext> = plain
            .iter()
            .map(|v| cipher.encrypt(v, keys.public_key()).unwrap())
            .collect();

        let expected = PlaintextVector::elementwise_sum(&plain);

        let sum = cipher.homomorphic_sum(&cts).unwrap().unwrap();
        let mut decrypted = cipher.decrypt(&sum, keys.secret_key()).unwrap();
        decrypted.truncate(4);
        assert_eq!(decrypted, expected);

        cts.shuffle(&mut rng);
        let shuffled = cipher.homomorphic_sum(&cts).unwrap().unwrap();
        let mut decrypted = cipher.decrypt(&shuffled, keys.secret_key()).unwrap();
        decrypted.truncate(4);
        assert_eq!(decrypted, expected);
    }

    #[test]
    fn test_sum_of_empty_and_single() {
        let (cipher, keys) = setup();
        assert!(cipher.homomorphic_sum(&[]).unwrap().is_none());

        let ct = cipher.encrypt(&one_hot(3, 2), keys.public_key()).unwrap();
        let single = cipher.homomorphic_sum(&[ct.clone()]).unwrap().unwrap();
        assert_eq!(cipher.to_base64(&single), cipher.to_base64(&ct));
    }

    #[test]
    fn test_sum_cap() {
        let params = SchemeParameters::with_max_summands(2).unwrap();
        let keys = KeyStore::new(MemBlobStore::default(), params.clone())
            .ensure_keys()
            .unwrap();
        let cipher = HomomorphicCipher::new(params);

        let ct = cipher.encrypt(&one_hot(2, 0), keys.public_key()).unwrap();
        assert!(cipher.homomorphic_sum(&[ct.clone(), ct.clone()]).is_ok());
        match cipher.homomorphic_sum(&[ct.clone(), ct.clone(), ct]) {
            Err(CryptoError::NoiseBudgetExhausted {
                requested,
                supported,
            }) => {
                assert_eq!(requested, 3);
                assert_eq!(supported, 2);
            }
            other => panic!("expected NoiseBudgetExhausted, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_accumulate_matches_sum() {
        let params = SchemeParameters::with_max_summands(3).unwrap();
        let keys = KeyStore::new(MemBlobStore::default(), params.clone())
            .ensure_keys()
            .unwrap();
        let cipher = HomomorphicCipher::new(params);

        let cts: Vec<Ciphertext> = [0, 2, 2]
            .iter()
            .map(|i| cipher.encrypt(&one_hot(3, *i), keys.public_key()).unwrap())
            .collect();

        let mut running = None;
        for (n, ct) in cts.iter().enumerate() {
            cipher.accumulate(&mut running, n, ct).unwrap();
        }
        let mut decrypted = cipher
            .decrypt(&running.clone().unwrap(), keys.secret_key())
            .unwrap();
        decrypted.truncate(3);
        assert_eq!(&*decrypted, &[1, 0, 2]);

        assert!(matches!(
            cipher.accumulate(&mut running, 3, &cts[0]),
            Err(CryptoError::NoiseBudgetExhausted {
                requested: 4,
                supported: 3
            })
        ));
    }

    #[test]
    fn test_encoding_out_of_range() {
        let (cipher, keys) = setup();
        let modulus = cipher.params().plaintext_modulus();

        let v = PlaintextVector::new(vec![0, modulus]);
        assert!(matches!(
            cipher.encrypt(&v, keys.public_key()),
            Err(CryptoError::EncodingOutOfRange { slot: 1, .. })
        ));

        let v = PlaintextVector::new(vec![0; cipher.params().slots() + 1]);
        assert!(matches!(
            cipher.encrypt(&v, keys.public_key()),
            Err(CryptoError::TooManySlots { .. })
        ));
    }

    #[test]
    fn test_wire_format() {
        let (cipher, keys) = setup();
        let v = one_hot(4, 3);
        let ct = cipher.encrypt(&v, keys.public_key()).unwrap();

        let encoded = cipher.to_base64(&ct);
        let decoded = cipher.from_base64(&encoded).unwrap();
        let mut decrypted = cipher.decrypt(&decoded, keys.secret_key()).unwrap();
        decrypted.truncate(4);
        assert_eq!(decrypted, v);

        assert!(matches!(
            cipher.from_base64("not base64!"),
            Err(CryptoError::InvalidCiphertext(_))
        ));
        assert!(matches!(
            cipher.from_base64(&base64::encode(b"garbage bytes")),
            Err(CryptoError::InvalidCiphertext(_))
        ));
    }
}
