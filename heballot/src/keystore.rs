use crate::*;
use fhe::bfv::{PublicKey, SecretKey};
use fhe_traits::{DeserializeParametrized, Serialize as FheSerialize};
use fs2::FileExt;
use once_cell::sync::OnceCell;
use rand::rngs::OsRng;
use rand::RngCore;
use rand_chacha::ChaCha20Rng;
use rand_core::SeedableRng;
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

pub const PUBLIC_KEY_BLOB: &str = "publicKey";
pub const SECRET_KEY_BLOB: &str = "secretKey";
pub const PARAMETERS_BLOB: &str = "parameters";

const SEED_LEN: usize = 32;

/// Opaque blob persistence for key material
pub trait BlobStore: Send + Sync {
    /// Guard that serializes key generation across every user of the store
    type Lock;

    fn read(&self, name: &str) -> std::io::Result<Option<Vec<u8>>>;
    fn write(&self, name: &str, bytes: &[u8]) -> std::io::Result<()>;
    fn lock(&self) -> std::io::Result<Self::Lock>;
}

/// Blobs stored as files in one directory.
///
/// Generation is serialized between processes with an exclusive lock on
/// `.keygen.lock`; the lock is released when the guard is dropped.
pub struct DirBlobStore {
    dir: PathBuf,
}

impl DirBlobStore {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        DirBlobStore {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl BlobStore for DirBlobStore {
    type Lock = File;

    fn read(&self, name: &str) -> std::io::Result<Option<Vec<u8>>> {
        match fs::read(self.dir.join(name)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn write(&self, name: &str, bytes: &[u8]) -> std::io::Result<()> {
        fs::create_dir_all(&self.dir)?;
        let tmp = self.dir.join(format!(".{}.tmp", name));
        {
            let mut file = File::create(&tmp)?;
            file.write_all(bytes)?;
            file.sync_all()?;
        }
        fs::rename(tmp, self.dir.join(name))
    }

    fn lock(&self) -> std::io::Result<File> {
        fs::create_dir_all(&self.dir)?;
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .open(self.dir.join(".keygen.lock"))?;
        file.lock_exclusive()?;
        Ok(file)
    }
}

/// In-memory blob store
#[derive(Default)]
pub struct MemBlobStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
    generation: Mutex<()>,
}

impl MemBlobStore {
    fn blobs(&self) -> std::io::Result<MutexGuard<'_, HashMap<String, Vec<u8>>>> {
        self.blobs
            .lock()
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::Other, "blob store poisoned"))
    }
}

impl<'a> BlobStore for &'a MemBlobStore {
    type Lock = MutexGuard<'a, ()>;

    fn read(&self, name: &str) -> std::io::Result<Option<Vec<u8>>> {
        Ok(self.blobs()?.get(name).cloned())
    }

    fn write(&self, name: &str, bytes: &[u8]) -> std::io::Result<()> {
        self.blobs()?.insert(name.to_owned(), bytes.to_vec());
        Ok(())
    }

    fn lock(&self) -> std::io::Result<MutexGuard<'a, ()>> {
        self.generation
            .lock()
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::Other, "blob store poisoned"))
    }
}

impl BlobStore for MemBlobStore {
    type Lock = ();

    fn read(&self, name: &str) -> std::io::Result<Option<Vec<u8>>> {
        Ok(self.blobs()?.get(name).cloned())
    }

    fn write(&self, name: &str, bytes: &[u8]) -> std::io::Result<()> {
        self.blobs()?.insert(name.to_owned(), bytes.to_vec());
        Ok(())
    }

    /// An owned `MemBlobStore` is only reachable through its `KeyStore`, whose
    /// own cell already serializes generation.
    fn lock(&self) -> std::io::Result<()> {
        Ok(())
    }
}

/// The BFV key pair together with the blobs it was loaded from
pub struct KeyPair {
    public_key: PublicKey,
    secret_key: SecretKey,
    public_blob: Vec<u8>,
    secret_blob: Vec<u8>,
}

impl KeyPair {
    fn generate(params: &SchemeParameters) -> Self {
        let mut seed = [0u8; SEED_LEN];
        OsRng.fill_bytes(&mut seed);

        let secret_key = derive_secret_key(params, &seed);
        let public_key = PublicKey::new(&secret_key, &mut OsRng);
        let public_blob = public_key.to_bytes();

        KeyPair {
            public_key,
            secret_key,
            public_blob,
            secret_blob: seed.to_vec(),
        }
    }

    fn from_blobs(
        params: &SchemeParameters,
        public_blob: Vec<u8>,
        secret_blob: Vec<u8>,
    ) -> Result<Self, CryptoError> {
        if secret_blob.len() != SEED_LEN {
            return Err(CryptoError::KeyUnavailable(format!(
                "secret key blob has length {}, expected {}",
                secret_blob.len(),
                SEED_LEN
            )));
        }
        let mut seed = [0u8; SEED_LEN];
        seed.copy_from_slice(&secret_blob);

        let public_key = PublicKey::from_bytes(&public_blob, params.bfv())
            .map_err(|e| CryptoError::KeyUnavailable(format!("corrupt public key: {}", e)))?;
        let secret_key = derive_secret_key(params, &seed);

        Ok(KeyPair {
            public_key,
            secret_key,
            public_blob,
            secret_blob,
        })
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    pub fn secret_key(&self) -> &SecretKey {
        &self.secret_key
    }

    /// Serialized public key, as persisted
    pub fn public_bytes(&self) -> &[u8] {
        &self.public_blob
    }

    /// Serialized secret key material, as persisted
    pub fn secret_bytes(&self) -> &[u8] {
        &self.secret_blob
    }
}

/// The secret key is sampled from a ChaCha20 stream keyed by the persisted seed
fn derive_secret_key(params: &SchemeParameters, seed: &[u8; SEED_LEN]) -> SecretKey {
    let mut rng = ChaCha20Rng::from_seed(*seed);
    SecretKey::random(params.bfv(), &mut rng)
}

/// Loads the process-wide key pair, generating and persisting it on first use.
pub struct KeyStore<B: BlobStore> {
    blobs: B,
    params: Arc<SchemeParameters>,
    keys: OnceCell<Arc<KeyPair>>,
}

impl<B: BlobStore> KeyStore<B> {
    pub fn new(blobs: B, params: Arc<SchemeParameters>) -> Self {
        KeyStore {
            blobs,
            params,
            keys: OnceCell::new(),
        }
    }

    pub fn params(&self) -> &Arc<SchemeParameters> {
        &self.params
    }

    /// Load the key pair for the parameter set, generating it if none exists.
    ///
    /// Idempotent: later calls return the same key material.
    pub fn ensure_keys(&self) -> Result<Arc<KeyPair>, CryptoError> {
        self.keys
            .get_or_try_init(|| self.load_or_generate().map(Arc::new))
            .map(Arc::clone)
    }

    pub fn load_public(&self) -> Result<PublicKeyHandle, CryptoError> {
        Ok(PublicKeyHandle(self.ensure_keys()?))
    }

    pub fn load_secret(&self) -> Result<SecretKeyHandle, CryptoError> {
        Ok(SecretKeyHandle(self.ensure_keys()?))
    }

    fn load_or_generate(&self) -> Result<KeyPair, CryptoError> {
        let _lock = self.blobs.lock().map_err(unavailable)?;

        match self.load()? {
            Some(keys) => {
                debug!("loaded homomorphic keys ({})", self.params.fingerprint());
                Ok(keys)
            }
            None => {
                let keys = KeyPair::generate(&self.params);
                self.blobs
                    .write(PUBLIC_KEY_BLOB, keys.public_bytes())
                    .map_err(unavailable)?;
                self.blobs
                    .write(SECRET_KEY_BLOB, keys.secret_bytes())
                    .map_err(unavailable)?;
                self.blobs
                    .write(PARAMETERS_BLOB, self.params.fingerprint().as_bytes())
                    .map_err(unavailable)?;
                info!(
                    "generated and saved homomorphic keys ({})",
                    self.params.fingerprint()
                );

                // Read back what was persisted so a broken store fails now
                self.load()?.ok_or_else(|| {
                    CryptoError::KeyUnavailable("keys missing after generation".to_owned())
                })
            }
        }
    }

    fn load(&self) -> Result<Option<KeyPair>, CryptoError> {
        let public = self.blobs.read(PUBLIC_KEY_BLOB).map_err(unavailable)?;
        let secret = self.blobs.read(SECRET_KEY_BLOB).map_err(unavailable)?;
        let params = self.blobs.read(PARAMETERS_BLOB).map_err(unavailable)?;

        match (public, secret, params) {
            (None, None, None) => Ok(None),
            (Some(public), Some(secret), Some(params)) => {
                if params != self.params.fingerprint().as_bytes() {
                    return Err(CryptoError::KeyUnavailable(
                        "stored keys were generated under different scheme parameters".to_owned(),
                    ));
                }
                KeyPair::from_blobs(&self.params, public, secret).map(Some)
            }
            _ => Err(CryptoError::KeyUnavailable(
                "key store is incomplete".to_owned(),
            )),
        }
    }
}

fn unavailable(err: std::io::Error) -> CryptoError {
    CryptoError::KeyUnavailable(err.to_string())
}

/// Shared handle to the public half of the process key pair
#[derive(Clone)]
pub struct PublicKeyHandle(Arc<KeyPair>);

impl std::ops::Deref for PublicKeyHandle {
    type Target = PublicKey;

    fn deref(&self) -> &PublicKey {
        self.0.public_key()
    }
}

/// Shared handle to the secret half of the process key pair
#[derive(Clone)]
pub struct SecretKeyHandle(Arc<KeyPair>);

impl std::ops::Deref for SecretKeyHandle {
    type Target = SecretKey;

    fn deref(&self) -> &SecretKey {
        self.0.secret_key()
    }
}
