//! Identifier and secret generation
//!
//! All material comes from the operating system CSPRNG. The generator makes
//! no uniqueness promise; callers check the record store and regenerate.

use crate::model::{AccessKeyPair, RootCredentials, TenantId};
use rand::rngs::OsRng;
use rand::Rng;

const TENANT_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
const SECRET_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Tenant id length
pub const TENANT_ID_LEN: usize = 6;
pub const ROOT_USER_LEN: usize = 16;
pub const ROOT_PASSWORD_LEN: usize = 32;
pub const ACCESS_KEY_LEN: usize = 20;
pub const SECRET_KEY_LEN: usize = 40;

/// Source of identifiers and secrets
pub trait IdGenerator: Send + Sync {
    /// Short lowercase alphanumeric id
    fn new_tenant_id(&self) -> TenantId;

    /// Mixed-case alphanumeric secret
    fn new_secret(&self, len: usize) -> String;

    /// Root user/password for a new tenant
    fn root_credentials(&self) -> RootCredentials {
        RootCredentials {
            user: self.new_secret(ROOT_USER_LEN).to_ascii_lowercase(),
            password: self.new_secret(ROOT_PASSWORD_LEN),
        }
    }

    /// Scoped access/secret key pair
    fn access_key_pair(&self) -> AccessKeyPair {
        AccessKeyPair {
            access_key: self.new_secret(ACCESS_KEY_LEN),
            secret_key: self.new_secret(SECRET_KEY_LEN),
        }
    }
}

/// Generator backed by [`OsRng`]
#[derive(Debug, Default, Clone, Copy)]
pub struct OsRngGenerator;

impl OsRngGenerator {
    fn sample(alphabet: &[u8], len: usize) -> String {
        let mut rng = OsRng;
        (0..len)
            .map(|_| alphabet[rng.gen_range(0..alphabet.len())] as char)
            .collect()
    }
}

impl IdGenerator for OsRngGenerator {
    fn new_tenant_id(&self) -> TenantId {
        TenantId::from(Self::sample(TENANT_ALPHABET, TENANT_ID_LEN))
    }

    fn new_secret(&self, len: usize) -> String {
        Self::sample(SECRET_ALPHABET, len)
    }
}
