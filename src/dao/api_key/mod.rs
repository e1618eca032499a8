mod api_key;
pub mod crypto;

pub use api_key::{
    ApiKeyRecord,
    count_api_keys,
    create_api_key,
    delete_api_key,
    get_api_key,
    list_api_keys,
    update_api_key,
};

pub use crypto::{CryptoError, SecretCipher, generate_key_hash, mask_secret, verify_key_integrity};
