//! Credential persistence inside a shared TOML secrets file.
//!
//! The store owns exactly one reserved top-level section (`[oauth]`) of the
//! secrets file; other sections written by other subsystems are preserved
//! untouched across read-modify-write cycles.

use super::{SecretPayload, StorageError, StoredCredential};
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use toml::{Table, Value};

/// Directory under the project root holding the secrets file.
pub const SECRETS_DIR: &str = ".connectors";

/// File name of the shared secrets document.
pub const SECRETS_FILE: &str = "secrets.toml";

/// Reserved top-level section owned by this store.
const OAUTH_SECTION: &str = "oauth";

/// Field holding the secret payload within a credential record.
const PAYLOAD_FIELD: &str = "credentials";

/// Envelope marker distinguishing ciphertext payloads from plaintext.
const ENCRYPTED_FLAG: &str = "_encrypted";

/// Envelope field carrying the opaque ciphertext blob.
const ENCRYPTED_DATA: &str = "_data";

/// Symmetric encryption collaborator for secret payloads.
///
/// The store never implements encryption itself; it serializes the payload
/// to JSON and hands the string to this trait. Implementations own key
/// management and algorithm choice.
pub trait TokenCipher: Send + Sync {
    fn encrypt_token(&self, plaintext: &str) -> anyhow::Result<String>;
    fn decrypt_token(&self, blob: &str) -> anyhow::Result<String>;
}

/// Durable, queryable credential storage.
///
/// Each mutating operation is a full load-modify-store cycle finished by a
/// write-to-temp-then-rename, so no partially written document survives a
/// crash mid-write. There is no cross-process locking: concurrent processes
/// mutating the same secrets file are out of contract.
///
/// When constructed without a cipher, payloads round-trip in plaintext and
/// any encrypted envelope found on disk is an unrecoverable-without-key
/// error rather than ciphertext silently returned to the caller.
pub struct CredentialStore {
    secrets_file: PathBuf,
    cipher: Option<Arc<dyn TokenCipher>>,
}

impl CredentialStore {
    /// Creates a store rooted at a project directory; the document lives at
    /// `<root>/.connectors/secrets.toml`.
    pub fn new<P: AsRef<Path>>(project_root: P, cipher: Option<Arc<dyn TokenCipher>>) -> Self {
        let secrets_file = project_root.as_ref().join(SECRETS_DIR).join(SECRETS_FILE);
        Self::at_file(secrets_file, cipher)
    }

    /// Creates a store over an explicit secrets file path.
    pub fn at_file(secrets_file: PathBuf, cipher: Option<Arc<dyn TokenCipher>>) -> Self {
        Self {
            secrets_file,
            cipher,
        }
    }

    /// Path of the backing secrets file.
    pub fn secrets_file(&self) -> &Path {
        &self.secrets_file
    }

    /// Inserts or overwrites a credential keyed by `cred.name`.
    ///
    /// Creates the containing directory and file on first use. The secret
    /// payload is replaced by an encrypted envelope when a cipher is
    /// configured; all other fields are stored in plaintext.
    pub fn save(&self, cred: &StoredCredential) -> Result<(), StorageError> {
        let mut doc = self.load_document()?;

        let mut record = Value::try_from(cred)?;
        if let Some(cipher) = &self.cipher {
            let table = record
                .as_table_mut()
                .ok_or_else(|| malformed(&cred.name, "record did not serialize to a table"))?;
            let plaintext = serde_json::to_string(&cred.credentials)
                .map_err(|e| malformed(&cred.name, &e.to_string()))?;
            let blob = cipher
                .encrypt_token(&plaintext)
                .map_err(|e| crypto(&cred.name, &format!("encryption failed: {e}")))?;

            let mut envelope = Table::new();
            envelope.insert(ENCRYPTED_FLAG.to_string(), Value::Boolean(true));
            envelope.insert(ENCRYPTED_DATA.to_string(), Value::String(blob));
            table.insert(PAYLOAD_FIELD.to_string(), Value::Table(envelope));
        }

        let section = doc
            .entry(OAUTH_SECTION)
            .or_insert_with(|| Value::Table(Table::new()));
        let section = section.as_table_mut().ok_or_else(|| {
            malformed(OAUTH_SECTION, "reserved oauth section is not a table")
        })?;
        section.insert(cred.name.clone(), record);

        self.store_document(&doc)?;
        tracing::debug!(credential = %cred.name, provider = %cred.provider, "credential saved");
        Ok(())
    }

    /// Looks up a credential by name.
    ///
    /// Returns `Ok(None)` when the file, section, or entry is absent;
    /// decryption and deserialization problems are errors.
    pub fn get(&self, name: &str) -> Result<Option<StoredCredential>, StorageError> {
        let doc = self.load_document()?;
        let entry = match doc.get(OAUTH_SECTION).and_then(|s| s.get(name)) {
            Some(entry) => entry,
            None => return Ok(None),
        };
        self.decode_record(name, entry).map(Some)
    }

    /// Lists stored credentials, optionally filtered by provider tag.
    ///
    /// An entry that fails to decrypt or deserialize is skipped with a
    /// warning so one corrupt entry never hides the rest of the store.
    pub fn list(&self, provider: Option<&str>) -> Result<Vec<StoredCredential>, StorageError> {
        let doc = self.load_document()?;
        let section = match doc.get(OAUTH_SECTION).and_then(|s| s.as_table()) {
            Some(section) => section,
            None => return Ok(Vec::new()),
        };

        let mut credentials = Vec::new();
        for (name, entry) in section {
            if let Some(filter) = provider {
                if entry.get("provider").and_then(|p| p.as_str()) != Some(filter) {
                    continue;
                }
            }
            match self.decode_record(name, entry) {
                Ok(cred) => credentials.push(cred),
                Err(e) => {
                    tracing::warn!(credential = %name, error = %e, "skipping unreadable credential");
                }
            }
        }
        Ok(credentials)
    }

    /// Removes a credential by name.
    ///
    /// Returns `Ok(false)` if the entry was absent. The reserved section is
    /// dropped from the document entirely once its last entry is removed.
    pub fn delete(&self, name: &str) -> Result<bool, StorageError> {
        let mut doc = self.load_document()?;
        let section = match doc.get_mut(OAUTH_SECTION).and_then(|s| s.as_table_mut()) {
            Some(section) => section,
            None => return Ok(false),
        };

        if section.remove(name).is_none() {
            return Ok(false);
        }
        if section.is_empty() {
            doc.remove(OAUTH_SECTION);
        }

        self.store_document(&doc)?;
        tracing::debug!(credential = %name, "credential deleted");
        Ok(true)
    }

    /// Stamps `last_used = now` on a credential.
    ///
    /// Returns `Ok(false)` if no credential with that name exists.
    pub fn update_last_used(&self, name: &str) -> Result<bool, StorageError> {
        let mut cred = match self.get(name)? {
            Some(cred) => cred,
            None => return Ok(false),
        };
        cred.last_used = Some(Utc::now());
        self.save(&cred)?;
        Ok(true)
    }

    /// Finds a credential by provider tag and provider-scoped identifier.
    pub fn find_by(
        &self,
        provider: &str,
        identifier: &str,
    ) -> Result<Option<StoredCredential>, StorageError> {
        let credentials = self.list(Some(provider))?;
        Ok(credentials.into_iter().find(|c| c.identifier == identifier))
    }

    /// Loads the whole secrets document; a missing or empty file reads as an
    /// empty document.
    fn load_document(&self) -> Result<Table, StorageError> {
        if !self.secrets_file.exists() {
            return Ok(Table::new());
        }
        let content = std::fs::read_to_string(&self.secrets_file)?;
        if content.trim().is_empty() {
            return Ok(Table::new());
        }
        Ok(content.parse::<Table>()?)
    }

    /// Writes the whole document back atomically: serialize to a sibling
    /// temp file, then rename over the target.
    fn store_document(&self, doc: &Table) -> Result<(), StorageError> {
        if let Some(parent) = self.secrets_file.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let rendered = toml::to_string_pretty(doc)?;
        let tmp = self.secrets_file.with_extension("toml.tmp");
        std::fs::write(&tmp, rendered)?;
        std::fs::rename(&tmp, &self.secrets_file)?;
        Ok(())
    }

    /// Turns a raw TOML record into a [`StoredCredential`], unwrapping the
    /// encrypted envelope when present.
    fn decode_record(&self, name: &str, entry: &Value) -> Result<StoredCredential, StorageError> {
        let mut record = entry.clone();
        let table = record
            .as_table_mut()
            .ok_or_else(|| malformed(name, "entry is not a table"))?;

        let is_encrypted = table
            .get(PAYLOAD_FIELD)
            .and_then(|p| p.get(ENCRYPTED_FLAG))
            .and_then(|f| f.as_bool())
            .unwrap_or(false);

        if is_encrypted {
            let cipher = self.cipher.as_ref().ok_or_else(|| {
                crypto(name, "payload is encrypted but encryption is disabled")
            })?;
            let blob = table
                .get(PAYLOAD_FIELD)
                .and_then(|p| p.get(ENCRYPTED_DATA))
                .and_then(|d| d.as_str())
                .ok_or_else(|| malformed(name, "encrypted envelope is missing _data"))?
                .to_string();
            let plaintext = cipher
                .decrypt_token(&blob)
                .map_err(|e| crypto(name, &format!("decryption failed: {e}")))?;
            let payload: SecretPayload = serde_json::from_str(&plaintext)
                .map_err(|e| malformed(name, &format!("decrypted payload is not a map: {e}")))?;
            let payload = Value::try_from(payload)?;
            table.insert(PAYLOAD_FIELD.to_string(), payload);
        }

        record
            .try_into::<StoredCredential>()
            .map_err(|e| malformed(name, &e.to_string()))
    }
}

fn malformed(name: &str, reason: &str) -> StorageError {
    StorageError::Malformed {
        name: name.to_string(),
        reason: reason.to_string(),
    }
}

fn crypto(name: &str, reason: &str) -> StorageError {
    StorageError::Crypto {
        name: name.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
    use chrono::{Duration, Utc};
    use tempfile::TempDir;

    /// Reversible stand-in for the real symmetric cipher.
    struct Base64Cipher;

    impl TokenCipher for Base64Cipher {
        fn encrypt_token(&self, plaintext: &str) -> anyhow::Result<String> {
            Ok(format!("enc:{}", BASE64.encode(plaintext)))
        }

        fn decrypt_token(&self, blob: &str) -> anyhow::Result<String> {
            let encoded = blob
                .strip_prefix("enc:")
                .ok_or_else(|| anyhow!("not a cipher blob"))?;
            let bytes = BASE64.decode(encoded)?;
            Ok(String::from_utf8(bytes)?)
        }
    }

    fn plain_store(dir: &TempDir) -> CredentialStore {
        CredentialStore::new(dir.path(), None)
    }

    fn encrypted_store(dir: &TempDir) -> CredentialStore {
        CredentialStore::new(dir.path(), Some(Arc::new(Base64Cipher)))
    }

    fn sample(name: &str, provider: &str, identifier: &str) -> StoredCredential {
        let mut payload = SecretPayload::new();
        payload.insert("access_token".to_string(), "tok-12345".to_string());
        payload.insert("client_secret".to_string(), "s3cret".to_string());
        StoredCredential::new(
            name.to_string(),
            provider.to_string(),
            identifier.to_string(),
            format!("{provider} account {identifier}"),
            payload,
        )
    }

    #[test]
    fn test_save_and_get_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = encrypted_store(&dir);
        let mut cred = sample("google_alice_example_com", "google", "alice@example.com");
        cred.expires_at = Some(Utc::now() + Duration::days(59));

        store.save(&cred).unwrap();
        let back = store.get("google_alice_example_com").unwrap().unwrap();

        assert_eq!(back.name, cred.name);
        assert_eq!(back.provider, cred.provider);
        assert_eq!(back.identifier, cred.identifier);
        assert_eq!(back.credentials, cred.credentials);
        assert_eq!(back.created_at, cred.created_at);
        assert_eq!(back.expires_at, cred.expires_at);
        assert!(!back.is_expiring_soon(7));
    }

    #[test]
    fn test_get_absent_returns_none() {
        let dir = TempDir::new().unwrap();
        let store = plain_store(&dir);

        // No file at all
        assert!(store.get("google_alice").unwrap().is_none());

        // File exists, entry does not
        store.save(&sample("shopify_s1", "shopify", "s1")).unwrap();
        assert!(store.get("google_alice").unwrap().is_none());
    }

    #[test]
    fn test_save_is_upsert() {
        let dir = TempDir::new().unwrap();
        let store = plain_store(&dir);

        let mut cred = sample("google_alice", "google", "alice@example.com");
        store.save(&cred).unwrap();

        cred.credentials
            .insert("refresh_token".to_string(), "1//new".to_string());
        store.save(&cred).unwrap();

        let all = store.list(None).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(
            all[0].credentials.get("refresh_token"),
            Some(&"1//new".to_string())
        );
    }

    #[test]
    fn test_secret_payload_is_not_plaintext_on_disk() {
        let dir = TempDir::new().unwrap();
        let store = encrypted_store(&dir);
        store
            .save(&sample("google_alice", "google", "alice@example.com"))
            .unwrap();

        let on_disk = std::fs::read_to_string(store.secrets_file()).unwrap();
        assert!(!on_disk.contains("tok-12345"));
        assert!(!on_disk.contains("s3cret"));
        assert!(on_disk.contains("_encrypted"));
        assert!(on_disk.contains("_data"));

        // Non-secret metadata stays readable
        assert!(on_disk.contains("alice@example.com"));
    }

    #[test]
    fn test_encrypted_entry_without_cipher_is_an_error() {
        let dir = TempDir::new().unwrap();
        encrypted_store(&dir)
            .save(&sample("google_alice", "google", "alice@example.com"))
            .unwrap();

        let store = plain_store(&dir);
        let err = store.get("google_alice").unwrap_err();
        assert!(matches!(err, StorageError::Crypto { .. }));
    }

    #[test]
    fn test_delete_absent_returns_false_and_preserves_store() {
        let dir = TempDir::new().unwrap();
        let store = plain_store(&dir);
        store.save(&sample("shopify_s1", "shopify", "s1")).unwrap();

        assert!(!store.delete("google_missing").unwrap());
        assert_eq!(store.list(None).unwrap().len(), 1);
    }

    #[test]
    fn test_delete_removes_empty_section_only() {
        let dir = TempDir::new().unwrap();
        let store = plain_store(&dir);

        // Another subsystem's section must survive our writes
        std::fs::create_dir_all(store.secrets_file().parent().unwrap()).unwrap();
        std::fs::write(store.secrets_file(), "[destination]\napi_key = \"k\"\n").unwrap();

        store.save(&sample("shopify_s1", "shopify", "s1")).unwrap();
        assert!(store.delete("shopify_s1").unwrap());

        let on_disk = std::fs::read_to_string(store.secrets_file()).unwrap();
        assert!(!on_disk.contains("[oauth]"));
        assert!(on_disk.contains("[destination]"));
    }

    #[test]
    fn test_list_filters_by_provider() {
        let dir = TempDir::new().unwrap();
        let store = plain_store(&dir);
        store.save(&sample("google_a", "google", "a@x.com")).unwrap();
        store.save(&sample("shopify_s1", "shopify", "s1")).unwrap();
        store.save(&sample("shopify_s2", "shopify", "s2")).unwrap();

        let shopify = store.list(Some("shopify")).unwrap();
        assert_eq!(shopify.len(), 2);
        assert!(shopify.iter().all(|c| c.provider == "shopify"));

        assert_eq!(store.list(None).unwrap().len(), 3);
    }

    #[test]
    fn test_list_skips_unreadable_entries() {
        let dir = TempDir::new().unwrap();
        let store = encrypted_store(&dir);
        store.save(&sample("shopify_s1", "shopify", "s1")).unwrap();
        store.save(&sample("shopify_s2", "shopify", "s2")).unwrap();

        // Corrupt one entry's ciphertext in place
        let content = std::fs::read_to_string(store.secrets_file()).unwrap();
        let mut doc: Table = content.parse().unwrap();
        let entry = doc
            .get_mut("oauth")
            .and_then(|s| s.get_mut("shopify_s1"))
            .and_then(|e| e.get_mut("credentials"))
            .and_then(|c| c.as_table_mut())
            .unwrap();
        entry.insert("_data".to_string(), Value::String("enc:!!!!".to_string()));
        std::fs::write(store.secrets_file(), toml::to_string_pretty(&doc).unwrap()).unwrap();

        let listed = store.list(Some("shopify")).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "shopify_s2");
    }

    #[test]
    fn test_update_last_used() {
        let dir = TempDir::new().unwrap();
        let store = plain_store(&dir);
        let cred = sample("google_a", "google", "a@x.com");
        store.save(&cred).unwrap();
        assert!(cred.last_used.is_none());

        assert!(store.update_last_used("google_a").unwrap());
        let back = store.get("google_a").unwrap().unwrap();
        assert!(back.last_used.is_some());
        assert_eq!(back.created_at, cred.created_at);

        assert!(!store.update_last_used("google_missing").unwrap());
    }

    #[test]
    fn test_find_by_provider_and_identifier() {
        let dir = TempDir::new().unwrap();
        let store = plain_store(&dir);
        store.save(&sample("google_a", "google", "a@x.com")).unwrap();
        store.save(&sample("google_b", "google", "b@x.com")).unwrap();

        let found = store.find_by("google", "b@x.com").unwrap().unwrap();
        assert_eq!(found.name, "google_b");

        assert!(store.find_by("google", "c@x.com").unwrap().is_none());
        assert!(store.find_by("shopify", "a@x.com").unwrap().is_none());
    }

    #[test]
    fn test_no_temp_file_left_behind() {
        let dir = TempDir::new().unwrap();
        let store = plain_store(&dir);
        store.save(&sample("google_a", "google", "a@x.com")).unwrap();

        let tmp = store.secrets_file().with_extension("toml.tmp");
        assert!(!tmp.exists());
        assert!(store.secrets_file().exists());
    }
}
