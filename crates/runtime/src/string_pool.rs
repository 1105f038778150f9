//! Encrypted string pool (spec §4.2).
//!
//! A single growing byte arena holds every interned string. Each entry is
//! ChaCha20-encrypted in place the moment it is appended, with its own
//! freshly generated (key, nonce) pair. Nothing is ever decrypted at
//! compile time — decryption only happens in the emitted program, lazily,
//! the first time a given offset is touched.
//!
//! ## Layout
//!
//! ```text
//! pool:      [ ciphertext0 | ciphertext1 | ciphertext2 | ... ]
//!              ^offset0      ^offset1      ^offset2
//! decrypted: [ false, false, ..., false ]   (one flag per byte range)
//! ```
//!
//! Appending is monotonic, so offsets never alias and decrypting one entry
//! can never partially overlap another (spec §3 invariant).

use std::collections::HashMap;

use chacha20::ChaCha20;
use chacha20::cipher::{KeyIvInit, StreamCipher};
use rand::RngCore;
use rand::rngs::OsRng;

/// The fixed mask applied to handles returned by [`StringPool::intern`], so
/// that source-level decimals never reveal raw pool offsets (spec §6).
pub const HANDLE_MASK: u64 = 0xAD9CF0;

/// Per-position XOR mask applied to the emitted (key, nonce) literal bytes,
/// reversed by [`decode_key`]/[`decode_nonce`] at runtime. This keeps the
/// encryption keys themselves from sitting as plaintext literals in the
/// generated source.
const KEY_OBFUSCATION_MASK: u8 = 0x5A;

#[derive(Debug, Clone)]
pub struct StringEntry {
    pub offset: usize,
    pub length: usize,
    pub key: [u8; 32],
    pub nonce: [u8; 12],
}

#[derive(Debug)]
pub struct StringPool {
    pool: Vec<u8>,
    /// One flag per byte offset the pool has ever held; an entry is
    /// decrypted once its first byte's flag is set.
    decrypted: Vec<bool>,
    entries: Vec<StringEntry>,
    /// Dedup map: identical text always returns the same handle.
    by_text: HashMap<String, u64>,
    obfuscate: bool,
}

impl Default for StringPool {
    fn default() -> Self {
        Self::new()
    }
}

impl StringPool {
    pub fn new() -> Self {
        StringPool {
            pool: Vec::new(),
            decrypted: Vec::new(),
            entries: Vec::new(),
            by_text: HashMap::new(),
            obfuscate: true,
        }
    }

    /// Reset all state between archive classes (spec §4.1 "reset operation
    /// zeroes all four kinds" generalizes to every per-archive pool).
    /// When `obfuscate_strings` is false, subsequent interns store the
    /// plaintext bytes directly and mark them pre-decrypted.
    pub fn reset(&mut self, obfuscate_strings: bool) {
        self.pool.clear();
        self.decrypted.clear();
        self.entries.clear();
        self.by_text.clear();
        self.obfuscate = obfuscate_strings;
    }

    /// Intern `text`, returning a stable masked handle. Duplicate strings
    /// return the same handle (spec §8 round-trip law).
    pub fn intern(&mut self, text: &str) -> u64 {
        if let Some(&handle) = self.by_text.get(text) {
            return handle;
        }

        let offset = self.pool.len();
        let bytes = text.as_bytes();
        let length = bytes.len();

        let (key, nonce) = if self.obfuscate {
            let mut key = [0u8; 32];
            let mut nonce = [0u8; 12];
            OsRng.fill_bytes(&mut key);
            OsRng.fill_bytes(&mut nonce);
            (key, nonce)
        } else {
            ([0u8; 32], [0u8; 12])
        };

        self.pool.extend_from_slice(bytes);
        self.decrypted.resize(self.pool.len(), !self.obfuscate);

        if self.obfuscate {
            let mut cipher = ChaCha20::new((&key).into(), (&nonce).into());
            cipher.apply_keystream(&mut self.pool[offset..offset + length]);
        }

        self.entries.push(StringEntry {
            offset,
            length,
            key,
            nonce,
        });

        let handle = (offset as u64) ^ HANDLE_MASK;
        self.by_text.insert(text.to_string(), handle);
        handle
    }

    pub fn handle_to_offset(handle: u64) -> usize {
        (handle ^ HANDLE_MASK) as usize
    }

    fn entry_at_offset(&self, offset: usize) -> Option<&StringEntry> {
        self.entries.iter().find(|e| e.offset == offset)
    }

    /// Decrypt the entry at `offset` in place. Idempotent: a second call
    /// on an already-decrypted offset is a no-op (spec §8 round-trip law).
    ///
    /// Uses the 4-argument ABI spec §9 resolves as authoritative:
    /// `decrypt_string(key, nonce, offset, length)`.
    pub fn decrypt_string(&mut self, key: &[u8; 32], nonce: &[u8; 12], offset: usize, length: usize) {
        if offset >= self.decrypted.len() || self.decrypted[offset] {
            return;
        }
        let mut cipher = ChaCha20::new(key.into(), nonce.into());
        cipher.apply_keystream(&mut self.pool[offset..offset + length]);
        for flag in &mut self.decrypted[offset..offset + length] {
            *flag = true;
        }
    }

    /// Decrypt using the entry's own stored (key, nonce); a convenience for
    /// callers that have an offset but not the key/nonce pair in hand
    /// (e.g. tests, or the debug CLI's `--dump-tables`).
    pub fn decrypt_at(&mut self, offset: usize) -> Option<String> {
        let entry = self.entry_at_offset(offset)?.clone();
        self.decrypt_string(&entry.key, &entry.nonce, entry.offset, entry.length);
        std::str::from_utf8(&self.pool[entry.offset..entry.offset + entry.length])
            .ok()
            .map(|s| s.to_string())
    }

    /// Re-encrypt and clear an already-decrypted entry's plaintext from the
    /// pool (spec §4.2 `clear_string`): zeroes both the bytes and the
    /// decrypted sentinel.
    pub fn clear_string(&mut self, offset: usize, length: usize) {
        for b in &mut self.pool[offset..offset + length] {
            *b = 0;
        }
        for flag in &mut self.decrypted[offset..offset + length] {
            *flag = false;
        }
    }

    pub fn get_pool(&self) -> &[u8] {
        &self.pool
    }

    pub fn get_pool_size(&self) -> usize {
        self.pool.len()
    }

    pub fn encrypted_bytes(&self) -> &[u8] {
        &self.pool
    }

    pub fn entries(&self) -> &[StringEntry] {
        &self.entries
    }

    /// Emit the byte-array initializer and the four runtime functions as
    /// C-family source text (spec §4.2 `build`). This textual form is what
    /// ships in the generated native library; the Rust functions in this
    /// module are the executable reference semantics it must match.
    pub fn build(&self) -> String {
        let mut out = String::new();
        out.push_str("static unsigned char __nv_string_pool[] = {");
        for (i, b) in self.pool.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            out.push_str(&format!("{}", b));
        }
        out.push_str("};\n");
        out.push_str(&format!(
            "static unsigned char __nv_string_decrypted[{}];\n",
            self.pool.len().max(1)
        ));
        out.push_str(&self.build_meta_table());
        out.push_str("unsigned char *get_pool(void) { return __nv_string_pool; }\n");
        out.push_str(&format!(
            "unsigned long get_pool_size(void) {{ return {}UL; }}\n",
            self.pool.len()
        ));
        out.push_str(
            "void decode_key(unsigned char *obf, unsigned char *out, unsigned len);\n",
        );
        out.push_str(
            "void decode_nonce(unsigned char *obf, unsigned char *out, unsigned len);\n",
        );
        out.push_str(
            "void decrypt_string(unsigned char *key, unsigned char *nonce, unsigned long offset, unsigned long length);\n",
        );
        out.push_str("void clear_string(unsigned long offset, unsigned long length);\n");
        out
    }

    /// Emit the per-entry `(offset, length, key, nonce)` literal table that
    /// `decrypt_string`'s 4-argument ABI reads from at runtime. Each key and
    /// nonce byte is rendered through [`emit_obfuscated_key`]/
    /// [`emit_obfuscated_nonce`] and hex-formatted via the `hex` crate, so
    /// the real key material never sits as a plaintext literal in the
    /// generated source — `decode_key`/`decode_nonce` reverse the mask
    /// before the bytes are handed to ChaCha20.
    fn build_meta_table(&self) -> String {
        let mut out = String::new();
        out.push_str("static const struct { unsigned long offset; unsigned long length; unsigned char key[32]; unsigned char nonce[12]; } __nv_string_meta[] = {\n");
        for entry in &self.entries {
            let key = Self::emit_obfuscated_key(entry);
            let nonce = Self::emit_obfuscated_nonce(entry);
            let key_literal: Vec<String> =
                key.iter().map(|b| format!("0x{}", hex::encode([*b]))).collect();
            let nonce_literal: Vec<String> =
                nonce.iter().map(|b| format!("0x{}", hex::encode([*b]))).collect();
            out.push_str(&format!(
                "  {{ {}UL, {}UL, {{{}}}, {{{}}} }},\n",
                entry.offset,
                entry.length,
                key_literal.join(","),
                nonce_literal.join(","),
            ));
        }
        out.push_str("};\n");
        out
    }

    /// Emit the (key, nonce) literal pair for `entry`, each byte XORed
    /// against [`KEY_OBFUSCATION_MASK`], the form the generated source
    /// embeds so that [`decode_key`]/[`decode_nonce`] must run before the
    /// bytes are usable as a real ChaCha20 key/nonce.
    pub fn emit_obfuscated_key(entry: &StringEntry) -> [u8; 32] {
        let mut out = entry.key;
        for b in &mut out {
            *b ^= KEY_OBFUSCATION_MASK;
        }
        out
    }

    pub fn emit_obfuscated_nonce(entry: &StringEntry) -> [u8; 12] {
        let mut out = entry.nonce;
        for b in &mut out {
            *b ^= KEY_OBFUSCATION_MASK;
        }
        out
    }
}

/// Reverse the literal-embedding obfuscation applied by
/// [`StringPool::emit_obfuscated_key`].
pub fn decode_key(obf: &[u8; 32]) -> [u8; 32] {
    let mut out = *obf;
    for b in &mut out {
        *b ^= KEY_OBFUSCATION_MASK;
    }
    out
}

/// Reverse the literal-embedding obfuscation applied by
/// [`StringPool::emit_obfuscated_nonce`].
pub fn decode_nonce(obf: &[u8; 12]) -> [u8; 12] {
    let mut out = *obf;
    for b in &mut out {
        *b ^= KEY_OBFUSCATION_MASK;
    }
    out
}
