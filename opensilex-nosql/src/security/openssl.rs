//! OpenSSL decryption of credentials files.
//!
//! The decrypted password is read from the child's stdout into a zeroizing
//! buffer. The child process is owned by a guard which kills and reaps it
//! if it is still running when the guard goes out of scope.

use crate::error::NoSqlError;
use std::ffi::OsString;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use zeroize::Zeroizing;

/// `openssl enc -d` invocation for one encrypted credentials file.
#[derive(Debug, Clone)]
pub struct OpensslDecryption {
    openssl_path: PathBuf,
    cipher: String,
    digest: String,
    key_path: PathBuf,
    pbkdf2_iterations: Option<u32>,
}

impl OpensslDecryption {
    /// Creates a decryption with the given cipher, digest and passphrase file.
    pub fn new(
        openssl_path: impl Into<PathBuf>,
        cipher: impl Into<String>,
        digest: impl Into<String>,
        key_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            openssl_path: openssl_path.into(),
            cipher: cipher.into(),
            digest: digest.into(),
            key_path: key_path.into(),
            pbkdf2_iterations: None,
        }
    }

    /// Builder method to enable `-pbkdf2 -iter <iterations>`.
    pub fn with_pbkdf2_iterations(mut self, iterations: Option<u32>) -> Self {
        self.pbkdf2_iterations = iterations;
        self
    }

    /// Passphrase file handed to OpenSSL.
    pub fn key_path(&self) -> &Path {
        &self.key_path
    }

    /// Command line arguments for decrypting `input`.
    ///
    /// The passphrase is passed by file reference, never on the command line.
    pub fn arguments(&self, input: &Path) -> Vec<OsString> {
        let mut pass = OsString::from("file:");
        pass.push(&self.key_path);

        let mut args: Vec<OsString> = vec![
            "enc".into(),
            "-d".into(),
            format!("-{}", self.cipher).into(),
            "-md".into(),
            self.digest.clone().into(),
            "-pass".into(),
            pass,
            "-salt".into(),
        ];
        if let Some(iterations) = self.pbkdf2_iterations {
            args.push("-pbkdf2".into());
            args.push("-iter".into());
            args.push(iterations.to_string().into());
        }
        args.push("-in".into());
        args.push(input.as_os_str().to_owned());
        args
    }

    /// Decrypts `input` and returns its plaintext.
    ///
    /// Blocks until the child exits; call from a blocking context.
    ///
    /// # Errors
    /// Returns an I/O error if OpenSSL cannot be started or its output cannot
    /// be read, and a security error naming the cipher and file if OpenSSL
    /// exits with a non-zero status.
    pub fn decrypt(&self, input: &Path) -> crate::Result<Zeroizing<Vec<u8>>> {
        let child = Command::new(&self.openssl_path)
            .args(self.arguments(input))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                NoSqlError::io(
                    format!("starting {}", self.openssl_path.display()),
                    e,
                )
            })?;
        let mut process = ProcessGuard::new(child);

        let stderr = process.child.stderr.take().map(|mut pipe| {
            std::thread::spawn(move || {
                let mut text = String::new();
                let _ = pipe.read_to_string(&mut text);
                text
            })
        });

        let mut plaintext = Zeroizing::new(Vec::new());
        if let Some(stdout) = process.child.stdout.as_mut() {
            stdout
                .read_to_end(&mut plaintext)
                .map_err(|e| NoSqlError::io("reading OpenSSL output", e))?;
        }

        let status = process.wait()?;
        let diagnostics = stderr
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();

        if status.success() {
            Ok(plaintext)
        } else {
            let reason = diagnostics.lines().next().unwrap_or("no diagnostics");
            Err(NoSqlError::security(format!(
                "OpenSSL failed to decrypt {} with cipher {} ({status}): {reason}",
                input.display(),
                self.cipher,
            )))
        }
    }
}

/// Owns a child process until it has been reaped.
struct ProcessGuard {
    child: Child,
    reaped: bool,
}

impl ProcessGuard {
    fn new(child: Child) -> Self {
        Self {
            child,
            reaped: false,
        }
    }

    fn wait(&mut self) -> crate::Result<ExitStatus> {
        let status = self
            .child
            .wait()
            .map_err(|e| NoSqlError::io("waiting for OpenSSL", e))?;
        self.reaped = true;
        Ok(status)
    }
}

impl Drop for ProcessGuard {
    fn drop(&mut self) {
        if self.reaped {
            return;
        }
        if let Ok(None) = self.child.try_wait() {
            let _ = self.child.kill();
        }
        let _ = self.child.wait();
    }
}
