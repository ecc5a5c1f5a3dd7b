/// Hex-encoded SHA-256 digest of a request's canonical form.
pub type Fingerprint = String;

/// Logical provider name from the configuration ("fast-remote", "local", ...).
pub type ProviderName = String;
