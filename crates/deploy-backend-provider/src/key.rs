//! Composite blob keys.
//!
//! A [`BlobKey`] addresses one object in the state bucket by
//! `(kind, app, stage)`. The object path is the three segments joined with
//! `/`. Segments are validated so that two distinct triples can never map to
//! the same path.

use std::fmt;

use deploy_backend_common::ProviderError;

/// Maximum length of a single key segment in bytes.
const MAX_SEGMENT_LEN: usize = 255;

/// Logical class of a stored object.
///
/// The set is open: [`BlobKind::Other`] carries any additional category.
/// Keys store the canonical form, so `Other("state")` and `State` address
/// the same blob and compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BlobKind {
    /// Serialized deployment state.
    State,
    /// Per-stage encryption passphrase.
    Passphrase,
    /// Any other category.
    Other(String),
}

impl BlobKind {
    /// Get the path segment for this kind.
    pub fn as_str(&self) -> &str {
        match self {
            BlobKind::State => "state",
            BlobKind::Passphrase => "passphrase",
            BlobKind::Other(kind) => kind,
        }
    }

    fn canonical(self) -> Self {
        match self {
            BlobKind::Other(kind) => BlobKind::from(kind),
            named => named,
        }
    }
}

impl fmt::Display for BlobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for BlobKind {
    fn from(kind: &str) -> Self {
        match kind {
            "state" => BlobKind::State,
            "passphrase" => BlobKind::Passphrase,
            other => BlobKind::Other(other.to_string()),
        }
    }
}

impl From<String> for BlobKind {
    fn from(kind: String) -> Self {
        match kind.as_str() {
            "state" => BlobKind::State,
            "passphrase" => BlobKind::Passphrase,
            _ => BlobKind::Other(kind),
        }
    }
}

/// Composite `(kind, app, stage)` key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BlobKey {
    kind: BlobKind,
    app: String,
    stage: String,
}

impl BlobKey {
    /// Create a validated key.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::InvalidKey`] if any segment is empty, is `.`
    /// or `..`, contains a path separator, or is longer than 255 bytes.
    pub fn new(
        kind: impl Into<BlobKind>,
        app: impl Into<String>,
        stage: impl Into<String>,
    ) -> Result<Self, ProviderError> {
        let kind = kind.into().canonical();
        let app = app.into();
        let stage = stage.into();

        validate_segment("kind", kind.as_str())?;
        validate_segment("app", &app)?;
        validate_segment("stage", &stage)?;

        Ok(Self { kind, app, stage })
    }

    /// Shorthand for a [`BlobKind::State`] key.
    ///
    /// # Errors
    ///
    /// See [`BlobKey::new`].
    pub fn state(app: impl Into<String>, stage: impl Into<String>) -> Result<Self, ProviderError> {
        Self::new(BlobKind::State, app, stage)
    }

    /// Shorthand for a [`BlobKind::Passphrase`] key.
    ///
    /// # Errors
    ///
    /// See [`BlobKey::new`].
    pub fn passphrase(
        app: impl Into<String>,
        stage: impl Into<String>,
    ) -> Result<Self, ProviderError> {
        Self::new(BlobKind::Passphrase, app, stage)
    }

    pub fn kind(&self) -> &BlobKind {
        &self.kind
    }

    pub fn app(&self) -> &str {
        &self.app
    }

    pub fn stage(&self) -> &str {
        &self.stage
    }

    /// The three segments in path order.
    pub fn segments(&self) -> [&str; 3] {
        [self.kind.as_str(), &self.app, &self.stage]
    }

    /// The object path: `<kind>/<app>/<stage>`.
    pub fn path(&self) -> String {
        self.segments().join("/")
    }
}

impl fmt::Display for BlobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.kind, self.app, self.stage)
    }
}

fn validate_segment(name: &str, value: &str) -> Result<(), ProviderError> {
    if value.is_empty() {
        return Err(ProviderError::invalid_key(format!("{name} must not be empty")));
    }
    if value == "." || value == ".." {
        return Err(ProviderError::invalid_key(format!(
            "{name} must not be '{value}'"
        )));
    }
    if value.contains('/') || value.contains('\\') {
        return Err(ProviderError::invalid_key(format!(
            "{name} must not contain path separators: {value}"
        )));
    }
    if value.len() > MAX_SEGMENT_LEN {
        return Err(ProviderError::invalid_key(format!(
            "{name} exceeds {MAX_SEGMENT_LEN} bytes"
        )));
    }
    Ok(())
}
