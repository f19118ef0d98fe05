/// Identifier for a queued message
///
/// Freshly queued messages get a ULID, which is collision-resistant and doubles
/// as the queue filename stem. Files dropped into the queue by other tools may
/// use any opaque stem, so parsing only rejects names that could escape the
/// queue directory or that belong to in-progress writes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueueId {
    id: String,
}

/// Suffix of every published queue file
pub const QUEUE_SUFFIX: &str = ".eml";

/// Prefix of files still being written
pub const TEMP_PREFIX: &str = ".tmp_";

impl QueueId {
    /// Generate a new unique message ID
    #[must_use]
    pub fn generate() -> Self {
        Self {
            id: ulid::Ulid::new().to_string(),
        }
    }

    /// Parse an ID from a queue filename like `01ARZ3NDEKTSV4RRFFQ69G5FAV.eml`
    ///
    /// # Security
    /// This function explicitly rejects:
    /// - Path separators (/ and \), which rules out leaving the directory
    /// - Hidden files, which covers `..` and temporary `.tmp_` files
    pub fn from_filename(filename: &str) -> Option<Self> {
        let stem = filename.strip_suffix(QUEUE_SUFFIX)?;
        Self::parse(stem)
    }

    /// Validate a bare identifier
    pub fn parse(stem: &str) -> Option<Self> {
        if stem.is_empty() || stem.starts_with('.') || stem.contains(['/', '\\']) {
            return None;
        }

        Some(Self {
            id: stem.to_string(),
        })
    }

    /// Name of the published queue file
    #[must_use]
    pub fn filename(&self) -> String {
        format!("{}{QUEUE_SUFFIX}", self.id)
    }

    /// Name of the file used while the message is being written
    #[must_use]
    pub fn temp_filename(&self) -> String {
        format!("{TEMP_PREFIX}{}", self.filename())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.id
    }
}

impl std::fmt::Display for QueueId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.id)
    }
}
