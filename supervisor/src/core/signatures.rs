//! Crash signatures matched against child output

/// Output fragments that indicate the bot is in trouble
pub const DEFAULT_CRASH_PATTERNS: &[&str] = &[
    "FATAL ERROR",
    "Segmentation fault",
    "out of memory",
    "ECONNREFUSED",
    "ETIMEDOUT",
    "Connection lost",
    "SyntaxError",
    "Cannot find module",
    "Cannot enqueue Query after fatal error",
];

/// A substring pattern plus whether seeing it forces a restart
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrashSignature {
    pattern: String,
    fatal: bool,
}

impl CrashSignature {
    pub fn new(pattern: impl Into<String>) -> Self {
        let pattern = pattern.into();
        let fatal = is_fatal_pattern(&pattern);
        Self { pattern, fatal }
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Fatal signatures restart the child even while it keeps running
    pub fn is_fatal(&self) -> bool {
        self.fatal
    }

    pub fn matches(&self, line: &str) -> bool {
        line.contains(&self.pattern)
    }
}

fn is_fatal_pattern(pattern: &str) -> bool {
    let lower = pattern.to_lowercase();
    lower.contains("fatal")
        || lower.contains("segmentation fault")
        || (lower.contains("enqueue") && lower.contains("after fatal error"))
}

#[derive(Debug, Clone, Default)]
pub struct SignatureSet {
    signatures: Vec<CrashSignature>,
}

impl SignatureSet {
    pub fn from_patterns<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            signatures: patterns.into_iter().map(CrashSignature::new).collect(),
        }
    }

    /// Every signature contained in `line`, in configuration order
    pub fn matching<'a>(&'a self, line: &'a str) -> impl Iterator<Item = &'a CrashSignature> + 'a {
        self.signatures.iter().filter(move |sig| sig.matches(line))
    }

    pub fn len(&self) -> usize {
        self.signatures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty()
    }
}
