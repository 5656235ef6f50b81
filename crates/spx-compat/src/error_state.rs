use std::fmt::{Display, Formatter};

/// Failure category of a native short code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NativeErrorKind {
    /// The routine does not know the body, frame or code it was given.
    UnrecognizedIdentifier,
    /// The lookup itself was valid but produced no result.
    NotFound,
    InvalidValue,
    Io,
    Memory,
    ZeroDivision,
    Index,
    Runtime,
}

const SHORT_CODE_KINDS: &[(&str, NativeErrorKind)] = &[
    ("SPICE(IDCODENOTFOUND)", NativeErrorKind::UnrecognizedIdentifier),
    ("SPICE(BODYIDNOTFOUND)", NativeErrorKind::UnrecognizedIdentifier),
    ("SPICE(BODYNAMENOTFOUND)", NativeErrorKind::UnrecognizedIdentifier),
    ("SPICE(NOTRANSLATION)", NativeErrorKind::UnrecognizedIdentifier),
    ("SPICE(FRAMEIDNOTFOUND)", NativeErrorKind::UnrecognizedIdentifier),
    ("SPICE(FRAMENAMENOTFOUND)", NativeErrorKind::UnrecognizedIdentifier),
    ("SPICE(UNKNOWNFRAME)", NativeErrorKind::UnrecognizedIdentifier),
    ("SPICE(NOFRAME)", NativeErrorKind::UnrecognizedIdentifier),
    ("SPICE(NOTFOUND)", NativeErrorKind::NotFound),
    ("SPICE(KERNELVARNOTFOUND)", NativeErrorKind::NotFound),
    ("SPICE(SPKINSUFFDATA)", NativeErrorKind::NotFound),
    ("SPICE(CKINSUFFDATA)", NativeErrorKind::NotFound),
    ("SPICE(INVALIDVALUE)", NativeErrorKind::InvalidValue),
    ("SPICE(INVALIDARGUMENT)", NativeErrorKind::InvalidValue),
    ("SPICE(BADDIMENSION)", NativeErrorKind::InvalidValue),
    ("SPICE(ZEROVECTOR)", NativeErrorKind::InvalidValue),
    ("SPICE(VALUEOUTOFRANGE)", NativeErrorKind::InvalidValue),
    ("SPICE(NOSUCHFILE)", NativeErrorKind::Io),
    ("SPICE(FILEOPENFAILED)", NativeErrorKind::Io),
    ("SPICE(FILEREADFAILED)", NativeErrorKind::Io),
    ("SPICE(MALLOCFAILED)", NativeErrorKind::Memory),
    ("SPICE(MALLOCFAILURE)", NativeErrorKind::Memory),
    ("SPICE(DIVIDEBYZERO)", NativeErrorKind::ZeroDivision),
    ("SPICE(INDEXOUTOFRANGE)", NativeErrorKind::Index),
    ("SPICE(BADINDEX)", NativeErrorKind::Index),
];

/// Maps a short code to its category; unknown codes are runtime failures.
pub fn classify_short_code(short: &str) -> NativeErrorKind {
    let short = short.trim();
    SHORT_CODE_KINDS
        .iter()
        .find(|(code, _)| code.eq_ignore_ascii_case(short))
        .map(|(_, kind)| *kind)
        .unwrap_or(NativeErrorKind::Runtime)
}

/// A failure signalled by a native routine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeError {
    pub short: String,
    pub long: String,
    /// Routines active when the failure was signalled, outermost first.
    pub traceback: Vec<String>,
}

impl NativeError {
    pub fn kind(&self) -> NativeErrorKind {
        classify_short_code(&self.short)
    }

    pub fn is_unrecognized_identifier(&self) -> bool {
        self.kind() == NativeErrorKind::UnrecognizedIdentifier
    }

    /// Failures that flag-mode routines report through their found-flag.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self.kind(),
            NativeErrorKind::NotFound | NativeErrorKind::UnrecognizedIdentifier
        )
    }
}

impl Display for NativeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.short)?;
        if !self.long.is_empty() {
            write!(f, " -- {}", self.long)?;
        }
        if !self.traceback.is_empty() {
            write!(f, " [{}]", self.traceback.join(" --> "))?;
        }
        Ok(())
    }
}

impl std::error::Error for NativeError {}

/// Process-wide failure state of the native library.
///
/// Only the first signal is kept until the state is taken or reset.
#[derive(Debug, Default)]
pub struct ErrorState {
    trace: Vec<String>,
    pending: Option<NativeError>,
}

impl ErrorState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signal(&mut self, short: impl Into<String>, long: impl Into<String>) {
        if self.pending.is_some() {
            return;
        }
        self.pending = Some(NativeError {
            short: short.into(),
            long: long.into(),
            traceback: self.trace.clone(),
        });
    }

    pub fn failed(&self) -> bool {
        self.pending.is_some()
    }

    pub fn pending(&self) -> Option<&NativeError> {
        self.pending.as_ref()
    }

    /// Removes and returns the pending failure, leaving the state clean.
    pub fn take(&mut self) -> Option<NativeError> {
        self.pending.take()
    }

    pub fn reset(&mut self) {
        self.pending = None;
        self.trace.clear();
    }

    pub fn trace(&self) -> &[String] {
        &self.trace
    }

    pub(crate) fn check_in(&mut self, routine: &str) {
        self.trace.push(routine.to_string());
    }

    pub(crate) fn check_out(&mut self) {
        self.trace.pop();
    }
}
