//! Extraction diagnostics.
//!
//! [`ExtractDiagnostics`] records what happened while turning a raw model
//! answer into a typed record: which cleanup path produced the mapping,
//! whether the fallback was used, and whether structural validation
//! rejected the candidate.

/// Records what happened during one extraction.
///
/// Attached to every [`ProcessorOutput`](crate::processor::ProcessorOutput).
///
/// # Example
///
/// ```
/// use llm_extract::diagnostics::ExtractDiagnostics;
///
/// let diag = ExtractDiagnostics::default();
/// assert!(diag.ok()); // No fallback and no rejection means a clean parse
/// ```
#[derive(Debug, Clone, Default)]
pub struct ExtractDiagnostics {
    /// Which input path produced the mapping: `"text"` or `"mapping"`.
    pub strategy: Option<&'static str>,

    /// Whether the normalizer fell back to the fully-defaulted mapping.
    pub fallback: bool,

    /// Whether structural validation rejected the candidate and the full
    /// default record was substituted.
    pub structurally_rejected: bool,

    /// Error text from the failed parse or rejection, when available.
    pub parse_error: Option<String>,
}

impl ExtractDiagnostics {
    /// Quick check: was the response mapped without any recovery?
    pub fn ok(&self) -> bool {
        !self.fallback && !self.structurally_rejected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_ok() {
        let d = ExtractDiagnostics::default();
        assert!(d.ok());
        assert!(d.strategy.is_none());
        assert!(d.parse_error.is_none());
    }

    #[test]
    fn test_fallback_is_not_ok() {
        let d = ExtractDiagnostics {
            fallback: true,
            ..Default::default()
        };
        assert!(!d.ok());
    }

    #[test]
    fn test_rejection_is_not_ok() {
        let d = ExtractDiagnostics {
            structurally_rejected: true,
            ..Default::default()
        };
        assert!(!d.ok());
    }
}
