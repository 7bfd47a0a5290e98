use std::collections::BTreeMap;
use std::fmt;

/// Outcome category of a plugin invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Code {
    Success,
    /// Internal failure of the plugin, not a verdict about the node
    Error,
    /// The node does not fit, but evicting pods might change that
    Unschedulable,
    /// The node does not fit and preemption cannot help
    UnschedulableAndUnresolvable,
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Code::Success => "Success",
            Code::Error => "Error",
            Code::Unschedulable => "Unschedulable",
            Code::UnschedulableAndUnresolvable => "UnschedulableAndUnresolvable",
        };
        f.write_str(s)
    }
}

/// Result of running a plugin: a code plus human readable reasons
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    code: Code,
    reasons: Vec<String>,
}

impl Status {
    pub fn success() -> Self {
        Self {
            code: Code::Success,
            reasons: Vec::new(),
        }
    }

    pub fn new(code: Code, reason: impl Into<String>) -> Self {
        Self {
            code,
            reasons: vec![reason.into()],
        }
    }

    pub fn with_reasons(code: Code, reasons: Vec<String>) -> Self {
        Self { code, reasons }
    }

    pub fn error(reason: impl Into<String>) -> Self {
        Self::new(Code::Error, reason)
    }

    pub fn unschedulable(reason: impl Into<String>) -> Self {
        Self::new(Code::Unschedulable, reason)
    }

    pub fn unresolvable(reason: impl Into<String>) -> Self {
        Self::new(Code::UnschedulableAndUnresolvable, reason)
    }

    pub fn code(&self) -> Code {
        self.code
    }

    pub fn reasons(&self) -> &[String] {
        &self.reasons
    }

    /// Reasons joined with ", "
    pub fn message(&self) -> String {
        self.reasons.join(", ")
    }

    pub fn is_success(&self) -> bool {
        self.code == Code::Success
    }

    /// True for both unschedulable codes
    pub fn is_unschedulable(&self) -> bool {
        matches!(
            self.code,
            Code::Unschedulable | Code::UnschedulableAndUnresolvable
        )
    }

    pub fn append_reason(&mut self, reason: impl Into<String>) {
        self.reasons.push(reason.into());
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.reasons.is_empty() {
            write!(f, "{}", self.code)
        } else {
            write!(f, "{}: {}", self.code, self.message())
        }
    }
}

/// Non-success statuses keyed by the plugin that produced them.
///
/// An empty map means every plugin accepted the node.
pub type PluginToStatus = BTreeMap<String, Status>;

/// Collapse per-plugin statuses into a single status.
///
/// `Error` dominates; otherwise `UnschedulableAndUnresolvable` dominates
/// `Unschedulable`. Reasons of every entry are kept.
pub fn merge_statuses(statuses: &PluginToStatus) -> Status {
    if statuses.is_empty() {
        return Status::success();
    }

    let mut final_code = Code::Success;
    let mut reasons = Vec::new();
    for status in statuses.values() {
        let code = status.code();
        if code == Code::Error {
            final_code = Code::Error;
        } else if code == Code::UnschedulableAndUnresolvable && final_code != Code::Error {
            final_code = code;
        } else if code == Code::Unschedulable && final_code == Code::Success {
            final_code = code;
        }
        reasons.extend(status.reasons().iter().cloned());
    }

    Status::with_reasons(final_code, reasons)
}
