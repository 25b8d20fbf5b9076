//! Per-encoder session state and expression evaluation contexts.
//!
//! A [`Session`] carries the strictness policy and the warnings raised while
//! encoding the current row. Expression evaluation gets an [`EvalContext`]
//! derived from it; expression defaults additionally get a [`TxnScope`] that
//! lives only for that one lookup.

use chrono::{DateTime, Utc};

use crate::config::EncoderOptions;

/// Transaction-like scope required by expression defaults.
///
/// Expressions such as `CURRENT_TIMESTAMP` read their notion of "now" from
/// here so every use within one lookup agrees.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxnScope {
    pub start_time: DateTime<Utc>,
}

impl TxnScope {
    fn begin() -> Self {
        Self {
            start_time: Utc::now(),
        }
    }
}

/// Read-only view handed to [`crate::core::Expression::eval`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvalContext {
    /// Whether lossy conversions are errors rather than warnings.
    pub strict: bool,
    txn: Option<TxnScope>,
}

impl EvalContext {
    /// The transaction scope, present only while evaluating a default.
    pub fn txn_scope(&self) -> Option<&TxnScope> {
        self.txn.as_ref()
    }
}

/// Encoder-owned session state.
#[derive(Debug, Clone)]
pub struct Session {
    strict_cast: bool,
    strict_not_null: bool,
    warnings: Vec<String>,
}

impl Session {
    pub fn new(options: &EncoderOptions) -> Self {
        Self {
            strict_cast: options.strict_cast,
            strict_not_null: options.strict_not_null,
            warnings: Vec::new(),
        }
    }

    /// Whether lossy casts fail instead of clamping or truncating.
    pub fn strict_cast(&self) -> bool {
        self.strict_cast
    }

    /// Whether a null in a `NOT NULL` column fails instead of becoming the zero value.
    pub fn strict_not_null(&self) -> bool {
        self.strict_not_null
    }

    pub fn append_warning(&mut self, warning: impl Into<String>) {
        let warning = warning.into();
        tracing::debug!(%warning, "encode warning");
        self.warnings.push(warning);
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Drop all warnings past the first `keep`.
    pub fn truncate_warnings(&mut self, keep: usize) {
        self.warnings.truncate(keep);
    }

    pub fn eval_context(&self) -> EvalContext {
        EvalContext {
            strict: self.strict_cast,
            txn: None,
        }
    }

    /// Run `f` with a context carrying a fresh transaction scope.
    ///
    /// The scope is created for this call and dropped when it returns; it is
    /// never stored on the session.
    pub fn with_txn_scope<T>(&self, f: impl FnOnce(&EvalContext) -> T) -> T {
        let ctx = EvalContext {
            strict: self.strict_cast,
            txn: Some(TxnScope::begin()),
        };
        f(&ctx)
    }
}
