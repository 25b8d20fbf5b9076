//! Error types for the row encoder.

use thiserror::Error;

/// Coarse classification of an [`EncodeError`], stable across context layers.
///
/// Drivers match on this to decide whether a failed row is skipped, retried
/// or aborts the load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    CastFailure,
    NotNullViolation,
    DefaultValueFailure,
    GeneratedColumnFailure,
    AllocatorRebaseFailure,
    InsertFailure,
    Expression,
    Schema,
    Config,
}

/// Main error type for encoding operations.
#[derive(Error, Debug)]
pub enum EncodeError {
    /// A value could not be coerced to the column type.
    #[error("cannot convert {value} to {field_type} for column `{column}`: {reason}")]
    Cast {
        column: String,
        field_type: String,
        value: String,
        reason: String,
    },

    /// A null reached a `NOT NULL` column and no coercion applied.
    #[error("Column '{column}' cannot be null")]
    NotNull { column: String },

    /// No usable default exists, or the default expression failed.
    #[error("no usable default value for column `{column}`: {reason}")]
    DefaultValue { column: String, reason: String },

    /// A generated column expression or the cast of its result failed.
    #[error("generated column `{column}` failed: {source}")]
    GeneratedColumn {
        column: String,
        #[source]
        source: Box<EncodeError>,
    },

    /// The identifier allocator refused to move its watermark.
    #[error("failed to rebase {allocator} allocator to {base}: {reason}")]
    AllocatorRebase {
        allocator: &'static str,
        base: i64,
        reason: String,
    },

    /// The row insertion backend rejected the row.
    #[error("row insertion failed: {0}")]
    Insert(String),

    /// An expression failed to compile or evaluate.
    #[error("expression error: {0}")]
    Expression(String),

    /// Table metadata violates an encoder invariant.
    #[error("Schema error: {0}")]
    Schema(String),

    /// Configuration error (invalid YAML, out-of-range options, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error while loading configuration.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// An annotation wrapped around a lower-level error.
    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<EncodeError>,
    },
}

impl EncodeError {
    /// Create a Cast error.
    pub fn cast(
        column: impl Into<String>,
        field_type: impl ToString,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        EncodeError::Cast {
            column: column.into(),
            field_type: field_type.to_string(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// Create a DefaultValue error.
    pub fn default_value(column: impl Into<String>, reason: impl Into<String>) -> Self {
        EncodeError::DefaultValue {
            column: column.into(),
            reason: reason.into(),
        }
    }

    /// Wrap this error with an annotation.
    #[must_use]
    pub fn context(self, context: impl Into<String>) -> Self {
        EncodeError::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Classify the error, looking through annotation layers.
    pub fn kind(&self) -> ErrorKind {
        match self {
            EncodeError::Cast { .. } => ErrorKind::CastFailure,
            EncodeError::NotNull { .. } => ErrorKind::NotNullViolation,
            EncodeError::DefaultValue { .. } => ErrorKind::DefaultValueFailure,
            EncodeError::GeneratedColumn { .. } => ErrorKind::GeneratedColumnFailure,
            EncodeError::AllocatorRebase { .. } => ErrorKind::AllocatorRebaseFailure,
            EncodeError::Insert(_) => ErrorKind::InsertFailure,
            EncodeError::Expression(_) => ErrorKind::Expression,
            EncodeError::Schema(_) => ErrorKind::Schema,
            EncodeError::Config(_) | EncodeError::Io(_) | EncodeError::Yaml(_) => {
                ErrorKind::Config
            }
            EncodeError::Context { source, .. } => source.kind(),
        }
    }

    /// Annotation messages, outermost first.
    pub fn contexts(&self) -> Vec<&str> {
        let mut out = Vec::new();
        let mut current = self;
        while let EncodeError::Context { context, source } = current {
            out.push(context.as_str());
            current = source;
        }
        out
    }

    /// The innermost error beneath all annotation layers.
    pub fn root(&self) -> &EncodeError {
        match self {
            EncodeError::Context { source, .. } => source.root(),
            other => other,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for encoding operations.
pub type Result<T> = std::result::Result<T, EncodeError>;
