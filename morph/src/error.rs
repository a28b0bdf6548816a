use std::{error::Error, fmt, sync::Arc};

use crate::StorageKind;

/// Source location of the node attempting an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSection {
    pub file: Arc<str>,
    pub line: u32,
}

impl SourceSection {
    pub fn new(file: &str, line: u32) -> Self {
        Self {
            file: Arc::from(file),
            line,
        }
    }
}

impl fmt::Display for SourceSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

/// A specialized read found the location in another representation.
///
/// Internal signal: the caller falls back to a generic read and respecializes.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct RepresentationMismatch {
    pub expected: StorageKind,
    pub actual: StorageKind,
}

impl fmt::Display for RepresentationMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "expected {} representation, found {}",
            self.expected, self.actual
        )
    }
}

impl Error for RepresentationMismatch {}

/// Errors surfaced to the language as catchable exceptions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RubyError {
    FrozenModification {
        class_name: Arc<str>,
        section: Option<SourceSection>,
    },
    CannotDefineSingleton {
        class_name: Arc<str>,
        section: Option<SourceSection>,
    },
    /// Missing instance variable read with `ReadMode::ReadOrFail`.
    UndefinedProperty {
        name: Arc<str>,
        class_name: Arc<str>,
        section: Option<SourceSection>,
    },
    /// Array write at an index the array can never grow to.
    IndexTooBig {
        index: usize,
        section: Option<SourceSection>,
    },
}

pub type RubyResult<T> = Result<T, RubyError>;

impl RubyError {
    pub fn frozen(class_name: &str) -> Self {
        RubyError::FrozenModification {
            class_name: Arc::from(class_name),
            section: None,
        }
    }

    pub fn cannot_define_singleton(class_name: &str) -> Self {
        RubyError::CannotDefineSingleton {
            class_name: Arc::from(class_name),
            section: None,
        }
    }

    pub fn undefined_property(name: &str, class_name: &str) -> Self {
        RubyError::UndefinedProperty {
            name: Arc::from(name),
            class_name: Arc::from(class_name),
            section: None,
        }
    }

    pub fn index_too_big(index: usize) -> Self {
        RubyError::IndexTooBig {
            index,
            section: None,
        }
    }

    /// Attach the location of the node that attempted the operation.
    pub fn at(mut self, at: SourceSection) -> Self {
        match &mut self {
            RubyError::FrozenModification { section, .. }
            | RubyError::CannotDefineSingleton { section, .. }
            | RubyError::UndefinedProperty { section, .. }
            | RubyError::IndexTooBig { section, .. } => *section = Some(at),
        }
        self
    }

    pub fn section(&self) -> Option<&SourceSection> {
        match self {
            RubyError::FrozenModification { section, .. }
            | RubyError::CannotDefineSingleton { section, .. }
            | RubyError::UndefinedProperty { section, .. }
            | RubyError::IndexTooBig { section, .. } => section.as_ref(),
        }
    }

    /// Name of the exception class raised in the language.
    pub fn exception_class(&self) -> &'static str {
        match self {
            RubyError::FrozenModification { .. } => "FrozenError",
            RubyError::CannotDefineSingleton { .. } => "TypeError",
            RubyError::UndefinedProperty { .. } => "NameError",
            RubyError::IndexTooBig { .. } => "IndexError",
        }
    }
}

impl fmt::Display for RubyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RubyError::FrozenModification { class_name, .. } => {
                write!(f, "can't modify frozen {class_name}")?
            }
            RubyError::CannotDefineSingleton { .. } => {
                f.write_str("can't define singleton")?
            }
            RubyError::UndefinedProperty {
                name, class_name, ..
            } => write!(
                f,
                "instance variable {name} not initialized for {class_name}"
            )?,
            RubyError::IndexTooBig { index, .. } => {
                write!(f, "index {index} too big")?
            }
        }
        if let Some(section) = self.section() {
            write!(f, " ({section})")?;
        }
        Ok(())
    }
}

impl Error for RubyError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frozen_error_mentions_class_and_location() {
        let err = RubyError::frozen("Point").at(SourceSection::new("a.rb", 3));
        assert_eq!(err.to_string(), "can't modify frozen Point (a.rb:3)");
        assert_eq!(err.exception_class(), "FrozenError");
    }

    #[test]
    fn singleton_error_is_a_type_error() {
        let err = RubyError::cannot_define_singleton("Integer");
        assert_eq!(err.exception_class(), "TypeError");
        assert_eq!(err.section(), None);
    }

    #[test]
    fn index_too_big_is_an_index_error() {
        let err = RubyError::index_too_big(7).at(SourceSection::new("b.rb", 1));
        assert_eq!(err.exception_class(), "IndexError");
        assert_eq!(err.to_string(), "index 7 too big (b.rb:1)");
    }

    #[test]
    fn mismatch_display() {
        let m = RepresentationMismatch {
            expected: StorageKind::Int32,
            actual: StorageKind::Generic,
        };
        assert_eq!(m.to_string(), "expected int32 representation, found generic");
    }
}
