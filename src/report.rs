//! Human-readable, colored rendering of accumulated errors, grouped by the element (or file)
//! each group of related fragments belongs to.

use std::collections::BTreeMap;
use std::fmt;

use yansi::{Color, Style};

use crate::error::{Error, Severity};

impl Severity {
    fn color(self) -> Color {
        match self {
            Severity::Error => Color::Red,
            Severity::Warning => Color::Yellow,
            Severity::Info => Color::White,
        }
    }
}

/// Groups a flat error list by [`Error::group_key`], preserving each group's errors in their
/// original order.
pub struct Report<'a> {
    groups: BTreeMap<String, Vec<&'a Error>>,
}

impl<'a> Report<'a> {
    pub fn new(errors: &'a [Error]) -> Self {
        let mut groups: BTreeMap<String, Vec<&Error>> = BTreeMap::new();
        for error in errors {
            groups.entry(error.group_key()).or_default().push(error);
        }
        Self { groups }
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    pub fn has_errors(&self) -> bool {
        self.groups.values().flatten().any(|e| e.severity().is_error())
    }
}

impl fmt::Display for Report<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first_group = true;
        for (key, errors) in &self.groups {
            if !first_group {
                writeln!(f)?;
            }
            first_group = false;
            styled(f, Color::Blue.style().bold(), |f| write!(f, "{key}"))?;
            writeln!(f, ":")?;
            for error in errors {
                styled(f, error.severity().color().style().bold(), |f| write!(f, "  {}", error.severity()))?;
                writeln!(f, ": {error}")?;
            }
        }
        Ok(())
    }
}

fn styled<F>(f: &mut fmt::Formatter, style: Style, fun: F) -> fmt::Result
where
    F: FnOnce(&mut fmt::Formatter) -> fmt::Result,
{
    if yansi::Paint::is_enabled() {
        style.fmt_prefix(f)?;
        fun(f)?;
        style.fmt_suffix(f)
    } else {
        fun(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ParseError, ValidationError};
    use crate::id::ElemId;
    use crate::source_map::{Position, SourceRange};

    #[test]
    fn errors_for_the_same_element_are_grouped_together() {
        let errors = vec![
            Error::Validation(ValidationError::MissingRequiredField {
                id: ElemId::top_level_instance("x", "T", "a"),
                field: "name".into(),
            }),
            Error::Validation(ValidationError::UnresolvedReference {
                id: ElemId::top_level_instance("x", "T", "a"),
                target: ElemId::top_level_type("x", "Other"),
                range: None,
            }),
        ];
        let report = Report::new(&errors);
        assert_eq!(report.group_count(), 1);
    }

    #[test]
    fn parse_errors_group_by_filename() {
        let errors = vec![Error::Parse(ParseError {
            range: SourceRange::new("a.nacl", Position::new(0, 0, 0), Position::new(0, 1, 1)),
            message: "unexpected token".into(),
            severity: Severity::Error,
        })];
        let report = Report::new(&errors);
        assert_eq!(report.group_count(), 1);
        assert!(report.has_errors());
    }

    #[test]
    fn empty_error_list_produces_an_empty_report() {
        let report = Report::new(&[]);
        assert!(report.is_empty());
        assert!(!report.has_errors());
    }
}
