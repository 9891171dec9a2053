//! Header → logical field resolution
//!
//! Runs once per import against the header row. Matching is case-insensitive and
//! exact against a small synonym set per field.

use std::fmt;

use super::ImportError;

/// Logical fields of a contact row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    /// Natural key
    Email,
    /// Required display field
    FirstName,
    /// Optional secondary field
    LastName,
}

impl Field {
    pub fn as_str(&self) -> &'static str {
        match self {
            Field::Email => "email",
            Field::FirstName => "first_name",
            Field::LastName => "last_name",
        }
    }

    /// Accepted header spellings (already lowercased)
    pub fn synonyms(&self) -> &'static [&'static str] {
        match self {
            Field::Email => &["email", "e-mail", "email_address", "email address", "emailaddress"],
            Field::FirstName => &["first_name", "firstname", "first name", "given_name", "given name"],
            Field::LastName => &[
                "last_name",
                "lastname",
                "last name",
                "surname",
                "family_name",
                "family name",
            ],
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where one logical field lives in the input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedColumn {
    pub index: usize,
    /// Header text as it appeared in the input
    pub header: String,
}

/// Logical field → physical column, resolved once per import
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMapping {
    pub email: ResolvedColumn,
    pub first_name: ResolvedColumn,
    pub last_name: Option<ResolvedColumn>,
}

fn normalize_header(header: &str) -> String {
    header.trim_start_matches('\u{feff}').trim().to_lowercase()
}

fn find_column<'a, I>(headers: I, field: Field) -> Option<ResolvedColumn>
where
    I: IntoIterator<Item = &'a str>,
{
    let synonyms = field.synonyms();
    headers
        .into_iter()
        .enumerate()
        .find(|(_, header)| synonyms.contains(&normalize_header(header).as_str()))
        .map(|(index, header)| ResolvedColumn {
            index,
            header: header.to_string(),
        })
}

/// Map the header row to logical fields
///
/// Fails with [`ImportError::MissingColumns`] naming every required field that
/// could not be found. A missing last-name column is not an error.
pub fn resolve_columns<'a, I>(headers: I) -> Result<ColumnMapping, ImportError>
where
    I: IntoIterator<Item = &'a str>,
    I::IntoIter: Clone,
{
    let headers = headers.into_iter();

    let email = find_column(headers.clone(), Field::Email);
    let first_name = find_column(headers.clone(), Field::FirstName);
    let last_name = find_column(headers, Field::LastName);

    match (email, first_name) {
        (Some(email), Some(first_name)) => Ok(ColumnMapping {
            email,
            first_name,
            last_name,
        }),
        (email, first_name) => {
            let mut missing = Vec::new();
            if email.is_none() {
                missing.push(Field::Email);
            }
            if first_name.is_none() {
                missing.push(Field::FirstName);
            }
            Err(ImportError::MissingColumns { missing })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolve(headers: &[&str]) -> Result<ColumnMapping, ImportError> {
        resolve_columns(headers.iter().copied())
    }

    #[test]
    fn test_exact_headers() {
        let mapping = resolve(&["email", "first_name", "last_name"]).unwrap();
        assert_eq!(mapping.email.index, 0);
        assert_eq!(mapping.first_name.index, 1);
        assert_eq!(mapping.last_name.unwrap().index, 2);
    }

    #[test]
    fn test_case_and_spelling_variants() {
        let mapping = resolve(&["Last Name", " FirstName ", "E-Mail"]).unwrap();
        assert_eq!(mapping.email.index, 2);
        assert_eq!(mapping.email.header, "E-Mail");
        assert_eq!(mapping.first_name.index, 1);
        assert_eq!(mapping.last_name.unwrap().index, 0);
    }

    #[test]
    fn test_byte_order_mark_on_first_header() {
        let mapping = resolve(&["\u{feff}email", "first name"]).unwrap();
        assert_eq!(mapping.email.index, 0);
    }

    #[test]
    fn test_optional_column_absent() {
        let mapping = resolve(&["email", "first_name", "phone"]).unwrap();
        assert!(mapping.last_name.is_none());
    }

    #[test]
    fn test_missing_required_column() {
        match resolve(&["email", "last_name"]) {
            Err(ImportError::MissingColumns { missing }) => {
                assert_eq!(missing, vec![Field::FirstName]);
            }
            other => panic!("expected missing columns, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_both_required_columns() {
        let err = resolve(&["name", "phone"]).unwrap_err();
        assert_eq!(err.to_string(), "Missing required columns: email, first_name");
    }

    #[test]
    fn test_first_matching_column_wins() {
        let mapping = resolve(&["email", "first_name", "Email"]).unwrap();
        assert_eq!(mapping.email.index, 0);
    }
}
