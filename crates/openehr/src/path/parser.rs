//! Nom parser for openEHR paths.
//!
//! ```text
//! path      := "/"? segment ("/" segment)*
//! segment   := attribute ("[" predicate "]")?
//! predicate := node_id
//!            | node_id "and" name_cond
//!            | node_id "," ( quoted | terminology "::" code )
//!            | name_cond
//! name_cond := "name/value" "=" quoted
//!            | "name/defining_code/code_string" "=" quoted
//! ```
//!
//! Quoted strings use `'` or `"`; a backslash escapes the next character.

use crate::rm::NameQuery;
use crate::{OpenEhrError, OpenEhrResult};
use nom::{
    branch::alt,
    bytes::complete::{tag, tag_no_case, take_while1},
    character::complete::{char, multispace0, multispace1},
    combinator::{all_consuming, map, opt},
    error::{Error, ErrorKind},
    multi::separated_list0,
    sequence::{delimited, pair, preceded, separated_pair, tuple},
    IResult,
};
use std::fmt;

/// A parsed path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsedPath {
    /// Starts at the root of the tree rather than at the given item.
    pub absolute: bool,
    pub segments: Vec<PathSegment>,
}

/// One `attribute[predicate]` step.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PathSegment {
    pub attribute: String,
    pub predicate: Option<Predicate>,
}

/// The bracketed part of a segment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Predicate {
    pub node_id: Option<String>,
    pub name: Option<NameQuery>,
}

/// Parses a path string.
///
/// # Errors
///
/// Returns [`OpenEhrError::PathSyntax`] if the text is not a valid path.
pub fn parse_path(path: &str) -> OpenEhrResult<ParsedPath> {
    match all_consuming(path_expr)(path.trim()) {
        Ok((_, parsed)) => Ok(parsed),
        Err(nom::Err::Error(e) | nom::Err::Failure(e)) => Err(OpenEhrError::PathSyntax {
            path: path.to_string(),
            reason: if e.input.is_empty() {
                "unexpected end of path".to_string()
            } else {
                format!("unexpected input at '{}'", e.input)
            },
        }),
        Err(nom::Err::Incomplete(_)) => Err(OpenEhrError::PathSyntax {
            path: path.to_string(),
            reason: "incomplete path".to_string(),
        }),
    }
}

fn path_expr(input: &str) -> IResult<&str, ParsedPath> {
    map(
        pair(opt(char('/')), separated_list0(char('/'), segment)),
        |(slash, segments)| ParsedPath {
            absolute: slash.is_some(),
            segments,
        },
    )(input)
}

fn segment(input: &str) -> IResult<&str, PathSegment> {
    map(pair(attribute_name, opt(predicate)), |(attribute, predicate)| {
        PathSegment {
            attribute: attribute.to_string(),
            predicate,
        }
    })(input)
}

fn attribute_name(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_ascii_alphanumeric() || c == '_')(input)
}

/// Archetype node ids: at-codes and full archetype ids.
fn node_id(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))(input)
}

fn predicate(input: &str) -> IResult<&str, Predicate> {
    delimited(
        pair(char('['), multispace0),
        alt((
            map(name_condition, |name| Predicate {
                node_id: None,
                name: Some(name),
            }),
            map(
                pair(
                    node_id,
                    opt(alt((
                        preceded(and_keyword, name_condition),
                        preceded(tuple((multispace0, char(','), multispace0)), name_shorthand),
                    ))),
                ),
                |(node_id, name)| Predicate {
                    node_id: Some(node_id.to_string()),
                    name,
                },
            ),
        )),
        pair(multispace0, char(']')),
    )(input)
}

fn and_keyword(input: &str) -> IResult<&str, ()> {
    map(tuple((multispace1, tag_no_case("and"), multispace1)), |_| ())(input)
}

fn equals(input: &str) -> IResult<&str, ()> {
    map(tuple((multispace0, char('='), multispace0)), |_| ())(input)
}

fn name_condition(input: &str) -> IResult<&str, NameQuery> {
    alt((
        map(
            preceded(pair(tag("name/defining_code/code_string"), equals), quoted),
            |code| NameQuery::Code {
                terminology_id: None,
                code,
            },
        ),
        map(preceded(pair(tag("name/value"), equals), quoted), NameQuery::Text),
    ))(input)
}

fn name_shorthand(input: &str) -> IResult<&str, NameQuery> {
    alt((
        map(quoted, NameQuery::Text),
        map(
            separated_pair(
                take_while1(|c: char| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')),
                tag("::"),
                take_while1(|c: char| !c.is_whitespace() && c != ']'),
            ),
            |(terminology, code): (&str, &str)| NameQuery::Code {
                terminology_id: Some(terminology.to_string()),
                code: code.to_string(),
            },
        ),
    ))(input)
}

/// A single- or double-quoted string with backslash escapes.
fn quoted(input: &str) -> IResult<&str, String> {
    let mut chars = input.char_indices();
    let quote = match chars.next() {
        Some((_, c @ ('\'' | '"'))) => c,
        _ => return Err(nom::Err::Error(Error::new(input, ErrorKind::Char))),
    };

    let mut value = String::new();
    let mut escaped = false;
    for (index, c) in chars {
        if escaped {
            value.push(c);
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == quote {
            return Ok((&input[index + c.len_utf8()..], value));
        } else {
            value.push(c);
        }
    }
    Err(nom::Err::Error(Error::new(input, ErrorKind::Char)))
}

fn write_quoted(f: &mut fmt::Formatter<'_>, value: &str) -> fmt::Result {
    f.write_str("'")?;
    for c in value.chars() {
        if c == '\'' || c == '\\' {
            f.write_str("\\")?;
        }
        write!(f, "{c}")?;
    }
    f.write_str("'")
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        if let Some(node_id) = &self.node_id {
            f.write_str(node_id)?;
        }
        match (&self.node_id, &self.name) {
            (Some(_), Some(NameQuery::Code {
                terminology_id: Some(terminology_id),
                code,
            })) => write!(f, ", {terminology_id}::{code}")?,
            (_, Some(name)) => {
                if self.node_id.is_some() {
                    f.write_str(" and ")?;
                }
                match name {
                    NameQuery::Text(text) => {
                        f.write_str("name/value=")?;
                        write_quoted(f, text)?;
                    }
                    NameQuery::Code { code, .. } => {
                        f.write_str("name/defining_code/code_string=")?;
                        write_quoted(f, code)?;
                    }
                }
            }
            (_, None) => {}
        }
        f.write_str("]")
    }
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.attribute)?;
        if let Some(predicate) = &self.predicate {
            write!(f, "{predicate}")?;
        }
        Ok(())
    }
}

impl fmt::Display for ParsedPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.absolute {
            f.write_str("/")?;
        }
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                f.write_str("/")?;
            }
            write!(f, "{segment}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single(path: &str) -> PathSegment {
        let mut parsed = parse_path(path).expect("valid path");
        assert_eq!(parsed.segments.len(), 1);
        parsed.segments.remove(0)
    }

    #[test]
    fn parses_absolute_and_relative_paths() {
        let parsed = parse_path("/content[openEHR-EHR-OBSERVATION.blood_pressure.v1]/data")
            .expect("valid path");
        assert!(parsed.absolute);
        assert_eq!(parsed.segments.len(), 2);
        assert_eq!(
            parsed.segments[0].predicate,
            Some(Predicate {
                node_id: Some("openEHR-EHR-OBSERVATION.blood_pressure.v1".into()),
                name: None,
            })
        );

        let relative = parse_path("data/events").expect("valid path");
        assert!(!relative.absolute);

        let root = parse_path("/").expect("root path");
        assert!(root.absolute && root.segments.is_empty());
        assert!(parse_path("").expect("empty path").segments.is_empty());
    }

    #[test]
    fn parses_every_predicate_form() {
        assert_eq!(
            single("items[at0004 and name/value='Systolic']").predicate,
            Some(Predicate {
                node_id: Some("at0004".into()),
                name: Some(NameQuery::Text("Systolic".into())),
            })
        );
        assert_eq!(
            single("items[at0004, \"Systolic\"]").predicate,
            single("items[at0004 AND name/value=\"Systolic\"]").predicate
        );
        assert_eq!(
            single("items[at0004, local::at1001]").predicate,
            Some(Predicate {
                node_id: Some("at0004".into()),
                name: Some(NameQuery::Code {
                    terminology_id: Some("local".into()),
                    code: "at1001".into(),
                }),
            })
        );
        assert_eq!(
            single("items[at0004 and name/defining_code/code_string='at1001']").predicate,
            Some(Predicate {
                node_id: Some("at0004".into()),
                name: Some(NameQuery::Code {
                    terminology_id: None,
                    code: "at1001".into(),
                }),
            })
        );
        assert_eq!(
            single("items[name/value='Systolic']").predicate,
            Some(Predicate {
                node_id: None,
                name: Some(NameQuery::Text("Systolic".into())),
            })
        );
    }

    #[test]
    fn quoted_names_support_escapes() {
        let segment = single(r"items[at0001 and name/value='Patient\'s view']");
        assert_eq!(
            segment.predicate.and_then(|p| p.name),
            Some(NameQuery::Text("Patient's view".into()))
        );
    }

    #[test]
    fn rejects_malformed_paths() {
        for bad in ["/content[", "content/", "items[at0001 and]", "items[at0001, 'x]", "//a"] {
            assert!(
                matches!(parse_path(bad), Err(OpenEhrError::PathSyntax { .. })),
                "{bad} should not parse"
            );
        }
    }

    #[test]
    fn display_is_reparseable() {
        for path in [
            "/content[at0001 and name/value='Vitals']/items[at0002, local::at1001]",
            "data[at0001]/events[at0002 and name/defining_code/code_string='x']",
            "/items[at0001 and name/value='It\\'s']",
            "/",
        ] {
            let parsed = parse_path(path).expect("valid path");
            let written = parsed.to_string();
            assert_eq!(parse_path(&written).expect("reparse"), parsed);
        }
    }
}
