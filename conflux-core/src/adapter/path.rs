//! Navigation Paths
//!
//! A path such as `completions[0].text` is parsed once into a sequence of
//! [`PathStep`]s and then applied to any value. Field steps index into
//! maps, index steps into lists. Records coming from the compute
//! collaborator are plain maps in the value model, so field access covers
//! both mapping-style and attribute-style lookups.

use std::fmt;

use serde_json::Value;
use smallvec::SmallVec;

use crate::error::PathError;
use crate::value::ArgMap;

/// One step of a navigation path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathStep {
    /// Member access (`.field`, or a leading `field`).
    Field(String),
    /// Zero-based list index (`[n]`).
    Index(usize),
}

/// A parsed navigation path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Path {
    raw: String,
    steps: SmallVec<[PathStep; 4]>,
}

impl Path {
    /// Parse a dotted/indexed expression.
    pub fn parse(raw: &str) -> Result<Self, PathError> {
        if raw.is_empty() {
            return Err(PathError::Empty);
        }

        let mut steps = SmallVec::new();
        let mut chars = raw.char_indices().peekable();
        // A field is expected at the start and after every '.'.
        let mut expect_field = true;

        while let Some(&(offset, c)) = chars.peek() {
            match c {
                '[' => {
                    // Indices only follow a field or another index.
                    if expect_field {
                        return Err(PathError::Unexpected {
                            path: raw.to_string(),
                            offset,
                            found: c,
                        });
                    }
                    chars.next();
                    let mut digits = String::new();
                    let mut closed = false;
                    for (_, d) in chars.by_ref() {
                        if d == ']' {
                            closed = true;
                            break;
                        }
                        digits.push(d);
                    }
                    if !closed {
                        return Err(PathError::UnexpectedEnd {
                            path: raw.to_string(),
                        });
                    }
                    let index = digits.trim().parse::<usize>().map_err(|_| {
                        PathError::InvalidIndex {
                            path: raw.to_string(),
                            index: digits.clone(),
                        }
                    })?;
                    steps.push(PathStep::Index(index));
                    expect_field = false;
                }
                '.' => {
                    if expect_field {
                        return Err(PathError::Unexpected {
                            path: raw.to_string(),
                            offset,
                            found: c,
                        });
                    }
                    chars.next();
                    expect_field = true;
                    if chars.peek().is_none() {
                        return Err(PathError::UnexpectedEnd {
                            path: raw.to_string(),
                        });
                    }
                }
                ']' => {
                    return Err(PathError::Unexpected {
                        path: raw.to_string(),
                        offset,
                        found: c,
                    });
                }
                _ => {
                    if !expect_field {
                        return Err(PathError::Unexpected {
                            path: raw.to_string(),
                            offset,
                            found: c,
                        });
                    }
                    let mut field = String::new();
                    while let Some(&(_, f)) = chars.peek() {
                        if matches!(f, '.' | '[' | ']') {
                            break;
                        }
                        field.push(f);
                        chars.next();
                    }
                    steps.push(PathStep::Field(field));
                    expect_field = false;
                }
            }
        }

        Ok(Self {
            raw: raw.to_string(),
            steps,
        })
    }

    /// The original expression.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// The parsed steps.
    pub fn steps(&self) -> &[PathStep] {
        &self.steps
    }

    /// The name of the last field step, if any.
    pub fn last_field(&self) -> Option<&str> {
        self.steps.iter().rev().find_map(|step| match step {
            PathStep::Field(name) => Some(name.as_str()),
            PathStep::Index(_) => None,
        })
    }

    /// Navigate from a root argument map. Returns `None` when any step does
    /// not resolve.
    pub fn resolve<'a>(&self, root: &'a ArgMap) -> Option<&'a Value> {
        let (first, rest) = self.steps.split_first()?;
        let mut current = match first {
            PathStep::Field(name) => root.get(name)?,
            // `parse` never yields a leading index.
            PathStep::Index(_) => return None,
        };
        for step in rest {
            current = step.apply(current)?;
        }
        Some(current)
    }
}

impl PathStep {
    fn apply<'a>(&self, value: &'a Value) -> Option<&'a Value> {
        match (self, value) {
            (PathStep::Field(name), Value::Object(map)) => map.get(name),
            (PathStep::Index(i), Value::Array(items)) => items.get(*i),
            _ => None,
        }
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::args;
    use serde_json::json;

    #[test]
    fn parses_mixed_steps() {
        let path = Path::parse("completions[0].text").unwrap();
        assert_eq!(
            path.steps(),
            &[
                PathStep::Field("completions".into()),
                PathStep::Index(0),
                PathStep::Field("text".into()),
            ]
        );
        assert_eq!(path.last_field(), Some("text"));
    }

    #[test]
    fn parses_consecutive_indices() {
        let path = Path::parse("grid[1][2]").unwrap();
        assert_eq!(path.steps().len(), 3);
        assert_eq!(path.last_field(), Some("grid"));
    }

    #[test]
    fn rejects_malformed_paths() {
        assert_eq!(Path::parse(""), Err(PathError::Empty));
        assert!(matches!(Path::parse("a..b"), Err(PathError::Unexpected { offset: 2, .. })));
        assert!(matches!(Path::parse("a."), Err(PathError::UnexpectedEnd { .. })));
        assert!(matches!(Path::parse("a[0"), Err(PathError::UnexpectedEnd { .. })));
        assert!(matches!(Path::parse("a[x]"), Err(PathError::InvalidIndex { .. })));
        assert!(matches!(Path::parse("a]"), Err(PathError::Unexpected { .. })));
        assert!(matches!(Path::parse("a[0]b"), Err(PathError::Unexpected { .. })));
    }

    #[test]
    fn rejects_leading_index() {
        // The root is a map, so a path has to start with a field.
        assert!(matches!(
            Path::parse("[0]"),
            Err(PathError::Unexpected { offset: 0, found: '[', .. })
        ));
        assert!(matches!(
            Path::parse("[0].text"),
            Err(PathError::Unexpected { offset: 0, .. })
        ));
        assert!(matches!(Path::parse("a.[0]"), Err(PathError::Unexpected { offset: 2, .. })));
    }

    #[test]
    fn resolves_against_root() {
        let root = args([(
            "completions",
            json!([{"text": "sancho panza", "score": 0.9}]),
        )]);

        let path = Path::parse("completions[0].text").unwrap();
        assert_eq!(path.resolve(&root), Some(&json!("sancho panza")));

        let missing = Path::parse("completions[3].text").unwrap();
        assert_eq!(missing.resolve(&root), None);

        let wrong_shape = Path::parse("completions.text").unwrap();
        assert_eq!(wrong_shape.resolve(&root), None);
    }
}
