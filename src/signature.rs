//! Generic type patterns for signature exploration.
//!
//! ## Grammar
//!
//! ```text
//! pattern := name ( '<' pattern ( ',' pattern )* '>' )?
//!          | '_'          any type, ignored
//!          | 'T'          the type being looked for; exactly once
//! name    := [A-Za-z0-9_./$]+
//! ```
//!
//! A pattern compiles to signature steps along the path from the root to
//! `T` only: every named node on the path becomes a type filter, every
//! argument position on the path becomes a type-argument descent, and `T`
//! becomes the explode-to-class step. Siblings of the path are never visited.

use winnow::ascii::multispace0;
use winnow::combinator::{delimited, opt, preceded, repeat};
use winnow::error::{ErrMode, ParserError};
use winnow::prelude::*;
use winnow::token::take_while;
use winnow::ModalResult;

use archsight_core::error::{ArchError, Result};

use crate::dsl::{ClassScope, SignatureScope};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypePattern {
    /// `_`
    Any,
    /// `T`
    Target,
    Named { name: String, args: Vec<TypePattern> },
}

impl TypePattern {
    fn target_count(&self) -> usize {
        match self {
            TypePattern::Any => 0,
            TypePattern::Target => 1,
            TypePattern::Named { args, .. } => args.iter().map(TypePattern::target_count).sum(),
        }
    }

    /// Named nodes and argument positions leading to `T`.
    fn path_to_target(&self) -> Option<Vec<(&str, u32)>> {
        match self {
            TypePattern::Any => None,
            TypePattern::Target => Some(Vec::new()),
            TypePattern::Named { name, args } => {
                args.iter().enumerate().find_map(|(index, arg)| {
                    let mut rest = arg.path_to_target()?;
                    rest.insert(0, (name.as_str(), index as u32));
                    Some(rest)
                })
            }
        }
    }
}

/// Parse a type pattern, requiring exactly one `T`.
pub fn parse_type_pattern(input: &str) -> Result<TypePattern> {
    let trimmed = input.trim();
    let invalid = |message: String| ArchError::InvalidSignaturePattern {
        input: input.to_string(),
        message,
    };
    if trimmed.is_empty() {
        return Err(invalid("empty pattern".to_string()));
    }

    let pattern = parse_pattern
        .parse(trimmed)
        .map_err(|e| invalid(format!("{:?}", e)))?;

    match pattern.target_count() {
        1 => Ok(pattern),
        0 => Err(invalid("no 'T' in pattern".to_string())),
        n => Err(invalid(format!("'T' appears {} times", n))),
    }
}

/// Append the steps for `pattern` to `scope`, ending in `build` on the class
/// bound to `T`.
pub(crate) fn compile(
    pattern: &TypePattern,
    scope: &mut SignatureScope,
    build: impl FnOnce(&mut ClassScope),
) {
    let path = pattern.path_to_target().unwrap_or_default();
    descend(scope, &path, build);
}

fn descend(scope: &mut SignatureScope, path: &[(&str, u32)], build: impl FnOnce(&mut ClassScope)) {
    match path.split_first() {
        None => {
            scope.explode_type(build);
        }
        Some((&(name, index), rest)) => {
            scope
                .filter_type(name)
                .type_argument(index, |inner| descend(inner, rest, build));
        }
    }
}

// ============================================================================
// Parser implementation using winnow
// ============================================================================

fn parse_pattern(input: &mut &str) -> ModalResult<TypePattern> {
    let _ = multispace0.parse_next(input)?;
    let name: &str = take_while(1.., |c: char| {
        c.is_alphanumeric() || matches!(c, '_' | '.' | '/' | '$')
    })
    .parse_next(input)?;

    let args = opt(delimited(
        ('<', multispace0),
        parse_arguments,
        (multispace0, '>'),
    ))
    .parse_next(input)?;
    let _ = multispace0.parse_next(input)?;

    match (name, args) {
        ("_", None) => Ok(TypePattern::Any),
        ("T", None) => Ok(TypePattern::Target),
        ("_" | "T", Some(_)) => Err(ErrMode::from_input(input)),
        (name, args) => Ok(TypePattern::Named {
            name: name.to_string(),
            args: args.unwrap_or_default(),
        }),
    }
}

fn parse_arguments(input: &mut &str) -> ModalResult<Vec<TypePattern>> {
    let first = parse_pattern(input)?;
    let rest: Vec<TypePattern> = repeat(
        0..,
        preceded((multispace0, ','), parse_pattern),
    )
    .parse_next(input)?;

    let mut all = vec![first];
    all.extend(rest);
    Ok(all)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsl::ScopeBuilder;

    fn named(name: &str, args: Vec<TypePattern>) -> TypePattern {
        TypePattern::Named {
            name: name.to_string(),
            args,
        }
    }

    mod parser_tests {
        use super::*;

        #[test]
        fn nested_generics() {
            let parsed = parse_type_pattern("Map<_, List<Pair<T, _>>>").unwrap();
            assert_eq!(
                parsed,
                named(
                    "Map",
                    vec![
                        TypePattern::Any,
                        named(
                            "List",
                            vec![named("Pair", vec![TypePattern::Target, TypePattern::Any])]
                        ),
                    ]
                )
            );
        }

        #[test]
        fn qualified_names() {
            let parsed = parse_type_pattern("java.util.Map$Entry<T,_>").unwrap();
            assert_eq!(
                parsed,
                named("java.util.Map$Entry", vec![TypePattern::Target, TypePattern::Any])
            );
        }

        #[test]
        fn bare_target() {
            assert_eq!(parse_type_pattern(" T ").unwrap(), TypePattern::Target);
        }

        #[test]
        fn target_must_appear_once() {
            for bad in ["List<_>", "Map<T, T>", "", "List<T", "List<T>>", "T<String>"] {
                assert!(
                    matches!(
                        parse_type_pattern(bad),
                        Err(ArchError::InvalidSignaturePattern { .. })
                    ),
                    "{:?} should be rejected",
                    bad
                );
            }
        }
    }

    mod compile_tests {
        use super::*;

        #[test]
        fn matches_hand_written_steps() {
            let mut compiled = SignatureScope::detached();
            compiled
                .explode_type_t("Map<_, List<Pair<T, _>>>", |c| {
                    c.entity("payload");
                })
                .unwrap();

            let mut manual = SignatureScope::detached();
            manual.filter_type("Map").type_argument(1, |s| {
                s.filter_type("List").type_argument(0, |s| {
                    s.filter_type("Pair").type_argument(0, |s| {
                        s.explode_type(|c| {
                            c.entity("payload");
                        });
                    });
                });
            });

            assert_eq!(compiled.into_chain(), manual.into_chain());
        }

        #[test]
        fn bare_target_explodes_directly() {
            let mut compiled = SignatureScope::detached();
            compiled.explode_type_t("T", |_| {}).unwrap();
            let mut manual = SignatureScope::detached();
            manual.explode_type(|_| {});
            assert_eq!(compiled.into_chain(), manual.into_chain());
        }
    }
}
