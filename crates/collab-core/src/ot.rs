//! Operational-transform adapter trait boundary.
//!
//! The real document/schema/step primitives are an external, opaque
//! collaborator (§1): this module only defines the contract the rest of the
//! system programs against — construct an empty document, apply a step
//! total-or-fail, (de)serialize steps to JSON, and compose position maps into
//! a [`OtMapping`] for client-side rebasing (§4.4).
//!
//! [`text_ot`] is a small, concrete implementation of that contract (flat
//! UTF-8 strings with insert/delete steps) so the rest of the crate is
//! testable without a real ProseMirror-equivalent dependency.

use crate::error::OtError;

/// An atomic, serializable document transformation (§3 Step, GLOSSARY).
pub trait OtStep: Clone + std::fmt::Debug + PartialEq + Send + Sync + 'static {
    /// The step's `stepType` discriminator, as carried in its JSON form.
    fn step_type(&self) -> &str;

    /// Serialize to the step's `{stepType: string, ...}` JSON form.
    fn to_json(&self) -> serde_json::Value;

    /// Deserialize from a step's JSON form.
    ///
    /// # Errors
    ///
    /// Returns [`OtError::UnknownStepType`] or [`OtError::MalformedStep`] if
    /// `value` is not a well-formed step of this adapter's schema.
    fn from_json(value: &serde_json::Value) -> Result<Self, OtError>
    where
        Self: Sized;
}

/// An opaque document tree produced by the OT adapter from a schema (§3).
pub trait OtDocument: Clone + std::fmt::Debug + PartialEq + Send + Sync + 'static {
    /// The step type this document accepts.
    type Step: OtStep;

    /// Construct the document corresponding to room version 0 (§3 Version).
    fn empty() -> Self;

    /// Apply a single step, total-or-fail.
    ///
    /// # Errors
    ///
    /// Returns an [`OtError`] if `step` cannot be applied to this document
    /// (e.g. a position outside document bounds). Implementations must not
    /// mutate `self`; callers rely on `self` being unchanged on failure.
    fn apply(&self, step: &Self::Step) -> Result<Self, OtError>;

    /// Serialize to a JSON object for snapshot exchange (`doc-snapshot`).
    fn to_json(&self) -> serde_json::Value;
}

/// A composition of step position maps, used to transform a queued local
/// step's positions across intervening server edits (§4.4 Rebase algorithm,
/// GLOSSARY).
pub trait OtMapping: Default {
    /// The step type this mapping transforms.
    type Step: OtStep;

    /// The empty mapping (no intervening edits).
    fn identity() -> Self
    where
        Self: Sized,
    {
        Self::default()
    }

    /// Extend the mapping with one more intervening step, in application
    /// order.
    fn append(&mut self, step: &Self::Step);

    /// Transform `step`'s positions through every step appended so far.
    ///
    /// Returns `None` if the step has been fully subsumed by intervening
    /// edits (e.g. a delete whose entire range was already removed) — a
    /// "dead" step that must be dropped from the rebase output, not resent.
    fn map_step(&self, step: &Self::Step) -> Option<Self::Step>;
}

/// A minimal, concrete OT adapter: a flat UTF-8 string document with insert
/// and delete steps.
///
/// This stands in for the opaque ProseMirror-equivalent library named in §1;
/// it is deliberately small (no marks, no node tree, no schema) since its only
/// job is to exercise the version gate, history replay, and rebase contracts
/// this core is actually responsible for.
pub mod text_ot {
    use serde::{Deserialize, Serialize};
    use serde_json::json;

    use super::{OtDocument, OtMapping, OtStep};
    use crate::error::OtError;

    /// A flat-string document.
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct TextDocument(pub String);

    impl OtDocument for TextDocument {
        type Step = TextStep;

        fn empty() -> Self {
            Self(String::new())
        }

        fn apply(&self, step: &Self::Step) -> Result<Self, OtError> {
            match *step {
                TextStep::Insert { at, ref text } => {
                    let at = checked_index(at, self.0.chars().count())?;
                    let mut chars: Vec<char> = self.0.chars().collect();
                    let tail = chars.split_off(at);
                    chars.extend(text.chars());
                    chars.extend(tail);
                    Ok(Self(chars.into_iter().collect()))
                },
                TextStep::Delete { from, to } => {
                    let len = self.0.chars().count();
                    let from_idx = checked_index(from, len)?;
                    let to_idx = checked_index(to, len)?;
                    if from_idx > to_idx {
                        return Err(OtError::InvalidRange { from, to });
                    }
                    let chars: Vec<char> = self.0.chars().collect();
                    let mut result: Vec<char> = chars[..from_idx].to_vec();
                    result.extend_from_slice(&chars[to_idx..]);
                    Ok(Self(result.into_iter().collect()))
                },
            }
        }

        fn to_json(&self) -> serde_json::Value {
            json!({ "text": self.0 })
        }
    }

    fn checked_index(position: i64, len: usize) -> Result<usize, OtError> {
        if position < 0 || position as usize > len {
            return Err(OtError::PositionOutOfBounds { position, len });
        }
        Ok(position as usize)
    }

    /// An insert or delete step over a [`TextDocument`].
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(tag = "stepType", rename_all = "camelCase")]
    pub enum TextStep {
        /// Insert `text` at position `at`.
        Insert {
            /// Insertion point.
            at: i64,
            /// Text to insert.
            text: String,
        },
        /// Delete the half-open range `[from, to)`.
        Delete {
            /// Range start.
            from: i64,
            /// Range end.
            to: i64,
        },
    }

    impl OtStep for TextStep {
        fn step_type(&self) -> &str {
            match self {
                Self::Insert { .. } => "insert",
                Self::Delete { .. } => "delete",
            }
        }

        fn to_json(&self) -> serde_json::Value {
            #[allow(clippy::expect_used)]
            serde_json::to_value(self).expect("TextStep serialization is infallible")
        }

        fn from_json(value: &serde_json::Value) -> Result<Self, OtError> {
            serde_json::from_value(value.clone())
                .map_err(|err| OtError::MalformedStep(err.to_string()))
        }
    }

    /// One replaced span recorded while appending a step to a [`TextMapping`]:
    /// `[start, end)` in the coordinates of the document *before* this step,
    /// replaced by a span of length `new_len`.
    #[derive(Debug, Clone, Copy)]
    struct Span {
        start: i64,
        end: i64,
        new_len: i64,
    }

    /// Composition of [`TextStep`] position maps.
    #[derive(Debug, Clone, Default)]
    pub struct TextMapping {
        spans: Vec<Span>,
    }

    impl TextMapping {
        /// Map a single position through every recorded span, in order.
        /// Positions strictly inside a replaced span clamp to the span's
        /// start (§4.4: an intervening edit that consumed this position).
        fn map_pos(&self, pos: i64) -> i64 {
            let mut p = pos;
            for span in &self.spans {
                if p < span.start {
                    // untouched
                } else if p >= span.end {
                    p += span.new_len - (span.end - span.start);
                } else {
                    p = span.start;
                }
            }
            p
        }
    }

    impl OtMapping for TextMapping {
        type Step = TextStep;

        fn append(&mut self, step: &Self::Step) {
            let span = match *step {
                TextStep::Insert { at, ref text } => {
                    Span { start: at, end: at, new_len: text.chars().count() as i64 }
                },
                TextStep::Delete { from, to } => Span { start: from, end: to, new_len: 0 },
            };
            self.spans.push(span);
        }

        fn map_step(&self, step: &Self::Step) -> Option<Self::Step> {
            match *step {
                TextStep::Insert { at, ref text } => {
                    Some(TextStep::Insert { at: self.map_pos(at), text: text.clone() })
                },
                TextStep::Delete { from, to } => {
                    let mapped_from = self.map_pos(from);
                    let mapped_to = self.map_pos(to);
                    if mapped_from >= mapped_to {
                        None
                    } else {
                        Some(TextStep::Delete { from: mapped_from, to: mapped_to })
                    }
                },
            }
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn insert_then_delete_round_trip() {
            let doc = TextDocument::empty();
            let doc = doc.apply(&TextStep::Insert { at: 0, text: "hello".to_string() }).unwrap();
            assert_eq!(doc.0, "hello");
            let doc = doc.apply(&TextStep::Delete { from: 0, to: 1 }).unwrap();
            assert_eq!(doc.0, "ello");
        }

        #[test]
        fn apply_rejects_out_of_bounds_position() {
            let doc = TextDocument("abc".to_string());
            let err = doc.apply(&TextStep::Delete { from: 1000, to: 1001 }).unwrap_err();
            assert!(matches!(err, OtError::PositionOutOfBounds { .. }));
        }

        #[test]
        fn apply_is_total_or_fail_document_unchanged_on_error() {
            let doc = TextDocument("abc".to_string());
            let result = doc.apply(&TextStep::Delete { from: 1000, to: 1001 });
            assert!(result.is_err());
            assert_eq!(doc.0, "abc");
        }

        #[test]
        fn mapping_shifts_positions_after_earlier_insert() {
            let mut mapping = TextMapping::identity();
            mapping.append(&TextStep::Insert { at: 0, text: "xx".to_string() });
            let mapped = mapping.map_step(&TextStep::Insert { at: 0, text: "y".to_string() });
            assert_eq!(mapped, Some(TextStep::Insert { at: 2, text: "y".to_string() }));
            let mapped = mapping.map_step(&TextStep::Insert { at: 2, text: "y".to_string() });
            assert_eq!(mapped, Some(TextStep::Insert { at: 4, text: "y".to_string() }));
        }

        #[test]
        fn mapping_kills_delete_fully_consumed_by_earlier_delete() {
            let mut mapping = TextMapping::identity();
            mapping.append(&TextStep::Delete { from: 0, to: 5 });
            let mapped = mapping.map_step(&TextStep::Delete { from: 1, to: 3 });
            assert_eq!(mapped, None);
        }

        #[test]
        fn mapping_rebase_scenario_s2() {
            // S2: A inserts "x" at 0 (server applies first). B's queued
            // delete [0,1) on the original doc must rebase onto A's insert.
            let mut mapping = TextMapping::identity();
            mapping.append(&TextStep::Insert { at: 0, text: "x".to_string() });
            let rebased = mapping.map_step(&TextStep::Delete { from: 0, to: 1 });
            assert_eq!(rebased, Some(TextStep::Delete { from: 1, to: 2 }));
        }
    }
}
