//! Store Response Decoding
//!
//! Every poll procedure answers with a positional result list. Slot 0 holds
//! the success payload and slot 1, when present and non-nil, carries the
//! store's rejection text. Each procedure gets its own decode routine so the
//! shape it expects is written down exactly once.
//!
//! Rejections from `vote`, `get_poll`, `close_poll` and `delete_poll` arrive
//! tuple-wrapped (`["already voted"]`) while `create_poll` puts the bare text
//! in slot 1. Both shapes are part of the store contract and are decoded as-is.

use super::Poll;
use rmpv::Value;
use std::collections::HashMap;
use thiserror::Error;

/// Minimum arity of the tuple returned by `get_poll`.
pub const POLL_TUPLE_MIN_FIELDS: usize = 10;

const POLL_FIELD_ID: usize = 0;
const POLL_FIELD_QUESTION: usize = 1;
const POLL_FIELD_OPTIONS: usize = 2;
const POLL_FIELD_VOTES: usize = 3;
const POLL_FIELD_ACTIVE: usize = 7;

/// Stored procedures exposed by the poll store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Procedure {
    CreatePoll,
    Vote,
    GetPoll,
    ClosePoll,
    DeletePoll,
}

impl Procedure {
    /// Name the procedure is registered under in the store.
    pub fn name(self) -> &'static str {
        match self {
            Procedure::CreatePoll => "create_poll",
            Procedure::Vote => "vote",
            Procedure::GetPoll => "get_poll",
            Procedure::ClosePoll => "close_poll",
            Procedure::DeletePoll => "delete_poll",
        }
    }

    /// Whether the rejection text in slot 1 is wrapped in a one-element tuple.
    fn wraps_rejection(self) -> bool {
        !matches!(self, Procedure::CreatePoll)
    }
}

impl std::fmt::Display for Procedure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Raw result list of one remote call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RpcOutcome {
    slots: Vec<Value>,
}

impl RpcOutcome {
    pub fn new(slots: Vec<Value>) -> Self {
        Self { slots }
    }

    /// Slot 0, the success payload.
    pub fn payload(&self) -> Option<&Value> {
        self.slots.first()
    }

    /// Slot 1 when it is present and not nil.
    pub fn error_slot(&self) -> Option<&Value> {
        self.slots.get(1).filter(|v| !v.is_nil())
    }

    pub fn slots(&self) -> &[Value] {
        &self.slots
    }
}

/// Decoded result of a call that reached the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded<T> {
    Success(T),
    /// Business rejection reported by the store (already voted, not creator...).
    Rejected(String),
}

/// The store answered with a shape this service does not understand.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("{procedure}: response has no payload")]
    MissingPayload { procedure: Procedure },

    #[error("{procedure}: {field} should be {expected}, got {found}")]
    UnexpectedType {
        procedure: Procedure,
        field: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("{procedure}: poll tuple has {len} fields, expected at least {min}")]
    ShortTuple {
        procedure: Procedure,
        len: usize,
        min: usize,
    },

    #[error("{procedure}: vote key {key:?} does not match any of the {options} options")]
    UnknownVoteKey {
        procedure: Procedure,
        key: String,
        options: usize,
    },
}

/// Short name of a value's dynamic type, for decode errors.
fn kind(value: &Value) -> &'static str {
    match value {
        Value::Nil => "nil",
        Value::Boolean(_) => "boolean",
        Value::Integer(i) if i.is_u64() => "unsigned integer",
        Value::Integer(_) => "integer",
        Value::F32(_) | Value::F64(_) => "float",
        Value::String(_) => "string",
        Value::Binary(_) => "binary",
        Value::Array(_) => "array",
        Value::Map(_) => "map",
        Value::Ext(..) => "extension",
    }
}

fn unexpected(
    procedure: Procedure,
    field: impl Into<String>,
    expected: &'static str,
    value: &Value,
) -> DecodeError {
    DecodeError::UnexpectedType {
        procedure,
        field: field.into(),
        expected,
        found: kind(value),
    }
}

fn as_array<'a>(
    procedure: Procedure,
    field: &str,
    value: &'a Value,
) -> Result<&'a [Value], DecodeError> {
    value
        .as_array()
        .map(Vec::as_slice)
        .ok_or_else(|| unexpected(procedure, field, "array", value))
}

fn as_str<'a>(procedure: Procedure, field: &str, value: &'a Value) -> Result<&'a str, DecodeError> {
    value
        .as_str()
        .ok_or_else(|| unexpected(procedure, field, "string", value))
}

fn as_u64(procedure: Procedure, field: &str, value: &Value) -> Result<u64, DecodeError> {
    value
        .as_u64()
        .ok_or_else(|| unexpected(procedure, field, "unsigned integer", value))
}

fn payload(procedure: Procedure, outcome: &RpcOutcome) -> Result<&Value, DecodeError> {
    outcome
        .payload()
        .ok_or(DecodeError::MissingPayload { procedure })
}

/// Extract the rejection text from slot 1, if any.
pub fn decode_rejection(
    procedure: Procedure,
    outcome: &RpcOutcome,
) -> Result<Option<String>, DecodeError> {
    let Some(slot) = outcome.error_slot() else {
        return Ok(None);
    };

    let text = if procedure.wraps_rejection() {
        let wrapped = as_array(procedure, "error slot", slot)?;
        let first = wrapped.first().unwrap_or(&Value::Nil);
        as_str(procedure, "error slot[0]", first)?
    } else {
        as_str(procedure, "error slot", slot)?
    };

    Ok(Some(text.to_string()))
}

/// `create_poll` answers `[[poll_id]]` on success.
pub fn decode_create_poll(outcome: &RpcOutcome) -> Result<Decoded<u64>, DecodeError> {
    let procedure = Procedure::CreatePoll;
    if let Some(text) = decode_rejection(procedure, outcome)? {
        return Ok(Decoded::Rejected(text));
    }

    let wrapped = as_array(procedure, "payload", payload(procedure, outcome)?)?;
    let id = wrapped.first().unwrap_or(&Value::Nil);
    Ok(Decoded::Success(as_u64(procedure, "poll id", id)?))
}

fn decode_ack(procedure: Procedure, outcome: &RpcOutcome) -> Result<Decoded<()>, DecodeError> {
    match decode_rejection(procedure, outcome)? {
        Some(text) => Ok(Decoded::Rejected(text)),
        None => Ok(Decoded::Success(())),
    }
}

/// `vote` carries no payload on success.
pub fn decode_vote(outcome: &RpcOutcome) -> Result<Decoded<()>, DecodeError> {
    decode_ack(Procedure::Vote, outcome)
}

/// `close_poll` carries no payload on success.
pub fn decode_close_poll(outcome: &RpcOutcome) -> Result<Decoded<()>, DecodeError> {
    decode_ack(Procedure::ClosePoll, outcome)
}

/// `delete_poll` carries no payload on success.
pub fn decode_delete_poll(outcome: &RpcOutcome) -> Result<Decoded<()>, DecodeError> {
    decode_ack(Procedure::DeletePoll, outcome)
}

/// `get_poll` answers with the poll's space tuple.
///
/// Only id, question, options, votes and the active flag are read; the
/// remaining fields of the tuple are left uninterpreted.
pub fn decode_get_poll(outcome: &RpcOutcome) -> Result<Decoded<Poll>, DecodeError> {
    let procedure = Procedure::GetPoll;
    if let Some(text) = decode_rejection(procedure, outcome)? {
        return Ok(Decoded::Rejected(text));
    }

    let tuple = as_array(procedure, "poll tuple", payload(procedure, outcome)?)?;
    if tuple.len() < POLL_TUPLE_MIN_FIELDS {
        return Err(DecodeError::ShortTuple {
            procedure,
            len: tuple.len(),
            min: POLL_TUPLE_MIN_FIELDS,
        });
    }

    let id = as_u64(procedure, "poll id", &tuple[POLL_FIELD_ID])?;
    let question = as_str(procedure, "question", &tuple[POLL_FIELD_QUESTION])?.to_string();

    let options = as_array(procedure, "options", &tuple[POLL_FIELD_OPTIONS])?
        .iter()
        .enumerate()
        .map(|(i, opt)| {
            as_str(procedure, &format!("options[{}]", i), opt).map(str::to_string)
        })
        .collect::<Result<Vec<_>, _>>()?;

    let votes = decode_votes(procedure, &tuple[POLL_FIELD_VOTES], options.len())?;

    let active = tuple[POLL_FIELD_ACTIVE]
        .as_bool()
        .ok_or_else(|| unexpected(procedure, "active", "boolean", &tuple[POLL_FIELD_ACTIVE]))?;

    Ok(Decoded::Success(Poll {
        id,
        question,
        options,
        votes,
        active,
    }))
}

fn decode_votes(
    procedure: Procedure,
    value: &Value,
    options: usize,
) -> Result<HashMap<String, u64>, DecodeError> {
    let entries = value
        .as_map()
        .ok_or_else(|| unexpected(procedure, "votes", "map", value))?;

    let mut votes = HashMap::with_capacity(entries.len());
    for (key, count) in entries {
        let key = as_str(procedure, "vote key", key)?;
        let count = as_u64(procedure, &format!("votes[{:?}]", key), count)?;

        let in_range = key
            .parse::<usize>()
            .ok()
            .filter(|index| (1..=options).contains(index) && index.to_string() == key)
            .is_some();
        if !in_range {
            return Err(DecodeError::UnknownVoteKey {
                procedure,
                key: key.to_string(),
                options,
            });
        }

        votes.insert(key.to_string(), count);
    }

    Ok(votes)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Build a ten-field `get_poll` tuple in the store's layout.
    pub(crate) fn poll_tuple(
        id: u64,
        question: &str,
        options: &[&str],
        votes: &[(&str, u64)],
        active: bool,
    ) -> Value {
        Value::Array(vec![
            Value::from(id),
            Value::from(question),
            Value::Array(options.iter().map(|o| Value::from(*o)).collect()),
            Value::Map(
                votes
                    .iter()
                    .map(|(k, v)| (Value::from(*k), Value::from(*v)))
                    .collect(),
            ),
            Value::from("creator"),
            Value::from("channel"),
            Value::from(1_700_000_000u64),
            Value::Boolean(active),
            Value::Nil,
            Value::Map(vec![]),
        ])
    }

    fn wrapped_error(text: &str) -> Value {
        Value::Array(vec![Value::from(text)])
    }

    #[test]
    fn test_get_poll_success() {
        let outcome = RpcOutcome::new(vec![poll_tuple(
            7,
            "Fav color?",
            &["Red", "Blue"],
            &[("1", 3), ("2", 1)],
            true,
        )]);

        let Decoded::Success(poll) = decode_get_poll(&outcome).unwrap() else {
            panic!("expected success");
        };
        assert_eq!(poll.id, 7);
        assert_eq!(poll.question, "Fav color?");
        assert_eq!(poll.options, vec!["Red", "Blue"]);
        assert_eq!(poll.votes_for(1), 3);
        assert_eq!(poll.votes_for(2), 1);
        assert!(poll.active);
    }

    #[test]
    fn test_nil_error_slot_is_success() {
        let outcome = RpcOutcome::new(vec![
            poll_tuple(1, "Q", &["A"], &[], false),
            Value::Nil,
        ]);
        assert!(matches!(
            decode_get_poll(&outcome),
            Ok(Decoded::Success(Poll { active: false, .. }))
        ));
    }

    #[test]
    fn test_get_poll_rejection_is_wrapped() {
        let outcome = RpcOutcome::new(vec![Value::Nil, wrapped_error("poll not found")]);
        assert_eq!(
            decode_get_poll(&outcome),
            Ok(Decoded::Rejected("poll not found".to_string()))
        );
    }

    #[test]
    fn test_create_poll_rejection_is_not_wrapped() {
        let outcome = RpcOutcome::new(vec![Value::Nil, Value::from("too many options")]);
        assert_eq!(
            decode_create_poll(&outcome),
            Ok(Decoded::Rejected("too many options".to_string()))
        );

        // The wrapped shape used by the other procedures is not accepted here.
        let wrapped = RpcOutcome::new(vec![Value::Nil, wrapped_error("too many options")]);
        assert!(matches!(
            decode_create_poll(&wrapped),
            Err(DecodeError::UnexpectedType { expected: "string", found: "array", .. })
        ));
    }

    #[test]
    fn test_vote_rejection_requires_wrapping() {
        let bare = RpcOutcome::new(vec![Value::Array(vec![]), Value::from("already voted")]);
        assert!(matches!(
            decode_vote(&bare),
            Err(DecodeError::UnexpectedType { expected: "array", found: "string", .. })
        ));

        let empty = RpcOutcome::new(vec![Value::Array(vec![]), Value::Array(vec![])]);
        assert!(decode_vote(&empty).is_err());
    }

    #[test]
    fn test_ack_procedures() {
        let ok = RpcOutcome::new(vec![]);
        assert_eq!(decode_vote(&ok), Ok(Decoded::Success(())));
        assert_eq!(decode_close_poll(&ok), Ok(Decoded::Success(())));
        assert_eq!(decode_delete_poll(&ok), Ok(Decoded::Success(())));

        let rejected = RpcOutcome::new(vec![Value::Nil, wrapped_error("not creator")]);
        assert_eq!(
            decode_close_poll(&rejected),
            Ok(Decoded::Rejected("not creator".to_string()))
        );
        assert_eq!(
            decode_delete_poll(&rejected),
            Ok(Decoded::Rejected("not creator".to_string()))
        );
    }

    #[test]
    fn test_create_poll_success() {
        let outcome = RpcOutcome::new(vec![Value::Array(vec![Value::from(42u64)])]);
        assert_eq!(decode_create_poll(&outcome), Ok(Decoded::Success(42)));
    }

    #[test]
    fn test_create_poll_bad_payload() {
        let missing = RpcOutcome::new(vec![]);
        assert_eq!(
            decode_create_poll(&missing),
            Err(DecodeError::MissingPayload {
                procedure: Procedure::CreatePoll
            })
        );

        let bare = RpcOutcome::new(vec![Value::from(42u64)]);
        assert!(decode_create_poll(&bare).is_err());

        let negative = RpcOutcome::new(vec![Value::Array(vec![Value::from(-1i64)])]);
        assert!(matches!(
            decode_create_poll(&negative),
            Err(DecodeError::UnexpectedType { found: "integer", .. })
        ));
    }

    #[test]
    fn test_get_poll_short_tuple() {
        let outcome = RpcOutcome::new(vec![Value::Array(vec![Value::from(1u64); 9])]);
        assert_eq!(
            decode_get_poll(&outcome),
            Err(DecodeError::ShortTuple {
                procedure: Procedure::GetPoll,
                len: 9,
                min: POLL_TUPLE_MIN_FIELDS
            })
        );
    }

    fn with_field(index: usize, value: Value) -> RpcOutcome {
        let mut tuple = poll_tuple(1, "Q", &["A", "B"], &[("1", 1)], true);
        if let Value::Array(fields) = &mut tuple {
            fields[index] = value;
        }
        RpcOutcome::new(vec![tuple])
    }

    #[test]
    fn test_get_poll_field_type_mismatches() {
        let cases = [
            (POLL_FIELD_ID, Value::from("1"), "poll id"),
            (POLL_FIELD_QUESTION, Value::from(5u64), "question"),
            (POLL_FIELD_OPTIONS, Value::from("A,B"), "options"),
            (POLL_FIELD_VOTES, Value::Array(vec![]), "votes"),
            (POLL_FIELD_ACTIVE, Value::from(1u64), "active"),
        ];

        for (index, value, name) in cases {
            match decode_get_poll(&with_field(index, value)) {
                Err(DecodeError::UnexpectedType { field, .. }) => assert_eq!(field, name),
                other => panic!("field {} decoded to {:?}", name, other),
            }
        }
    }

    #[test]
    fn test_get_poll_non_string_option() {
        let outcome = with_field(
            POLL_FIELD_OPTIONS,
            Value::Array(vec![Value::from("A"), Value::from(2u64)]),
        );
        match decode_get_poll(&outcome) {
            Err(DecodeError::UnexpectedType { field, .. }) => assert_eq!(field, "options[1]"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_get_poll_vote_key_out_of_range() {
        for key in ["0", "3", "01", "x"] {
            let outcome = with_field(
                POLL_FIELD_VOTES,
                Value::Map(vec![(Value::from(key), Value::from(1u64))]),
            );
            assert!(
                matches!(
                    decode_get_poll(&outcome),
                    Err(DecodeError::UnknownVoteKey { options: 2, .. })
                ),
                "key {:?} should be rejected",
                key
            );
        }
    }

    #[test]
    fn test_get_poll_vote_count_must_be_unsigned() {
        let outcome = with_field(
            POLL_FIELD_VOTES,
            Value::Map(vec![(Value::from("1"), Value::from(-2i64))]),
        );
        assert!(matches!(
            decode_get_poll(&outcome),
            Err(DecodeError::UnexpectedType { expected: "unsigned integer", .. })
        ));
    }

    #[test]
    fn test_get_poll_missing_payload() {
        assert_eq!(
            decode_get_poll(&RpcOutcome::default()),
            Err(DecodeError::MissingPayload {
                procedure: Procedure::GetPoll
            })
        );
    }
}
