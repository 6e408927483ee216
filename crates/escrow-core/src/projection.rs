//! Pure mapping from raw registry responses into display-ready records.
//!
//! The only failure is `MalformedResponse`: the registry answered with a shape
//! that does not match the operation's declared output.

use serde::Deserialize;
use serde::Serialize;

use crate::error::SessionError;
use crate::registry::OperationId;
use crate::registry::OperationRegistry;
use crate::registry::OutputShape;
use crate::types::AbiValue;
use crate::types::Address;
use crate::types::AmountWei;
use crate::types::TaskId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: TaskId,
    pub parent: Address,
    pub child: Address,
    pub amount: AmountWei,
    pub released: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipEntry {
    pub parent: Address,
    pub child: Address,
    /// Opaque to the session manager.
    pub secret_commitment: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BalanceStatus {
    Sufficient,
    Insufficient,
}

impl BalanceStatus {
    pub fn is_sufficient(self) -> bool {
        self == Self::Sufficient
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Sufficient => "Yes",
            Self::Insufficient => "No",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum Projected {
    Unit,
    ChildCount(u64),
    Children(Vec<RelationshipEntry>),
    TaskIds(Vec<TaskId>),
    Task(TaskRecord),
    Balance(BalanceStatus),
}

fn uint_field(raw: &AbiValue, what: &str) -> Result<u128, SessionError> {
    raw.as_uint()
        .ok_or_else(|| SessionError::malformed(what, raw.type_label()))
}

fn u64_field(raw: &AbiValue, what: &str) -> Result<u64, SessionError> {
    let value = uint_field(raw, what)?;
    u64::try_from(value).map_err(|_| SessionError::malformed(what, value))
}

fn address_field(raw: &AbiValue, what: &str) -> Result<Address, SessionError> {
    raw.as_address()
        .ok_or_else(|| SessionError::malformed(what, raw.type_label()))
}

/// `(id, parent, child, amount, released)` tuple into a `TaskRecord`.
pub fn project_task_record(raw: &AbiValue) -> Result<TaskRecord, SessionError> {
    let AbiValue::Tuple(fields) = raw else {
        return Err(SessionError::malformed("task tuple", raw.type_label()));
    };
    let [id, parent, child, amount, released] = fields.as_slice() else {
        return Err(SessionError::malformed(
            "task tuple of 5 fields",
            format!("{} field(s)", fields.len()),
        ));
    };
    Ok(TaskRecord {
        id: TaskId(u64_field(id, "task id")?),
        parent: address_field(parent, "parent address")?,
        child: address_field(child, "child address")?,
        amount: AmountWei(uint_field(amount, "task amount")?),
        released: released
            .as_bool()
            .ok_or_else(|| SessionError::malformed("released flag", released.type_label()))?,
    })
}

pub fn project_task_ids(raw: &AbiValue) -> Result<Vec<TaskId>, SessionError> {
    let AbiValue::Array(items) = raw else {
        return Err(SessionError::malformed("task id array", raw.type_label()));
    };
    items
        .iter()
        .map(|item| u64_field(item, "task id").map(TaskId))
        .collect()
}

/// Child listing of `parent`; each element is `(child, commitment)` or a bare address.
pub fn project_children(parent: Address, raw: &AbiValue) -> Result<Vec<RelationshipEntry>, SessionError> {
    let AbiValue::Array(items) = raw else {
        return Err(SessionError::malformed("child array", raw.type_label()));
    };
    items
        .iter()
        .map(|item| match item {
            AbiValue::Address(child) => Ok(RelationshipEntry {
                parent,
                child: *child,
                secret_commitment: Vec::new(),
            }),
            AbiValue::Tuple(fields) => match fields.as_slice() {
                [child, AbiValue::Bytes(commitment)] => Ok(RelationshipEntry {
                    parent,
                    child: address_field(child, "child address")?,
                    secret_commitment: commitment.clone(),
                }),
                _ => Err(SessionError::malformed(
                    "(address, bytes) child entry",
                    format!("tuple of {} field(s)", fields.len()),
                )),
            },
            other => Err(SessionError::malformed("child entry", other.type_label())),
        })
        .collect()
}

pub fn project_child_count(raw: &AbiValue) -> Result<u64, SessionError> {
    u64_field(raw, "child count")
}

pub fn project_balance(raw: &AbiValue) -> Result<BalanceStatus, SessionError> {
    match raw.as_bool() {
        Some(true) => Ok(BalanceStatus::Sufficient),
        Some(false) => Ok(BalanceStatus::Insufficient),
        None => Err(SessionError::malformed("bool", raw.type_label())),
    }
}

/// Projects by the operation's declared output shape. `subject` is the
/// address argument of the request (parent for child listings).
pub fn project(
    operation: OperationId,
    subject: Option<Address>,
    raw: &AbiValue,
) -> Result<Projected, SessionError> {
    match OperationRegistry::get(operation).output {
        OutputShape::Unit => Ok(Projected::Unit),
        OutputShape::Count => project_child_count(raw).map(Projected::ChildCount),
        OutputShape::ChildList => {
            let parent = subject.ok_or_else(|| {
                SessionError::invalid_arguments(operation.as_str(), "missing parent address")
            })?;
            project_children(parent, raw).map(Projected::Children)
        }
        OutputShape::TaskIds => project_task_ids(raw).map(Projected::TaskIds),
        OutputShape::TaskRecord => project_task_record(raw).map(Projected::Task),
        OutputShape::Bool => project_balance(raw).map(Projected::Balance),
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn raw_task(id: u128, released: bool) -> AbiValue {
        AbiValue::Tuple(vec![
            AbiValue::Uint(id),
            AbiValue::Address(Address::from_low_u64(0xAA)),
            AbiValue::Address(Address::from_low_u64(0xBB)),
            AbiValue::Uint(100),
            AbiValue::Bool(released),
        ])
    }

    #[test]
    fn task_tuple_projects_without_field_loss() {
        let record = project_task_record(&raw_task(7, false)).expect("project");
        assert_eq!(
            record,
            TaskRecord {
                id: TaskId(7),
                parent: Address::from_low_u64(0xAA),
                child: Address::from_low_u64(0xBB),
                amount: AmountWei(100),
                released: false,
            }
        );
    }

    #[test]
    fn task_tuple_with_wrong_arity_is_malformed() {
        let raw = AbiValue::Tuple(vec![AbiValue::Uint(1)]);
        let err = project_task_record(&raw).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::MalformedResponse);
    }

    #[test]
    fn oversized_task_id_is_malformed() {
        let err = project_task_record(&raw_task(u128::from(u64::MAX) + 1, true)).unwrap_err();
        assert!(matches!(err, SessionError::MalformedResponse(_)));
    }

    #[test]
    fn empty_child_list_is_empty_not_missing() {
        let parent = Address::from_low_u64(1);
        let entries = project_children(parent, &AbiValue::Array(Vec::new())).expect("project");
        assert!(entries.is_empty());
    }

    #[test]
    fn child_list_keeps_order_and_commitments() {
        let parent = Address::from_low_u64(1);
        let raw = AbiValue::Array(vec![
            AbiValue::Tuple(vec![
                AbiValue::Address(Address::from_low_u64(2)),
                AbiValue::Bytes(vec![0xde, 0xad]),
            ]),
            AbiValue::Address(Address::from_low_u64(3)),
        ]);
        let entries = project_children(parent, &raw).expect("project");
        let children: Vec<Address> = entries.iter().map(|entry| entry.child).collect();
        assert_eq!(
            children,
            vec![Address::from_low_u64(2), Address::from_low_u64(3)]
        );
        assert_eq!(entries[0].secret_commitment, vec![0xde, 0xad]);
        assert!(entries[1].secret_commitment.is_empty());
        assert!(entries.iter().all(|entry| entry.parent == parent));
    }

    #[test]
    fn balance_flag_is_typed() {
        assert_eq!(
            project_balance(&AbiValue::Bool(true)),
            Ok(BalanceStatus::Sufficient)
        );
        assert!(project_balance(&AbiValue::Uint(1)).is_err());
    }

    #[test]
    fn dispatcher_follows_output_shape() {
        let ids = AbiValue::Array(vec![AbiValue::Uint(1), AbiValue::Uint(4)]);
        assert_eq!(
            project(OperationId::TasksByChild, None, &ids),
            Ok(Projected::TaskIds(vec![TaskId(1), TaskId(4)]))
        );
        assert_eq!(
            project(OperationId::ReleaseTask, None, &AbiValue::Bool(true)),
            Ok(Projected::Unit)
        );
        assert_eq!(
            project(OperationId::CountChildren, None, &AbiValue::Uint(2)),
            Ok(Projected::ChildCount(2))
        );
    }
}
