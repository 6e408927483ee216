use serde::Serialize;

use crate::registry::CallMode;
use crate::registry::OperationId;
use crate::registry::OperationRegistry;
use crate::registry::OperationSpec;
use crate::registry::RegistryId;
use crate::types::AbiValue;
use crate::types::Address;
use crate::types::AmountWei;
use crate::types::RequestId;
use crate::types::TaskId;

/// One intended registry interaction, built per user action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallRequest {
    pub id: RequestId,
    pub registry: RegistryId,
    pub operation: OperationId,
    pub arguments: Vec<AbiValue>,
    pub mode: CallMode,
    pub value_attached: Option<AmountWei>,
}

impl CallRequest {
    /// Registry and mode are taken from the operation table.
    pub fn new(operation: OperationId, arguments: Vec<AbiValue>) -> Self {
        let spec = OperationRegistry::get(operation);
        Self {
            id: RequestId::next(),
            registry: spec.registry,
            operation,
            arguments,
            mode: spec.mode,
            value_attached: None,
        }
    }

    pub fn with_value(mut self, value: AmountWei) -> Self {
        self.value_attached = Some(value);
        self
    }

    pub fn register_child(child: Address, secret: impl Into<String>) -> Self {
        Self::new(
            OperationId::RegisterChild,
            vec![child.into(), AbiValue::String(secret.into())],
        )
    }

    pub fn count_children(parent: Address) -> Self {
        Self::new(OperationId::CountChildren, vec![parent.into()])
    }

    pub fn list_children(parent: Address) -> Self {
        Self::new(OperationId::ListChildren, vec![parent.into()])
    }

    /// Escrows `amount`: the same value is attached to the transaction.
    pub fn create_task(child: Address, amount: AmountWei) -> Self {
        Self::new(OperationId::CreateTask, vec![child.into(), amount.into()]).with_value(amount)
    }

    pub fn release_task(task_id: TaskId) -> Self {
        Self::new(OperationId::ReleaseTask, vec![task_id.into()])
    }

    pub fn tasks_by_parent(parent: Address) -> Self {
        Self::new(OperationId::TasksByParent, vec![parent.into()])
    }

    pub fn tasks_by_child(child: Address) -> Self {
        Self::new(OperationId::TasksByChild, vec![child.into()])
    }

    pub fn task_details(task_id: TaskId) -> Self {
        Self::new(OperationId::TaskDetails, vec![task_id.into()])
    }

    pub fn has_sufficient_balance(task_id: TaskId) -> Self {
        Self::new(OperationId::HasSufficientBalance, vec![task_id.into()])
    }

    pub fn spec(&self) -> &'static OperationSpec {
        OperationRegistry::get(self.operation)
    }

    pub fn is_write(&self) -> bool {
        self.mode == CallMode::Write
    }

    /// First address argument, i.e. the parent a child listing belongs to.
    pub fn subject_address(&self) -> Option<Address> {
        self.arguments.iter().find_map(AbiValue::as_address)
    }
}
