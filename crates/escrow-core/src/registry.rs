use serde::Deserialize;
use serde::Serialize;

use crate::call::CallRequest;
use crate::error::SessionError;
use crate::types::AbiType;
use crate::types::Address;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistryId {
    Relationship,
    Task,
}

impl RegistryId {
    pub fn label(self) -> &'static str {
        match self {
            Self::Relationship => "relationship registry",
            Self::Task => "task registry",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationId {
    RegisterChild,
    CountChildren,
    ListChildren,
    CreateTask,
    ReleaseTask,
    TasksByParent,
    TasksByChild,
    TaskDetails,
    HasSufficientBalance,
}

impl OperationId {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RegisterChild => "registerChild",
            Self::CountChildren => "countChildren",
            Self::ListChildren => "listChildren",
            Self::CreateTask => "createTask",
            Self::ReleaseTask => "releaseTask",
            Self::TasksByParent => "tasksByParent",
            Self::TasksByChild => "tasksByChild",
            Self::TaskDetails => "taskDetails",
            Self::HasSufficientBalance => "hasSufficientBalance",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallMode {
    Read,
    Write,
}

impl CallMode {
    pub fn label(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Payable {
    No,
    /// Attached value must equal the uint argument at this index.
    ValueEqualsArg(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputShape {
    Unit,
    Count,
    ChildList,
    TaskIds,
    TaskRecord,
    Bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationSpec {
    pub id: OperationId,
    pub registry: RegistryId,
    /// Function name in the registry's ABI.
    pub function: &'static str,
    pub title: &'static str,
    pub mode: CallMode,
    pub inputs: &'static [AbiType],
    pub payable: Payable,
    pub output: OutputShape,
}

pub struct OperationRegistry;

const OPERATION_SPECS: [OperationSpec; 9] = [
    OperationSpec {
        id: OperationId::RegisterChild,
        registry: RegistryId::Relationship,
        function: "addChild",
        title: "adding child",
        mode: CallMode::Write,
        inputs: &[AbiType::Address, AbiType::String],
        payable: Payable::No,
        output: OutputShape::Unit,
    },
    OperationSpec {
        id: OperationId::CountChildren,
        registry: RegistryId::Relationship,
        function: "getChildCount",
        title: "getting child count",
        mode: CallMode::Read,
        inputs: &[AbiType::Address],
        payable: Payable::No,
        output: OutputShape::Count,
    },
    OperationSpec {
        id: OperationId::ListChildren,
        registry: RegistryId::Relationship,
        function: "getChildren",
        title: "getting children",
        mode: CallMode::Read,
        inputs: &[AbiType::Address],
        payable: Payable::No,
        output: OutputShape::ChildList,
    },
    OperationSpec {
        id: OperationId::CreateTask,
        registry: RegistryId::Task,
        function: "createTask",
        title: "creating task",
        mode: CallMode::Write,
        inputs: &[AbiType::Address, AbiType::Uint256],
        payable: Payable::ValueEqualsArg(1),
        output: OutputShape::Unit,
    },
    OperationSpec {
        id: OperationId::ReleaseTask,
        registry: RegistryId::Task,
        function: "release",
        title: "releasing task",
        mode: CallMode::Write,
        inputs: &[AbiType::Uint256],
        payable: Payable::No,
        output: OutputShape::Unit,
    },
    OperationSpec {
        id: OperationId::TasksByParent,
        registry: RegistryId::Task,
        function: "getTasksByParent",
        title: "getting tasks",
        mode: CallMode::Read,
        inputs: &[AbiType::Address],
        payable: Payable::No,
        output: OutputShape::TaskIds,
    },
    OperationSpec {
        id: OperationId::TasksByChild,
        registry: RegistryId::Task,
        function: "getTasksByChild",
        title: "getting tasks",
        mode: CallMode::Read,
        inputs: &[AbiType::Address],
        payable: Payable::No,
        output: OutputShape::TaskIds,
    },
    OperationSpec {
        id: OperationId::TaskDetails,
        registry: RegistryId::Task,
        function: "getTaskDetails",
        title: "getting task details",
        mode: CallMode::Read,
        inputs: &[AbiType::Uint256],
        payable: Payable::No,
        output: OutputShape::TaskRecord,
    },
    OperationSpec {
        id: OperationId::HasSufficientBalance,
        registry: RegistryId::Task,
        function: "hasEnoughBalance",
        title: "checking balance",
        mode: CallMode::Read,
        inputs: &[AbiType::Uint256],
        payable: Payable::No,
        output: OutputShape::Bool,
    },
];

impl OperationRegistry {
    pub fn list() -> &'static [OperationSpec] {
        &OPERATION_SPECS
    }

    pub fn get(id: OperationId) -> &'static OperationSpec {
        match id {
            OperationId::RegisterChild => &OPERATION_SPECS[0],
            OperationId::CountChildren => &OPERATION_SPECS[1],
            OperationId::ListChildren => &OPERATION_SPECS[2],
            OperationId::CreateTask => &OPERATION_SPECS[3],
            OperationId::ReleaseTask => &OPERATION_SPECS[4],
            OperationId::TasksByParent => &OPERATION_SPECS[5],
            OperationId::TasksByChild => &OPERATION_SPECS[6],
            OperationId::TaskDetails => &OPERATION_SPECS[7],
            OperationId::HasSufficientBalance => &OPERATION_SPECS[8],
        }
    }

    pub fn for_registry(registry: RegistryId) -> impl Iterator<Item = &'static OperationSpec> {
        OPERATION_SPECS
            .iter()
            .filter(move |spec| spec.registry == registry)
    }

    pub fn by_function(registry: RegistryId, function: &str) -> Option<&'static OperationSpec> {
        Self::for_registry(registry).find(|spec| spec.function == function)
    }
}

pub const DEFAULT_RELATIONSHIP_REGISTRY: Address = Address::from_bytes([
    0xf8, 0x8c, 0x50, 0x1c, 0xba, 0x1d, 0xb7, 0x13, 0xc0, 0x80, 0xf8, 0x86, 0xc7, 0x4d, 0xb8,
    0x7f, 0xfd, 0x61, 0x6f, 0xb2,
]);

pub const DEFAULT_TASK_REGISTRY: Address = Address::from_bytes([
    0x94, 0x04, 0x07, 0x8d, 0xd1, 0x6f, 0x12, 0xc7, 0x52, 0x72, 0x15, 0xfe, 0xee, 0xcf, 0x4f,
    0xf8, 0x6f, 0x96, 0xda, 0x3c,
]);

/// On-chain location of each registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryAddresses {
    pub relationship: Address,
    pub task: Address,
}

impl Default for RegistryAddresses {
    fn default() -> Self {
        Self {
            relationship: DEFAULT_RELATIONSHIP_REGISTRY,
            task: DEFAULT_TASK_REGISTRY,
        }
    }
}

impl RegistryAddresses {
    pub fn address_of(&self, registry: RegistryId) -> Address {
        match registry {
            RegistryId::Relationship => self.relationship,
            RegistryId::Task => self.task,
        }
    }

    pub fn registry_at(&self, address: Address) -> Option<RegistryId> {
        if address == self.relationship {
            Some(RegistryId::Relationship)
        } else if address == self.task {
            Some(RegistryId::Task)
        } else {
            None
        }
    }
}

/// Checks a request against its declared signature without touching the network.
pub fn validate_request(request: &CallRequest) -> Result<&'static OperationSpec, SessionError> {
    let spec = OperationRegistry::get(request.operation);
    let op = spec.id.as_str();

    if request.registry != spec.registry {
        return Err(SessionError::invalid_arguments(
            op,
            format!("operation belongs to the {}", spec.registry.label()),
        ));
    }
    if request.mode != spec.mode {
        return Err(SessionError::invalid_arguments(
            op,
            format!("declared as {} but requested as {}", spec.mode.label(), request.mode.label()),
        ));
    }
    if request.arguments.len() != spec.inputs.len() {
        return Err(SessionError::invalid_arguments(
            op,
            format!(
                "expected {} argument(s), got {}",
                spec.inputs.len(),
                request.arguments.len()
            ),
        ));
    }
    for (index, (expected, actual)) in spec.inputs.iter().zip(&request.arguments).enumerate() {
        if actual.abi_type() != Some(*expected) {
            return Err(SessionError::invalid_arguments(
                op,
                format!(
                    "argument {index} must be {}, got {}",
                    expected.label(),
                    actual.type_label()
                ),
            ));
        }
    }

    match (spec.payable, request.value_attached) {
        (Payable::No, None) => {}
        (Payable::No, Some(_)) => {
            return Err(SessionError::invalid_arguments(
                op,
                "operation does not accept an attached value",
            ));
        }
        (Payable::ValueEqualsArg(_), None) => {
            return Err(SessionError::invalid_arguments(op, "attached value is required"));
        }
        (Payable::ValueEqualsArg(index), Some(value)) => {
            let bound = request.arguments[index].as_uint().unwrap_or_default();
            if bound == 0 {
                return Err(SessionError::invalid_arguments(op, "amount must be positive"));
            }
            if value.0 != bound {
                return Err(SessionError::invalid_arguments(
                    op,
                    format!("attached value {value} must equal amount {bound}"),
                ));
            }
        }
    }

    Ok(spec)
}
