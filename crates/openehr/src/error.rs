use crate::rm::NodeHandle;

/// Errors returned by the `openehr` crate.
///
/// Domain validation failures are not errors: they are recorded as
/// [`ValidationError`](crate::am::ValidationError)s and returned in a report. Everything here is
/// either a contract violation by the caller or a path/operand resolution failure.
#[derive(Debug, thiserror::Error)]
pub enum OpenEhrError {
    #[error("invalid YAML: {0}")]
    InvalidYaml(#[from] serde_yaml::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("translation error: {0}")]
    Translation(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid archetype ID: {0}")]
    InvalidArchetypeId(String),

    #[error("invalid text: {0}")]
    Text(#[from] openehr_types::TextError),

    #[error("invalid interval: {0}")]
    Interval(#[from] openehr_types::IntervalError),

    #[error("node name cannot be empty")]
    EmptyName,

    #[error("unknown RM type '{0}'")]
    UnknownRmType(String),

    #[error("unknown node {0}")]
    UnknownNode(NodeHandle),

    #[error("{rm_type} has no attribute '{attribute}'")]
    UnknownAttribute { rm_type: String, attribute: String },

    #[error("{rm_type}.{attribute} is read-only")]
    ReadOnlyAttribute { rm_type: String, attribute: String },

    #[error("invalid value for {rm_type}.{attribute}: expected {expected}, got {actual}")]
    InvalidAttributeValue {
        rm_type: String,
        attribute: String,
        expected: String,
        actual: String,
    },

    #[error("{child} cannot be attached to {parent}.{attribute} (expects {expected})")]
    IncompatibleChild {
        parent: String,
        attribute: String,
        expected: String,
        child: String,
    },

    #[error("attaching {0} would create a cycle")]
    CyclicAttachment(NodeHandle),

    #[error("duplicate name '{name}' for node id '{node_id}' in collection")]
    DuplicateName { node_id: String, name: String },

    #[error("{0} already belongs to a different parent")]
    ParentConflict(NodeHandle),

    #[error("{0} is not a member of this collection")]
    NotACollectionMember(NodeHandle),

    #[error("invalid path '{path}': {reason}")]
    PathSyntax { path: String, reason: String },

    #[error("path '{0}' does not exist")]
    PathNotExist(String),

    #[error("path '{0}' is not unique")]
    PathNotUnique(String),

    #[error("{0} is not a descendant of the given root")]
    NotADescendant(NodeHandle),

    #[error("invalid constraint: {0}")]
    InvalidConstraint(String),

    #[error("duplicate attribute constraint '{0}'")]
    DuplicateAttributeConstraint(String),

    #[error("no default value rule for {0}")]
    NoDefaultValue(String),

    #[error("invalid operator: {0}")]
    InvalidOperator(String),

    #[error("invalid assertion: {0}")]
    InvalidAssertion(String),

    #[error("'{value}' is not a valid {kind} value")]
    InvalidValue { kind: String, value: String },

    #[error("operator '{operator}' is invalid for type '{type_name}'")]
    OperatorInvalidForType { operator: String, type_name: String },

    #[error("not supported: {0}")]
    Unsupported(String),

    #[error("missing operand: {0}")]
    MissingOperand(String),

    #[error("invalid pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

pub type OpenEhrResult<T> = std::result::Result<T, OpenEhrError>;

impl OpenEhrError {
    pub(crate) fn invalid_value(kind: &str, value: impl Into<String>) -> Self {
        OpenEhrError::InvalidValue {
            kind: kind.to_string(),
            value: value.into(),
        }
    }
}
