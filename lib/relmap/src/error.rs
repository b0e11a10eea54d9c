use thiserror::Error;

/// MySQL numeric code for a duplicate entry on a unique index.
pub const ER_DUP_ENTRY: u32 = 1062;
/// MySQL numeric codes for foreign-key failures (child and parent side).
pub const ER_NO_REFERENCED_ROW: u32 = 1216;
pub const ER_ROW_IS_REFERENCED: u32 = 1217;
pub const ER_ROW_IS_REFERENCED_2: u32 = 1451;
pub const ER_NO_REFERENCED_ROW_2: u32 = 1452;

#[derive(Error, Debug)]
pub enum MapperError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Execution failed [{state}] ({code}): {message}")]
    Execution {
        state: String,
        code: u32,
        message: String,
    },

    #[error("Column `{column}` does not exist on table `{table}`")]
    SchemaMismatch { table: String, column: String },

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl MapperError {
    pub fn invalid(message: impl Into<String>) -> Self {
        MapperError::InvalidArgument(message.into())
    }

    /// Build an execution failure from driver-reported parts.
    pub fn execution(state: impl Into<String>, code: u32, message: impl Into<String>) -> Self {
        MapperError::Execution {
            state: state.into(),
            code,
            message: message.into(),
        }
    }

    /// Driver numeric code, if this is an execution failure.
    pub fn code(&self) -> Option<u32> {
        match self {
            MapperError::Execution { code, .. } => Some(*code),
            _ => None,
        }
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            MapperError::Execution { message, .. } => Some(message),
            _ => None,
        }
    }

    /// A unique-constraint conflict on insert or update.
    pub fn is_unique_violation(&self) -> bool {
        match self {
            MapperError::Execution {
                state,
                code,
                message,
            } => {
                *code == ER_DUP_ENTRY
                    || (state == "23000" && message.contains("Duplicate entry"))
            }
            _ => false,
        }
    }

    /// A foreign-key constraint failure (either side).
    pub fn is_foreign_key_violation(&self) -> bool {
        match self {
            MapperError::Execution { code, message, .. } => {
                matches!(
                    *code,
                    ER_NO_REFERENCED_ROW
                        | ER_ROW_IS_REFERENCED
                        | ER_ROW_IS_REFERENCED_2
                        | ER_NO_REFERENCED_ROW_2
                ) || message.contains("a foreign key constraint fails")
            }
            _ => false,
        }
    }
}
