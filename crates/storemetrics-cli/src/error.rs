use storemetrics_warehouse::WarehouseError;
use thiserror::Error;

/// CLI-level error categories mapped to exit codes.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Warehouse(#[from] WarehouseError),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Warehouse(WarehouseError::Connectivity { .. }) => 7,
            Self::Warehouse(_) => 2,
            Self::Serialization(_) => 4,
            Self::Io(_) => 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use storemetrics_warehouse::BackendKind;

    #[test]
    fn connectivity_failures_have_their_own_exit_code() {
        let error = CliError::from(WarehouseError::Connectivity {
            backend: BackendKind::Cloud,
            message: String::from("unreachable"),
        });
        assert_eq!(error.exit_code(), 7);
        assert_eq!(
            CliError::from(WarehouseError::UnknownDimension(4)).exit_code(),
            2
        );
    }
}
