//! ParameterProvider trait - filter parameters for a new upstream request

use crate::ContractError;

/// Supplies the form parameters sent in the body of each upstream request.
///
/// Called once per consumer construction, so a parameter change takes
/// effect on the next (hot) restart.
#[trait_variant::make(ParameterProvider: Send)]
pub trait LocalParameterProvider {
    async fn params(&self) -> Result<Vec<(String, String)>, ContractError>;
}

/// Fixed parameter set
#[derive(Debug, Clone, Default)]
pub struct StaticParameters {
    params: Vec<(String, String)>,
}

impl StaticParameters {
    pub fn new(params: Vec<(String, String)>) -> Self {
        Self { params }
    }
}

impl ParameterProvider for StaticParameters {
    async fn params(&self) -> Result<Vec<(String, String)>, ContractError> {
        Ok(self.params.clone())
    }
}
