use thiserror::Error;

use lumo_types::EngineError;

#[derive(Debug, Error)]
pub enum RateError {
    #[error("pricing feed request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("pricing feed returned malformed payload: {0}")]
    Decode(String),

    #[error("no current fee rates for {0}")]
    FeeRatesUnavailable(String),
}

impl From<RateError> for EngineError {
    fn from(err: RateError) -> Self {
        match err {
            RateError::FeeRatesUnavailable(currency) => {
                EngineError::FeeRateUnavailable(currency)
            }
            other => EngineError::Unknown(other.to_string()),
        }
    }
}
