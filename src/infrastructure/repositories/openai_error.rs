use crate::domain::resilience::ProviderError;
use async_openai::error::OpenAIError;

/// Keep status, code and message so failures can be classified
pub fn provider_error(err: OpenAIError) -> ProviderError {
    match &err {
        OpenAIError::ApiError(api) => {
            let mut provider = ProviderError::new(api.message.clone());
            if let Some(code) = api.code.as_ref() {
                provider = provider.with_code(code.to_string());
            }
            provider
        }
        OpenAIError::Reqwest(e) => {
            let provider = ProviderError::new(e.to_string());
            match e.status() {
                Some(status) => provider.with_status(status.as_u16()),
                None => provider,
            }
        }
        _ => ProviderError::new(err.to_string()),
    }
}
