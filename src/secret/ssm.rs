use async_trait::async_trait;

use crate::secret::{SecretStore, SecretStoreError, Token};

/// AWS Systems Manager Parameter Store backend.
///
/// Reads a single `SecureString` parameter with decryption enabled.
#[derive(Clone)]
pub struct SsmSecretStore {
    client: aws_sdk_ssm::Client,
    parameter: String,
}

impl SsmSecretStore {
    /// Create a store reading one parameter.
    ///
    /// # Arguments
    ///
    /// * `client` - Configured SSM client.
    /// * `parameter` - Name of the parameter holding the token.
    pub fn new(client: aws_sdk_ssm::Client, parameter: impl Into<String>) -> Self {
        Self {
            client,
            parameter: parameter.into(),
        }
    }
}

#[async_trait]
impl SecretStore for SsmSecretStore {
    #[tracing::instrument(skip_all, fields(parameter = %self.parameter))]
    async fn fetch(&self) -> Result<Token, SecretStoreError> {
        let output = self
            .client
            .get_parameter()
            .name(&self.parameter)
            .with_decryption(true)
            .send()
            .await
            .map_err(SecretStoreError::backend)?;

        output
            .parameter()
            .and_then(|parameter| parameter.value())
            .map(Token::from)
            .ok_or_else(|| SecretStoreError::not_found(&self.parameter))
    }
}
