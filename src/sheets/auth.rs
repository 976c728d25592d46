use yup_oauth2::{read_service_account_key, ServiceAccountAuthenticator};

use crate::config::SheetsConfig;
use crate::sheets::data::SheetsError;
use crate::sheets::SheetsClient;

pub async fn authenticate(config: &SheetsConfig) -> Result<SheetsClient, SheetsError> {
    let secret = read_service_account_key(&config.credentials_path)
        .await
        .map_err(|e| SheetsError::Credentials(config.credentials_path.clone(), e))?;

    let authenticator = ServiceAccountAuthenticator::builder(secret)
        .build()
        .await
        .map_err(|e| SheetsError::Credentials(config.credentials_path.clone(), e))?;

    let token = authenticator.token(config.scopes.as_slice()).await?;
    let access_token = token.token().ok_or(SheetsError::EmptyToken)?;

    log::info!("Authorized Google service account");
    Ok(SheetsClient::new(access_token.to_string()))
}
